use std::{convert::Infallible, sync::Arc, time::Duration};

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use warp::Filter;

use crate::{
    config::Config,
    error::{CacheError, QueryError},
};

/// Everything a handler needs, passed explicitly down the filter tree.
#[derive(Clone)]
pub struct State {
    pub pool: Pool<Postgres>,
    pub cache: Option<MultiplexedConnection>,
    pub config: Arc<Config>,
}

impl State {
    pub fn new(pool: Pool<Postgres>, cache: Option<MultiplexedConnection>, config: Config) -> Self {
        Self {
            pool,
            cache,
            config: Arc::new(config),
        }
    }

    pub async fn connect(config: Config) -> Result<Self, QueryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await?;

        let cache = match &config.redis_url {
            Some(url) => match init_redis(url).await {
                Ok(connection) => Some(connection),
                Err(e) => {
                    log::warn!("Redis unavailable, continuing without cache: {e}");
                    None
                }
            },
            None => {
                log::info!("REDIS_URL not set, caching disabled");
                None
            }
        };

        Ok(Self::new(pool, cache, config))
    }
}

async fn init_redis(redis_url: &str) -> Result<MultiplexedConnection, CacheError> {
    let client = redis::Client::open(redis_url)?;
    let connection = client.get_multiplexed_async_connection().await?;

    Ok(connection)
}

pub fn with_state(state: State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
