use std::{fmt::Debug, future::Future};

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::{INGREDIENT_CACHE_KEY, INGREDIENT_SEARCH_TTL, TAG_CACHE_KEY},
    error::{CacheError, Error},
};

// Caching - keys

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tags,
    /// Ingredient search results for a name prefix.
    Ingredients(String),
}

impl CacheKeyType {
    pub fn key(&self) -> String {
        match self {
            CacheKeyType::Tags => "tags".to_owned(),
            CacheKeyType::Ingredients(prefix) => {
                format!("ingredients-{}", prefix.to_lowercase())
            }
        }
    }

    pub fn lifetime(&self) -> CacheLifetime {
        match self {
            CacheKeyType::Tags => CacheLifetime::BindTagCache,
            CacheKeyType::Ingredients(_) => CacheLifetime::BindIngredientCache,
        }
    }

    /// Seconds before redis drops the entry on its own. Search keys are
    /// client controlled, so they always expire.
    pub fn expiry(&self) -> Option<u64> {
        match self {
            CacheKeyType::Tags => None,
            CacheKeyType::Ingredients(_) => Some(INGREDIENT_SEARCH_TTL),
        }
    }
}

// Cache - wrappers

/// What a cached value is tied to. Bound values are dropped as soon as the
/// generation stored under the bind key changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindTagCache,
    BindIngredientCache,
}

impl CacheLifetime {
    fn bind_key(&self) -> &'static str {
        match self {
            CacheLifetime::BindTagCache => TAG_CACHE_KEY,
            CacheLifetime::BindIngredientCache => INGREDIENT_CACHE_KEY,
        }
    }

    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, CacheError> {
        get_cache_value::<&str, String>(self.bind_key(), cache).await
    }

    /// Starts a new generation, invalidating every value bound to it.
    pub async fn invalidate(&self, cache: &mut MultiplexedConnection) -> Result<(), CacheError> {
        let generation = uuid::Uuid::new_v4().to_string();
        set_cache_value(self.bind_key(), generation, None, cache).await
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
pub struct RedisValue {
    pub value: Value,
    lifetime: CacheLifetime,
    bind: Option<String>,
}

impl RedisValue {
    async fn new<T: Serialize>(
        value: &T,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, CacheError> {
        let bind = lifetime.get_cache_bind(cache).await?;
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::new(format!("{e}")))?;

        Ok(Self {
            value,
            lifetime,
            bind,
        })
    }

    async fn validate(&self, cache: &mut MultiplexedConnection) -> Result<bool, CacheError> {
        Ok(self.bind == self.lifetime.get_cache_bind(cache).await?)
    }

    /// Cached value for `key`, `None` on a miss or an invalidated entry.
    pub async fn lookup<T: DeserializeOwned>(
        key: &CacheKeyType,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<T>, CacheError> {
        let Some(value) = get_cache_value::<String, RedisValue>(key.key(), cache).await? else {
            return Ok(None);
        };

        if !value.validate(cache).await? {
            log::trace!("> Invalidated {}", key.key());
            delete_cache_value(key.key(), cache).await?;
            return Ok(None);
        }

        log::trace!("> Found {}", key.key());
        match serde_json::from_value(value.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::error!("> Failed to deserialize cached value {}: {e}", key.key());
                delete_cache_value(key.key(), cache).await?;
                Ok(None)
            }
        }
    }

    pub async fn store<T: Serialize>(
        key: &CacheKeyType,
        value: &T,
        cache: &mut MultiplexedConnection,
    ) -> Result<(), CacheError> {
        let value = RedisValue::new(value, key.lifetime(), cache).await?;
        set_cache_value(key.key(), value, key.expiry(), cache).await
    }
}

/// Serves `key` from redis when a valid entry exists, otherwise runs
/// `callback` and caches its result. Without a connection, or when redis
/// misbehaves, this degrades to calling `callback`.
pub async fn get_or_list<T, F, Fut>(
    key: CacheKeyType,
    cache: Option<MultiplexedConnection>,
    callback: F,
) -> Result<Vec<T>, Error>
where
    T: Serialize + DeserializeOwned + Debug,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, Error>>,
{
    let Some(mut cache) = cache else {
        return callback().await;
    };

    match RedisValue::lookup::<Vec<T>>(&key, &mut cache).await {
        Ok(Some(value)) => return Ok(value),
        Ok(None) => {}
        Err(e) => log::warn!("Cache lookup for {} failed: {e}", key.key()),
    }

    log::trace!("> Fetching {}", key.key());
    let value = callback().await?;

    if let Err(e) = RedisValue::store(&key, &value, &mut cache).await {
        log::warn!("Cache store for {} failed: {e}", key.key());
    }

    Ok(value)
}

/// Drops every cached value bound to `lifetime`. Failures are logged only.
pub async fn invalidate(lifetime: CacheLifetime, cache: Option<MultiplexedConnection>) {
    if let Some(mut cache) = cache {
        if let Err(e) = lifetime.invalidate(&mut cache).await {
            log::warn!("Failed to invalidate {lifetime:?}: {e}");
        }
    }
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    expiry: Option<u64>,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    match expiry {
        Some(seconds) => {
            let _: () = cache.set_ex(key, value, seconds).await?;
        }
        None => {
            let _: () = cache.set(key, value).await?;
        }
    }

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), CacheError> {
    let _: () = cache.del(key).await?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, CacheError> {
    let value: Option<V> = cache.get(key).await?;

    Ok(value)
}
