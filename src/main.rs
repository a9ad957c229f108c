use std::{error::Error, net::SocketAddr};

use foodgram::{api::routes::routes, config::Config, fixtures::load_fixtures, state::State};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("Foodgram stopped: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = State::connect(config).await?;
    sqlx::migrate!("./migrations").run(&state.pool).await?;
    log::info!("Database migrated");

    load_fixtures(&state).await?;

    log::info!("Listening on {address}");
    warp::serve(routes(state)).run(address).await;

    Ok(())
}
