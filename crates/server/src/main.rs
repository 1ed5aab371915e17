use cell_authz::AppState;
use cell_authz::api::start_webserver;
use cell_authz::config::load_config_or_panic;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "cell_authz=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let layer = fmt::layer().with_target(true).with_level(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; config.yaml and the environment still apply.
    let _ = dotenvy::dotenv();

    initialize_tracing();

    let config = Arc::new(load_config_or_panic());
    tracing::info!(
        base_url = %config.base_url,
        listen_addr = %config.listen_addr,
        admin_nets = config.admin.allowed_nets.len(),
        "configuration loaded"
    );

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let state = AppState::new(db, config)?;

    start_webserver(state).await?;
    Ok(())
}
