use anyhow::Result;
use switchyard::{config::Config, server};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG wins, otherwise info until the config is read
    let env_filter = EnvFilter::try_from_default_env();
    let filter_from_env = env_filter.is_ok();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    info!("🚀 Switchyard v{}", switchyard::VERSION);

    // Load configuration
    let config = Config::load()?;
    if !filter_from_env {
        filter_handle.reload(EnvFilter::new(&config.server.log_level))?;
    }

    info!("✓ Configuration loaded");
    info!("  HTTP: {}", config.server.bind);
    info!("  Public URL: {}", config.server.public_url);

    server::run(config).await?;

    Ok(())
}
