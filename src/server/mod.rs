pub mod http;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::providers::{build_http_client, elevenlabs::ElevenLabsClient};
use crate::registry::ProviderRegistry;
use crate::storage::LocalFileStore;
use crate::tts::TtsProxy;
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Wire the registry, dispatcher and TTS proxy from configuration
pub async fn build_state(config: Config) -> Result<http::AppState> {
    let registry = Arc::new(ProviderRegistry::build(&config).await);
    info!("✓ {} providers registered", registry.len());

    let dispatcher = Arc::new(Dispatcher::from_config(&config, registry));

    tokio::fs::create_dir_all(&config.storage.upload_dir).await?;
    let store = Arc::new(LocalFileStore::new(
        &config.storage.upload_dir,
        &config.storage.serve_prefix,
    ));

    let tts_client = ElevenLabsClient::new(
        config.tts.endpoint.clone(),
        build_http_client(Duration::from_secs(config.tts.timeout_secs)),
    );
    let tts = Arc::new(TtsProxy::new(
        tts_client,
        store,
        &config.server.public_url,
        config.tts.default_model.clone(),
    ));

    Ok(http::AppState {
        config: Arc::new(config),
        dispatcher,
        tts,
    })
}

/// Run the HTTP server until it exits or fails
pub async fn run(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let state = build_state(config).await?;

    info!("🌐 HTTP server starting on {}", bind);
    http::serve(&bind, state).await
}
