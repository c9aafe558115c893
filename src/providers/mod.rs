pub mod elevenlabs;
pub mod openai_compat;
pub mod sambanova;

use crate::config::{ProviderConfig, ProviderKind, TtsConfig};
use crate::error::ProviderError;
use crate::types::{ProviderOutput, ProviderRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Provider trait for model inference
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider identifier
    fn id(&self) -> &str;

    /// Fetch the upstream model catalog. `None` means the provider has no
    /// remote catalog and relies on configured models.
    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError> {
        Ok(None)
    }

    /// Execute a normalized request
    async fn execute(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError>;
}

/// Shared HTTP client with a bounded per-request timeout
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Construct the executor for a configured provider. Catalog entries have none.
pub fn build_provider(
    id: &str,
    config: &ProviderConfig,
    tts: &TtsConfig,
    client: reqwest::Client,
) -> Option<Arc<dyn ChatProvider>> {
    match config.kind {
        ProviderKind::Sambanova => Some(Arc::new(sambanova::SambaNovaProvider::from_config(
            id, config, client,
        ))),
        ProviderKind::OpenaiCompatible => Some(Arc::new(
            openai_compat::OpenAICompatProvider::from_config(id, config, client),
        )),
        ProviderKind::Elevenlabs => Some(Arc::new(
            elevenlabs::ElevenLabsProvider::from_config(id, config, tts, client),
        )),
        ProviderKind::Catalog => None,
    }
}
