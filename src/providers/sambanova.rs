use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::providers::ChatProvider;
use crate::providers::openai_compat::OpenAICompatProvider;
use crate::types::{ProviderOutput, ProviderRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use tracing::info;

pub const DEFAULT_ENDPOINT: &str = "https://api.sambanova.ai";

/// A model as listed by the SambaNova catalog endpoint
#[derive(Debug, Deserialize)]
struct SambaNovaModel {
    model: String,
}

#[derive(Debug, Deserialize)]
struct ModelsObject {
    models: Vec<SambaNovaModel>,
}

/// SambaNova Cloud, served through its OpenAI-compatible API
pub struct SambaNovaProvider {
    inner: OpenAICompatProvider,
}

impl SambaNovaProvider {
    pub fn new(id: &str, endpoint: String, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            inner: OpenAICompatProvider::new(id, "SambaNova", endpoint, api_key, client),
        }
    }

    /// Endpoint: config, then `SAMBANOVA_API_ENDPOINT`, then the public API.
    /// Key: config, then `SAMBANOVA_API_KEY`.
    pub fn from_config(id: &str, config: &ProviderConfig, client: reqwest::Client) -> Self {
        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| env::var("SAMBANOVA_API_ENDPOINT").ok())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Self::new(id, endpoint, config.resolve_api_key(), client)
    }

    pub fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    /// Accepts the native `{ models: [{ model }] }` catalog or the OpenAI `{ data: [{ id }] }` list
    fn parse_catalog(value: serde_json::Value) -> Result<Vec<String>, ProviderError> {
        if value.get("models").is_some() {
            let catalog: ModelsObject = serde_json::from_value(value)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            return Ok(catalog.models.into_iter().map(|m| m.model).collect());
        }
        OpenAICompatProvider::parse_model_list(value)
    }
}

#[async_trait]
impl ChatProvider for SambaNovaProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError> {
        let value = self.inner.fetch_models_json().await?;
        let models = Self::parse_catalog(value)?;
        info!(count = models.len(), "Fetched SambaNova models");
        Ok(Some(models))
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError> {
        self.inner.chat(request).await
    }
}
