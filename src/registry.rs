use crate::config::{Config, ProviderConfig};
use crate::error::DispatchError;
use crate::providers::{self, ChatProvider};
use crate::types::ProviderDescriptor;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const DESCRIPTOR_VERSION: &str = "1.0.0";

struct ProviderEntry {
    descriptor: ProviderDescriptor,
    executor: Option<Arc<dyn ChatProvider>>,
}

/// Registered providers, built once at startup and read-only afterwards
#[derive(Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider. `executor = None` registers a listing-only entry.
    pub fn register(&mut self, descriptor: ProviderDescriptor, executor: Option<Arc<dyn ChatProvider>>) {
        self.entries
            .insert(descriptor.id.clone(), ProviderEntry { descriptor, executor });
    }

    /// Build from config, discovering model catalogs concurrently.
    ///
    /// A failed discovery leaves that provider with an empty model list;
    /// startup never aborts because one upstream is down.
    pub async fn build(config: &Config) -> Self {
        let client = providers::build_http_client(config.server.request_timeout());

        let pending: Vec<_> = config
            .enabled_providers()
            .into_iter()
            .map(|(id, provider_config)| {
                let executor = providers::build_provider(&id, provider_config, &config.tts, client.clone());
                (id, provider_config, executor)
            })
            .collect();

        let discovered = join_all(pending.iter().map(|(id, provider_config, executor)| {
            discover_models(id, provider_config, executor.as_deref())
        }))
        .await;

        let mut registry = Self::new();
        for ((id, provider_config, executor), models) in pending.into_iter().zip(discovered) {
            let descriptor = describe(&id, provider_config, models);
            info!(
                provider = %id,
                kind = provider_config.kind.as_str(),
                models = descriptor.models.len(),
                executable = executor.is_some(),
                "Registered provider"
            );
            crate::metrics::METRICS
                .provider_models
                .with_label_values(&[&id])
                .set(descriptor.models.len() as f64);
            registry.register(descriptor, executor);
        }

        registry
    }

    pub fn lookup(&self, id: &str) -> Result<&ProviderDescriptor, DispatchError> {
        self.entries
            .get(id)
            .map(|entry| &entry.descriptor)
            .ok_or_else(|| DispatchError::ProviderNotFound(id.to_string()))
    }

    /// Resolve a provider for execution
    pub fn executor(&self, id: &str) -> Result<Arc<dyn ChatProvider>, DispatchError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| DispatchError::ProviderNotFound(id.to_string()))?;

        entry
            .executor
            .clone()
            .ok_or_else(|| DispatchError::ExecutorMissing(id.to_string()))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.entries.values().map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn discover_models(
    id: &str,
    config: &ProviderConfig,
    executor: Option<&dyn ChatProvider>,
) -> Vec<String> {
    let Some(executor) = executor.filter(|_| config.discover_models) else {
        return config.models.clone();
    };

    match executor.list_models().await {
        Ok(Some(models)) => {
            info!(provider = %id, count = models.len(), "Fetched model catalog");
            models
        }
        Ok(None) => config.models.clone(),
        Err(e) => {
            warn!(provider = %id, error = %e, "Failed to fetch model catalog, continuing with no models");
            vec![]
        }
    }
}

fn describe(id: &str, config: &ProviderConfig, models: Vec<String>) -> ProviderDescriptor {
    let default_model = config
        .default_model
        .clone()
        .or_else(|| models.first().cloned())
        .unwrap_or_default();

    ProviderDescriptor {
        id: id.to_string(),
        name: config.name.clone().unwrap_or_else(|| id.to_string()),
        description: config
            .description
            .clone()
            .unwrap_or_else(|| format!("{} models", config.kind.as_str())),
        version: DESCRIPTOR_VERSION.to_string(),
        models,
        default_model,
    }
}
