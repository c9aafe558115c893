//! Model capability lookup and request sanitization.

use crate::config::CapabilitiesConfig;
use crate::types::ProviderRequest;

/// Models that reject a `temperature` parameter. A trailing `*` matches by prefix.
const NO_TEMPERATURE_MODELS: &[&str] = &[
    "o1*",
    "o3*",
    "o4*",
    "deepseek-r1*",
    "deepseek-reasoner",
];

/// Canonical form used for capability and pricing lookups:
/// trimmed, lowercased, routing prefix (`provider/`) removed.
pub fn normalize_model_id(model: &str) -> String {
    let model = model.trim();
    let model = model.rsplit('/').next().unwrap_or(model);
    model.to_lowercase()
}

#[derive(Debug, Clone)]
pub struct ModelCapabilities {
    no_temperature: Vec<String>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            no_temperature: NO_TEMPERATURE_MODELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ModelCapabilities {
    pub fn from_config(config: &CapabilitiesConfig) -> Self {
        let mut capabilities = Self::default();
        capabilities.no_temperature.extend(
            config
                .no_temperature
                .iter()
                .map(|pattern| pattern.trim().to_lowercase()),
        );
        capabilities
    }

    pub fn supports_temperature(&self, model: &str) -> bool {
        let model = normalize_model_id(model);
        !self.no_temperature.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => model.starts_with(prefix),
            None => model == *pattern,
        })
    }

    /// Drop parameters the target model does not accept. Everything else passes through.
    pub fn sanitize(&self, mut request: ProviderRequest) -> ProviderRequest {
        if !request.model.is_empty() && !self.supports_temperature(&request.model) {
            request.temperature = None;
        }
        request
    }
}
