use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fs, path::Path, time::Duration};

use crate::types::Pricing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    /// Base URL prepended to stored artifact paths
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound on every outbound provider call
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Sambanova,
    OpenaiCompatible,
    Elevenlabs,
    /// Listed for model discovery only, cannot execute requests
    Catalog,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Sambanova => "sambanova",
            ProviderKind::OpenaiCompatible => "openai_compatible",
            ProviderKind::Elevenlabs => "elevenlabs",
            ProviderKind::Catalog => "catalog",
        }
    }

    /// Environment variable consulted when no API key is configured
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Sambanova => Some("SAMBANOVA_API_KEY"),
            ProviderKind::Elevenlabs => Some("ELEVENLABS_API_KEY"),
            ProviderKind::OpenaiCompatible | ProviderKind::Catalog => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Fetch the model list from the upstream catalog at startup
    #[serde(default)]
    pub discover_models: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            enabled: true,
            name: None,
            description: None,
            api_key: None,
            endpoint: None,
            models: vec![],
            default_model: None,
            discover_models: false,
            voice_id: None,
        }
    }

    /// Configured key, else the kind's environment variable. Empty keys count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| self.kind.api_key_env().and_then(|var| env::var(var).ok()))
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Extra model patterns that reject `temperature` (`*` suffix = prefix match)
    #[serde(default)]
    pub no_temperature: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Pricing>,
    #[serde(default)]
    pub models: HashMap<String, Pricing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_serve_prefix")]
    pub serve_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_tts_model")]
    pub default_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Defaults
fn default_http_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_public_url() -> String { "http://localhost:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_timeout_secs() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_upload_dir() -> String { "./uploads".to_string() }
fn default_serve_prefix() -> String { "/api/files/serve".to_string() }
fn default_tts_endpoint() -> String { "https://api.elevenlabs.io".to_string() }
fn default_tts_model() -> String { "eleven_monolingual_v1".to_string() }

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut providers = HashMap::new();

    let mut sambanova = ProviderConfig::new(ProviderKind::Sambanova);
    sambanova.discover_models = true;
    providers.insert("sambanova".to_string(), sambanova);

    let mut elevenlabs = ProviderConfig::new(ProviderKind::Elevenlabs);
    elevenlabs.models = crate::providers::elevenlabs::SPEECH_MODELS
        .iter()
        .map(|m| m.to_string())
        .collect();
    providers.insert("elevenlabs".to_string(), elevenlabs);

    providers
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            public_url: default_public_url(),
            log_level: default_log_level(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            serve_prefix: default_serve_prefix(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            default_model: default_tts_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: default_providers(),
            capabilities: CapabilitiesConfig::default(),
            pricing: PricingConfig::default(),
            storage: StorageConfig::default(),
            tts: TtsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config_path = env::var("SWITCHYARD_CONFIG").unwrap_or_else(|_| {
            let home_config = format!(
                "{}/.config/switchyard/config.toml",
                env::var("HOME").unwrap_or_default()
            );
            let locations = [
                "./config.toml",
                "./switchyard.toml",
                "/etc/switchyard/config.toml",
                home_config.as_str(),
            ];

            for path in locations {
                if Path::new(path).exists() {
                    return path.to_string();
                }
            }

            "./config.toml".to_string()
        });

        if !Path::new(&config_path).exists() {
            tracing::warn!("No config file at {}, using defaults", config_path);
            let mut config = Config::default();
            config.validate_providers()?;
            return Ok(config);
        }

        // Validate config file permissions on Unix systems
        #[cfg(unix)]
        Self::validate_file_permissions(&config_path)?;

        let config_content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;

        Self::from_toml_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))
    }

    /// Parse a TOML document after `${VAR}` substitution
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let content = Self::substitute_env_vars(content);
        let mut config: Config = toml::from_str(&content)?;
        config.validate_providers()?;
        Ok(config)
    }

    /// Substitute ${VAR_NAME} with environment variable values
    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        while let Some(start) = result.find("${") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 2..start + end];
                let value = env::var(var_name).unwrap_or_default();
                result.replace_range(start..start + end + 1, &value);
            } else {
                break;
            }
        }

        result
    }

    /// Validate provider configurations
    fn validate_providers(&mut self) -> Result<()> {
        for (name, provider) in &self.providers {
            if !provider.enabled {
                continue;
            }

            match provider.kind {
                ProviderKind::Sambanova | ProviderKind::Elevenlabs => {
                    if provider.resolve_api_key().is_none() {
                        tracing::warn!(
                            "Provider '{}' enabled but missing API key - requests will fail",
                            name
                        );
                    }
                }
                ProviderKind::OpenaiCompatible => {
                    if provider.endpoint.as_deref().is_none_or(str::is_empty) {
                        anyhow::bail!(
                            "Provider '{}' is openai_compatible and requires an endpoint",
                            name
                        );
                    }
                }
                ProviderKind::Catalog => {
                    if provider.models.is_empty() && !provider.discover_models {
                        tracing::warn!("Catalog provider '{}' lists no models", name);
                    }
                }
            }
        }

        Ok(())
    }

    /// Get enabled providers
    pub fn enabled_providers(&self) -> Vec<(String, &ProviderConfig)> {
        let mut enabled: Vec<_> = self
            .providers
            .iter()
            .filter(|(_, config)| config.enabled)
            .map(|(name, config)| (name.clone(), config))
            .collect();
        enabled.sort_by(|a, b| a.0.cmp(&b.0));
        enabled
    }

    /// Validate config file permissions (Unix only)
    #[cfg(unix)]
    fn validate_file_permissions(path: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read metadata for config file: {}", path))?;
        let mode = metadata.permissions().mode();

        let group_readable = (mode & 0o040) != 0;
        let others_readable = (mode & 0o004) != 0;
        let group_writable = (mode & 0o020) != 0;
        let others_writable = (mode & 0o002) != 0;

        if group_readable || others_readable {
            tracing::warn!(
                "Config file {} has insecure permissions: {:o}. Recommended: chmod 600 {}",
                path,
                mode & 0o777,
                path
            );
        }

        if group_writable || others_writable {
            anyhow::bail!(
                "Config file {} is writable by group or others (mode: {:o}). \
                This is a security risk. Run: chmod 600 {}",
                path,
                mode & 0o777,
                path
            );
        }

        Ok(())
    }
}
