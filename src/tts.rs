//! Text-to-speech proxy: synthesize with ElevenLabs, persist, return a public URL.

use crate::error::ProviderError;
use crate::providers::elevenlabs::{AUDIO_MPEG, ElevenLabsClient, SPEECH_MODELS};
use crate::storage::FileStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponse {
    pub audio_url: String,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Failed to generate TTS: {status} {reason}")]
    Upstream { status: u16, reason: String },

    #[error("Empty audio received")]
    EmptyAudio,

    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ProviderError> for TtsError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Upstream { status, reason, .. } => TtsError::Upstream { status, reason },
            ProviderError::EmptyPayload => TtsError::EmptyAudio,
            other => TtsError::Internal(other.into()),
        }
    }
}

impl TtsError {
    /// HTTP status to answer with; upstream failures keep the vendor's status
    pub fn status_code(&self) -> u16 {
        match self {
            TtsError::MissingParameters => 400,
            TtsError::Upstream { status, .. } => *status,
            TtsError::EmptyAudio => 422,
            TtsError::Internal(_) => 500,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub struct TtsProxy {
    client: ElevenLabsClient,
    store: Arc<dyn FileStore>,
    public_url: String,
    default_model: String,
}

impl TtsProxy {
    pub fn new(
        client: ElevenLabsClient,
        store: Arc<dyn FileStore>,
        public_url: &str,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            public_url: public_url.trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        }
    }

    /// Metric label for a speech model; caller-supplied ids outside the known set collapse to `"other"`
    fn model_label<'a>(&'a self, model_id: &'a str) -> &'a str {
        if model_id == self.default_model || SPEECH_MODELS.iter().any(|m| *m == model_id) {
            model_id
        } else {
            "other"
        }
    }

    pub async fn generate(&self, request: TtsRequest) -> Result<TtsResponse, TtsError> {
        let model_id = non_empty(&request.model_id).unwrap_or(&self.default_model);

        info!(
            has_api_key = non_empty(&request.api_key).is_some(),
            text_length = request.text.as_ref().map_or(0, String::len),
            voice_id = ?request.voice_id,
            model_id,
            "Incoming TTS request"
        );

        let (Some(text), Some(voice_id), Some(api_key)) = (
            non_empty(&request.text),
            non_empty(&request.voice_id),
            non_empty(&request.api_key),
        ) else {
            error!(
                has_text = non_empty(&request.text).is_some(),
                voice_id = ?request.voice_id,
                has_api_key = non_empty(&request.api_key).is_some(),
                "Missing required parameters"
            );
            return Err(TtsError::MissingParameters);
        };

        let audio = self
            .client
            .synthesize(api_key, voice_id, text, model_id)
            .await?;

        let file_name = format!(
            "elevenlabs-tts-{}-{}.mp3",
            chrono::Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let stored = self.store.upload(audio, &file_name, AUDIO_MPEG).await?;
        let audio_url = format!("{}{}", self.public_url, stored.path);

        info!(audio_url = %audio_url, size = stored.size, "Generated TTS successfully");
        crate::metrics::METRICS
            .tts_audio_bytes_total
            .with_label_values(&[self.model_label(model_id)])
            .inc_by(stored.size as f64);

        Ok(TtsResponse {
            audio_url,
            size: stored.size,
        })
    }
}
