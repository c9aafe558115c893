use crate::config::{ProviderConfig, TtsConfig};
use crate::error::ProviderError;
use crate::providers::ChatProvider;
use crate::types::{BinaryStream, ByteStream, ProviderOutput, ProviderRequest, Role};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Speech models offered by default
pub const SPEECH_MODELS: &[&str] = &[
    "eleven_monolingual_v1",
    "eleven_multilingual_v2",
    "eleven_turbo_v2_5",
];

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[derive(Deserialize)]
struct VoiceModel {
    model_id: String,
}

/// Thin client for the ElevenLabs text-to-speech API
#[derive(Clone)]
pub struct ElevenLabsClient {
    endpoint: String,
    client: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn send(
        &self,
        api_key: &str,
        voice_id: &str,
        text: &str,
        model_id: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.endpoint,
            urlencoding::encode(voice_id)
        );
        info!(endpoint = %url, model_id, text_length = text.len(), "Sending request to ElevenLabs");

        let res = self
            .client
            .post(&url)
            .header("Accept", AUDIO_MPEG)
            .header("xi-api-key", api_key)
            .json(&SpeechRequest { text, model_id })
            .send()
            .await?;

        if !res.status().is_success() {
            let err = ProviderError::from_response(res).await;
            if let ProviderError::Upstream { status, reason, body } = &err {
                error!(status, reason = %reason, body = %body, "ElevenLabs returned error");
            }
            return Err(err);
        }

        Ok(res)
    }

    /// Synthesize speech and buffer the whole audio body. Zero bytes is an error.
    pub async fn synthesize(
        &self,
        api_key: &str,
        voice_id: &str,
        text: &str,
        model_id: &str,
    ) -> Result<Bytes, ProviderError> {
        let res = self.send(api_key, voice_id, text, model_id).await?;
        let audio = res.bytes().await?;

        if audio.is_empty() {
            error!("Empty audio received from ElevenLabs");
            return Err(ProviderError::EmptyPayload);
        }

        Ok(audio)
    }

    /// Synthesize speech, passing the audio body through as it arrives.
    /// The first audio chunk is awaited so a zero-byte reply fails here.
    pub async fn synthesize_stream(
        &self,
        api_key: &str,
        voice_id: &str,
        text: &str,
        model_id: &str,
    ) -> Result<ByteStream, ProviderError> {
        let res = self.send(api_key, voice_id, text, model_id).await?;
        let mut body = res.bytes_stream();

        let first = loop {
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    error!("Empty audio received from ElevenLabs");
                    return Err(ProviderError::EmptyPayload);
                }
            }
        };

        let rest = body.map(|chunk| chunk.map_err(ProviderError::from));
        Ok(Box::pin(
            futures::stream::once(async move { Ok(first) }).chain(rest),
        ))
    }

    pub async fn list_models(&self, api_key: &str) -> Result<Vec<String>, ProviderError> {
        let res = self
            .client
            .get(format!("{}/v1/models", self.endpoint))
            .header("xi-api-key", api_key)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(ProviderError::from_response(res).await);
        }

        let models: Vec<VoiceModel> = res.json().await?;
        Ok(models.into_iter().map(|m| m.model_id).collect())
    }
}

/// Speech synthesis exposed through the dispatch contract; returns raw audio bytes
pub struct ElevenLabsProvider {
    id: String,
    api_key: Option<String>,
    voice_id: Option<String>,
    default_model: String,
    client: ElevenLabsClient,
}

impl ElevenLabsProvider {
    pub fn new(
        id: impl Into<String>,
        api_key: Option<String>,
        voice_id: Option<String>,
        default_model: impl Into<String>,
        client: ElevenLabsClient,
    ) -> Self {
        Self {
            id: id.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            voice_id: voice_id.filter(|v| !v.is_empty()),
            default_model: default_model.into(),
            client,
        }
    }

    pub fn from_config(
        id: &str,
        config: &ProviderConfig,
        tts: &TtsConfig,
        client: reqwest::Client,
    ) -> Self {
        let endpoint = config.endpoint.clone().unwrap_or_else(|| tts.endpoint.clone());
        Self::new(
            id,
            config.resolve_api_key(),
            config.voice_id.clone(),
            config
                .default_model
                .clone()
                .unwrap_or_else(|| tts.default_model.clone()),
            ElevenLabsClient::new(endpoint, client),
        )
    }

    fn require_api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredentials {
                provider: "ElevenLabs".to_string(),
            })
    }

    /// Text to speak: the last user message, else the context
    pub fn speech_text(request: &ProviderRequest) -> Option<&str> {
        request
            .messages
            .iter()
            .flatten()
            .rev()
            .find(|m| m.role == Role::User && !m.content.is_empty())
            .map(|m| m.content.as_str())
            .or_else(|| request.context.as_deref().filter(|c| !c.is_empty()))
    }
}

#[async_trait]
impl ChatProvider for ElevenLabsProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError> {
        let api_key = self.require_api_key()?;
        Ok(Some(self.client.list_models(api_key).await?))
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError> {
        let api_key = self.require_api_key()?;
        let voice_id = self
            .voice_id
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidRequest("voice_id is not configured".to_string()))?;
        let text = Self::speech_text(&request)
            .ok_or_else(|| ProviderError::InvalidRequest("no text to synthesize".to_string()))?;
        let model_id = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let stream = self
            .client
            .synthesize_stream(api_key, voice_id, text, model_id)
            .await?;

        Ok(ProviderOutput::Bytes(BinaryStream {
            content_type: AUDIO_MPEG.to_string(),
            stream,
        }))
    }
}
