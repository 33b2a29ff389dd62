//! Hosted speech collaborators: speech-to-text for voice input and
//! text-to-speech for spoken replies. Both talk to OpenAI's audio endpoints.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::events::{Provider, Voice};
use crate::llm::http_client;

/// Turns recorded audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns the transcript, which may be empty when nothing was said
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String>;
}

/// Turns text into compressed audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns MP3 bytes
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>>;
}

/// OpenAI `audio/transcriptions` and `audio/speech`
#[derive(Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    tts_model: String,
    transcription_model: String,
}

impl OpenAiSpeech {
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config
            .provider(Provider::OpenAi)
            .map(|p| p.base_url.trim_end_matches('/').to_string())
            .ok_or_else(|| anyhow!("No configuration for provider openai"))?;

        Ok(Self {
            client: http_client()?,
            base_url,
            api_key: config.get_api_key(Provider::OpenAi),
            tts_model: config.speech.tts_model.clone(),
            transcription_model: config.speech.transcription_model.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "Speech needs an OpenAI API key. Set {}.",
                Provider::OpenAi.api_key_env()
            )
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiSpeech {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);

        debug!(model = %self.transcription_model, "transcription request");
        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let text = payload
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        Ok(text)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        let payload = serde_json::json!({
            "model": self.tts_model,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        });

        debug!(model = %self.tts_model, %voice, chars = text.len(), "speech request");
        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI speech error ({}): {}", status, error_text));
        }

        let audio = response.bytes().await.context("Failed to read speech audio")?;
        Ok(audio.to_vec())
    }
}
