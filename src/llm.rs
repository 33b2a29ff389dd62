use crate::config::Config;
use crate::events::{Message, Provider, Role};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::debug;

/// Lazy, finite sequence of response fragments. Ends when the remote side
/// closes the stream; an `Err` item aborts it.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Capability shared by every hosted completion vendor
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Start a streaming completion over an ordered message list
    async fn stream_completion(&self, model: &str, messages: &[Message]) -> Result<TextStream>;
}

/// The two dispatch targets a session can select between
#[derive(Clone)]
pub struct ProviderSet {
    openai: Arc<dyn CompletionProvider>,
    anthropic: Arc<dyn CompletionProvider>,
}

impl ProviderSet {
    pub fn new(
        openai: Arc<dyn CompletionProvider>,
        anthropic: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self { openai, anthropic }
    }

    /// Build the HTTP-backed providers described by the config
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client()?;
        let base_url = |provider: Provider| {
            config
                .provider(provider)
                .map(|p| p.base_url.trim_end_matches('/').to_string())
                .ok_or_else(|| anyhow!("No configuration for provider {}", provider))
        };

        Ok(Self {
            openai: Arc::new(OpenAiProvider {
                client: client.clone(),
                base_url: base_url(Provider::OpenAi)?,
                api_key: config.get_api_key(Provider::OpenAi),
            }),
            anthropic: Arc::new(AnthropicProvider {
                client,
                base_url: base_url(Provider::Anthropic)?,
                api_key: config.get_api_key(Provider::Anthropic),
            }),
        })
    }

    pub fn get(&self, provider: Provider) -> &dyn CompletionProvider {
        match provider {
            Provider::OpenAi => self.openai.as_ref(),
            Provider::Anthropic => self.anthropic.as_ref(),
        }
    }
}

/// Shared HTTP client. Only the connect phase is bounded so long streams
/// are never cut off mid-response.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

/// OpenAI chat completions
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream_completion(&self, model: &str, messages: &[Message]) -> Result<TextStream> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!("No API key configured for OpenAI. Set {}.", Provider::OpenAi.api_key_env())
        })?;
        let url = format!("{}/v1/chat/completions", self.base_url);

        let payload = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });

        debug!(model, messages = messages.len(), "openai stream request");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        Ok(sse_text_stream(response.bytes_stream(), parse_openai_chunk))
    }
}

/// Anthropic messages API
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn stream_completion(&self, model: &str, messages: &[Message]) -> Result<TextStream> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!("No API key configured for Anthropic. Set {}.", Provider::Anthropic.api_key_env())
        })?;
        let url = format!("{}/v1/messages", self.base_url);

        let payload = serde_json::json!({
            "model": model,
            "messages": anthropic_messages(messages),
            "max_tokens": 4096,
            "stream": true,
        });

        debug!(model, messages = messages.len(), "anthropic stream request");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("Content-Type", "application/json")
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error ({}): {}", status, error_text));
        }

        Ok(sse_text_stream(response.bytes_stream(), parse_anthropic_event))
    }
}

/// What a single SSE `data:` payload means for the text stream
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text(String),
    Done,
    Skip,
}

/// Splits a byte stream into SSE `data:` payloads. Bytes are buffered until a
/// full line is available so multi-byte characters split across network
/// chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(data) = Self::data_of(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush any remaining buffer line (without newline)
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        Self::data_of(&line)
    }

    fn data_of(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        line.strip_prefix("data:").map(|data| data.trim_start().to_string())
    }
}

/// Turn a byte stream of SSE frames into text fragments
pub fn sse_text_stream<S, B, E>(bytes: S, parse: fn(&str) -> Result<Chunk>) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err::<String, anyhow::Error>(anyhow::Error::from(e).context("Stream read failed"));
                    return;
                }
            };
            for data in decoder.push(chunk.as_ref()) {
                match parse(&data) {
                    Ok(Chunk::Text(text)) => yield Ok(text),
                    Ok(Chunk::Done) => return,
                    Ok(Chunk::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if let Some(data) = decoder.finish() {
            match parse(&data) {
                Ok(Chunk::Text(text)) => yield Ok(text),
                Ok(_) => {}
                Err(e) => yield Err(e),
            }
        }
    })
}

/// OpenAI: `choices[0].delta.content`, terminated by `[DONE]`
pub fn parse_openai_chunk(data: &str) -> Result<Chunk> {
    if data == "[DONE]" {
        return Ok(Chunk::Done);
    }

    let chunk: serde_json::Value = serde_json::from_str(data)
        .with_context(|| format!("Malformed OpenAI stream chunk: {}", data))?;

    if let Some(error) = chunk.get("error") {
        let message = error.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error");
        return Err(anyhow!("OpenAI stream error: {}", message));
    }

    let content = chunk
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|c| c.as_str());

    Ok(match content {
        Some(text) if !text.is_empty() => Chunk::Text(text.to_string()),
        _ => Chunk::Skip,
    })
}

/// Anthropic: `content_block_delta` text deltas, terminated by `message_stop`
pub fn parse_anthropic_event(data: &str) -> Result<Chunk> {
    let event: serde_json::Value = serde_json::from_str(data)
        .with_context(|| format!("Malformed Anthropic stream event: {}", data))?;

    match event.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let text = event
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            if text.is_empty() {
                Ok(Chunk::Skip)
            } else {
                Ok(Chunk::Text(text.to_string()))
            }
        }
        Some("message_stop") => Ok(Chunk::Done),
        Some("error") => {
            let message = event
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            Err(anyhow!("Anthropic stream error: {}", message))
        }
        _ => Ok(Chunk::Skip),
    }
}

/// Anthropic rejects empty content, so an exchange whose reply came back empty
/// is left out together with its question.
fn anthropic_messages(messages: &[Message]) -> Vec<&Message> {
    let mut kept: Vec<&Message> = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role() == Role::Assistant && message.content().trim().is_empty() {
            if kept.last().is_some_and(|m| m.role() == Role::User) {
                kept.pop();
            }
            continue;
        }
        kept.push(message);
    }
    kept
}
