//! Client for endpoints speaking the OpenAI chat-completions protocol.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use crate::sse::SseDecoder;
use crate::{ChunkStream, LlmProvider, LlmRequest, LlmResponse, StreamChunk};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Read the API key from `api_key_env`; a missing or blank key is an error.
    pub fn from_env(api_key_env: &str, api_base: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("{api_key_env} is not set"))?;
        Ok(Self::new(api_key, api_base))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }

    async fn complete(&self, body: &CompletionBody) -> Result<Response> {
        tracing::debug!(model = %body.model, stream = body.stream, turns = body.messages.len(), "chat completion request");
        let request = self
            .authorized(self.client.post(format!("{}/chat/completions", self.api_base)))
            .json(body);
        checked(request.send().await).await
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let completion: Completion = self
            .complete(&CompletionBody::new(request, false))
            .await?
            .json()
            .await?;
        completion.into_response()
    }

    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream> {
        let resp = self.complete(&CompletionBody::new(request, true)).await?;
        Ok(Box::pin(event_stream(resp.bytes_stream())))
    }

    /// Lists models with the configured key, which checks reachability and auth
    /// without spending tokens.
    async fn health(&self) -> Result<()> {
        let request = self.authorized(self.client.get(format!("{}/models", self.api_base)));
        checked(request.send().await).await.map(drop)
    }
}

/// Turn transport failures and non-2xx replies into readable errors. Errors a
/// caller may retry carry a `[retryable]` marker.
async fn checked(sent: reqwest::Result<Response>) -> Result<Response> {
    let resp = match sent {
        Ok(resp) => resp,
        Err(e) if e.is_timeout() => {
            return Err(anyhow!(
                "openai api error (timeout) [retryable]: no response after {}s",
                REQUEST_TIMEOUT.as_secs()
            ))
        }
        Err(e) if e.is_connect() => {
            return Err(anyhow!("openai api error (connect) [retryable]: {e}"))
        }
        Err(e) => return Err(e.into()),
    };

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(api_error(status, &text))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    let marker = if is_retryable(status) { " [retryable]" } else { "" };
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) if error.kind.is_empty() => {
            anyhow!("openai api error ({status}){marker}: {}", error.message)
        }
        Ok(ErrorEnvelope { error }) => {
            anyhow!("openai api error ({status}){marker}: {} ({})", error.message, error.kind)
        }
        Err(_) => anyhow!("openai api error ({status}){marker}"),
    }
}

/// Map the wire finish reason onto the provider-neutral names.
fn stop_reason(finish_reason: Option<String>) -> Option<String> {
    finish_reason.map(|reason| match reason.as_str() {
        "stop" => "end_turn".to_string(),
        "length" => "max_tokens".to_string(),
        _ => reason,
    })
}

fn event_stream<S>(body: S) -> impl Stream<Item = Result<StreamChunk>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::try_stream! {
        tokio::pin!(body);
        let mut decoder = SseDecoder::default();

        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|e| anyhow!("stream error: {e}"))?;
            for payload in decoder.push(&bytes)? {
                if payload == DONE_MARKER {
                    return;
                }
                let event: StreamEvent = serde_json::from_str(&payload)
                    .map_err(|e| anyhow!("invalid sse event payload: {e}"))?;
                if let Some(chunk) = event.into_chunk() {
                    yield chunk;
                }
            }
        }

        if decoder.pending_len() > 0 {
            tracing::debug!(bytes = decoder.pending_len(), "stream ended inside an event");
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl CompletionBody {
    /// The system instruction, when present, becomes the leading message.
    fn new(request: LlmRequest, stream: bool) -> Self {
        let system = request.system.map(|content| WireMessage {
            role: "system".to_string(),
            content,
        });
        let turns = request.messages.into_iter().map(|m| WireMessage {
            role: m.role,
            content: m.content,
        });
        Self {
            model: request.model,
            messages: system.into_iter().chain(turns).collect(),
            max_tokens: request.max_tokens,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Completion {
    fn into_response(self) -> Result<LlmResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("openai api error: empty choices"))?;
        Ok(LlmResponse {
            text: choice.message.content.unwrap_or_default(),
            input_tokens: self.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: self.usage.as_ref().map(|u| u.completion_tokens),
            stop_reason: stop_reason(choice.finish_reason),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamEvent {
    /// Text deltas become plain chunks; a finish reason or a usage-only
    /// trailer becomes a final chunk. Anything else (role-only deltas) is
    /// skipped.
    fn into_chunk(self) -> Option<StreamChunk> {
        let input_tokens = self.usage.as_ref().map(|u| u.prompt_tokens);
        let output_tokens = self.usage.as_ref().map(|u| u.completion_tokens);

        match self.choices.into_iter().next() {
            Some(StreamChoice {
                delta: StreamDelta { content: Some(text) },
                ..
            }) if !text.is_empty() => Some(StreamChunk::delta(text)),
            Some(StreamChoice {
                finish_reason: Some(reason),
                ..
            }) => Some(StreamChunk {
                delta: String::new(),
                is_final: true,
                input_tokens,
                output_tokens,
                stop_reason: stop_reason(Some(reason)),
            }),
            Some(_) => None,
            None => self.usage.is_some().then(|| StreamChunk {
                delta: String::new(),
                is_final: true,
                input_tokens,
                output_tokens,
                stop_reason: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}
