pub mod openai;
mod sse;
pub mod types;

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_core::Stream;
use tokio_stream::iter as stream_iter;
use tokio_stream::StreamExt;

pub use openai::OpenAiProvider;
pub use types::*;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
    async fn stream(&self, _request: LlmRequest) -> Result<ChunkStream> {
        anyhow::bail!("streaming not supported by this provider")
    }
    /// Cheap reachability check run before a chat session starts.
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Drain a token stream, handing each delta to `on_delta`, and return the
/// assembled text.
pub async fn collect_stream<F>(mut stream: ChunkStream, mut on_delta: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_final {
            tracing::debug!(
                input_tokens = ?chunk.input_tokens,
                output_tokens = ?chunk.output_tokens,
                stop_reason = ?chunk.stop_reason,
                "stream finished"
            );
            continue;
        }
        on_delta(&chunk.delta);
        text.push_str(&chunk.delta);
    }
    Ok(text)
}

/// Offline provider that echoes the last user turn.
pub struct StubProvider;

impl StubProvider {
    fn reply_for(request: &LlmRequest) -> String {
        let user_text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        format!("[stub:{}] {}", request.model, user_text)
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        Ok(LlmResponse {
            text: Self::reply_for(&request),
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".into()),
        })
    }

    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream> {
        let full_text = Self::reply_for(&request);
        let mut chunks: Vec<Result<StreamChunk>> = full_text
            .split_inclusive(' ')
            .map(|word| Ok(StreamChunk::delta(word)))
            .collect();

        chunks.push(Ok(StreamChunk {
            delta: String::new(),
            is_final: true,
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".into()),
        }));

        Ok(Box::pin(stream_iter(chunks)))
    }
}
