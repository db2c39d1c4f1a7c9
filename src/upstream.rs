// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Generation service client
//
// Responsibilities:
// - Send the conversation to an OpenAI-compatible chat-completions endpoint
//   with streaming enabled
// - Decode the SSE response byte-exactly into content fragments
// - Map transport failures, timeouts and error statuses to `UpstreamError`

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::UpstreamConfig;
use crate::stream::sse::{classify_chunk, parse_sse_line, SseLineDecoder, UpstreamChunk};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
}

/// Content fragments of one generation, in order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("upstream returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

impl UpstreamError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Trait: GenerationClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Starts a streaming generation.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, UpstreamError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

pub struct OpenAiGenerationClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    system_prompt: Option<String>,
}

impl OpenAiGenerationClient {
    pub fn new(client: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
            system_prompt: config.system_prompt.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(json!({"role": "system", "content": prompt}));
        }
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        );
        json!({
            "model": self.model,
            "stream": true,
            "messages": messages,
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, UpstreamError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&self.request_body(&request));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(UpstreamError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "upstream rejected generation request");
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(decode_fragments(resp.bytes_stream())))
    }
}

// ---------------------------------------------------------------------------
// SSE byte stream -> fragments
// ---------------------------------------------------------------------------

struct DecodeState<S> {
    input: Pin<Box<S>>,
    decoder: SseLineDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            if self.finished {
                return;
            }
            let Some(chunk) = parse_sse_line(&line) else {
                continue;
            };
            match classify_chunk(&chunk) {
                UpstreamChunk::Content(content) => self.ready.push_back(content),
                UpstreamChunk::Done => self.finished = true,
                UpstreamChunk::Ignored => {}
            }
        }
    }
}

/// Turn an SSE byte stream into content fragments. `[DONE]` or the end of
/// input ends the stream; a transport error is yielded once, then the
/// stream ends.
pub fn decode_fragments<S, E>(input: S) -> impl Stream<Item = Result<String, UpstreamError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        input: Box::pin(input),
        decoder: SseLineDecoder::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.ready.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.finished {
                return None;
            }
            match state.input.next().await {
                Some(Ok(bytes)) => {
                    let lines = state.decoder.push(&bytes);
                    state.absorb(lines);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(UpstreamError::Transport(e.to_string())), state));
                }
                None => {
                    let tail = state.decoder.finish();
                    state.absorb(tail);
                    state.finished = true;
                }
            }
        }
    })
}
