// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Server-sent events codec
//
// Inbound: split an OpenAI-compatible chat-completions byte stream into SSE
// lines and pull the content delta out of each `data:` payload.
// Outbound: frame parser events as `data: <json>\n\n`.

use bytes::Bytes;

use super::types::StreamEvent;

/// Terminal frame written after the last event.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

const DONE_SENTINEL: &str = "[DONE]";

/// A parsed SSE `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseChunk {
    pub data: String,
}

/// What one upstream SSE chunk means for the fragment stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamChunk {
    /// A content fragment for the parser.
    Content(String),
    /// End of the generation.
    Done,
    /// Role announcements, finish reasons, keep-alives.
    Ignored,
}

/// Parse one SSE line. Blank lines, comments and non-`data` fields yield
/// `None`.
pub fn parse_sse_line(line: &str) -> Option<SseChunk> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))
        .map(|data| SseChunk {
            data: data.to_string(),
        })
}

/// Classify an OpenAI chat-completions chunk.
pub fn classify_chunk(chunk: &SseChunk) -> UpstreamChunk {
    if chunk.data.trim() == DONE_SENTINEL {
        return UpstreamChunk::Done;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&chunk.data) else {
        return UpstreamChunk::Ignored;
    };
    match json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(content) if !content.is_empty() => UpstreamChunk::Content(content.to_string()),
        _ => UpstreamChunk::Ignored,
    }
}

/// Splits a byte stream into complete lines.
///
/// Bytes are held until a newline arrives, so a UTF-8 sequence split across
/// network chunks is decoded whole.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
}

impl SseLineDecoder {
    /// Append `bytes` and return every line now complete, without its
    /// terminator.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }

    /// Flush a trailing line that never got its terminator.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Frame one event for the outbound stream.
pub fn encode_event(event: &StreamEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize stream event");
            Bytes::new()
        }
    }
}
