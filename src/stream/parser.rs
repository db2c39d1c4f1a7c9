// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Hybrid stream parser
//
// Consumes generation fragments one at a time and emits typed events:
// visible text deltas, the structured payload, deduplicated follow-up
// options, enrichment results, and a single terminal `complete`.
//
// `process_chunk` is synchronous and fully updates state before returning.
// The only asynchronous work is enrichment lookups, which run as tasks and
// report through the same sink.

use std::sync::Arc;

use regex::Regex;

use super::enrichment::EnrichmentDispatcher;
use super::followup::{OptionAugmenter, SeenKeys};
use super::types::{
    BlockPolicy, EventSink, FollowUpOption, ParserOptions, StreamEvent, StructuredPayload,
};
use crate::protocol::{self, EnrichmentMatch, Lexeme, MarkerScan};

/// Per-response parser state. Owned by exactly one parser.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    buffer: String,
    emitted_text_len: usize,
    payload_emitted: bool,
    seen_follow_ups: SeenKeys,
    last_payload: Option<StructuredPayload>,
    // Byte offset into `buffer` up to which visible text is decided.
    visible_cursor: usize,
    // Set once the visible region hits a block open or a leaked name.
    visible_closed: bool,
    // Everything before this offset belongs to a consumed block.
    consumed_through: usize,
    blocks_seen: usize,
    provisional_cursor: usize,
    enrichment_cursor: usize,
    completed: bool,
}

impl StreamState {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Bytes of visible text delivered so far.
    pub fn emitted_text_len(&self) -> usize {
        self.emitted_text_len
    }

    pub fn payload_emitted(&self) -> bool {
        self.payload_emitted
    }

    pub fn seen_follow_ups(&self) -> &SeenKeys {
        &self.seen_follow_ups
    }

    pub fn last_payload(&self) -> Option<&StructuredPayload> {
        self.last_payload.as_ref()
    }

    pub fn blocks_seen(&self) -> usize {
        self.blocks_seen
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

/// Matches one brace-free JSON object; used for provisional follow-ups.
struct ProvisionalExtractor {
    object: Regex,
}

impl ProvisionalExtractor {
    fn new() -> Self {
        Self {
            // Panics only if the literal pattern is invalid.
            object: Regex::new(r"\{[^{}]*\}").expect("provisional object pattern is valid"),
        }
    }

    /// Follow-up options among the complete flat objects of `tail`, with the
    /// byte offset just past the last complete object.
    fn extract(&self, tail: &str) -> (Vec<FollowUpOption>, usize) {
        let mut options = Vec::new();
        let mut consumed = 0;
        for found in self.object.find_iter(tail) {
            consumed = found.end();
            let Ok(serde_json::Value::Object(map)) =
                serde_json::from_str::<serde_json::Value>(found.as_str())
            else {
                continue;
            };
            if !map.contains_key("text") && !map.contains_key("question") {
                continue;
            }
            if let Ok(option) =
                serde_json::from_value::<FollowUpOption>(serde_json::Value::Object(map))
            {
                options.push(option);
            }
        }
        (options, consumed)
    }
}

pub struct HybridStreamParser {
    options: ParserOptions,
    augmenter: Arc<dyn OptionAugmenter>,
    enrichment: Option<EnrichmentDispatcher>,
    provisional: Option<ProvisionalExtractor>,
    sink: EventSink,
    state: StreamState,
}

impl HybridStreamParser {
    pub fn new(options: ParserOptions, augmenter: Arc<dyn OptionAugmenter>, sink: EventSink) -> Self {
        let provisional = options.eager_follow_ups.then(ProvisionalExtractor::new);
        Self {
            options,
            augmenter,
            enrichment: None,
            provisional,
            sink,
            state: StreamState::default(),
        }
    }

    /// Attach an enrichment dispatcher. Without one, enrichment tokens are
    /// still stripped from visible text but trigger no lookups.
    pub fn with_enrichment(mut self, dispatcher: EnrichmentDispatcher) -> Self {
        self.enrichment = Some(dispatcher);
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Feed one fragment. Empty fragments and calls after `complete` are
    /// no-ops. Enrichment lookups only start inside a tokio runtime.
    pub fn process_chunk(&mut self, fragment: &str) {
        if fragment.is_empty() || self.state.completed {
            return;
        }
        self.state.buffer.push_str(fragment);

        self.emit_visible_text(false);
        self.extract_blocks();
        if self.provisional.is_some() {
            self.extract_provisional_follow_ups();
        }
        self.dispatch_enrichment();
    }

    /// Finalize the stream: flush text, wait for outstanding lookups,
    /// guarantee a follow-up, then emit `complete`. A second call is a no-op.
    pub async fn complete(&mut self) {
        if self.state.completed {
            return;
        }
        self.state.completed = true;

        self.emit_visible_text(true);
        self.dispatch_enrichment();
        if let Some(dispatcher) = self.enrichment.as_mut() {
            dispatcher.drain().await;
        }
        if self.state.seen_follow_ups.is_empty() {
            self.offer_fallback();
        }

        tracing::debug!(
            text_bytes = self.state.emitted_text_len,
            follow_ups = self.state.seen_follow_ups.len(),
            payload = self.state.payload_emitted,
            "stream complete"
        );
        self.sink.emit(StreamEvent::Complete);
    }

    /// Return to the initial state, aborting outstanding lookups.
    pub fn reset(&mut self) {
        if let Some(dispatcher) = self.enrichment.as_mut() {
            dispatcher.abort_all();
        }
        self.state = StreamState::default();
    }

    // -----------------------------------------------------------------------
    // Visible text
    // -----------------------------------------------------------------------

    fn emit_visible_text(&mut self, at_end: bool) {
        if self.state.visible_closed {
            return;
        }
        let mut delta = String::new();
        loop {
            let rest = &self.state.buffer[self.state.visible_cursor..];
            match protocol::next_lexeme(rest, at_end) {
                Lexeme::Text(n) => {
                    delta.push_str(&rest[..n]);
                    self.state.visible_cursor += n;
                }
                Lexeme::Strip(n) => self.state.visible_cursor += n,
                Lexeme::Boundary => {
                    self.state.visible_closed = true;
                    break;
                }
                Lexeme::Pending | Lexeme::End => break,
            }
        }
        if !delta.is_empty() {
            self.state.emitted_text_len += delta.len();
            self.sink.emit(StreamEvent::Text { content: delta });
        }
    }

    // -----------------------------------------------------------------------
    // Structured blocks
    // -----------------------------------------------------------------------

    fn blocks_exhausted(&self) -> bool {
        self.options.block_policy == BlockPolicy::First && self.state.blocks_seen > 0
    }

    fn extract_blocks(&mut self) {
        while !self.blocks_exhausted() {
            let MarkerScan::BothSeen { open, close } =
                protocol::scan_markers(&self.state.buffer, self.state.consumed_through)
            else {
                return;
            };
            let parsed = StructuredPayload::parse(protocol::block_body(&self.state.buffer, open, close));
            self.state.consumed_through = protocol::block_end(close);
            self.state.blocks_seen += 1;

            match parsed {
                Ok(payload) => self.accept_payload(payload),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        block = self.state.blocks_seen,
                        "discarding malformed structured block"
                    );
                }
            }
        }
    }

    fn accept_payload(&mut self, mut payload: StructuredPayload) {
        let options: Vec<FollowUpOption> = std::mem::take(&mut payload.follow_up_options)
            .into_iter()
            .filter_map(FollowUpOption::normalized)
            .map(|option| self.augmenter.augment(option))
            .collect();
        payload.follow_up_options = if options.is_empty() {
            vec![self.options.fallback.clone()]
        } else {
            options
        };

        self.state.payload_emitted = true;
        self.state.last_payload = Some(payload.clone());
        self.sink.emit(StreamEvent::Payload {
            data: payload.clone(),
        });

        for option in payload.follow_up_options {
            self.offer_follow_up(option);
        }
    }

    fn extract_provisional_follow_ups(&mut self) {
        if self.blocks_exhausted() {
            return;
        }
        let MarkerScan::OpenSeenCloseMissing { open } =
            protocol::scan_markers(&self.state.buffer, self.state.consumed_through)
        else {
            return;
        };
        let Some(extractor) = self.provisional.as_ref() else {
            return;
        };

        let start = self
            .state
            .provisional_cursor
            .max(open + protocol::BLOCK_OPEN.len());
        let (found, consumed) = extractor.extract(&self.state.buffer[start..]);
        self.state.provisional_cursor = start + consumed;

        for option in found {
            if let Some(option) = option.normalized() {
                let option = self.augmenter.augment(option);
                self.offer_follow_up(option);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Follow-ups
    // -----------------------------------------------------------------------

    fn offer_follow_up(&mut self, option: FollowUpOption) {
        if !self.state.seen_follow_ups.insert(&option.text) {
            tracing::debug!(text = %option.text, "skipping duplicate follow-up");
            return;
        }
        let generation_intent = option.generate == Some(true);
        self.sink.emit(StreamEvent::FollowUp { option });
        if generation_intent {
            self.offer_fallback();
        }
    }

    fn offer_fallback(&mut self) {
        let fallback = self.options.fallback.clone();
        if self.state.seen_follow_ups.insert(&fallback.text) {
            self.sink.emit(StreamEvent::FollowUp { option: fallback });
        }
    }

    // -----------------------------------------------------------------------
    // Enrichment
    // -----------------------------------------------------------------------

    fn dispatch_enrichment(&mut self) {
        let Some(dispatcher) = self.enrichment.as_mut() else {
            return;
        };
        let state = &mut self.state;
        while let Some((start, found)) =
            protocol::next_enrichment(&state.buffer, state.enrichment_cursor)
        {
            match found {
                EnrichmentMatch::Complete { len, request } => {
                    state.enrichment_cursor = start + len;
                    dispatcher.dispatch(request, &self.options.locale, &self.sink);
                }
                EnrichmentMatch::Partial | EnrichmentMatch::Malformed => {
                    state.enrichment_cursor = start;
                    break;
                }
            }
        }
    }
}
