// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Hybrid text/payload streaming
//
// Responsibilities:
// - Separate visible prose from the embedded structured block as fragments
//   arrive, whatever the fragment boundaries
// - Deliver each visible character exactly once, withholding delimiter
//   leakage
// - Parse the structured payload and surface deduplicated, augmented
//   follow-up options
// - Dispatch enrichment lookups without blocking the stream
// - Frame events for server-sent-event transport

mod enrichment;
mod followup;
mod parser;
mod processor;
pub mod sse;
mod types;

pub use enrichment::{
    EnrichmentDispatcher, ExerciseLookup, HttpExerciseLookup, LookupError, LookupQuery,
};
pub use followup::{
    AugmentationRule, OptionAugmenter, Phrase, RuleAugmenter, SeenKeys, WORD_START_MARKER,
};
pub use parser::{HybridStreamParser, StreamState};
pub use processor::{StreamProcessor, EVENT_CHANNEL_CAPACITY};
pub use types::{
    BlockPolicy, EventSink, FollowUpOption, ParserOptions, PayloadError, StreamEvent,
    StructuredPayload, DEFAULT_ENRICHMENT_RESULT_LIMIT, DEFAULT_ENRICHMENT_TIMEOUT_MS,
    DEFAULT_MODE,
};
