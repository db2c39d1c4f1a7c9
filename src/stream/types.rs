// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Events delivered to the UI layer, the structured payload carried inside
// the response, follow-up options, parser options, and the event sink.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Chat mode assigned to follow-ups that do not name one.
pub const DEFAULT_MODE: &str = "diagnosis";

/// Maximum number of enrichment results attached to one lookup.
pub const DEFAULT_ENRICHMENT_RESULT_LIMIT: usize = 3;

/// Timeout for one enrichment lookup in milliseconds.
pub const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// Follow-up options
// ---------------------------------------------------------------------------

/// A suggested next user action, rendered as a selectable element.
///
/// Identity is `text` (exact match). Input accepts the legacy field names
/// `question`, `chatMode` and `programType`; output always uses the
/// canonical names. A null `text` or `mode` takes its default and a
/// `generate` that is not a boolean is treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpOption {
    #[serde(default, alias = "question", deserialize_with = "string_or_empty")]
    pub text: String,
    #[serde(default = "default_mode", alias = "chatMode", deserialize_with = "mode_or_default")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "flag_or_none", skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,
    #[serde(default, alias = "programType", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn mode_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_mode))
}

fn flag_or_none<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(Some(flag)),
        Value::Null => Ok(None),
        other => {
            tracing::debug!(value = %other, "ignoring non-boolean generate flag");
            Ok(None)
        }
    }
}

impl FollowUpOption {
    pub fn new(text: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: mode.into(),
            title: None,
            generate: None,
            category: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The escape hatch back to free-form conversation.
    pub fn answer_in_chat() -> Self {
        Self::new("Answer in chat", DEFAULT_MODE).with_title("Type your answer")
    }

    /// Fill an empty `text` from `title`; `None` if the option has neither.
    pub fn normalized(mut self) -> Option<Self> {
        if self.text.trim().is_empty() {
            match self.title.as_deref().map(str::trim) {
                Some(title) if !title.is_empty() => self.text = title.to_string(),
                _ => return None,
            }
        }
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// Structured payload
// ---------------------------------------------------------------------------

/// The machine-readable object embedded between the block delimiters.
///
/// Everything except the follow-up list is schema-defined by the
/// conversation and passes through untouched in `fields`. The list is
/// decoded one option at a time: an option that cannot be decoded is
/// dropped without affecting the rest of the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredPayload {
    pub follow_up_options: Vec<FollowUpOption>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

const FOLLOW_UP_OPTIONS_KEY: &str = "followUpOptions";
const LEGACY_FOLLOW_UP_KEY: &str = "followUpQuestions";

impl<'de> Deserialize<'de> for StructuredPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        // The canonical key wins when both are present.
        let canonical = fields.remove(FOLLOW_UP_OPTIONS_KEY);
        let legacy = fields.remove(LEGACY_FOLLOW_UP_KEY);
        let list = match canonical {
            Some(list) if !list.is_null() => Some(list),
            _ => legacy,
        };
        Ok(Self {
            follow_up_options: decode_options(list),
            fields,
        })
    }
}

fn decode_options(list: Option<Value>) -> Vec<FollowUpOption> {
    match list {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match FollowUpOption::deserialize(item) {
                Ok(option) => Some(option),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed follow-up option");
                    None
                }
            })
            .collect(),
        Some(other) => {
            tracing::warn!(value = %other, "follow-up list is not an array, ignoring it");
            Vec::new()
        }
    }
}

/// Errors raised while decoding a structured block. Never escapes the parser.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("structured block is empty")]
    Empty,

    #[error("structured block is not a valid payload object: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl StructuredPayload {
    /// Decode the trimmed text of a structured block.
    pub fn parse(body: &str) -> Result<Self, PayloadError> {
        if body.trim().is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(serde_json::from_str(body)?)
    }
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// One typed event for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A delta to append to the visible transcript.
    Text { content: String },
    /// One clickable suggested next action.
    #[serde(rename = "followup")]
    FollowUp { option: FollowUpOption },
    /// The full parsed structured object.
    Payload { data: StructuredPayload },
    /// Capped enrichment results and the query that produced them.
    Exercises {
        results: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    /// Terminal signal; nothing follows.
    Complete,
}

/// Delivery side of the event channel.
///
/// Sending never blocks and never fails from the parser's point of view: a
/// dropped receiver just means nobody is listening any more.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: StreamEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Parser options
// ---------------------------------------------------------------------------

/// Which structured blocks a stream honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPolicy {
    /// Only the first block per stream; later blocks are ignored.
    #[default]
    First,
    /// Every block, with follow-ups deduplicated across blocks.
    Every,
}

/// Per-stream parser behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    /// Locale forwarded to enrichment lookups.
    pub locale: String,
    pub block_policy: BlockPolicy,
    /// Offer follow-ups from an unterminated block as soon as each option
    /// object closes.
    pub eager_follow_ups: bool,
    /// The "answer in chat" option used whenever one must be synthesized.
    pub fallback: FollowUpOption,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            block_policy: BlockPolicy::First,
            eager_follow_ups: false,
            fallback: FollowUpOption::answer_in_chat(),
        }
    }
}
