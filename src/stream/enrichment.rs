// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Enrichment side-channel
//
// Enrichment tokens in the stream trigger asynchronous exercise lookups whose
// results reach the UI as `exercises` events. Lookups never block text
// delivery and their failures never surface to the user.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use super::types::{EventSink, StreamEvent};
use crate::protocol::EnrichmentRequest;

// ---------------------------------------------------------------------------
// Lookup seam
// ---------------------------------------------------------------------------

/// Body of one exercise search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupQuery {
    pub body_parts: Vec<String>,
    pub query: String,
    pub limit: usize,
    pub locale: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("exercise search transport error: {0}")]
    Transport(String),

    #[error("exercise search returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("exercise search returned a malformed body: {0}")]
    MalformedResponse(String),

    #[error("exercise search timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Searches the exercise catalogue.
#[async_trait]
pub trait ExerciseLookup: Send + Sync {
    async fn search(&self, query: &LookupQuery) -> Result<Vec<Value>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    exercises: Vec<Value>,
}

/// `ExerciseLookup` over HTTP: POST `{base}/api/exercises/search`.
pub struct HttpExerciseLookup {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExerciseLookup {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/exercises/search", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ExerciseLookup for HttpExerciseLookup {
    async fn search(&self, query: &LookupQuery) -> Result<Vec<Value>, LookupError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(query)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        let parsed: SearchResponse = serde_json::from_slice(&body)
            .map_err(|e| LookupError::MalformedResponse(e.to_string()))?;
        Ok(parsed.exercises)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Owns the in-flight lookups of one stream.
///
/// Tasks are aborted when the dispatcher is dropped.
pub struct EnrichmentDispatcher {
    lookup: Arc<dyn ExerciseLookup>,
    result_limit: usize,
    timeout: Duration,
    tasks: JoinSet<()>,
}

impl EnrichmentDispatcher {
    pub fn new(
        lookup: Arc<dyn ExerciseLookup>,
        result_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            result_limit: result_limit.max(1),
            timeout,
            tasks: JoinSet::new(),
        }
    }

    /// Start a lookup for `request`. Outside a tokio runtime the request is
    /// logged and dropped.
    pub fn dispatch(&mut self, request: EnrichmentRequest, locale: &str, sink: &EventSink) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(
                topic = %request.topic,
                query = %request.query,
                "no async runtime, dropping exercise lookup"
            );
            return;
        };
        // An empty topic means no body-part filter.
        let body_parts = if request.topic.is_empty() {
            Vec::new()
        } else {
            vec![request.topic.clone()]
        };
        let query = LookupQuery {
            body_parts,
            query: request.query.clone(),
            limit: self.result_limit,
            locale: locale.to_string(),
        };
        tracing::debug!(
            topic = %request.topic,
            query = %request.query,
            "dispatching exercise lookup"
        );

        let lookup = self.lookup.clone();
        let sink = sink.clone();
        let limit = self.result_limit;
        let timeout = self.timeout;
        let task = async move {
            let outcome = match tokio::time::timeout(timeout, lookup.search(&query)).await {
                Ok(result) => result,
                Err(_) => Err(LookupError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };
            match outcome {
                Ok(mut results) if !results.is_empty() => {
                    results.truncate(limit);
                    sink.emit(StreamEvent::Exercises {
                        results,
                        query: Some(query.query),
                    });
                }
                Ok(_) => {
                    tracing::debug!(query = %query.query, "exercise lookup returned no results");
                }
                Err(e) => {
                    tracing::debug!(query = %query.query, error = %e, "exercise lookup failed");
                }
            }
        };
        self.tasks.spawn_on(task, &runtime);
    }

    /// Wait for every in-flight lookup to finish.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::warn!(error = %e, "exercise lookup task panicked");
                }
            }
        }
    }

    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
        self.tasks = JoinSet::new();
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
