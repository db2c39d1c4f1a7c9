// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Heartbeat endpoint
// - Accept a conversation, start the generation via the injected
//   `GenerationClient`, and stream parser events back as SSE
// - Map request and upstream failures to status codes

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::Config;
use crate::stream::sse::{encode_event, DONE_FRAME};
use crate::stream::{HttpExerciseLookup, RuleAugmenter, StreamEvent, StreamProcessor};
use crate::upstream::{
    ChatMessage, GenerationClient, GenerationRequest, OpenAiGenerationClient, UpstreamError,
};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("conversation has no messages")]
    EmptyConversation,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            ServerError::EmptyBody => (StatusCode::BAD_REQUEST, "request body is empty"),
            ServerError::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, "request body is not valid JSON")
            }
            ServerError::EmptyConversation => {
                (StatusCode::BAD_REQUEST, "conversation has no messages")
            }
            ServerError::Upstream(UpstreamError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out")
            }
            ServerError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream request failed"),
        };
        (status, public_message).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn GenerationClient>,
    pub processor: Arc<StreamProcessor>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub locale: Option<String>,
}

pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Stream an assistant reply as server-sent events.
pub async fn assistant_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let request_id = Uuid::new_v4().to_string();

    if body.is_empty() {
        return Err(ServerError::EmptyBody);
    }
    let request: AssistantRequest =
        serde_json::from_slice(&body).map_err(|e| ServerError::MalformedJson(e.to_string()))?;
    if request.messages.is_empty() {
        return Err(ServerError::EmptyConversation);
    }

    tracing::info!(
        request_id = %request_id,
        messages = request.messages.len(),
        locale = request.locale.as_deref().unwrap_or(""),
        "assistant stream requested"
    );

    let fragments = match state
        .generator
        .stream(GenerationRequest {
            messages: request.messages,
        })
        .await
    {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "generation failed to start");
            return Err(e.into());
        }
    };

    let events = state.processor.process(fragments, request.locale);
    let frames = events
        .map(move |event| {
            if event == StreamEvent::Complete {
                tracing::info!(request_id = %request_id, "assistant stream complete");
            }
            Ok::<_, Infallible>(encode_event(&event))
        })
        .chain(tokio_stream::once(Ok(Bytes::from_static(DONE_FRAME))));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/api/assistant/stream", post(assistant_stream))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// The stream processor described by `config`, sharing `client` for
/// exercise lookups.
pub fn build_processor(config: &Config, client: reqwest::Client) -> StreamProcessor {
    let augmenter = Arc::new(RuleAugmenter::new(config.augmentation_rules.clone()));
    let processor = StreamProcessor::new(config.parser.clone(), augmenter);

    match (&config.enrichment.base_url, config.enrichment.enabled) {
        (Some(base_url), true) => processor.with_enrichment(
            Arc::new(HttpExerciseLookup::new(client, base_url)),
            config.enrichment.result_limit,
            config.enrichment.timeout(),
        ),
        _ => processor,
    }
}

/// Application state wired to the real generation service.
pub fn build_state(config: &Config) -> AppState {
    let client = reqwest::Client::new();
    AppState {
        generator: Arc::new(OpenAiGenerationClient::new(client.clone(), &config.upstream)),
        processor: Arc::new(build_processor(config, client)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::default_augmentation_rules;
    use crate::config::{load_config, StringSource};
    use crate::stream::ParserOptions;
    use crate::upstream::FragmentStream;
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt; // for oneshot

    // -----------------------------------------------------------------------
    // Mock generation client
    // -----------------------------------------------------------------------

    enum Reply {
        Fragments(Vec<Result<&'static str, &'static str>>),
        Fail(fn() -> UpstreamError),
    }

    /// Replays a canned generation and records the conversations it saw.
    struct MockGenerator {
        reply: Reply,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl MockGenerator {
        fn replying(fragments: Vec<Result<&'static str, &'static str>>) -> Self {
            Self {
                reply: Reply::Fragments(fragments),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(make: fn() -> UpstreamError) -> Self {
            Self {
                reply: Reply::Fail(make),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl GenerationClient for MockGenerator {
        async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, UpstreamError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Reply::Fragments(items) => {
                    let items: Vec<Result<String, UpstreamError>> = items
                        .iter()
                        .map(|r| match r {
                            Ok(s) => Ok(s.to_string()),
                            Err(e) => Err(UpstreamError::Transport(e.to_string())),
                        })
                        .collect();
                    Ok(Box::pin(tokio_stream::iter(items)))
                }
                Reply::Fail(make) => Err(make()),
            }
        }
    }

    fn app(generator: Arc<MockGenerator>) -> Router {
        let processor = StreamProcessor::new(
            ParserOptions::default(),
            Arc::new(RuleAugmenter::new(default_augmentation_rules())),
        );
        build_router(AppState {
            generator,
            processor: Arc::new(processor),
        })
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/assistant/stream")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const CONVERSATION: &str = r#"{"messages":[{"role":"user","content":"My knee hurts"}],"locale":"nb"}"#;

    // -----------------------------------------------------------------------
    // Routes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn heartbeat_returns_200() {
        let app = app(Arc::new(MockGenerator::replying(vec![])));
        let req = Request::builder()
            .method("GET")
            .uri("/v1/heartbeat")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let app = app(Arc::new(MockGenerator::replying(vec![])));
        let req = Request::builder()
            .uri("/v1/chat/completions")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn streams_events_as_sse() {
        let generator = Arc::new(MockGenerator::replying(vec![
            Ok("Rest the knee. "),
            Ok(r#"<<JSON_DATA>>{"followUpOptions":[{"text":"Make me a workout program"}]}"#),
            Ok("<<JSON_END>>"),
        ]));
        let resp = app(generator.clone()).oneshot(post_json(CONVERSATION)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        let body = body_string(resp).await;
        let frames: Vec<&str> = body.split("\n\n").filter(|f| !f.is_empty()).collect();

        assert_eq!(frames[0], r#"data: {"type":"text","content":"Rest the knee. "}"#);
        assert!(frames[1].starts_with(r#"data: {"type":"payload""#));
        assert!(frames[2].contains(r#""text":"Make me a workout program""#));
        assert!(frames[2].contains(r#""category":"exercise""#));
        assert!(frames[3].contains(r#""text":"Answer in chat""#));
        assert_eq!(frames[4], r#"data: {"type":"complete"}"#);
        assert_eq!(frames[5], "data: [DONE]");
        assert_eq!(frames.len(), 6);

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0].messages[0].content, "My knee hurts");
    }

    #[tokio::test]
    async fn mid_stream_upstream_error_still_completes() {
        let generator = Arc::new(MockGenerator::replying(vec![Ok("Partial "), Err("reset")]));
        let resp = app(generator).oneshot(post_json(CONVERSATION)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_string(resp).await;
        assert!(body.contains(r#""content":"Partial ""#));
        assert!(body.contains(r#""text":"Answer in chat""#));
        assert!(body.ends_with("data: {\"type\":\"complete\"}\n\ndata: [DONE]\n\n"));
    }

    // -----------------------------------------------------------------------
    // Error mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn empty_body_returns_400() {
        let resp = app(Arc::new(MockGenerator::replying(vec![])))
            .oneshot(post_json(""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "request body is empty");
    }

    #[tokio::test]
    async fn invalid_json_returns_400() {
        let resp = app(Arc::new(MockGenerator::replying(vec![])))
            .oneshot(post_json("{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_conversation_returns_400() {
        let generator = Arc::new(MockGenerator::replying(vec![]));
        let resp = app(generator.clone())
            .oneshot(post_json(r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_returns_502() {
        let generator = Arc::new(MockGenerator::failing(|| UpstreamError::HttpStatus {
            status: 500,
            body: "boom".to_string(),
        }));
        let resp = app(generator).oneshot(post_json(CONVERSATION)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(resp).await, "upstream request failed");
    }

    #[tokio::test]
    async fn upstream_timeout_returns_504() {
        let generator = Arc::new(MockGenerator::failing(|| {
            UpstreamError::Timeout("deadline elapsed".to_string())
        }));
        let resp = app(generator).oneshot(post_json(CONVERSATION)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    // -----------------------------------------------------------------------
    // Factories
    // -----------------------------------------------------------------------

    #[test]
    fn processor_follows_config() {
        let config = load_config(&StringSource {
            content: "coachstream: v1\nparser:\n  locale: nb\n  block_policy: every\n".to_string(),
        })
        .unwrap();
        let processor = build_processor(&config, reqwest::Client::new());
        assert_eq!(processor.options().locale, "nb");
        assert_eq!(processor.options(), &config.parser);
    }
}
