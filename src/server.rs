//! The gateway HTTP server.
//!
//! A single chat endpoint, method-dispatched, plus a health probe:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Retrieval-augmented chat, buffered or streamed |
//! | `GET`  | `/chat` | Configuration probe (`{ok, model, embedModel}`) |
//! | `OPTIONS` | `/chat` | CORS preflight / empty 204 |
//! | `GET`  | `/health` | Liveness check (returns version) |
//!
//! Other methods on `/chat` get a 405 with an `Allow` header from the
//! method router.
//!
//! # Error Contract
//!
//! Every failure before the first streamed byte is a JSON object:
//!
//! ```json
//! { "error": "Upstream AI provider returned an error", "detail": "..." }
//! ```
//!
//! 400 for empty/invalid message lists, 502 for upstream status failures,
//! 500 for missing credentials, absent replies, and everything unexpected.
//! Once streaming has begun, a failure can only manifest as a terminated
//! stream; that asymmetry is inherent to the protocol.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! call the gateway cross-origin.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::{EmbeddingBackend, HttpEmbedder};
use crate::index::KnowledgeIndex;
use crate::models::{ChatRequest, Role};
use crate::prompt;
use crate::retrieval;
use crate::sanitize::sanitize_messages;
use crate::upstream::{UpstreamClient, UpstreamError, UpstreamPayload};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Provider-facing half of the state. `None` when no credential is
    /// configured: probes report 503 and chat attempts fail with 500.
    pub gateway: Option<Arc<Gateway>>,
}

/// Everything that needs the provider credential.
pub struct Gateway {
    pub index: KnowledgeIndex,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub upstream: UpstreamClient,
}

/// Build the application state from configuration, corpus, and the
/// credential read at process start.
pub fn build_state(
    config: Arc<Config>,
    corpus: Corpus,
    api_key: Option<String>,
) -> anyhow::Result<AppState> {
    let gateway = match api_key {
        Some(key) => {
            // One client for both outbound endpoints. Only a connect deadline
            // here: buffered calls add a per-request total deadline, while
            // streamed generations may run arbitrarily long.
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?;
            let embedder: Arc<dyn EmbeddingBackend> = Arc::new(HttpEmbedder::new(
                client.clone(),
                &config.provider,
                key.clone(),
            ));
            let upstream = UpstreamClient::new(client, &config.provider, key);
            let index = KnowledgeIndex::new(corpus, config.retrieval.max_input_chars);
            Some(Arc::new(Gateway {
                index,
                embedder,
                upstream,
            }))
        }
        None => None,
    };

    Ok(AppState { config, gateway })
}

/// Build the router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/chat",
            get(handle_probe).post(handle_chat).options(handle_options),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Load the corpus, read the credential, bind, and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let corpus = Corpus::from_path(&config.corpus.path)?;
    let api_key = std::env::var(&config.provider.api_key_env)
        .ok()
        .filter(|key| !key.is_empty());

    if api_key.is_none() {
        warn!(
            var = %config.provider.api_key_env,
            "provider credential not set; chat requests will fail until it is configured"
        );
    }

    let bind = config.server.bind.clone();
    let state = build_state(Arc::new(config.clone()), corpus, api_key)?;
    let app = router(state);

    println!("context-relay listening on http://{}", bind);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// HTTP boundary error, serialized as `{error, detail?}`.
pub struct ApiError {
    status: StatusCode,
    error: String,
    detail: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });
        if let Some(detail) = self.detail {
            body["detail"] = json!(detail);
        }
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, message)
}

/// Constructs a 500 Internal Server Error.
fn internal(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message)
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, body } => {
                warn!(status, "upstream chat call failed");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "Upstream AI provider returned an error",
                )
                .with_detail(body)
            }
            UpstreamError::NoReply => internal("AI provider did not return a message"),
            UpstreamError::Transport(e) => {
                internal("Failed to generate AI response").with_detail(e.to_string())
            }
        }
    }
}

// ============ GET /health ============

/// Handler for `GET /health`: liveness for load balancers and monitors.
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ GET /chat ============

/// Handler for `GET /chat`: a soft configuration probe.
///
/// 503 when no provider credential is configured, otherwise the active
/// model names.
async fn handle_probe(State(state): State<AppState>) -> Response {
    match &state.gateway {
        Some(_) => Json(json!({
            "ok": true,
            "model": state.config.provider.chat_model,
            "embedModel": state.config.provider.embed_model,
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "error": format!("{} is not set", state.config.provider.api_key_env),
            })),
        )
            .into_response(),
    }
}

// ============ OPTIONS /chat ============

/// Preflight requests are answered by the CORS layer; a plain OPTIONS gets
/// an empty 204.
async fn handle_options() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ============ POST /chat ============

/// Handler for `POST /chat`.
///
/// Sanitizes the history, retrieves corpus context (failures degrade to "no
/// context"), assembles the system prompt, and dispatches upstream in
/// buffered or streaming mode.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let Some(gateway) = &state.gateway else {
        return Err(internal(format!(
            "{} is not set",
            state.config.provider.api_key_env
        )));
    };
    let config = &state.config;

    let history = sanitize_messages(&request.messages, config.retrieval.max_history);
    if history.is_empty() {
        return Err(bad_request("messages array is required"));
    }

    // The latest user message drives retrieval. A conversation with no user
    // turn gets no retrieved context.
    let query = history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone());

    let results = match &query {
        Some(query) => {
            match retrieval::retrieve(
                &gateway.index,
                gateway.embedder.as_ref(),
                query,
                &config.retrieval,
            )
            .await
            {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %err, "retrieval unavailable; continuing without corpus context");
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    if !results.is_empty() {
        debug!(
            matches = results.len(),
            top_topic = %results[0].topic,
            top_score = results[0].score,
            "retrieved corpus context"
        );
    }

    let system_prompt = prompt::build_system_prompt(
        request.context.as_deref(),
        &results,
        config.retrieval.max_context_chars,
    );

    let payload = UpstreamPayload::new(
        request
            .model
            .clone()
            .unwrap_or_else(|| config.provider.chat_model.clone()),
        request.temperature.unwrap_or(config.upstream.temperature),
        config.upstream.max_tokens,
        request.stream,
        system_prompt,
        history,
        config.retrieval.max_history,
    );

    if request.stream {
        let upstream_response = gateway.upstream.open_stream(&payload).await?;
        Ok(relay_response(upstream_response))
    } else {
        let reply = gateway.upstream.complete(&payload).await?;
        let mut response = Json(json!({
            "reply": reply.reply,
            "finishReason": reply.finish_reason,
            "usage": reply.usage,
        }))
        .into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        Ok(response)
    }
}

/// Forward the upstream byte stream to the caller without buffering,
/// parsing, or transforming any chunk.
///
/// Cancellation rides on drop: if the caller disconnects, axum drops the
/// body, which drops the upstream response and releases the outbound
/// connection, so an abandoned stream is never read to completion.
fn relay_response(upstream_response: reqwest::Response) -> Response {
    let stream = upstream_response.bytes_stream().inspect(|chunk| {
        if let Err(err) = chunk {
            warn!(error = %err, "upstream stream ended with an error");
        }
    });

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}
