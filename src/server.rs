//! HTTP server for the web frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/answer` | Answer `{query, history}`; returns `{question, answer, history}` |
//! | `GET`  | `/api/answer?query=…` | Same, without history |
//! | `GET`  | `/api/description` | Assistant `{name, description}` |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | anything else | Static frontend bundle, falling back to `index.html` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "No query provided" }
//! ```
//!
//! Bad input is a 400; a failing agent or model provider is a 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a frontend dev server
//! on another port can call the API.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::agent::{Agent, HistoryEntry};
use crate::config::{AssistantConfig, ServerConfig};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<AssistantConfig>,
    pub agent: Arc<Agent>,
}

/// Build the application router.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let frontend =
        ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/answer", get(handle_answer_query).post(handle_answer))
        .route("/api/description", get(handle_description))
        .route("/health", get(handle_health))
        .fallback_service(frontend)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    if !config.static_dir.join("index.html").exists() {
        tracing::warn!(
            static_dir = %config.static_dir.display(),
            "frontend bundle not found; only the API will be useful"
        );
    }

    let app = router(state, &config.static_dir);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;

    tracing::info!(bind = %config.bind, "server listening");
    println!("Listening on http://{}", config.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ /api/answer ============

#[derive(Deserialize)]
struct AnswerRequest {
    #[serde(default)]
    query: Option<String>,
    /// Returned as received with the new turn appended; entries that are
    /// not `{question, answer}` objects are kept but not shown to the model.
    #[serde(default)]
    history: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct AnswerQuery {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize)]
struct AnswerResponse {
    question: String,
    answer: String,
    history: Vec<Value>,
}

async fn handle_answer(
    State(state): State<AppState>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;
    answer(&state, request.query, request.history.unwrap_or_default()).await
}

async fn handle_answer_query(
    State(state): State<AppState>,
    Query(params): Query<AnswerQuery>,
) -> Result<Json<AnswerResponse>, AppError> {
    answer(&state, params.query, Vec::new()).await
}

async fn answer(
    state: &AppState,
    query: Option<String>,
    mut history: Vec<Value>,
) -> Result<Json<AnswerResponse>, AppError> {
    let question = match query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(bad_request("No query provided")),
    };

    let prior: Vec<HistoryEntry> = history.iter().filter_map(HistoryEntry::from_json).collect();
    tracing::info!(query = %question, history = history.len(), usable = prior.len(), "answering");
    let answer = state.agent.answer(&question, &prior).await.map_err(|e| {
        tracing::error!(error = format!("{:#}", e), "agent failed");
        internal(format!("{:#}", e))
    })?;

    history.push(json!({ "question": &question, "answer": &answer }));
    Ok(Json(AnswerResponse {
        question,
        answer,
        history,
    }))
}

// ============ GET /api/description ============

#[derive(Serialize)]
struct DescriptionResponse {
    name: String,
    description: String,
}

async fn handle_description(State(state): State<AppState>) -> Json<DescriptionResponse> {
    Json(DescriptionResponse {
        name: state.assistant.name.clone(),
        description: state.assistant.description.clone(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatModel, ChatResponse, Message, ToolDefinition};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Answers every question by echoing it; fails on "explode".
    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, messages: &[Message], _tools: &[ToolDefinition]) -> anyhow::Result<ChatResponse> {
            let question = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            if question == "explode" {
                anyhow::bail!("provider unavailable");
            }
            Ok(ChatResponse::Text(format!("answer to {}", question)))
        }
    }

    fn app(static_dir: &Path) -> Router {
        let state = AppState {
            assistant: Arc::new(AssistantConfig {
                name: "AKS Assistant".to_string(),
                description: "Internal wiki".to_string(),
            }),
            agent: Arc::new(Agent::new(
                Arc::new(EchoModel),
                ToolRegistry::new(),
                "system".to_string(),
                3,
            )),
        };
        router(state, static_dir)
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/answer")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let resp = app(tmp.path()).oneshot(post_json(r#"{"query": ""}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await, json!({ "error": "No query provided" }));

        let resp = app(tmp.path()).oneshot(post_json("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let resp = app(tmp.path()).oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn answer_appends_to_history() {
        let tmp = TempDir::new().unwrap();
        let body = json!({
            "query": "how do I scale?",
            "history": [
                { "question": "q1", "answer": "a1" },
                { "question": "q2", "answer": "a2" }
            ]
        });
        let resp = app(tmp.path())
            .oneshot(post_json(&body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = json_body(resp).await;
        assert_eq!(json["question"], "how do I scale?");
        assert_eq!(json["answer"], "answer to how do I scale?");
        let history = json["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2]["question"], "how do I scale?");
    }

    #[tokio::test]
    async fn history_is_echoed_unchanged() {
        let tmp = TempDir::new().unwrap();
        let body = json!({
            "query": "q",
            "history": [
                { "question": "q1", "answer": "a1", "id": 7 },
                { "question": "q2" },
                "legacy"
            ]
        });
        let resp = app(tmp.path())
            .oneshot(post_json(&body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = json_body(resp).await;
        assert_eq!(
            json["history"],
            json!([
                { "question": "q1", "answer": "a1", "id": 7 },
                { "question": "q2" },
                "legacy",
                { "question": "q", "answer": "answer to q" }
            ])
        );
    }

    #[tokio::test]
    async fn get_answer_uses_query_string() {
        let tmp = TempDir::new().unwrap();
        let req = Request::builder()
            .uri("/api/answer?query=hello")
            .body(Body::empty())
            .unwrap();
        let resp = app(tmp.path()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["answer"], "answer to hello");
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn agent_failure_is_internal_error() {
        let tmp = TempDir::new().unwrap();
        let resp = app(tmp.path())
            .oneshot(post_json(r#"{"query": "explode"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(resp).await["error"]
            .as_str()
            .unwrap()
            .contains("provider unavailable"));
    }

    #[tokio::test]
    async fn description_and_health() {
        let tmp = TempDir::new().unwrap();
        let req = Request::builder()
            .uri("/api/description")
            .body(Body::empty())
            .unwrap();
        let json = json_body(app(tmp.path()).oneshot(req).await.unwrap()).await;
        assert_eq!(json, json!({ "name": "AKS Assistant", "description": "Internal wiki" }));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let json = json_body(app(tmp.path()).oneshot(req).await.unwrap()).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_paths_serve_index() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(tmp.path().join("main.js"), "console.log(1)").unwrap();

        let req = Request::builder().uri("/main.js").body(Body::empty()).unwrap();
        let resp = app(tmp.path()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"console.log(1)");

        let req = Request::builder()
            .uri("/chat/history")
            .body(Body::empty())
            .unwrap();
        let resp = app(tmp.path()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<html>app</html>");
    }
}
