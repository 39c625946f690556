use crate::chat::ConversationDriver;
use crate::db::SchemaCatalog;
use crate::error::Error;
use crate::session::{SessionStore, Turn};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<SchemaCatalog>,
    pub sessions: Arc<SessionStore>,
    pub driver: Arc<ConversationDriver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(delete_session))
        .route("/api/sessions/:id/messages", get(get_messages))
        .route("/api/sessions/:id/chat", post(chat))
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTableName(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Connection(_) | Error::TableNotFound(_) | Error::Query(_) | Error::Model(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ── Pages ────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Sessions ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub id: Uuid,
    pub tables: usize,
}

async fn create_session(State(state): State<AppState>) -> Result<Json<SessionCreated>, ApiError> {
    let schema = state.catalog.schema_context().await?;
    let id = state.sessions.create(schema.system_prompt()).await;

    tracing::info!(session = %id, tables = schema.tables.len(), "session started");
    Ok(Json(SessionCreated {
        id,
        tables: schema.tables.len(),
    }))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Turn>>, ApiError> {
    let session = state.sessions.get(&id).await?;
    let session = session.lock().await;
    Ok(Json(session.transcript.visible().to_vec()))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.sessions.remove(&id).await {
        tracing::info!(session = %id, "session ended");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ── Chat ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatInput {
    #[serde(default)]
    pub message: String,
}

/// Streams `delta` events while the model answers, then a `turn` event with
/// the finished assistant turn (or an `error` event), then `done`.
async fn chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ChatInput>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.sessions.get(&id).await?;
    let driver = state.driver.clone();
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let mut session = session.lock_owned().await;
        let delta_tx = tx.clone();
        let outcome = driver
            .interact(&mut session.transcript, &input.message, move |fragment| {
                let _ = delta_tx.send(json_event("delta", serde_json::json!({ "text": fragment })));
            })
            .await;

        match outcome {
            Ok(Some(turn)) => {
                let _ = tx.send(json_event("turn", &turn));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(session = %id, error = %e, "interaction failed");
                let _ = tx.send(json_event("error", serde_json::json!({ "error": e.to_string() })));
            }
        }
        let _ = tx.send(Event::default().event("done").data(""));
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn json_event<T: Serialize>(name: &str, payload: T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}
