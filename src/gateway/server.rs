use crate::activation::{ActivationMachine, SurfaceEvent};
use crate::chat::{ChatEvent, ChatPipeline, ChatRequest};
use crate::settings::{Settings, SettingsStore};
use crate::storage::Database;
use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Everything the boundary handlers need, shared by reference.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub settings: Arc<SettingsStore>,
    pub pipeline: ChatPipeline,
    pub machine: Arc<ActivationMachine>,
}

/// Loopback HTTP/SSE service the presentation shell talks to.
pub struct GatewayServer {
    state: GatewayState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl GatewayServer {
    pub fn new(state: GatewayState) -> Self {
        Self {
            state,
            shutdown_tx: None,
        }
    }

    pub async fn start(&mut self, port: u16) -> Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(tx);

        let app = router(self.state.clone());
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        tracing::info!("Gateway starting on {}", addr);

        let server = axum::serve(
            tokio::net::TcpListener::bind(addr).await?,
            app.into_make_service(),
        );

        tokio::spawn(async move {
            tokio::select! {
                _ = server => {},
                _ = rx => {
                    tracing::info!("Gateway shutting down");
                }
            }
        });

        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        Ok(())
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/settings", get(get_settings).put(save_settings))
        .route("/sessions", get(list_sessions).post(create_session).delete(clear_history))
        .route("/sessions/:id", delete(delete_session))
        .route("/sessions/:id/messages", get(get_history))
        .route("/chat", post(submit_chat))
        .route("/events", get(surface_events))
        .route("/activate", post(activate))
        .route("/hide", post(hide))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_settings(State(state): State<GatewayState>) -> Json<Settings> {
    Json(state.settings.load())
}

async fn save_settings(
    State(state): State<GatewayState>,
    Json(settings): Json<Settings>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .settings
        .save(&settings)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reads degrade to empty results so the surface stays usable even when
/// storage is unavailable; writes propagate failures instead.
async fn list_sessions(State(state): State<GatewayState>) -> Json<Vec<crate::models::Session>> {
    match state.db.list_sessions().await {
        Ok(sessions) => Json(sessions),
        Err(e) => {
            tracing::warn!("listing sessions failed: {}", e);
            Json(Vec::new())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatedSession {
    id: i64,
}

async fn create_session(
    State(state): State<GatewayState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreatedSession>, (StatusCode, String)> {
    let id = state
        .db
        .create_session(request.title.as_deref())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(CreatedSession { id }))
}

async fn get_history(
    State(state): State<GatewayState>,
    Path(session_id): Path<i64>,
) -> Json<Vec<crate::models::ChatMessage>> {
    match state.db.get_history(session_id).await {
        Ok(messages) => Json(messages),
        Err(e) => {
            tracing::warn!("history read failed for session {}: {}", session_id, e);
            Json(Vec::new())
        }
    }
}

async fn delete_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    // An in-flight stream for this session must not outlive it.
    state.pipeline.cancel_session(session_id);
    state
        .db
        .delete_session(session_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_history(
    State(state): State<GatewayState>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .db
        .clear_all()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// One submission, one event stream: optional `session`, `chunk`s in
/// provider order, then exactly one `done` or `error`.
async fn submit_chat(
    State(state): State<GatewayState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.pipeline.submit(request);
    let stream = ReceiverStream::new(rx).map(|event| Ok(chat_event_to_sse(event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn chat_event_to_sse(event: ChatEvent) -> Event {
    match event {
        ChatEvent::SessionCreated(id) => Event::default().event("session").data(id.to_string()),
        ChatEvent::Chunk(text) => Event::default()
            .event("chunk")
            .json_data(serde_json::json!({ "text": text }))
            .unwrap_or_default(),
        ChatEvent::Done => Event::default().event("done").data(""),
        ChatEvent::Error(message) => Event::default()
            .event("error")
            .json_data(serde_json::json!({ "message": message }))
            .unwrap_or_default(),
    }
}

/// Activation events for the presentation shell, e.g. captured selection
/// context to preload into the input.
async fn surface_events(
    State(state): State<GatewayState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.machine.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|event| async move {
        match event {
            Ok(SurfaceEvent::ContextCaptured(text)) => Some(Ok::<_, Infallible>(
                Event::default()
                    .event("context")
                    .json_data(serde_json::json!({ "text": text }))
                    .unwrap_or_default(),
            )),
            // A lagged receiver just skips; context is best-effort.
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn activate(State(state): State<GatewayState>) -> StatusCode {
    state.machine.activate().await;
    StatusCode::OK
}

async fn hide(State(state): State<GatewayState>) -> StatusCode {
    state.machine.request_hide().await;
    StatusCode::OK
}
