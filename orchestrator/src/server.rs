//! HTTP / WebSocket surface
//!
//! - `GET /` health banner
//! - `GET /ws` live decision stream, one snapshot per tick
//! - `GET /monitors` per-monitor run state
//! - `GET /signals` most recent signals
//! - `POST /admin/scale` resize the external worker pool

use crate::lifecycle::Lifecycle;
use crate::scaling::{ScaleController, ScaleReceipt};
use crate::stream::DecisionStream;
use crate::supervisor::{RunStateSnapshot, Supervisor};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{AdminError, Signal};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use signal_monitors::SignalTape;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub stream: Arc<DecisionStream>,
    pub tape: Arc<SignalTape>,
    pub scaler: Arc<ScaleController>,
}

impl AppState {
    pub fn new(lifecycle: &Lifecycle, tape: Arc<SignalTape>, scaler: Arc<ScaleController>) -> Self {
        Self {
            supervisor: lifecycle.supervisor().clone(),
            stream: lifecycle.stream().clone(),
            tape,
            scaler,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ws", get(ws_handler))
        .route("/monitors", get(monitors))
        .route("/signals", get(signals))
        .route("/admin/scale", post(scale))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "active",
        "system": "OmniTrade",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn monitors(State(state): State<AppState>) -> Json<Vec<RunStateSnapshot>> {
    Json(state.supervisor.snapshots())
}

#[derive(Debug, Deserialize)]
struct SignalsQuery {
    limit: Option<usize>,
}

async fn signals(
    State(state): State<AppState>,
    Query(query): Query<SignalsQuery>,
) -> Json<Vec<Signal>> {
    Json(state.tape.recent(query.limit.unwrap_or(50)))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ScaleRequest {
    pub replicas: u32,
}

async fn scale(
    State(state): State<AppState>,
    Json(request): Json<ScaleRequest>,
) -> Result<Json<ScaleReceipt>, ApiError> {
    let receipt = state.scaler.request(request.replicas).await?;
    Ok(Json(receipt))
}

/// Maps administrative failures onto HTTP status codes
pub struct ApiError(AdminError);

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AdminError::BelowMinimum { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.stream))
}

async fn handle_socket(socket: WebSocket, stream: Arc<DecisionStream>) {
    let mut subscriber = stream.subscribe();
    let id = subscriber.id();
    let (mut sender, mut receiver) = socket.split();
    info!("WebSocket client {} connected", id);

    loop {
        tokio::select! {
            snapshot = subscriber.next() => match snapshot {
                Some(payload) => {
                    if sender.send(Message::Text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(msg)) => debug!("Ignoring client message from {}: {:?}", id, msg),
                Some(Err(e)) => {
                    warn!("WebSocket error for {}: {}", id, e);
                    break;
                }
            },
        }
    }

    stream.subscribers().unsubscribe(id);
    info!("WebSocket client {} disconnected", id);
}
