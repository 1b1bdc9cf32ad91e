//! HTTP route handlers for the GateHub server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `POST /events` - Ingest device notifications (multipart or JSON)
//! - `GET /ws` - WebSocket observer endpoint
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration
//! - The event store (Postgres or in-memory)
//! - The broadcast hub distributing event summaries to observers
//! - The attachment store for event images
//! - Server start time for uptime reporting
//!
//! `POST /events` runs the full ingestion pipeline in order: extract the
//! payload, normalize it into a canonical event, save any attachments,
//! persist the event, then broadcast a one-line summary to observers.
//! Persistence is the commit point: broadcast happens only after the row
//! exists, and a broadcast with zero observers is still a success.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::attachments::AttachmentStore;
use crate::broadcast::BroadcastHub;
use crate::classify::classify;
use crate::config::Config;
use crate::error::ErrorResponse;
use crate::extract::{extract_payload, ExtractError, ExtractedPayload};
use crate::storage::EventStore;
use crate::types::CanonicalEvent;

/// Maximum body size for event ingestion (1 MB covers an event plus one
/// captured image).
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared application state for all route handlers.
///
/// This struct is cloned for each request handler; all clones share the
/// same underlying stores and registry.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Event persistence backend.
    pub store: EventStore,

    /// Broadcast hub distributing summaries to observers.
    pub hub: BroadcastHub,

    /// Attachment storage for event images.
    pub attachments: Arc<AttachmentStore>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from its components.
    #[must_use]
    pub fn new(
        config: Config,
        store: EventStore,
        hub: BroadcastHub,
        attachments: AttachmentStore,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            hub,
            attachments: Arc::new(attachments),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("hub", &self.hub)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

/// Creates the application router with all routes configured.
///
/// # Returns
///
/// An axum `Router` with the following routes:
/// - `POST /events` - Device notification ingestion endpoint
/// - `GET /ws` - WebSocket observer endpoint
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(post_events))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Response body for an accepted event.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Always "ok".
    pub status: String,

    /// Server-assigned id of the stored record.
    pub id: i64,
}

/// POST /events - Ingest a device notification.
///
/// Accepts `multipart/form-data` (event JSON in a form field, optional
/// image parts) or a raw `application/json` body.
///
/// # Responses
///
/// - `200 OK` - Event stored; body carries the assigned record id
/// - `400 Bad Request` - Undecodable body or no event data in the form
/// - `415 Unsupported Media Type` - Content type is neither multipart nor JSON
/// - `422 Unprocessable Entity` - Payload decoded but failed validation;
///   body enumerates every offending field
/// - `500 Internal Server Error` - Persistence failed; nothing was broadcast
async fn post_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let ExtractedPayload { event, attachments } = match extract_payload(&headers, body).await {
        Ok(extracted) => extracted,
        Err(err) => return extraction_response(&err),
    };

    let event = match classify(&event) {
        Ok(event) => event,
        Err(err) => {
            debug!(fields = err.fields.len(), "Event failed validation");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(
                    ErrorResponse::new("event validation failed")
                        .with_code("validation_failed")
                        .with_fields(err.fields),
                ),
            )
                .into_response();
        }
    };

    // Attachments are saved before the row so the picture reference can be
    // stored with it. A failed save degrades: the event still persists,
    // just without the reference. Heartbeats never carry attachments.
    let mut picture_ref = None;
    if matches!(event, CanonicalEvent::Access(_)) {
        for attachment in &attachments {
            match state
                .attachments
                .save(&attachment.label, &attachment.content)
                .await
            {
                Ok(filename) => {
                    picture_ref.get_or_insert(filename);
                }
                Err(err) => {
                    warn!(
                        label = %attachment.label,
                        error = %err,
                        "Attachment save failed; storing event without picture reference"
                    );
                }
            }
        }
    }

    let record = match state.store.persist(&event, picture_ref.as_deref()).await {
        Ok(record) => record,
        Err(err) => {
            error!(error = %err, device = %event.device_id(), "Failed to persist event");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("failed to store event").with_code("persistence_failed")),
            )
                .into_response();
        }
    };

    let delivered = state.hub.broadcast(&event.summary());
    info!(
        id = record.id(),
        device = %event.device_id(),
        event_type = %event.event_type(),
        observers = delivered,
        "Event stored and broadcast"
    );

    (
        StatusCode::OK,
        Json(IngestResponse {
            status: "ok".to_string(),
            id: record.id(),
        }),
    )
        .into_response()
}

/// Maps an extraction failure to its HTTP response.
fn extraction_response(err: &ExtractError) -> Response {
    match err {
        ExtractError::UnsupportedMediaType(content_type) => {
            debug!(content_type = %content_type, "Rejected unsupported content type");
            (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(
                    ErrorResponse::new(format!("unsupported content type: {content_type}"))
                        .with_code("unsupported_media_type"),
                ),
            )
                .into_response()
        }
        ExtractError::MissingEventData => (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("no form field contains event data")
                    .with_code("missing_event_data"),
            ),
        )
            .into_response(),
        ExtractError::MalformedPayload(err) => (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new(format!("malformed event JSON: {err}"))
                    .with_code("malformed_payload"),
            ),
        )
            .into_response(),
        ExtractError::Multipart(err) => (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new(format!("malformed multipart body: {err}"))
                    .with_code("malformed_multipart"),
            ),
        )
            .into_response(),
    }
}

/// GET /ws - WebSocket observer endpoint.
///
/// Once connected, the server sends the one-line summary of every accepted
/// event as a text message. There is no replay: an observer sees only
/// events accepted while it is connected.
async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_observer(socket, state.hub))
}

/// Handles an established observer connection.
///
/// Registers a channel with the hub and forwards every summary to the
/// client until either side disconnects; the channel is unregistered on
/// the way out.
async fn handle_observer(socket: axum::extract::ws::WebSocket, hub: BroadcastHub) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let (observer_id, mut summary_rx) = hub.register();

    info!(observer = %observer_id, "Observer connected");

    // Forward summaries to the client until the hub or socket closes.
    let forward_task = tokio::spawn(async move {
        while let Some(summary) = summary_rx.recv().await {
            if let Err(err) = sender.send(Message::Text(summary.into())).await {
                debug!(error = %err, "Failed to send summary to observer");
                break;
            }
        }
    });

    // Wait for the client to disconnect.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                debug!(observer = %observer_id, "Observer sent close frame");
                break;
            }
            Ok(Message::Ping(data)) => {
                // axum handles pong automatically
                trace!(data_len = data.len(), "Received ping");
            }
            Ok(_) => {
                // Observers are receive-only; other messages are ignored.
            }
            Err(err) => {
                debug!(observer = %observer_id, error = %err, "Observer socket error");
                break;
            }
        }
    }

    forward_task.abort();
    hub.unregister(observer_id);
    info!(observer = %observer_id, "Observer disconnected");
}

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of connected observers.
    pub observers: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// Returns server health status and statistics. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed();

    Json(HealthResponse {
        status: "ok".to_string(),
        observers: state.hub.observer_count(),
        uptime_seconds: uptime.as_secs(),
    })
}
