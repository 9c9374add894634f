//! API request handlers.
//!
//! Request-boundary validation (missing or empty payload fields, malformed
//! identities) lives here; the hub below only ever sees well-formed input.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::hub::{ConnectedUsers, DeliveryReport, PushEvent, SendOutcome, event};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Open a subscriber stream.
///
/// GET /connect/{identity}
pub async fn connect(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let identity = identity.trim().to_string();
    if identity.is_empty() {
        return Err(ApiError::bad_request("identity must not be empty"));
    }

    let stream = state.hub.connect(&identity).await?;
    Ok(Sse::new(stream.map(|event| Ok(into_sse_event(event)))))
}

/// Explicitly close a subscriber stream.
///
/// POST /disconnect/{identity}
pub async fn disconnect(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Json<DisconnectResponse> {
    let disconnected = state.hub.disconnect(&identity);
    Json(DisconnectResponse {
        identity,
        disconnected,
    })
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub identity: String,
    pub disconnected: bool,
}

/// Request body carrying a required message.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub identity: String,
    pub status: SendOutcome,
}

/// Send a message event to one subscriber.
///
/// POST /send/{identity}
pub async fn send_to_user(
    State(state): State<AppState>,
    Path(identity): Path<String>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<SendResponse>> {
    let message = require_message(body)?;
    let status = state
        .hub
        .send_to_user(&identity, event::MESSAGE, json!(message))
        .await;
    Ok(Json(SendResponse { identity, status }))
}

/// Broadcast a message event to every subscriber.
///
/// POST /broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<DeliveryReport>> {
    let message = require_message(body)?;
    let report = state.hub.broadcast(json!(message)).await;
    Ok(Json(report))
}

/// Request body for a labeled system event. Both fields are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEventBody {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEventResponse {
    pub event_type: String,
    pub success: usize,
    pub fail: usize,
}

/// Broadcast a labeled system event to every subscriber.
///
/// POST /system-event
pub async fn system_event(
    State(state): State<AppState>,
    Json(body): Json<SystemEventBody>,
) -> ApiResult<Json<SystemEventResponse>> {
    let event_type = body
        .event_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    if !is_valid_event_type(&event_type) {
        return Err(ApiError::bad_request(
            "eventType may only contain letters, digits, '-' and '_'",
        ));
    }
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "a system event occurred".to_string());

    let report = state.hub.system_event(&event_type, json!(message)).await;
    Ok(Json(SystemEventResponse {
        event_type,
        success: report.success,
        fail: report.fail,
    }))
}

/// List currently connected subscribers.
///
/// GET /users
pub async fn list_users(State(state): State<AppState>) -> Json<ConnectedUsers> {
    Json(state.hub.list_connected())
}

fn require_message(body: MessageBody) -> Result<String, ApiError> {
    match body.message {
        Some(message) if !message.trim().is_empty() => Ok(message),
        _ => Err(ApiError::bad_request("message must not be empty")),
    }
}

/// Event names become SSE field values, which must stay single-line.
fn is_valid_event_type(event_type: &str) -> bool {
    event_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn into_sse_event(event: PushEvent) -> Event {
    let base = Event::default().id(event.id).event(event.name);
    match base.json_data(&event.data) {
        Ok(sse) => sse,
        Err(err) => {
            warn!("failed to encode event data: {err}");
            Event::default().comment("encoding error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_message_rejects_empty_and_missing() {
        assert!(require_message(MessageBody { message: None }).is_err());
        assert!(
            require_message(MessageBody {
                message: Some("   ".to_string())
            })
            .is_err()
        );
        assert_eq!(
            require_message(MessageBody {
                message: Some("hello".to_string())
            })
            .unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_event_type_validation() {
        assert!(is_valid_event_type("info"));
        assert!(is_valid_event_type("deploy_started-2"));
        assert!(!is_valid_event_type("bad type"));
        assert!(!is_valid_event_type("line\nbreak"));
    }
}
