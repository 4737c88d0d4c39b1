//! HTTP route handlers for the WhatsApp session API

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::session::{MessageBody, SessionError, SessionManager, StatusSnapshot};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        Self { session_manager }
    }
}

/// Error response for the WhatsApp API
#[derive(Debug, Serialize, Deserialize)]
pub struct WhatsappErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<SessionError> for WhatsappErrorResponse {
    fn from(e: SessionError) -> Self {
        let code = match &e {
            SessionError::ConnectionSetupFailed(_) => "connection_setup_failed",
            SessionError::NotConnected => "not_connected",
            SessionError::DeliveryFailed(_) => "delivery_failed",
            SessionError::InvalidMessage(_) => "invalid_message",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for WhatsappErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "not_available" => StatusCode::NOT_FOUND,
            "invalid_message" => StatusCode::BAD_REQUEST,
            "not_connected" => StatusCode::SERVICE_UNAVAILABLE,
            "delivery_failed" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Response for GET /api/whatsapp/qr
#[derive(Debug, Serialize, Deserialize)]
pub struct PairingArtifactResponse {
    pub artifact: String,
}

/// Body for POST /api/whatsapp/send
#[derive(Debug, Serialize, Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    /// False when a supervisor was already running
    pub started: bool,
}

/// GET /api/whatsapp/status - Current connection status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.session_manager.status().await)
}

/// GET /api/whatsapp/qr - Current pairing QR code
pub async fn get_pairing_artifact(
    State(state): State<AppState>,
) -> Result<Json<PairingArtifactResponse>, WhatsappErrorResponse> {
    match state.session_manager.pairing_artifact().await {
        Some(artifact) => Ok(Json(PairingArtifactResponse { artifact })),
        None => Err(WhatsappErrorResponse {
            error: "No QR code available".to_string(),
            code: "not_available".to_string(),
        }),
    }
}

/// POST /api/whatsapp/send - Deliver a text or image message
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, WhatsappErrorResponse> {
    let body = MessageBody {
        text: request.text,
        image_url: request.image_url,
    };

    state
        .session_manager
        .send(&request.recipient, body)
        .await
        .map_err(|e| {
            tracing::warn!("Send to {} failed: {}", request.recipient, e);
            WhatsappErrorResponse::from(e)
        })?;

    Ok(Json(SendResponse { success: true }))
}

/// POST /api/whatsapp/start - (Re)start the session, e.g. to pair after a logout
pub async fn start_session(State(state): State<AppState>) -> (StatusCode, Json<StartResponse>) {
    let started = state.session_manager.start().await;
    if started {
        tracing::info!("Session start requested over HTTP");
    }
    (StatusCode::ACCEPTED, Json(StartResponse { started }))
}

/// Build WhatsApp API routes
pub fn whatsapp_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/qr", get(get_pairing_artifact))
        .route("/send", post(send_message))
        .route("/start", post(start_session))
}
