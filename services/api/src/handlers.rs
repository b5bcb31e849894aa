//! Axum Handlers for the REST API
//!
//! Meeting control (start, add/remove bots), the meeting platform's webhook,
//! and a persona status listing.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use huddle_core::PersonaId;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    models::{
        AddBotRequest, BotResponse, ErrorResponse, RemoveBotRequest, StartResponse, WebhookEvent,
        WebhookPayload,
    },
    persona::PersonaStatus,
    recall::{BotRequest, RecallError, bot_id},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(StatusCode, String),
    Timeout,
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Upstream(status, message) => {
                (status, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                Json(ErrorResponse {
                    message: "Request timeout".to_string(),
                }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn platform_error(err: RecallError, action: &str) -> ApiError {
    match err {
        RecallError::Timeout => ApiError::Timeout,
        RecallError::Status { status, body } => {
            ApiError::Upstream(status, format!("Failed to {action}: {body}"))
        }
        other => ApiError::InternalServerError(other.into()),
    }
}

/// Prompts the primary persona to open the meeting.
pub async fn start_meeting(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StartResponse>, ApiError> {
    let primary = state
        .personas
        .primary()
        .ok_or_else(|| ApiError::NotFound("No primary persona configured".to_string()))?;
    let session = state.personas.session(&primary.id)?;
    let outcome = session
        .send_text(&format!("Speaker said: Start the meeting {}", primary.keyword))
        .await?;
    info!(persona = %primary.id, ?outcome, "Start prompt sent");
    Ok(Json(StartResponse {
        status: "ok",
        outcome,
    }))
}

/// Sends a persona's bot into a meeting.
pub async fn add_bot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddBotRequest>,
) -> Result<Json<BotResponse>, ApiError> {
    let id = PersonaId::new(payload.bot_type.to_lowercase());
    let profile = state.personas.profile(&id).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid bot_type '{}'", payload.bot_type))
    })?;

    state.meeting.set_url(&payload.meeting_url);
    let request = BotRequest::new(
        &payload.meeting_url,
        &profile.display_name,
        &state.config.webhook_url(),
        &state.config.camera_page_url(id.as_str()),
    );
    let record = state
        .recall
        .create_bot(&request)
        .await
        .map_err(|e| platform_error(e, "add bot to meeting"))?;

    let bot_id = bot_id(&record);
    let active_bots_count = match &bot_id {
        Some(bot_id) => state.meeting.track_bot(bot_id.clone()),
        None => state.meeting.active_bots().len(),
    };
    info!(meeting_url = %payload.meeting_url, ?bot_id, active_bots_count, "Bot added to meeting");

    if let Err(e) = state.personas.ensure_started(&id).await {
        warn!(persona = %id, error = %e, "Persona session did not start with its bot");
    }

    Ok(Json(BotResponse {
        success: true,
        message: format!("{} bot successfully added to meeting", profile.display_name),
        bot_id,
        bot_data: record,
        active_bots_count,
    }))
}

/// Asks a bot to leave its meeting.
pub async fn remove_bot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RemoveBotRequest>,
) -> Result<Json<BotResponse>, ApiError> {
    let record = state
        .recall
        .leave_call(&payload.bot_id)
        .await
        .map_err(|e| platform_error(e, "remove bot from meeting"))?;
    let active_bots_count = state.meeting.untrack_bot(&payload.bot_id);
    info!(bot_id = %payload.bot_id, active_bots_count, "Bot removed from meeting");

    Ok(Json(BotResponse {
        success: true,
        message: "Bot successfully removed from meeting".to_string(),
        bot_id: Some(payload.bot_id),
        bot_data: record,
        active_bots_count,
    }))
}

/// Realtime events from the meeting platform. Always acknowledged.
pub async fn recall_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Json<Value> {
    info!("Received webhook from meeting platform");
    match serde_json::from_slice::<WebhookPayload>(&body).map(WebhookPayload::into_event) {
        Ok(Ok(event)) => handle_webhook_event(&state, event).await,
        Ok(Err(e)) | Err(e) => {
            error!(error = %e, "Error processing webhook");
            debug!(body = %String::from_utf8_lossy(&body), "Rejected webhook body");
        }
    }
    Json(json!({ "status": "ok" }))
}

async fn handle_webhook_event(state: &AppState, event: WebhookEvent) {
    match event {
        WebhookEvent::Transcript { speaker, text } => {
            info!(%speaker, %text, "Transcribed text");
            if text.trim().is_empty() {
                return;
            }
            state.personas.route_transcript(&speaker, &text).await;
        }
        WebhookEvent::ParticipantJoined(data) => {
            if data.action.as_deref() != Some("join") {
                debug!(action = ?data.action, "Ignoring participant event");
                return;
            }
            let name = data.participant.name.clone().unwrap_or_default();
            state.roster.upsert_joined(data.participant);
            info!(participant = %name, total = state.roster.len(), "Participant joined");
        }
        WebhookEvent::ParticipantLeft(id) => match state.roster.mark_left(&id) {
            Some(participant) => info!(participant = %participant.name, "Participant left"),
            None => debug!(%id, "Leave event for unknown participant"),
        },
        WebhookEvent::Other(name) => info!(event = %name, "Received unhandled event type"),
    }
}

/// Lists known personas and their session state.
pub async fn list_personas(State(state): State<Arc<AppState>>) -> Json<Vec<PersonaStatus>> {
    Json(state.personas.statuses())
}
