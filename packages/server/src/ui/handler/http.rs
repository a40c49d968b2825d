//! HTTP API endpoint handlers.

use std::{fmt::Display, sync::Arc};

use axum::{Json, extract::State, http::StatusCode};

use crate::{
    domain::{ChatMessage, HubError, MessageId, StatsSnapshot, ViewerClient},
    infrastructure::{
        config::validate_seconds_per_segment,
        dto::http::{
            ChatConfigResponse, ErrorResponse, HealthResponse, StreamStatusRequest,
            SystemMessageRequest, UpdateChatConfigRequest, UpdateMessageVisibilityRequest,
            UpdateMessageVisibilityResponse,
        },
    },
    ui::state::AppState,
    usecase::{GetChatHistoryError, ListViewersError, SendSystemMessageError, SetVisibilityError},
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn hub_unavailable(error: HubError) -> ApiError {
    tracing::warn!("{}", error);
    api_error(StatusCode::SERVICE_UNAVAILABLE, error)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        hub_running: state.hub.is_running(),
    })
}

/// Public chat backlog (most recent visible messages, oldest first)
pub async fn get_chat_messages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    state
        .get_chat_history_usecase
        .visible_backlog()
        .await
        .map(Json)
        .map_err(|GetChatHistoryError::Repository(e)| {
            tracing::error!("Failed to read chat history: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        })
}

/// Full history including hidden messages, for moderators
pub async fn get_moderation_messages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    state
        .get_chat_history_usecase
        .all()
        .await
        .map(Json)
        .map_err(|GetChatHistoryError::Repository(e)| {
            tracing::error!("Failed to read chat history: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        })
}

/// Show or hide messages and notify connected clients
pub async fn update_message_visibility(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateMessageVisibilityRequest>,
) -> Result<Json<UpdateMessageVisibilityResponse>, ApiError> {
    if request.id_array.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "idArray must not be empty"));
    }
    let ids: Vec<MessageId> = request.id_array.into_iter().map(MessageId::from).collect();

    match state
        .set_message_visibility_usecase
        .execute(ids, request.visible)
        .await
    {
        Ok(report) => Ok(Json(report.into())),
        Err(SetVisibilityError::Hub(e)) => Err(hub_unavailable(e)),
        Err(SetVisibilityError::Repository(e)) => {
            tracing::error!("Failed to update message visibility: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

/// Broadcast a SYSTEM message authored by the server
pub async fn send_system_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SystemMessageRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    match state.send_system_message_usecase.execute(&request.body).await {
        Ok(message) => Ok(Json(message)),
        Err(SendSystemMessageError::EmptyBody) => Err(api_error(
            StatusCode::BAD_REQUEST,
            SendSystemMessageError::EmptyBody,
        )),
        Err(SendSystemMessageError::Hub(e)) => Err(hub_unavailable(e)),
    }
}

/// Viewer roster with live session data
pub async fn get_viewers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ViewerClient>>, ApiError> {
    state
        .list_viewers_usecase
        .execute()
        .await
        .map(Json)
        .map_err(|ListViewersError::Hub(e)| hub_unavailable(e))
}

/// Viewer counts and stream state
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.presence.snapshot().await)
}

/// Stream connect/disconnect notification from the ingest side
pub async fn update_stream_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StreamStatusRequest>,
) -> Json<StatsSnapshot> {
    if request.connected {
        state.presence.set_stream_connected().await;
    } else {
        state.presence.set_stream_disconnected().await;
    }
    Json(state.presence.snapshot().await)
}

/// Current runtime chat configuration
pub async fn get_chat_config(State(state): State<Arc<AppState>>) -> Json<ChatConfigResponse> {
    Json(state.config.snapshot().into())
}

/// Update runtime chat configuration
///
/// The request is rejected as a whole when any value is out of range.
pub async fn update_chat_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateChatConfigRequest>,
) -> Result<Json<ChatConfigResponse>, ApiError> {
    if let Some(seconds) = request.seconds_per_segment {
        validate_seconds_per_segment(seconds)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    }

    let config = &state.config;
    if let Some(disabled) = request.chat_disabled {
        config.set_chat_disabled(disabled);
    }
    if let Some(message) = request.welcome_message {
        config.set_welcome_message(message);
    }
    if let Some(name) = request.server_name {
        config.set_server_name(name);
    }
    if let Some(seconds) = request.seconds_per_segment {
        config
            .set_seconds_per_segment(seconds)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    }
    Ok(Json(config.snapshot().into()))
}
