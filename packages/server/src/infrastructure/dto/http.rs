//! HTTP API DTOs.

use serde::{Deserialize, Serialize};

use crate::{infrastructure::config::ChatSettings, usecase::VisibilityUpdateReport};

/// Generic error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub hub_running: bool,
}

/// Body of `POST /api/admin/chat/updatemessagevisibility`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageVisibilityRequest {
    pub id_array: Vec<String>,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageVisibilityResponse {
    pub updated: Vec<String>,
    pub not_found: Vec<String>,
}

impl From<VisibilityUpdateReport> for UpdateMessageVisibilityResponse {
    fn from(report: VisibilityUpdateReport) -> Self {
        Self {
            updated: report.updated.into_iter().map(|id| id.to_string()).collect(),
            not_found: report
                .not_found
                .into_iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}

/// Body of `POST /api/admin/chat/system`
#[derive(Debug, Deserialize)]
pub struct SystemMessageRequest {
    pub body: String,
}

/// Body of `POST /api/admin/stream/status`
#[derive(Debug, Deserialize)]
pub struct StreamStatusRequest {
    pub connected: bool,
}

/// Body of `POST /api/admin/config/chat`; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChatConfigRequest {
    pub chat_disabled: Option<bool>,
    pub welcome_message: Option<String>,
    pub server_name: Option<String>,
    pub seconds_per_segment: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfigResponse {
    pub chat_disabled: bool,
    pub welcome_message: String,
    pub server_name: String,
    pub seconds_per_segment: u64,
}

impl From<ChatSettings> for ChatConfigResponse {
    fn from(settings: ChatSettings) -> Self {
        Self {
            chat_disabled: settings.chat_disabled,
            welcome_message: settings.welcome_message,
            server_name: settings.server_name,
            seconds_per_segment: settings.seconds_per_segment,
        }
    }
}
