//! Records stored on disk by the file-backed repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, MessageId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    #[serde(default)]
    pub peak_session_viewer_count: u64,
    #[serde(default)]
    pub peak_overall_viewer_count: u64,
    #[serde(default)]
    pub last_disconnect_time: Option<DateTime<Utc>>,
}

/// One line of the chat history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum HistoryRecord {
    Append { message: ChatMessage },
    Visibility { ids: Vec<MessageId>, visible: bool },
}
