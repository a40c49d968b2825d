//! Shared application state.

use std::sync::Arc;

use castchat_shared::time::Clock;
use governor::Quota;

use crate::{
    infrastructure::config::RuntimeChatConfig,
    usecase::{
        ChatHubHandle, GetChatHistoryUseCase, ListViewersUseCase, MessagePipeline,
        PresenceTracker, SendSystemMessageUseCase, SetMessageVisibilityUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// Command handle of the chat hub
    pub hub: ChatHubHandle,
    /// Inbound event pipeline shared by every session
    pub pipeline: Arc<MessagePipeline>,
    /// Per-session message quota
    pub rate_limit: Quota,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<RuntimeChatConfig>,
    pub presence: PresenceTracker,
    pub set_message_visibility_usecase: Arc<SetMessageVisibilityUseCase>,
    pub get_chat_history_usecase: Arc<GetChatHistoryUseCase>,
    pub list_viewers_usecase: Arc<ListViewersUseCase>,
    pub send_system_message_usecase: Arc<SendSystemMessageUseCase>,
}
