//! UseCase 層：ハブ、セッション、統計、およびモデレーション操作

pub mod error;
pub mod get_chat_history;
pub mod hub;
pub mod list_viewers;
pub mod message_pipeline;
pub mod presence;
pub mod rate_limiter;
pub mod send_system_message;
pub mod session;
pub mod set_message_visibility;

pub use error::{GetChatHistoryError, ListViewersError, SendSystemMessageError, SetVisibilityError};
pub use get_chat_history::GetChatHistoryUseCase;
pub use hub::{ChatHub, ChatHubHandle, HubDependencies, HubSettings};
pub use list_viewers::ListViewersUseCase;
pub use message_pipeline::MessagePipeline;
pub use presence::PresenceTracker;
pub use rate_limiter::{RateLimitSettings, SessionRateLimiter};
pub use send_system_message::SendSystemMessageUseCase;
pub use session::{ClientSession, SessionIdentity, SessionOutbound};
pub use set_message_visibility::{SetMessageVisibilityUseCase, VisibilityUpdateReport};
