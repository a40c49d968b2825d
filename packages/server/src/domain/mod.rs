//! Domain layer: chat events, viewer records and the ports the hub depends on.

pub mod entity;
pub mod error;
pub mod port;
pub mod repository;
pub mod value_object;

pub use entity::{
    ChatEvent, ChatMessage, EventType, GeoDetails, InboundEvent, NameChangeEvent, PingMessage,
    StatsSnapshot, UserJoinedEvent, ViewerClient,
};
pub use error::{HubError, RepositoryError, SessionError, WebhookError};
pub use port::{ChatConfigProvider, GeoResolver, MessageRenderer, StreamStatusListener, WebhookDispatcher};
pub use repository::{ChatHistoryRepository, StatsRepository};
pub use value_object::{MessageId, SessionId};

#[cfg(test)]
pub use port::{MockStreamStatusListener, MockWebhookDispatcher};
