//! Request handlers.

mod http;
pub mod session;
mod websocket;

pub use http::{
    get_chat_config, get_chat_messages, get_moderation_messages, get_stats, get_viewers,
    health_check, send_system_message, update_chat_config, update_message_visibility,
    update_stream_status,
};
pub use websocket::websocket_handler;
