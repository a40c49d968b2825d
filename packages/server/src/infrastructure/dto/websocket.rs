//! WebSocket frame DTOs.
//!
//! Outbound events serialize straight from the domain types. Inbound frames are
//! checked in stages so that every rejection reason is distinguishable.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ChatEvent, EventType, InboundEvent};

/// Why an inbound frame was discarded
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("frame has no type discriminator")]
    Untyped,

    #[error("unsupported frame type '{0}'")]
    UnsupportedType(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: EventType, reason: String },
}

#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameChangeFrame {
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct UserJoinedFrame {
    #[serde(default)]
    username: String,
}

fn payload<T: for<'de> Deserialize<'de>>(kind: EventType, value: Value) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|e| FrameError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Decode a client text frame into an inbound event
pub fn decode_frame(text: &str) -> Result<InboundEvent, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(FrameError::Malformed("expected a JSON object".to_string()));
    };
    let tag = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::Untyped)?
        .to_string();

    match EventType::from_tag(&tag) {
        Some(kind @ EventType::MessageSent) => {
            let frame: ChatFrame = payload(kind, value)?;
            Ok(InboundEvent::Chat {
                author: frame.author,
                body: frame.body,
            })
        }
        Some(kind @ EventType::UserNameChanged) => {
            let frame: NameChangeFrame = payload(kind, value)?;
            Ok(InboundEvent::NameChange {
                new_name: frame.new_name,
            })
        }
        Some(kind @ EventType::UserJoined) => {
            let frame: UserJoinedFrame = payload(kind, value)?;
            Ok(InboundEvent::UserJoined {
                username: frame.username,
            })
        }
        _ => Err(FrameError::UnsupportedType(tag)),
    }
}

/// Encode an outbound event as a JSON text frame
pub fn encode_event(event: &ChatEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
