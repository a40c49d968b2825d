//! Data Transfer Objects (DTOs).
//!
//! DTOs are organized by protocol:
//! - `websocket`: inbound chat frames and outbound event encoding
//! - `http`: admin and public HTTP API bodies
//! - `persistence`: on-disk stats and history records

pub mod http;
pub mod persistence;
pub mod websocket;
