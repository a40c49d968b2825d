//! Utilities shared between castchat binaries and libraries.

pub mod logger;
pub mod time;
