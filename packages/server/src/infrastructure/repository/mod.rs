//! Repository 実装

pub mod file;
pub mod inmemory;

pub use file::{JsonFileStatsRepository, JsonLinesChatHistoryRepository};
pub use inmemory::{InMemoryChatHistoryRepository, InMemoryStatsRepository};
