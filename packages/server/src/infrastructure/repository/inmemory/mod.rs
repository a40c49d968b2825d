//! インメモリ Repository 実装

mod chat_history;
mod stats;

pub(crate) use chat_history::HistoryLog;
pub use chat_history::InMemoryChatHistoryRepository;
pub use stats::InMemoryStatsRepository;
