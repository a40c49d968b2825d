//! ファイルに保存する Repository 実装

mod chat_history;
mod stats;

pub use chat_history::JsonLinesChatHistoryRepository;
pub use stats::JsonFileStatsRepository;
