//! Repository trait 定義
//!
//! チャット履歴と統計の永続化インターフェース。
//! 具体的な実装は Infrastructure 層が提供する。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ChatMessage, MessageId, RepositoryError};

/// チャット履歴の Repository
///
/// 挿入順を保持する追記型ストア。可視フラグ以外は変更しない。
#[async_trait]
pub trait ChatHistoryRepository: Send + Sync {
    /// メッセージを追記する
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError>;

    /// ID でメッセージを取得する
    async fn get_by_id(&self, id: &MessageId) -> Result<ChatMessage, RepositoryError>;

    /// 指定したメッセージの可視フラグを更新し、更新できた ID を返す
    async fn set_visibility(
        &self,
        ids: &[MessageId],
        visible: bool,
    ) -> Result<Vec<MessageId>, RepositoryError>;

    /// 可視メッセージを挿入順で返す
    async fn list_visible(&self) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// 全メッセージを挿入順で返す（モデレーション用）
    async fn list_all(&self) -> Result<Vec<ChatMessage>, RepositoryError>;
}

/// 視聴者統計の Repository
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn peak_session_viewer_count(&self) -> Result<u64, RepositoryError>;

    async fn set_peak_session_viewer_count(&self, count: u64) -> Result<(), RepositoryError>;

    async fn peak_overall_viewer_count(&self) -> Result<u64, RepositoryError>;

    async fn set_peak_overall_viewer_count(&self, count: u64) -> Result<(), RepositoryError>;

    async fn last_disconnect_time(&self) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    async fn set_last_disconnect_time(&self, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}
