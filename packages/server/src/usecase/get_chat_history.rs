//! UseCase: チャット履歴の取得

use std::sync::Arc;

use crate::domain::{ChatHistoryRepository, ChatMessage};

use super::error::GetChatHistoryError;

/// 公開履歴として返す最大件数
pub const PUBLIC_BACKLOG_LIMIT: usize = 50;

pub struct GetChatHistoryUseCase {
    history: Arc<dyn ChatHistoryRepository>,
}

impl GetChatHistoryUseCase {
    pub fn new(history: Arc<dyn ChatHistoryRepository>) -> Self {
        Self { history }
    }

    /// 新しい順に最大 50 件の可視メッセージを、古い順に並べて返す
    pub async fn visible_backlog(&self) -> Result<Vec<ChatMessage>, GetChatHistoryError> {
        let mut visible = self.history.list_visible().await?;
        let skip = visible.len().saturating_sub(PUBLIC_BACKLOG_LIMIT);
        Ok(visible.split_off(skip))
    }

    /// 不可視を含む全メッセージ
    pub async fn all(&self) -> Result<Vec<ChatMessage>, GetChatHistoryError> {
        Ok(self.history.list_all().await?)
    }
}
