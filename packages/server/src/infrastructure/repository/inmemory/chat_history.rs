//! インメモリのチャット履歴 Repository

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ChatHistoryRepository, ChatMessage, MessageId, RepositoryError};

/// 挿入順の履歴と ID 索引
///
/// ファイル版の Repository も同じ構造をメモリ上に持つ。
#[derive(Debug, Default)]
pub(crate) struct HistoryLog {
    messages: Vec<ChatMessage>,
    index: HashMap<MessageId, usize>,
}

impl HistoryLog {
    pub(crate) fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    pub(crate) fn insert(&mut self, message: ChatMessage) -> Result<(), RepositoryError> {
        if self.contains(&message.id) {
            return Err(RepositoryError::DuplicateMessage(message.id));
        }
        self.index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
        Ok(())
    }

    pub(crate) fn get(&self, id: &MessageId) -> Result<ChatMessage, RepositoryError> {
        self.index
            .get(id)
            .map(|&position| self.messages[position].clone())
            .ok_or_else(|| RepositoryError::MessageNotFound(id.clone()))
    }

    /// 可視フラグを更新し、存在した ID を返す
    pub(crate) fn set_visibility(&mut self, ids: &[MessageId], visible: bool) -> Vec<MessageId> {
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(&position) = self.index.get(id) else {
                continue;
            };
            self.messages[position].visible = visible;
            updated.push(id.clone());
        }
        updated
    }

    pub(crate) fn visible(&self) -> Vec<ChatMessage> {
        self.messages.iter().filter(|m| m.visible).cloned().collect()
    }

    pub(crate) fn all(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// 挿入順を保持するインメモリの履歴
#[derive(Debug, Default)]
pub struct InMemoryChatHistoryRepository {
    log: RwLock<HistoryLog>,
}

impl InMemoryChatHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatHistoryRepository for InMemoryChatHistoryRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        if message.ephemeral {
            tracing::debug!("Ephemeral message '{}' not stored", message.id);
            return Ok(());
        }
        self.log.write().await.insert(message)
    }

    async fn get_by_id(&self, id: &MessageId) -> Result<ChatMessage, RepositoryError> {
        self.log.read().await.get(id)
    }

    async fn set_visibility(
        &self,
        ids: &[MessageId],
        visible: bool,
    ) -> Result<Vec<MessageId>, RepositoryError> {
        Ok(self.log.write().await.set_visibility(ids, visible))
    }

    async fn list_visible(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self.log.read().await.visible())
    }

    async fn list_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self.log.read().await.all().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionId;
    use chrono::Utc;

    fn message(body: &str) -> ChatMessage {
        ChatMessage::chat("alice", body, SessionId::generate(), Utc::now())
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        // テスト項目: 追記した順に取り出せる
        // given (前提条件):
        let repository = InMemoryChatHistoryRepository::new();

        // when (操作):
        for body in ["a", "b", "c"] {
            repository.append(message(body)).await.unwrap();
        }

        // then (期待する結果):
        let bodies: Vec<String> = repository
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_ephemeral_messages_are_never_stored() {
        // テスト項目: 一時メッセージは保存されない
        // given (前提条件):
        let repository = InMemoryChatHistoryRepository::new();
        let ephemeral = message("welcome").into_ephemeral();
        let id = ephemeral.id.clone();

        // when (操作):
        repository.append(ephemeral).await.unwrap();

        // then (期待する結果):
        assert_eq!(
            repository.get_by_id(&id).await,
            Err(RepositoryError::MessageNotFound(id))
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        // テスト項目: 同じ ID の追記はエラーになる
        // given (前提条件):
        let repository = InMemoryChatHistoryRepository::new();
        let original = message("a");
        repository.append(original.clone()).await.unwrap();

        // when (操作):
        let result = repository.append(original.clone()).await;

        // then (期待する結果):
        assert_eq!(result, Err(RepositoryError::DuplicateMessage(original.id)));
    }

    #[tokio::test]
    async fn test_set_visibility_only_touches_known_ids() {
        // テスト項目: 可視フラグは既存 ID のみ更新され、他のフィールドは変わらない
        // given (前提条件):
        let repository = InMemoryChatHistoryRepository::new();
        let kept = message("kept");
        let hidden = message("hidden");
        repository.append(kept.clone()).await.unwrap();
        repository.append(hidden.clone()).await.unwrap();

        // when (操作):
        let updated = repository
            .set_visibility(&[hidden.id.clone(), MessageId::from("nope")], false)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(updated, vec![hidden.id.clone()]);
        let visible = repository.list_visible().await.unwrap();
        assert_eq!(visible, vec![kept]);
        let stored = repository.get_by_id(&hidden.id).await.unwrap();
        assert!(!stored.visible);
        assert_eq!(stored.body, hidden.body);
        assert_eq!(stored.timestamp, hidden.timestamp);
    }
}
