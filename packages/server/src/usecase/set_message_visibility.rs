//! UseCase: メッセージの可視状態の変更（モデレーション）
//!
//! 履歴の可視フラグを更新したあと、見つかったメッセージごとに
//! VISIBILITY-UPDATE を 1 件ずつ全セッションへ配送する。

use std::sync::Arc;

use crate::domain::{ChatHistoryRepository, MessageId, RepositoryError};

use super::{error::SetVisibilityError, hub::ChatHubHandle};

/// 更新結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityUpdateReport {
    pub updated: Vec<MessageId>,
    pub not_found: Vec<MessageId>,
}

pub struct SetMessageVisibilityUseCase {
    history: Arc<dyn ChatHistoryRepository>,
    hub: ChatHubHandle,
}

impl SetMessageVisibilityUseCase {
    pub fn new(history: Arc<dyn ChatHistoryRepository>, hub: ChatHubHandle) -> Self {
        Self { history, hub }
    }

    pub async fn execute(
        &self,
        ids: Vec<MessageId>,
        visible: bool,
    ) -> Result<VisibilityUpdateReport, SetVisibilityError> {
        self.history.set_visibility(&ids, visible).await?;

        let mut report = VisibilityUpdateReport::default();
        for id in ids {
            match self.history.get_by_id(&id).await {
                Ok(message) => {
                    self.hub
                        .send_visibility_update(message.into_visibility_update())
                        .await?;
                    report.updated.push(id);
                }
                Err(RepositoryError::MessageNotFound(_)) => {
                    tracing::warn!("Visibility update skipped unknown message '{}'", id);
                    report.not_found.push(id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            "Set visible={} on {} messages ({} not found)",
            visible,
            report.updated.len(),
            report.not_found.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ChatMessage, EventType, HubError, MockStreamStatusListener, MockWebhookDispatcher,
            SessionId,
        },
        infrastructure::{
            config::{ChatSettings, RuntimeChatConfig},
            repository::InMemoryChatHistoryRepository,
        },
        usecase::{
            hub::{ChatHub, HubDependencies, HubSettings},
            session::{ClientSession, SessionIdentity},
        },
    };
    use castchat_shared::time::SystemClock;
    use chrono::Utc;
    use std::time::Duration;

    fn spawn_hub(history: Arc<InMemoryChatHistoryRepository>) -> ChatHubHandle {
        let mut listener = MockStreamStatusListener::new();
        listener.expect_client_added().returning(|_| ());
        listener.expect_client_removed().returning(|_| ());
        let webhooks = MockWebhookDispatcher::new();
        let (hub, _task) = ChatHub::spawn(
            HubDependencies {
                config: Arc::new(RuntimeChatConfig::new(ChatSettings::default())),
                listener: Arc::new(listener),
                history,
                webhooks: Arc::new(webhooks),
                clock: Arc::new(SystemClock),
            },
            HubSettings::default(),
        );
        hub
    }

    async fn stored_message(history: &InMemoryChatHistoryRepository, body: &str) -> ChatMessage {
        let message = ChatMessage::chat("alice", body, SessionId::generate(), Utc::now());
        history.append(message.clone()).await.unwrap();
        message
    }

    #[tokio::test]
    async fn test_hide_message_updates_history_and_notifies_sessions() {
        // テスト項目: 非表示にしたメッセージは履歴で不可視になり、全員に通知される
        // given (前提条件):
        let history = Arc::new(InMemoryChatHistoryRepository::new());
        let hub = spawn_hub(history.clone());
        let message = stored_message(&history, "spam").await;
        let (session, mut outbound) = ClientSession::new(SessionIdentity::default(), Utc::now());
        hub.add(session).await.unwrap();
        let usecase = SetMessageVisibilityUseCase::new(history.clone(), hub);

        // when (操作):
        let report = usecase
            .execute(vec![message.id.clone()], false)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(report.updated, vec![message.id.clone()]);
        assert!(report.not_found.is_empty());
        assert!(history.list_visible().await.unwrap().is_empty());

        let update = tokio::time::timeout(Duration::from_secs(1), outbound.mailbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.id, message.id);
        assert_eq!(update.message_type, EventType::VisibilityUpdate);
        assert!(!update.visible);
    }

    #[tokio::test]
    async fn test_hiding_two_messages_sends_one_update_each() {
        // テスト項目: 2 件を非表示にすると、ID ごとに別々の通知が 1 件ずつだけ届く
        // given (前提条件):
        let history = Arc::new(InMemoryChatHistoryRepository::new());
        let hub = spawn_hub(history.clone());
        let first = stored_message(&history, "one").await;
        let second = stored_message(&history, "two").await;
        let (session, mut outbound) = ClientSession::new(SessionIdentity::default(), Utc::now());
        hub.add(session).await.unwrap();
        let usecase = SetMessageVisibilityUseCase::new(history.clone(), hub.clone());

        // when (操作):
        let report = usecase
            .execute(vec![first.id.clone(), second.id.clone()], false)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(report.updated, vec![first.id.clone(), second.id.clone()]);
        let mut received = Vec::new();
        for _ in 0..2 {
            let update = tokio::time::timeout(Duration::from_secs(1), outbound.mailbox.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(update.message_type, EventType::VisibilityUpdate);
            assert!(!update.visible);
            received.push(update.id);
        }
        assert_eq!(received, vec![first.id, second.id]);
        assert_ne!(received[0], received[1]);

        // ハブが先行コマンドを処理し終えたことを確認してから残りを見る
        hub.sessions().await.unwrap();
        assert!(outbound.mailbox.try_recv().is_err());
        assert!(history.list_visible().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_reported() {
        // テスト項目: 存在しない ID は not_found として報告され、他の更新は続行される
        // given (前提条件):
        let history = Arc::new(InMemoryChatHistoryRepository::new());
        let hub = spawn_hub(history.clone());
        let message = stored_message(&history, "ok").await;
        let usecase = SetMessageVisibilityUseCase::new(history.clone(), hub);
        let missing = MessageId::from("does-not-exist");

        // when (操作):
        let report = usecase
            .execute(vec![missing.clone(), message.id.clone()], false)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(report.updated, vec![message.id]);
        assert_eq!(report.not_found, vec![missing]);
    }

    #[tokio::test]
    async fn test_fails_when_hub_stopped() {
        // テスト項目: ハブ停止中は NotRunning エラーになる
        // given (前提条件):
        let history = Arc::new(InMemoryChatHistoryRepository::new());
        let hub = spawn_hub(history.clone());
        let message = stored_message(&history, "late").await;
        hub.shutdown().await.unwrap();
        while hub.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let usecase = SetMessageVisibilityUseCase::new(history, hub);

        // when (操作):
        let result = usecase.execute(vec![message.id], false).await;

        // then (期待する結果):
        assert_eq!(result, Err(SetVisibilityError::Hub(HubError::NotRunning)));
    }
}
