//! チャットイベントの Webhook 通知
//!
//! 外部 HTTP 配送は持たず、イベントを構造化ログに出す。

use async_trait::async_trait;

use crate::domain::{EventType, WebhookDispatcher, WebhookError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for TracingWebhookDispatcher {
    async fn notify(
        &self,
        kind: EventType,
        payload: serde_json::Value,
    ) -> Result<(), WebhookError> {
        tracing::debug!(event = %kind, payload = %payload, "chat webhook event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_always_succeeds() {
        // テスト項目: ログ出力の通知は失敗しない
        // given (前提条件):
        let dispatcher = TracingWebhookDispatcher;

        // when (操作):
        let result = dispatcher
            .notify(EventType::MessageSent, serde_json::json!({"body": "hi"}))
            .await;

        // then (期待する結果):
        assert_eq!(result, Ok(()));
    }
}
