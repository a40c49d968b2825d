//! ハブとパイプラインが依存する外部協調者のインターフェース

use async_trait::async_trait;

use super::{ChatMessage, EventType, GeoDetails, SessionId, ViewerClient, WebhookError};

/// 配信状態と視聴者の出入りを受け取るリスナー
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamStatusListener: Send + Sync {
    /// 配信が接続済みかつ安定しているか
    async fn is_stream_connected(&self) -> bool;

    async fn client_added(&self, client: ViewerClient);

    async fn client_removed(&self, client_id: &SessionId);

    async fn message_sent(&self, message: &ChatMessage);
}

/// 実行時に変更できるチャット設定
pub trait ChatConfigProvider: Send + Sync {
    fn chat_disabled(&self) -> bool;

    fn welcome_message(&self) -> String;

    fn server_name(&self) -> String;

    fn seconds_per_segment(&self) -> u64;
}

/// IP アドレスから地理情報を引く
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// キャッシュ済みの結果だけを返す
    async fn cached(&self, ip_address: &str) -> Option<GeoDetails>;

    /// 必要なら問い合わせて結果をキャッシュする
    async fn resolve(&self, ip_address: &str) -> Option<GeoDetails>;
}

/// チャットイベントの外部通知
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn notify(
        &self,
        kind: EventType,
        payload: serde_json::Value,
    ) -> Result<(), WebhookError>;
}

/// 本文を安全な HTML に変換する
pub trait MessageRenderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}
