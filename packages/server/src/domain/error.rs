//! ドメイン層のエラー定義

use thiserror::Error;

use super::value_object::{MessageId, SessionId};

/// Repository のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("message '{0}' not found")]
    MessageNotFound(MessageId),

    #[error("message '{0}' already exists")]
    DuplicateMessage(MessageId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// ハブへのコマンド送信が失敗したときのエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("chat hub is not running")]
    NotRunning,
}

/// セッションへの配送が失敗したときのエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("outbound queue of session '{0}' is full")]
    MailboxFull(SessionId),

    #[error("session '{0}' is closed")]
    Closed(SessionId),
}

/// Webhook 通知のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook delivery failed: {0}")]
    Delivery(String),
}
