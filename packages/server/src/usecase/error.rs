//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{HubError, RepositoryError};

/// 可視状態の更新に失敗
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetVisibilityError {
    #[error("failed to update history: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// 履歴の取得に失敗
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GetChatHistoryError {
    #[error("failed to read history: {0}")]
    Repository(#[from] RepositoryError),
}

/// 視聴者一覧の取得に失敗
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListViewersError {
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// システムメッセージの送信に失敗
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendSystemMessageError {
    #[error("system message body is empty")]
    EmptyBody,

    #[error(transparent)]
    Hub(#[from] HubError),
}
