//! 実行時に変更できるチャット設定

use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::domain::ChatConfigProvider;

pub const DEFAULT_SERVER_NAME: &str = "castchat";

pub const DEFAULT_SECONDS_PER_SEGMENT: u64 = 4;

/// 受け付けるセグメント長の上限（秒）
pub const MAX_SECONDS_PER_SEGMENT: u64 = 60;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatConfigError {
    #[error("seconds per segment must be between 1 and {MAX_SECONDS_PER_SEGMENT}, got {0}")]
    SegmentLengthOutOfRange(u64),
}

/// セグメント長が受け付け範囲内か確認する
pub fn validate_seconds_per_segment(seconds: u64) -> Result<u64, ChatConfigError> {
    if (1..=MAX_SECONDS_PER_SEGMENT).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(ChatConfigError::SegmentLengthOutOfRange(seconds))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub server_name: String,
    pub welcome_message: String,
    pub chat_disabled: bool,
    pub seconds_per_segment: u64,
}

impl ChatSettings {
    pub fn validate(&self) -> Result<(), ChatConfigError> {
        validate_seconds_per_segment(self.seconds_per_segment).map(|_| ())
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            welcome_message: String::new(),
            chat_disabled: false,
            seconds_per_segment: DEFAULT_SECONDS_PER_SEGMENT,
        }
    }
}

/// 起動時の値で初期化され、管理 API から更新される設定
#[derive(Debug, Default)]
pub struct RuntimeChatConfig {
    settings: RwLock<ChatSettings>,
}

impl RuntimeChatConfig {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn snapshot(&self) -> ChatSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, apply: impl FnOnce(&mut ChatSettings)) {
        let mut settings = self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        apply(&mut settings);
    }

    pub fn set_chat_disabled(&self, disabled: bool) {
        self.update(|s| s.chat_disabled = disabled);
        tracing::info!("Chat {}", if disabled { "disabled" } else { "enabled" });
    }

    pub fn set_welcome_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.welcome_message = message);
    }

    pub fn set_server_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.update(|s| s.server_name = name);
    }

    /// 範囲外の値は拒否し、設定は変更しない
    pub fn set_seconds_per_segment(&self, seconds: u64) -> Result<(), ChatConfigError> {
        let seconds = validate_seconds_per_segment(seconds)?;
        self.update(|s| s.seconds_per_segment = seconds);
        Ok(())
    }
}

impl ChatConfigProvider for RuntimeChatConfig {
    fn chat_disabled(&self) -> bool {
        self.snapshot().chat_disabled
    }

    fn welcome_message(&self) -> String {
        self.snapshot().welcome_message
    }

    fn server_name(&self) -> String {
        self.snapshot().server_name
    }

    fn seconds_per_segment(&self) -> u64 {
        self.snapshot().seconds_per_segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_are_visible_through_provider() {
        // テスト項目: 設定の更新が ChatConfigProvider から即座に読める
        // given (前提条件):
        let config = RuntimeChatConfig::new(ChatSettings::default());
        assert!(!config.chat_disabled());

        // when (操作):
        config.set_chat_disabled(true);
        config.set_welcome_message("hello");
        config.set_server_name("Night Stream");
        config.set_seconds_per_segment(6).unwrap();

        // then (期待する結果):
        assert!(config.chat_disabled());
        assert_eq!(config.welcome_message(), "hello");
        assert_eq!(config.server_name(), "Night Stream");
        assert_eq!(config.seconds_per_segment(), 6);
    }

    #[test]
    fn test_out_of_range_segment_length_is_rejected() {
        // テスト項目: 範囲外のセグメント長は拒否され、直前の値が残る
        // given (前提条件):
        let config = RuntimeChatConfig::new(ChatSettings::default());
        config.set_seconds_per_segment(6).unwrap();

        // when (操作):
        let zero = config.set_seconds_per_segment(0);
        let huge = config.set_seconds_per_segment(10_000_000_000_000_000);

        // then (期待する結果):
        assert_eq!(zero, Err(ChatConfigError::SegmentLengthOutOfRange(0)));
        assert_eq!(
            huge,
            Err(ChatConfigError::SegmentLengthOutOfRange(10_000_000_000_000_000))
        );
        assert_eq!(config.seconds_per_segment(), 6);
        assert!(config.set_seconds_per_segment(MAX_SECONDS_PER_SEGMENT).is_ok());
    }

    #[test]
    fn test_settings_validation() {
        // テスト項目: 起動時設定のセグメント長も同じ範囲で検証される
        // given (前提条件):
        let valid = ChatSettings::default();
        let invalid = ChatSettings {
            seconds_per_segment: MAX_SECONDS_PER_SEGMENT + 1,
            ..ChatSettings::default()
        };

        // when (操作) / then (期待する結果):
        assert!(valid.validate().is_ok());
        assert!(invalid.validate().is_err());
    }
}
