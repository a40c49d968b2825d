//! Entities
//!
//! チャットイベント、視聴者レコード、統計スナップショットを定義する。
//! `Serialize` の形がそのままクライアントへ送る JSON の形になる。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_object::{MessageId, SessionId};

/// 表示名が一度も与えられていない送信者の名前
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// イベント種別（ワイヤ上の `type` タグ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "CHAT")]
    MessageSent,
    #[serde(rename = "NAME_CHANGE")]
    UserNameChanged,
    #[serde(rename = "USER_JOINED")]
    UserJoined,
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "VISIBILITY-UPDATE", alias = "VISIBILITYUPDATE")]
    VisibilityUpdate,
    #[serde(rename = "SYSTEM")]
    SystemMessage,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageSent => "CHAT",
            EventType::UserNameChanged => "NAME_CHANGE",
            EventType::UserJoined => "USER_JOINED",
            EventType::Ping => "PING",
            EventType::VisibilityUpdate => "VISIBILITY-UPDATE",
            EventType::SystemMessage => "SYSTEM",
        }
    }

    /// ワイヤ上のタグから種別を引く
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CHAT" => Some(EventType::MessageSent),
            "NAME_CHANGE" => Some(EventType::UserNameChanged),
            "USER_JOINED" => Some(EventType::UserJoined),
            "PING" => Some(EventType::Ping),
            "VISIBILITY-UPDATE" | "VISIBILITYUPDATE" => Some(EventType::VisibilityUpdate),
            "SYSTEM" => Some(EventType::SystemMessage),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// チャットメッセージ（CHAT / SYSTEM / VISIBILITY-UPDATE）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: EventType,
    pub author: String,
    pub body: String,
    /// 送信元セッション。クライアントには公開しない
    #[serde(skip)]
    pub client_id: Option<SessionId>,
    pub visible: bool,
    pub timestamp: DateTime<Utc>,
    /// 配信のみで履歴に残さない
    #[serde(skip)]
    pub ephemeral: bool,
}

impl ChatMessage {
    /// クライアント発のチャットメッセージを作成
    pub fn chat(
        author: impl Into<String>,
        body: impl Into<String>,
        client_id: SessionId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            message_type: EventType::MessageSent,
            author: author.into(),
            body: body.into(),
            client_id: Some(client_id),
            visible: true,
            timestamp,
            ephemeral: false,
        }
    }

    /// サーバー発のシステムメッセージを作成
    pub fn system(
        author: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            message_type: EventType::SystemMessage,
            author: author.into(),
            body: body.into(),
            client_id: None,
            visible: true,
            timestamp,
            ephemeral: false,
        }
    }

    pub fn into_ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// 作者も本文も空のメッセージは配信しない
    pub fn is_empty(&self) -> bool {
        self.author.is_empty() && self.body.is_empty()
    }

    /// 未採番なら ID を振り、タイムスタンプを配信時刻で上書きする
    pub fn assign_defaults(&mut self, now: DateTime<Utc>) {
        if self.id.is_empty() {
            self.id = MessageId::generate();
        }
        self.timestamp = now;
    }

    /// 可視状態の変更を通知する VISIBILITY-UPDATE に変換する
    pub fn into_visibility_update(mut self) -> Self {
        self.message_type = EventType::VisibilityUpdate;
        self.ephemeral = true;
        self
    }
}

/// 表示名変更イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameChangeEvent {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    pub new_name: String,
    #[serde(skip)]
    pub client_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
}

impl NameChangeEvent {
    pub fn new(
        old_name: Option<String>,
        new_name: impl Into<String>,
        client_id: SessionId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            message_type: EventType::UserNameChanged,
            old_name,
            new_name: new_name.into(),
            client_id: Some(client_id),
            timestamp,
        }
    }
}

/// 参加イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedEvent {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: EventType,
    pub username: String,
    #[serde(skip)]
    pub client_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
}

impl UserJoinedEvent {
    pub fn new(username: impl Into<String>, client_id: SessionId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            message_type: EventType::UserJoined,
            username: username.into(),
            client_id: Some(client_id),
            timestamp,
        }
    }
}

/// ハートビート
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingMessage {
    #[serde(rename = "type")]
    pub message_type: EventType,
}

impl Default for PingMessage {
    fn default() -> Self {
        Self {
            message_type: EventType::Ping,
        }
    }
}

/// クライアントへ送るイベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatEvent {
    Message(ChatMessage),
    NameChange(NameChangeEvent),
    UserJoined(UserJoinedEvent),
    Ping(PingMessage),
}

impl ChatEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ChatEvent::Message(message) => message.message_type,
            ChatEvent::NameChange(_) => EventType::UserNameChanged,
            ChatEvent::UserJoined(_) => EventType::UserJoined,
            ChatEvent::Ping(_) => EventType::Ping,
        }
    }
}

/// クライアントから受け取った操作（デコード済み）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Chat {
        author: Option<String>,
        body: String,
    },
    NameChange {
        new_name: String,
    },
    UserJoined {
        username: String,
    },
}

/// 視聴者の地理情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoDetails {
    pub country_code: String,
    pub region_name: String,
    pub time_zone: String,
}

impl GeoDetails {
    /// ループバック接続に割り当てる固定レコード
    pub fn localhost() -> Self {
        Self {
            country_code: "N/A".to_string(),
            region_name: "Localhost".to_string(),
            time_zone: String::new(),
        }
    }
}

/// 視聴者名簿の 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerClient {
    pub client_id: SessionId,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: String,
    pub display_name: Option<String>,
    pub message_count: u64,
    pub geo: Option<GeoDetails>,
}

/// 統計のスナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub viewer_count: usize,
    pub session_peak_viewer_count: u64,
    pub overall_peak_viewer_count: u64,
    pub last_connect_time: Option<DateTime<Utc>>,
    pub last_disconnect_time: Option<DateTime<Utc>>,
    pub online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_event_type_tags_roundtrip_through_from_tag() {
        // テスト項目: すべての種別がワイヤ上のタグと相互変換できる
        // given (前提条件):
        let all = [
            EventType::MessageSent,
            EventType::UserNameChanged,
            EventType::UserJoined,
            EventType::Ping,
            EventType::VisibilityUpdate,
            EventType::SystemMessage,
        ];

        // when (操作) / then (期待する結果):
        for kind in all {
            assert_eq!(EventType::from_tag(kind.as_str()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert_eq!(
            EventType::from_tag("VISIBILITYUPDATE"),
            Some(EventType::VisibilityUpdate)
        );
        assert_eq!(EventType::from_tag("visibility-update"), None);
    }

    #[test]
    fn test_chat_message_wire_shape_hides_server_fields() {
        // テスト項目: clientId と ephemeral はワイヤに出ない
        // given (前提条件):
        let message = ChatMessage::chat("alice", "<p>hi</p>", SessionId::generate(), fixed_time());

        // when (操作):
        let value = serde_json::to_value(&message).unwrap();

        // then (期待する結果):
        let object = value.as_object().unwrap();
        assert_eq!(object["type"], "CHAT");
        assert_eq!(object["author"], "alice");
        assert_eq!(object["body"], "<p>hi</p>");
        assert_eq!(object["visible"], true);
        assert!(object.contains_key("id"));
        assert!(object.contains_key("timestamp"));
        assert!(!object.contains_key("clientId"));
        assert!(!object.contains_key("ephemeral"));
    }

    #[test]
    fn test_assign_defaults_keeps_existing_id_and_restamps() {
        // テスト項目: 採番済み ID は維持され、タイムスタンプは上書きされる
        // given (前提条件):
        let mut message = ChatMessage::system("server", "hello", fixed_time());
        let original_id = message.id.clone();
        let later = fixed_time() + chrono::Duration::seconds(5);

        // when (操作):
        message.assign_defaults(later);

        // then (期待する結果):
        assert_eq!(message.id, original_id);
        assert_eq!(message.timestamp, later);
    }

    #[test]
    fn test_assign_defaults_generates_missing_id() {
        // テスト項目: 未採番のメッセージに ID が振られる
        // given (前提条件):
        let mut message = ChatMessage::system("server", "hello", fixed_time());
        message.id = MessageId::default();

        // when (操作):
        message.assign_defaults(fixed_time());

        // then (期待する結果):
        assert!(!message.id.is_empty());
    }

    #[test]
    fn test_is_empty_requires_both_author_and_body_empty() {
        // テスト項目: 作者と本文の両方が空のときだけ空とみなす
        // given (前提条件):
        let empty = ChatMessage::system("", "", fixed_time());
        let body_only = ChatMessage::system("", "text", fixed_time());

        // when (操作) / then (期待する結果):
        assert!(empty.is_empty());
        assert!(!body_only.is_empty());
    }

    #[test]
    fn test_visibility_update_carries_same_id() {
        // テスト項目: VISIBILITY-UPDATE は元メッセージの ID と可視状態を引き継ぐ
        // given (前提条件):
        let mut message = ChatMessage::chat("bob", "yo", SessionId::generate(), fixed_time());
        message.visible = false;
        let id = message.id.clone();

        // when (操作):
        let update = message.into_visibility_update();

        // then (期待する結果):
        assert_eq!(update.id, id);
        assert_eq!(update.message_type, EventType::VisibilityUpdate);
        assert!(!update.visible);
        assert!(update.ephemeral);
    }

    #[test]
    fn test_name_change_wire_shape() {
        // テスト項目: NAME_CHANGE は oldName と newName を持つ
        // given (前提条件):
        let event = NameChangeEvent::new(
            Some("alice".to_string()),
            "alicia",
            SessionId::generate(),
            fixed_time(),
        );

        // when (操作):
        let value = serde_json::to_value(ChatEvent::NameChange(event)).unwrap();

        // then (期待する結果):
        assert_eq!(value["type"], "NAME_CHANGE");
        assert_eq!(value["oldName"], "alice");
        assert_eq!(value["newName"], "alicia");
    }

    #[test]
    fn test_ping_wire_shape() {
        // テスト項目: PING は type のみを持つ
        // given (前提条件):
        let event = ChatEvent::Ping(PingMessage::default());

        // when (操作):
        let json = serde_json::to_string(&event).unwrap();

        // then (期待する結果):
        assert_eq!(json, r#"{"type":"PING"}"#);
        assert_eq!(event.event_type(), EventType::Ping);
    }
}
