//! Client Session
//!
//! 1 接続ぶんの状態と送信キュー。読み書きループはこの構造体を共有し、
//! ハブはキューへ `try_send` で配送する。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
    watch,
};

use crate::domain::{
    ChatMessage, NameChangeEvent, PingMessage, SessionError, SessionId, UserJoinedEvent,
    ViewerClient,
};

use super::hub::ChatHubHandle;

/// 送信キュー（メールボックス）の容量
pub const MAILBOX_CAPACITY: usize = 100;

/// 名前変更・参加イベント用の専用キューの容量
const EVENT_LINE_CAPACITY: usize = MAILBOX_CAPACITY;

/// 接続時に決まるセッションの属性
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    pub ip_address: String,
    pub user_agent: Option<String>,
    /// 名簿・配信・統計の対象外とする接続
    pub ignore: bool,
}

#[derive(Debug, Default)]
struct SessionProfile {
    display_name: Option<String>,
    message_count: u64,
}

/// 書き込みループが所有する受信側
pub struct SessionOutbound {
    pub mailbox: mpsc::Receiver<ChatMessage>,
    pub pings: mpsc::Receiver<PingMessage>,
    pub name_changes: mpsc::Receiver<NameChangeEvent>,
    pub joins: mpsc::Receiver<UserJoinedEvent>,
    pub shutdown: watch::Receiver<bool>,
}

pub struct ClientSession {
    id: SessionId,
    connected_at: DateTime<Utc>,
    identity: SessionIdentity,
    profile: Mutex<SessionProfile>,
    mailbox: mpsc::Sender<ChatMessage>,
    pings: mpsc::Sender<PingMessage>,
    name_changes: mpsc::Sender<NameChangeEvent>,
    joins: mpsc::Sender<UserJoinedEvent>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl ClientSession {
    pub fn new(identity: SessionIdentity, now: DateTime<Utc>) -> (Arc<Self>, SessionOutbound) {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
        // PING は 1 件だけ保留できればよい
        let (ping_tx, ping_rx) = mpsc::channel(1);
        let (name_tx, name_rx) = mpsc::channel(EVENT_LINE_CAPACITY);
        let (join_tx, join_rx) = mpsc::channel(EVENT_LINE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = Arc::new(Self {
            id: SessionId::generate(),
            connected_at: now,
            identity,
            profile: Mutex::new(SessionProfile::default()),
            mailbox: mailbox_tx,
            pings: ping_tx,
            name_changes: name_tx,
            joins: join_tx,
            closed: AtomicBool::new(false),
            shutdown: shutdown_tx,
        });
        let outbound = SessionOutbound {
            mailbox: mailbox_rx,
            pings: ping_rx,
            name_changes: name_rx,
            joins: join_rx,
            shutdown: shutdown_rx,
        };
        (session, outbound)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn ip_address(&self) -> &str {
        &self.identity.ip_address
    }

    pub fn is_ignored(&self) -> bool {
        self.identity.ignore
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn display_name(&self) -> Option<String> {
        self.profile.lock().await.display_name.clone()
    }

    pub async fn set_display_name(&self, name: impl Into<String>) {
        self.profile.lock().await.display_name = Some(name.into());
    }

    /// 送信数を 1 増やし、増やした後の値を返す
    pub async fn record_message(&self) -> u64 {
        let mut profile = self.profile.lock().await;
        profile.message_count += 1;
        profile.message_count
    }

    pub async fn message_count(&self) -> u64 {
        self.profile.lock().await.message_count
    }

    /// 名簿用のレコードを作る
    pub async fn viewer_snapshot(&self, now: DateTime<Utc>) -> ViewerClient {
        let profile = self.profile.lock().await;
        ViewerClient {
            client_id: self.id.clone(),
            connected_at: self.connected_at,
            last_seen: now,
            user_agent: self.identity.user_agent.clone(),
            ip_address: self.identity.ip_address.clone(),
            display_name: profile.display_name.clone(),
            message_count: profile.message_count,
            geo: None,
        }
    }

    /// メールボックスへ配送する。満杯ならセッションを閉じてエラーを返す
    pub fn enqueue(&self, message: ChatMessage) -> Result<(), SessionError> {
        self.offer(&self.mailbox, message)
    }

    pub fn enqueue_name_change(&self, event: NameChangeEvent) -> Result<(), SessionError> {
        self.offer(&self.name_changes, event)
    }

    pub fn enqueue_join(&self, event: UserJoinedEvent) -> Result<(), SessionError> {
        self.offer(&self.joins, event)
    }

    /// PING を配送する。未送信の PING が残っていれば何もしない
    pub fn enqueue_ping(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id.clone()));
        }
        match self.pings.try_send(PingMessage::default()) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(SessionError::Closed(self.id.clone()))
            }
        }
    }

    fn offer<T>(&self, line: &mpsc::Sender<T>, item: T) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id.clone()));
        }
        match line.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.close();
                Err(SessionError::MailboxFull(self.id.clone()))
            }
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(SessionError::Closed(self.id.clone()))
            }
        }
    }

    /// 読み込みループ用のシャットダウン通知を購読する
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// セッションを閉じる。最初の呼び出しだけが `true` を返す
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.send_replace(true);
        true
    }

    /// セッションを閉じ、最初に閉じた呼び出し元だけがハブへ削除を依頼する
    pub async fn teardown(&self, hub: &ChatHubHandle) {
        if !self.close() {
            return;
        }
        if let Err(e) = hub.remove(self.id.clone()).await {
            tracing::debug!("Could not unregister session '{}': {}", self.id, e);
        }
    }
}
