//! Chat Hub
//!
//! 接続中セッションの登録簿を 1 つのタスクが所有し、コマンドキュー経由で
//! 登録・削除・配信を直列に処理する。配信中は登録簿の共有ロックだけを取り、
//! 各セッションへの配送は `try_send` で行う。配送できなかったセッションは
//! 配信後に登録簿から外す。

use std::{collections::HashMap, sync::Arc, time::Duration};

use castchat_shared::time::Clock;
use serde::Serialize;
use tokio::{
    sync::{RwLock, mpsc, oneshot},
    task::JoinHandle,
};

use crate::domain::{
    ChatConfigProvider, ChatHistoryRepository, ChatMessage, EventType, HubError, NameChangeEvent,
    SessionError, SessionId, StreamStatusListener, UserJoinedEvent, ViewerClient,
    WebhookDispatcher,
};

use super::session::ClientSession;

/// ハートビート間隔
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// 接続から歓迎メッセージ送信までの待ち時間
pub const WELCOME_MESSAGE_DELAY: Duration = Duration::from_secs(7);

const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// ハブのタイミング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSettings {
    pub heartbeat_period: Duration,
    pub welcome_delay: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            heartbeat_period: HEARTBEAT_PERIOD,
            welcome_delay: WELCOME_MESSAGE_DELAY,
        }
    }
}

/// ハブが利用する協調者
#[derive(Clone)]
pub struct HubDependencies {
    pub config: Arc<dyn ChatConfigProvider>,
    pub listener: Arc<dyn StreamStatusListener>,
    pub history: Arc<dyn ChatHistoryRepository>,
    pub webhooks: Arc<dyn WebhookDispatcher>,
    pub clock: Arc<dyn Clock>,
}

/// ハブが処理するコマンド
pub enum HubCommand {
    Add(Arc<ClientSession>),
    Remove(SessionId),
    Broadcast(ChatMessage),
    NameChanged(NameChangeEvent),
    UserJoined(UserJoinedEvent),
    VisibilityUpdate(ChatMessage),
    ListSessions(oneshot::Sender<Vec<ViewerClient>>),
    Heartbeat,
    Error(String),
    Shutdown,
}

/// ハブへのコマンド送信口
#[derive(Clone)]
pub struct ChatHubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl ChatHubHandle {
    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::NotRunning)
    }

    pub async fn add(&self, session: Arc<ClientSession>) -> Result<(), HubError> {
        self.send(HubCommand::Add(session)).await
    }

    pub async fn remove(&self, id: SessionId) -> Result<(), HubError> {
        self.send(HubCommand::Remove(id)).await
    }

    pub async fn broadcast(&self, message: ChatMessage) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast(message)).await
    }

    pub async fn name_changed(&self, event: NameChangeEvent) -> Result<(), HubError> {
        self.send(HubCommand::NameChanged(event)).await
    }

    pub async fn user_joined(&self, event: UserJoinedEvent) -> Result<(), HubError> {
        self.send(HubCommand::UserJoined(event)).await
    }

    /// 可視状態の変更を全セッションへ送る（履歴・Webhook には流さない）
    pub async fn send_visibility_update(&self, message: ChatMessage) -> Result<(), HubError> {
        self.send(HubCommand::VisibilityUpdate(message)).await
    }

    /// 登録中（名簿対象）のセッション一覧
    pub async fn sessions(&self) -> Result<Vec<ViewerClient>, HubError> {
        let (reply, receiver) = oneshot::channel();
        self.send(HubCommand::ListSessions(reply)).await?;
        receiver.await.map_err(|_| HubError::NotRunning)
    }

    /// 接続側で起きた障害をハブのログに残す（ハブは止まらない）
    pub async fn report_error(&self, error: impl Into<String>) -> Result<(), HubError> {
        self.send(HubCommand::Error(error.into())).await
    }

    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.send(HubCommand::Shutdown).await
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

type SessionMap = HashMap<SessionId, Arc<ClientSession>>;

pub struct ChatHub {
    clients: RwLock<SessionMap>,
    deps: HubDependencies,
    settings: HubSettings,
    history_writer: mpsc::UnboundedSender<ChatMessage>,
    commands: mpsc::WeakSender<HubCommand>,
}

impl ChatHub {
    /// ハブのタスクを起動し、送信口とタスクのハンドルを返す
    ///
    /// ハブはすべての `ChatHubHandle` が破棄されるか `Shutdown` を受け取ると停止する。
    pub fn spawn(deps: HubDependencies, settings: HubSettings) -> (ChatHubHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let history_writer = spawn_history_writer(deps.history.clone());

        let hub = ChatHub {
            clients: RwLock::new(HashMap::new()),
            deps,
            settings,
            history_writer,
            commands: command_tx.downgrade(),
        };
        spawn_heartbeat(command_tx.downgrade(), settings.heartbeat_period);
        let task = tokio::spawn(hub.run(command_rx));

        (
            ChatHubHandle {
                commands: command_tx,
            },
            task,
        )
    }

    async fn run(self, mut commands: mpsc::Receiver<HubCommand>) {
        tracing::info!("Chat hub started");
        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Add(session) => self.add(session).await,
                HubCommand::Remove(id) => self.remove(&id).await,
                HubCommand::Broadcast(message) => self.broadcast(message).await,
                HubCommand::NameChanged(event) => self.name_changed(event).await,
                HubCommand::UserJoined(event) => self.user_joined(event).await,
                HubCommand::VisibilityUpdate(message) => self.visibility_update(message).await,
                HubCommand::ListSessions(reply) => {
                    let _ = reply.send(self.list_sessions().await);
                }
                HubCommand::Heartbeat => self.heartbeat().await,
                HubCommand::Error(error) => tracing::warn!("Chat hub error: {}", error),
                HubCommand::Shutdown => break,
            }
        }
        self.close_all().await;
        tracing::info!("Chat hub stopped");
    }

    async fn add(&self, session: Arc<ClientSession>) {
        if session.is_closed() {
            return;
        }
        let count = {
            let mut clients = self.clients.write().await;
            clients.insert(session.id().clone(), session.clone());
            clients.len()
        };
        tracing::debug!(
            "Session '{}' registered ({} connected)",
            session.id(),
            count
        );

        if session.is_ignored() {
            return;
        }
        let snapshot = session.viewer_snapshot(self.deps.clock.now()).await;
        self.deps.listener.client_added(snapshot).await;
        self.schedule_welcome_message(session);
    }

    async fn remove(&self, id: &SessionId) {
        let Some(session) = self.clients.write().await.remove(id) else {
            return;
        };
        session.close();
        if !session.is_ignored() {
            self.deps.listener.client_removed(id).await;
        }

        let lifetime = self.deps.clock.now() - session.connected_at();
        tracing::info!(
            "Session '{}' was connected for {}s and sent {} messages",
            id,
            lifetime.num_seconds(),
            session.message_count().await
        );
    }

    async fn broadcast(&self, mut message: ChatMessage) {
        if self.deps.config.chat_disabled() {
            tracing::debug!("Chat is disabled, dropping message '{}'", message.id);
            return;
        }
        if message.is_empty() {
            return;
        }
        message.assign_defaults(self.deps.clock.now());
        self.deps.listener.message_sent(&message).await;

        let delivered = self
            .fan_out(false, |session| session.enqueue(message.clone()))
            .await;
        tracing::debug!(
            "{} '{}' delivered to {} sessions",
            message.message_type,
            message.id,
            delivered
        );

        if !message.ephemeral && self.history_writer.send(message.clone()).is_err() {
            tracing::error!("History writer stopped, message '{}' not saved", message.id);
        }
        self.notify_webhook(message.message_type, &message);
    }

    async fn name_changed(&self, event: NameChangeEvent) {
        self.fan_out(false, |session| session.enqueue_name_change(event.clone()))
            .await;
        self.notify_webhook(EventType::UserNameChanged, &event);
    }

    async fn user_joined(&self, event: UserJoinedEvent) {
        if self.deps.listener.is_stream_connected().await {
            self.fan_out(false, |session| session.enqueue_join(event.clone()))
                .await;
        }
        self.notify_webhook(EventType::UserJoined, &event);
    }

    async fn visibility_update(&self, message: ChatMessage) {
        self.fan_out(false, |session| session.enqueue(message.clone()))
            .await;
    }

    async fn heartbeat(&self) {
        self.fan_out(true, ClientSession::enqueue_ping).await;
    }

    async fn list_sessions(&self) -> Vec<ViewerClient> {
        let now = self.deps.clock.now();
        let clients = self.clients.read().await;
        let mut sessions = Vec::with_capacity(clients.len());
        for session in clients.values().filter(|s| !s.is_ignored()) {
            sessions.push(session.viewer_snapshot(now).await);
        }
        sessions
    }

    /// 登録中のセッションへ配送し、配送できたセッション数を返す
    async fn fan_out<F>(&self, include_ignored: bool, deliver: F) -> usize
    where
        F: Fn(&ClientSession) -> Result<(), SessionError>,
    {
        let mut delivered = 0;
        let mut failed = Vec::new();
        {
            let clients = self.clients.read().await;
            for (id, session) in clients.iter() {
                if session.is_ignored() && !include_ignored {
                    continue;
                }
                match deliver(session) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!("Dropping session '{}': {}", id, e);
                        failed.push(id.clone());
                    }
                }
            }
        }
        for id in failed {
            self.remove(&id).await;
        }
        delivered
    }

    fn notify_webhook<T: Serialize>(&self, kind: EventType, event: &T) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize {} webhook payload: {}", kind, e);
                return;
            }
        };
        let webhooks = self.deps.webhooks.clone();
        tokio::spawn(async move {
            if let Err(e) = webhooks.notify(kind, payload).await {
                tracing::warn!("{} webhook failed: {}", kind, e);
            }
        });
    }

    fn schedule_welcome_message(&self, session: Arc<ClientSession>) {
        let config = self.deps.config.clone();
        let clock = self.deps.clock.clone();
        let commands = self.commands.clone();
        let delay = self.settings.welcome_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if session.is_closed() {
                return;
            }
            let welcome = config.welcome_message();
            if welcome.trim().is_empty() {
                return;
            }

            let message =
                ChatMessage::system(config.server_name(), welcome, clock.now()).into_ephemeral();
            if let Err(e) = session.enqueue(message) {
                tracing::warn!("Welcome message not delivered: {}", e);
                if let Some(commands) = commands.upgrade() {
                    let hub = ChatHubHandle { commands };
                    let _ = hub
                        .report_error(format!(
                            "welcome message to session '{}' failed: {}",
                            session.id(),
                            e
                        ))
                        .await;
                    let _ = hub.remove(session.id().clone()).await;
                }
            }
        });
    }

    async fn close_all(&self) {
        let mut clients = self.clients.write().await;
        for (_, session) in clients.drain() {
            session.close();
        }
    }
}

/// 履歴への書き込みを 1 本のタスクに直列化し、挿入順を保つ
fn spawn_history_writer(
    history: Arc<dyn ChatHistoryRepository>,
) -> mpsc::UnboundedSender<ChatMessage> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let id = message.id.clone();
            if let Err(e) = history.append(message).await {
                tracing::error!("Failed to save message '{}': {}", id, e);
            }
        }
    });
    tx
}

fn spawn_heartbeat(commands: mpsc::WeakSender<HubCommand>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(commands) = commands.upgrade() else {
                break;
            };
            if commands.send(HubCommand::Heartbeat).await.is_err() {
                break;
            }
        }
    });
}
