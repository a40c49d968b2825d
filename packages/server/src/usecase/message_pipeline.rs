//! UseCase: クライアントから受け取ったイベントの整形とハブへの受け渡し
//!
//! チャット本文は HTML に変換し、作者名はセッションの表示名を優先して決める。
//! 名前変更は旧名を付けて配送してから表示名を更新する。

use std::sync::Arc;

use castchat_shared::time::Clock;

use crate::domain::{
    ChatMessage, HubError, InboundEvent, MessageRenderer, NameChangeEvent, UserJoinedEvent,
    entity::ANONYMOUS_AUTHOR,
};

use super::{hub::ChatHubHandle, session::ClientSession};

/// ハブへ渡せる状態になったイベント
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedEvent {
    Chat(ChatMessage),
    NameChange(NameChangeEvent),
    Join(UserJoinedEvent),
}

pub struct MessagePipeline {
    renderer: Arc<dyn MessageRenderer>,
    clock: Arc<dyn Clock>,
}

impl MessagePipeline {
    pub fn new(renderer: Arc<dyn MessageRenderer>, clock: Arc<dyn Clock>) -> Self {
        Self { renderer, clock }
    }

    /// イベントを整形する。配送する必要がなければ `None`
    pub async fn prepare(
        &self,
        session: &ClientSession,
        event: InboundEvent,
    ) -> Option<PreparedEvent> {
        let now = self.clock.now();
        match event {
            InboundEvent::Chat { author, body } => {
                if body.trim().is_empty() {
                    return None;
                }
                let author = match session.display_name().await {
                    Some(name) => name,
                    None => {
                        let name = author
                            .map(|a| a.trim().to_string())
                            .filter(|a| !a.is_empty())
                            .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
                        session.set_display_name(name.clone()).await;
                        name
                    }
                };
                session.record_message().await;
                let body = self.renderer.render(&body);
                Some(PreparedEvent::Chat(ChatMessage::chat(
                    author,
                    body,
                    session.id().clone(),
                    now,
                )))
            }
            InboundEvent::NameChange { new_name } => {
                let new_name = new_name.trim();
                if new_name.is_empty() {
                    return None;
                }
                let old_name = session.display_name().await;
                Some(PreparedEvent::NameChange(NameChangeEvent::new(
                    old_name,
                    new_name,
                    session.id().clone(),
                    now,
                )))
            }
            InboundEvent::UserJoined { username } => {
                let username = username.trim();
                let username = if username.is_empty() {
                    session
                        .display_name()
                        .await
                        .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string())
                } else {
                    username.to_string()
                };
                session.set_display_name(username.clone()).await;
                Some(PreparedEvent::Join(UserJoinedEvent::new(
                    username,
                    session.id().clone(),
                    now,
                )))
            }
        }
    }

    /// イベントを整形してハブへ渡す
    pub async fn handle(
        &self,
        session: &ClientSession,
        event: InboundEvent,
        hub: &ChatHubHandle,
    ) -> Result<(), HubError> {
        match self.prepare(session, event).await {
            None => Ok(()),
            Some(PreparedEvent::Chat(message)) => hub.broadcast(message).await,
            Some(PreparedEvent::NameChange(event)) => {
                let new_name = event.new_name.clone();
                hub.name_changed(event).await?;
                session.set_display_name(new_name).await;
                Ok(())
            }
            Some(PreparedEvent::Join(event)) => hub.user_joined(event).await,
        }
    }
}
