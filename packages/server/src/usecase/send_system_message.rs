//! UseCase: 管理者からのシステムメッセージ送信

use std::sync::Arc;

use castchat_shared::time::Clock;

use crate::domain::{ChatConfigProvider, ChatMessage, MessageRenderer};

use super::{error::SendSystemMessageError, hub::ChatHubHandle};

pub struct SendSystemMessageUseCase {
    hub: ChatHubHandle,
    config: Arc<dyn ChatConfigProvider>,
    renderer: Arc<dyn MessageRenderer>,
    clock: Arc<dyn Clock>,
}

impl SendSystemMessageUseCase {
    pub fn new(
        hub: ChatHubHandle,
        config: Arc<dyn ChatConfigProvider>,
        renderer: Arc<dyn MessageRenderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hub,
            config,
            renderer,
            clock,
        }
    }

    /// サーバー名義の SYSTEM メッセージを配送し、作成したメッセージを返す
    pub async fn execute(&self, body: &str) -> Result<ChatMessage, SendSystemMessageError> {
        if body.trim().is_empty() {
            return Err(SendSystemMessageError::EmptyBody);
        }
        let message = ChatMessage::system(
            self.config.server_name(),
            self.renderer.render(body),
            self.clock.now(),
        );
        self.hub.broadcast(message.clone()).await?;
        Ok(message)
    }
}
