//! UseCase: 視聴者一覧の取得
//!
//! 統計側の名簿に、ハブが保持している接続中セッションの最新状態を重ねる。
//! ハブにいないエントリは名簿の値をそのまま返す。

use std::collections::HashMap;

use crate::domain::ViewerClient;

use super::{error::ListViewersError, hub::ChatHubHandle, presence::PresenceTracker};

pub struct ListViewersUseCase {
    presence: PresenceTracker,
    hub: ChatHubHandle,
}

impl ListViewersUseCase {
    pub fn new(presence: PresenceTracker, hub: ChatHubHandle) -> Self {
        Self { presence, hub }
    }

    pub async fn execute(&self) -> Result<Vec<ViewerClient>, ListViewersError> {
        let live: HashMap<_, _> = self
            .hub
            .sessions()
            .await?
            .into_iter()
            .map(|session| (session.client_id.clone(), session))
            .collect();

        let viewers = self
            .presence
            .viewers()
            .await
            .into_iter()
            .map(|mut viewer| {
                if let Some(session) = live.get(&viewer.client_id) {
                    viewer.display_name = session.display_name.clone();
                    viewer.message_count = session.message_count;
                    viewer.last_seen = session.last_seen;
                }
                viewer
            })
            .collect();
        Ok(viewers)
    }
}
