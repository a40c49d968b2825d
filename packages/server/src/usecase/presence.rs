//! Presence / Stats tracker
//!
//! 視聴者の名簿、配信の接続状態、ピーク視聴者数を管理する。ハブからは
//! `StreamStatusListener` として呼ばれ、ピークの変化や定期チェックポイントで
//! 統計を永続化する。

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use castchat_shared::time::{Clock, to_rfc3339_millis};
use chrono::{DateTime, Utc};
use tokio::{sync::RwLock, task::JoinHandle};

use crate::domain::{
    ChatConfigProvider, ChatMessage, GeoResolver, RepositoryError, SessionId, StatsRepository,
    StatsSnapshot, StreamStatusListener, ViewerClient,
};

/// 切断からこの秒数以内に再接続すればセッションピークを引き継ぐ
pub const SESSION_RESUME_WINDOW_SECONDS: i64 = 5 * 60;

/// 配信接続後、安定したとみなすまでの最小待ち時間（秒）
pub const MIN_SETTLE_SECONDS: u64 = 7;

/// 統計のチェックポイント間隔
pub const CHECKPOINT_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct PresenceState {
    viewers: HashMap<SessionId, ViewerClient>,
    session_peak: u64,
    overall_peak: u64,
    stream_connected: bool,
    last_connect_time: Option<DateTime<Utc>>,
    last_disconnect_time: Option<DateTime<Utc>>,
}

impl PresenceState {
    /// 配信中ならピークを更新し、変化したかを返す
    fn update_peaks(&mut self) -> bool {
        if !self.stream_connected {
            return false;
        }
        let current = self.viewers.len() as u64;
        let mut changed = false;
        if current > self.session_peak {
            self.session_peak = current;
            changed = true;
        }
        if self.session_peak > self.overall_peak {
            self.overall_peak = self.session_peak;
            changed = true;
        }
        changed
    }
}

fn session_expired(last_disconnect: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let window = chrono::Duration::seconds(SESSION_RESUME_WINDOW_SECONDS);
    last_disconnect.is_none_or(|at| now - at > window)
}

struct PresenceInner {
    state: RwLock<PresenceState>,
    repository: Arc<dyn StatsRepository>,
    geo: Arc<dyn GeoResolver>,
    config: Arc<dyn ChatConfigProvider>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

impl PresenceTracker {
    /// 保存済みの統計を読み込んで起動する
    ///
    /// 最後の切断から 5 分以上経っていればセッションピークは 0 から始める。
    pub async fn load(
        repository: Arc<dyn StatsRepository>,
        geo: Arc<dyn GeoResolver>,
        config: Arc<dyn ChatConfigProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let mut session_peak = repository
            .peak_session_viewer_count()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Could not load session peak: {}", e);
                0
            });
        let overall_peak = repository
            .peak_overall_viewer_count()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Could not load overall peak: {}", e);
                0
            });
        let last_disconnect_time = repository.last_disconnect_time().await.unwrap_or_else(|e| {
            tracing::warn!("Could not load last disconnect time: {}", e);
            None
        });

        if session_expired(last_disconnect_time, now) {
            session_peak = 0;
        }
        tracing::info!(
            "Stats loaded: session peak {}, overall peak {}",
            session_peak,
            overall_peak
        );

        Self {
            inner: Arc::new(PresenceInner {
                state: RwLock::new(PresenceState {
                    session_peak,
                    overall_peak,
                    last_disconnect_time,
                    ..PresenceState::default()
                }),
                repository,
                geo,
                config,
                clock,
            }),
        }
    }

    /// 名簿に追加、または既存エントリの最終確認時刻を更新する
    pub async fn client_active(&self, client: ViewerClient) {
        let now = self.inner.clock.now();
        let cached_geo = self.inner.geo.cached(&client.ip_address).await;

        let (peaks_changed, needs_lookup) = {
            let mut state = self.inner.state.write().await;
            let needs_lookup = match state.viewers.get_mut(&client.client_id) {
                Some(existing) => {
                    existing.last_seen = now;
                    existing.display_name = client.display_name.clone();
                    existing.message_count = existing.message_count.max(client.message_count);
                    if existing.geo.is_none() {
                        existing.geo = cached_geo;
                    }
                    false
                }
                None => {
                    let needs_lookup = cached_geo.is_none();
                    state.viewers.insert(
                        client.client_id.clone(),
                        ViewerClient {
                            last_seen: now,
                            geo: cached_geo,
                            ..client.clone()
                        },
                    );
                    needs_lookup
                }
            };
            (state.update_peaks(), needs_lookup)
        };

        if needs_lookup {
            self.spawn_geo_lookup(client.client_id, client.ip_address);
        }
        if peaks_changed {
            self.spawn_save();
        }
    }

    /// 名簿から外す。ピークは下げない
    pub async fn remove_client(&self, client_id: &SessionId) {
        self.inner.state.write().await.viewers.remove(client_id);
    }

    /// 送信者の最終確認時刻と送信数を更新する
    pub async fn record_message(&self, message: &ChatMessage) {
        let Some(client_id) = &message.client_id else {
            return;
        };
        let now = self.inner.clock.now();
        let mut state = self.inner.state.write().await;
        if let Some(viewer) = state.viewers.get_mut(client_id) {
            viewer.last_seen = now;
            viewer.message_count += 1;
            viewer.display_name = Some(message.author.clone());
        }
    }

    /// 配信が接続済みで、接続から待ち時間が経過しているか
    pub async fn is_stream_connected(&self) -> bool {
        let now = self.inner.clock.now();
        let state = self.inner.state.read().await;
        if !state.stream_connected {
            return false;
        }
        let Some(connected_at) = state.last_connect_time else {
            return false;
        };
        now - connected_at >= self.settle_time()
    }

    /// max(3 × セグメント長, 7 秒)。表現できない長さは最大値に丸める
    fn settle_time(&self) -> chrono::Duration {
        let three_segments = self.inner.config.seconds_per_segment().saturating_mul(3);
        let seconds = three_segments.max(MIN_SETTLE_SECONDS);
        i64::try_from(seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// 配信開始を記録する
    pub async fn set_stream_connected(&self) {
        let now = self.inner.clock.now();
        let peaks_changed = {
            let mut state = self.inner.state.write().await;
            state.stream_connected = true;
            state.last_connect_time = Some(now);
            if session_expired(state.last_disconnect_time, now) {
                state.session_peak = 0;
            }
            state.update_peaks()
        };
        tracing::info!("Stream connected at {}", to_rfc3339_millis(now));
        if peaks_changed {
            self.spawn_save();
        }
    }

    /// 配信終了を記録する
    pub async fn set_stream_disconnected(&self) {
        let now = self.inner.clock.now();
        {
            let mut state = self.inner.state.write().await;
            state.stream_connected = false;
            state.last_disconnect_time = Some(now);
        }
        tracing::info!("Stream disconnected at {}", to_rfc3339_millis(now));
        self.spawn_save();
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let online = self.is_stream_connected().await;
        let state = self.inner.state.read().await;
        StatsSnapshot {
            viewer_count: state.viewers.len(),
            session_peak_viewer_count: state.session_peak,
            overall_peak_viewer_count: state.overall_peak,
            last_connect_time: state.last_connect_time,
            last_disconnect_time: state.last_disconnect_time,
            online,
        }
    }

    /// 名簿を接続時刻順で返す
    pub async fn viewers(&self) -> Vec<ViewerClient> {
        let state = self.inner.state.read().await;
        let mut viewers: Vec<ViewerClient> = state.viewers.values().cloned().collect();
        viewers.sort_by_key(|v| v.connected_at);
        viewers
    }

    /// 統計を保存する
    ///
    /// 配信中は現在時刻を最終切断時刻として保存し、再起動後にセッションを引き継げるようにする。
    pub async fn save(&self) -> Result<(), RepositoryError> {
        let now = self.inner.clock.now();
        let (session_peak, overall_peak, last_disconnect) = {
            let state = self.inner.state.read().await;
            let last_disconnect = if state.stream_connected {
                Some(now)
            } else {
                state.last_disconnect_time
            };
            (state.session_peak, state.overall_peak, last_disconnect)
        };

        let repository = &self.inner.repository;
        repository.set_peak_session_viewer_count(session_peak).await?;
        repository.set_peak_overall_viewer_count(overall_peak).await?;
        if let Some(at) = last_disconnect {
            repository.set_last_disconnect_time(at).await?;
        }
        Ok(())
    }

    /// 定期的に統計を保存するタスクを起動する
    pub fn spawn_checkpoint(&self, period: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = tracker.save().await {
                    tracing::error!("Stats checkpoint failed: {}", e);
                }
            }
        })
    }

    fn spawn_save(&self) {
        let tracker = self.clone();
        tokio::spawn(async move {
            if let Err(e) = tracker.save().await {
                tracing::error!("Failed to save stats: {}", e);
            }
        });
    }

    fn spawn_geo_lookup(&self, client_id: SessionId, ip_address: String) {
        let tracker = self.clone();
        tokio::spawn(async move {
            let Some(geo) = tracker.inner.geo.resolve(&ip_address).await else {
                return;
            };
            let mut state = tracker.inner.state.write().await;
            if let Some(viewer) = state.viewers.get_mut(&client_id) {
                viewer.geo = Some(geo);
            }
        });
    }
}

#[async_trait]
impl StreamStatusListener for PresenceTracker {
    async fn is_stream_connected(&self) -> bool {
        PresenceTracker::is_stream_connected(self).await
    }

    async fn client_added(&self, client: ViewerClient) {
        self.client_active(client).await;
    }

    async fn client_removed(&self, client_id: &SessionId) {
        self.remove_client(client_id).await;
    }

    async fn message_sent(&self, message: &ChatMessage) {
        self.record_message(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::GeoDetails,
        infrastructure::{
            config::{ChatSettings, RuntimeChatConfig},
            geo::CachingGeoResolver,
            repository::InMemoryStatsRepository,
        },
    };
    use castchat_shared::time::ManualClock;
    use chrono::TimeZone;

    struct Fixture {
        tracker: PresenceTracker,
        clock: ManualClock,
        repository: Arc<InMemoryStatsRepository>,
        config: Arc<RuntimeChatConfig>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
    }

    async fn fixture_with(repository: InMemoryStatsRepository) -> Fixture {
        let clock = ManualClock::new(start());
        let repository = Arc::new(repository);
        let config = Arc::new(RuntimeChatConfig::new(ChatSettings::default()));
        let tracker = PresenceTracker::load(
            repository.clone(),
            Arc::new(CachingGeoResolver::disabled()),
            config.clone(),
            Arc::new(clock.clone()),
        )
        .await;
        Fixture {
            tracker,
            clock,
            repository,
            config,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(InMemoryStatsRepository::default()).await
    }

    fn viewer(ip: &str) -> ViewerClient {
        ViewerClient {
            client_id: SessionId::generate(),
            connected_at: start(),
            last_seen: start(),
            user_agent: None,
            ip_address: ip.to_string(),
            display_name: None,
            message_count: 0,
            geo: None,
        }
    }

    #[tokio::test]
    async fn test_stream_not_connected_before_settle_time() {
        // テスト項目: 接続直後は安定待ちの間 false を返す
        // given (前提条件):
        let f = fixture().await;
        f.config.set_seconds_per_segment(4).unwrap();

        // when (操作):
        f.tracker.set_stream_connected().await;
        let just_connected = f.tracker.is_stream_connected().await;
        f.clock.advance(chrono::Duration::seconds(11));
        let before_settle = f.tracker.is_stream_connected().await;
        f.clock.advance(chrono::Duration::seconds(1));
        let settled = f.tracker.is_stream_connected().await;

        // then (期待する結果):
        assert!(!just_connected);
        assert!(!before_settle);
        assert!(settled);
    }

    #[tokio::test]
    async fn test_settle_time_has_seven_second_floor() {
        // テスト項目: セグメントが短くても最低 7 秒は待つ
        // given (前提条件):
        let f = fixture().await;
        f.config.set_seconds_per_segment(1).unwrap();
        f.tracker.set_stream_connected().await;

        // when (操作):
        f.clock.advance(chrono::Duration::seconds(6));
        let at_six = f.tracker.is_stream_connected().await;
        f.clock.advance(chrono::Duration::seconds(1));
        let at_seven = f.tracker.is_stream_connected().await;

        // then (期待する結果):
        assert!(!at_six);
        assert!(at_seven);
    }

    /// 検証を通らない値を返す設定
    struct UnboundedSegmentConfig;

    impl ChatConfigProvider for UnboundedSegmentConfig {
        fn chat_disabled(&self) -> bool {
            false
        }

        fn welcome_message(&self) -> String {
            String::new()
        }

        fn server_name(&self) -> String {
            "Test Stream".to_string()
        }

        fn seconds_per_segment(&self) -> u64 {
            10_000_000_000_000_000
        }
    }

    async fn unbounded_tracker(clock: &ManualClock) -> PresenceTracker {
        PresenceTracker::load(
            Arc::new(InMemoryStatsRepository::default()),
            Arc::new(CachingGeoResolver::disabled()),
            Arc::new(UnboundedSegmentConfig),
            Arc::new(clock.clone()),
        )
        .await
    }

    #[tokio::test]
    async fn test_unrepresentable_settle_time_saturates() {
        // テスト項目: 表現できないほど長い安定待ち時間でも panic せず、未接続扱いになる
        // given (前提条件):
        let clock = ManualClock::new(start());
        let tracker = unbounded_tracker(&clock).await;
        tracker.set_stream_connected().await;

        // when (操作):
        clock.advance(chrono::Duration::days(365 * 100));
        let connected = tracker.is_stream_connected().await;
        let snapshot = tracker.snapshot().await;

        // then (期待する結果):
        assert!(!connected);
        assert!(!snapshot.online);
    }

    #[tokio::test]
    async fn test_hub_survives_join_with_unrepresentable_settle_time() {
        // テスト項目: 参加イベントで安定判定が走ってもハブは停止しない
        // given (前提条件):
        use crate::{
            domain::UserJoinedEvent,
            infrastructure::{
                repository::InMemoryChatHistoryRepository, webhook::TracingWebhookDispatcher,
            },
            usecase::{
                ChatHub, HubDependencies, HubSettings,
                session::{ClientSession, SessionIdentity},
            },
        };

        let clock = ManualClock::new(start());
        let tracker = unbounded_tracker(&clock).await;
        tracker.set_stream_connected().await;
        let (hub, _task) = ChatHub::spawn(
            HubDependencies {
                config: Arc::new(UnboundedSegmentConfig),
                listener: Arc::new(tracker),
                history: Arc::new(InMemoryChatHistoryRepository::new()),
                webhooks: Arc::new(TracingWebhookDispatcher),
                clock: Arc::new(clock.clone()),
            },
            HubSettings::default(),
        );
        let (session, mut outbound) = ClientSession::new(SessionIdentity::default(), start());
        hub.add(session.clone()).await.unwrap();

        // when (操作):
        let joined = UserJoinedEvent::new("alice", session.id().clone(), start());
        hub.user_joined(joined).await.unwrap();
        let after = hub
            .broadcast(ChatMessage::chat("alice", "still here", session.id().clone(), start()))
            .await;

        // then (期待する結果):
        assert_eq!(after, Ok(()));
        let delivered = tokio::time::timeout(Duration::from_secs(1), outbound.mailbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.body, "still here");
        assert!(outbound.joins.try_recv().is_err());
        assert!(hub.is_running());
    }

    #[tokio::test]
    async fn test_disconnected_stream_is_never_connected() {
        // テスト項目: 配信終了後は経過時間に関係なく false
        // given (前提条件):
        let f = fixture().await;
        f.tracker.set_stream_connected().await;
        f.clock.advance(chrono::Duration::seconds(60));

        // when (操作):
        f.tracker.set_stream_disconnected().await;

        // then (期待する結果):
        assert!(!f.tracker.is_stream_connected().await);
    }

    #[tokio::test]
    async fn test_peaks_only_move_while_live() {
        // テスト項目: ピークは配信中のみ更新され、視聴者が減っても下がらない
        // given (前提条件):
        let f = fixture().await;
        f.tracker.client_active(viewer("203.0.113.1")).await;
        assert_eq!(f.tracker.snapshot().await.session_peak_viewer_count, 0);

        // when (操作):
        f.tracker.set_stream_connected().await;
        let second = viewer("203.0.113.2");
        let second_id = second.client_id.clone();
        f.tracker.client_active(second).await;
        f.tracker.remove_client(&second_id).await;

        // then (期待する結果):
        let snapshot = f.tracker.snapshot().await;
        assert_eq!(snapshot.viewer_count, 1);
        assert_eq!(snapshot.session_peak_viewer_count, 2);
        assert_eq!(snapshot.overall_peak_viewer_count, 2);
    }

    #[tokio::test]
    async fn test_overall_peak_never_below_session_peak() {
        // テスト項目: 全体ピークは常にセッションピーク以上
        // given (前提条件):
        let repository = InMemoryStatsRepository::default();
        repository.set_peak_overall_viewer_count(1).await.unwrap();
        let f = fixture_with(repository).await;
        f.tracker.set_stream_connected().await;

        // when (操作):
        for i in 0..3 {
            f.tracker.client_active(viewer(&format!("203.0.113.{i}"))).await;
        }

        // then (期待する結果):
        let snapshot = f.tracker.snapshot().await;
        assert_eq!(snapshot.session_peak_viewer_count, 3);
        assert!(snapshot.overall_peak_viewer_count >= snapshot.session_peak_viewer_count);
    }

    #[tokio::test]
    async fn test_load_resets_session_peak_after_resume_window() {
        // テスト項目: 最後の切断から 5 分を超えていればセッションピークを 0 にする
        // given (前提条件):
        let repository = InMemoryStatsRepository::default();
        repository.set_peak_session_viewer_count(12).await.unwrap();
        repository.set_peak_overall_viewer_count(40).await.unwrap();
        repository
            .set_last_disconnect_time(start() - chrono::Duration::minutes(10))
            .await
            .unwrap();

        // when (操作):
        let f = fixture_with(repository).await;

        // then (期待する結果):
        let snapshot = f.tracker.snapshot().await;
        assert_eq!(snapshot.session_peak_viewer_count, 0);
        assert_eq!(snapshot.overall_peak_viewer_count, 40);
    }

    #[tokio::test]
    async fn test_load_keeps_session_peak_within_resume_window() {
        // テスト項目: 5 分以内の再起動ならセッションピークを引き継ぐ
        // given (前提条件):
        let repository = InMemoryStatsRepository::default();
        repository.set_peak_session_viewer_count(12).await.unwrap();
        repository
            .set_last_disconnect_time(start() - chrono::Duration::minutes(2))
            .await
            .unwrap();

        // when (操作):
        let f = fixture_with(repository).await;

        // then (期待する結果):
        assert_eq!(f.tracker.snapshot().await.session_peak_viewer_count, 12);
    }

    #[tokio::test]
    async fn test_save_persists_peaks_and_disconnect_time() {
        // テスト項目: 保存で両ピークと最終切断時刻が書き込まれる
        // given (前提条件):
        let f = fixture().await;
        f.tracker.set_stream_connected().await;
        f.tracker.client_active(viewer("203.0.113.9")).await;
        f.clock.advance(chrono::Duration::minutes(30));
        f.tracker.set_stream_disconnected().await;

        // when (操作):
        f.tracker.save().await.unwrap();

        // then (期待する結果):
        assert_eq!(f.repository.peak_session_viewer_count().await.unwrap(), 1);
        assert_eq!(f.repository.peak_overall_viewer_count().await.unwrap(), 1);
        assert_eq!(
            f.repository.last_disconnect_time().await.unwrap(),
            Some(start() + chrono::Duration::minutes(30))
        );
    }

    #[tokio::test]
    async fn test_localhost_viewer_gets_fixed_geo_record() {
        // テスト項目: ループバック接続の視聴者には固定の地理情報が付く
        // given (前提条件):
        let f = fixture().await;

        // when (操作):
        f.tracker.client_active(viewer("127.0.0.1")).await;

        // then (期待する結果):
        let viewers = f.tracker.viewers().await;
        assert_eq!(viewers[0].geo, Some(GeoDetails::localhost()));
    }

    #[tokio::test]
    async fn test_message_sent_updates_roster_entry() {
        // テスト項目: 送信したメッセージで名簿の送信数と表示名が更新される
        // given (前提条件):
        let f = fixture().await;
        let entry = viewer("203.0.113.3");
        let id = entry.client_id.clone();
        f.tracker.client_active(entry).await;

        // when (操作):
        let message = ChatMessage::chat("dave", "<p>yo</p>", id, start());
        f.tracker.message_sent(&message).await;

        // then (期待する結果):
        let viewers = f.tracker.viewers().await;
        assert_eq!(viewers[0].message_count, 1);
        assert_eq!(viewers[0].display_name.as_deref(), Some("dave"));
    }
}
