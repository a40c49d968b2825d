//! Dependency wiring shared by the binary and the integration tests.

use std::{path::PathBuf, sync::Arc};

use castchat_shared::time::{Clock, SystemClock};
use thiserror::Error;

use crate::{
    domain::{ChatHistoryRepository, RepositoryError, StatsRepository},
    infrastructure::{
        config::{ChatConfigError, ChatSettings, RuntimeChatConfig},
        geo::CachingGeoResolver,
        repository::{
            InMemoryChatHistoryRepository, InMemoryStatsRepository, JsonFileStatsRepository,
            JsonLinesChatHistoryRepository,
        },
        sanitizer::MarkdownRenderer,
        webhook::TracingWebhookDispatcher,
    },
    ui::{Server, state::AppState},
    usecase::{
        ChatHub, GetChatHistoryUseCase, HubDependencies, HubSettings, ListViewersUseCase,
        MessagePipeline, PresenceTracker, RateLimitSettings, SendSystemMessageUseCase,
        SetMessageVisibilityUseCase, presence::CHECKPOINT_PERIOD,
        rate_limiter::RateLimitConfigError,
    },
};

/// Startup configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub chat: ChatSettings,
    pub rate_limit: RateLimitSettings,
    pub hub: HubSettings,
    /// JSON file for durable stats; stats live in memory when absent
    pub stats_file: Option<PathBuf>,
    /// JSON Lines file for durable chat history; history lives in memory when absent
    pub history_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid chat config: {0}")]
    Config(#[from] ChatConfigError),

    #[error("invalid rate limit: {0}")]
    RateLimit(#[from] RateLimitConfigError),

    #[error("failed to open stats store: {0}")]
    Stats(RepositoryError),

    #[error("failed to open history store: {0}")]
    History(RepositoryError),
}

/// Build every component and return a server ready to run
///
/// Background tasks (hub, heartbeat, stats checkpoint) are started here.
pub async fn build_server(config: ServerConfig) -> Result<Server, StartupError> {
    config.chat.validate()?;
    let quota = config.rate_limit.quota()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 1. Repositories
    let history: Arc<dyn ChatHistoryRepository> = match &config.history_file {
        Some(path) => {
            let repository = JsonLinesChatHistoryRepository::open(path.clone())
                .await
                .map_err(StartupError::History)?;
            tracing::info!("Chat history is saved to {}", repository.path().display());
            Arc::new(repository)
        }
        None => Arc::new(InMemoryChatHistoryRepository::new()),
    };
    let stats: Arc<dyn StatsRepository> = match &config.stats_file {
        Some(path) => {
            let repository = JsonFileStatsRepository::open(path.clone())
                .await
                .map_err(StartupError::Stats)?;
            tracing::info!("Stats are saved to {}", repository.path().display());
            Arc::new(repository)
        }
        None => Arc::new(InMemoryStatsRepository::default()),
    };

    // 2. Collaborators
    let chat_config = Arc::new(RuntimeChatConfig::new(config.chat));
    let renderer = Arc::new(MarkdownRenderer::new());
    let presence = PresenceTracker::load(
        stats,
        Arc::new(CachingGeoResolver::disabled()),
        chat_config.clone(),
        clock.clone(),
    )
    .await;
    presence.spawn_checkpoint(CHECKPOINT_PERIOD);

    // 3. Hub
    let (hub, _hub_task) = ChatHub::spawn(
        HubDependencies {
            config: chat_config.clone(),
            listener: Arc::new(presence.clone()),
            history: history.clone(),
            webhooks: Arc::new(TracingWebhookDispatcher),
            clock: clock.clone(),
        },
        config.hub,
    );

    // 4. UseCases
    let pipeline = Arc::new(MessagePipeline::new(renderer.clone(), clock.clone()));
    let set_message_visibility_usecase =
        Arc::new(SetMessageVisibilityUseCase::new(history.clone(), hub.clone()));
    let get_chat_history_usecase = Arc::new(GetChatHistoryUseCase::new(history));
    let list_viewers_usecase = Arc::new(ListViewersUseCase::new(presence.clone(), hub.clone()));
    let send_system_message_usecase = Arc::new(SendSystemMessageUseCase::new(
        hub.clone(),
        chat_config.clone(),
        renderer,
        clock.clone(),
    ));

    Ok(Server::new(AppState {
        hub,
        pipeline,
        rate_limit: quota,
        clock,
        config: chat_config,
        presence,
        set_message_visibility_usecase,
        get_chat_history_usecase,
        list_viewers_usecase,
        send_system_message_usecase,
    }))
}
