//! インメモリの統計 Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    domain::{RepositoryError, StatsRepository},
    infrastructure::dto::persistence::StatsRecord,
};

#[derive(Debug, Default)]
pub struct InMemoryStatsRepository {
    record: RwLock<StatsRecord>,
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn peak_session_viewer_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.record.read().await.peak_session_viewer_count)
    }

    async fn set_peak_session_viewer_count(&self, count: u64) -> Result<(), RepositoryError> {
        self.record.write().await.peak_session_viewer_count = count;
        Ok(())
    }

    async fn peak_overall_viewer_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.record.read().await.peak_overall_viewer_count)
    }

    async fn set_peak_overall_viewer_count(&self, count: u64) -> Result<(), RepositoryError> {
        self.record.write().await.peak_overall_viewer_count = count;
        Ok(())
    }

    async fn last_disconnect_time(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.record.read().await.last_disconnect_time)
    }

    async fn set_last_disconnect_time(&self, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.record.write().await.last_disconnect_time = Some(at);
        Ok(())
    }
}
