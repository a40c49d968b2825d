//! JSON ファイルに保存する統計 Repository
//!
//! 値はメモリ上に保持し、更新のたびにファイル全体を書き直す。
//! 書き込みは一時ファイルへの書き込みとリネームで行う。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    domain::{RepositoryError, StatsRepository},
    infrastructure::dto::persistence::StatsRecord,
};

#[derive(Debug)]
pub struct JsonFileStatsRepository {
    path: PathBuf,
    record: Mutex<StatsRecord>,
}

impl JsonFileStatsRepository {
    /// ファイルを開く。存在しなければ空の統計から始める
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let record = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No stats file at {}, starting fresh", path.display());
                StatsRecord::default()
            }
            Err(e) => return Err(RepositoryError::Storage(e.to_string())),
        };
        Ok(Self {
            path,
            record: Mutex::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update(&self, apply: impl FnOnce(&mut StatsRecord)) -> Result<(), RepositoryError> {
        let mut record = self.record.lock().await;
        apply(&mut record);
        let bytes = serde_json::to_vec_pretty(&*record)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let temp = self.path.with_extension("tmp");
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))
    }
}

#[async_trait]
impl StatsRepository for JsonFileStatsRepository {
    async fn peak_session_viewer_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.record.lock().await.peak_session_viewer_count)
    }

    async fn set_peak_session_viewer_count(&self, count: u64) -> Result<(), RepositoryError> {
        self.update(|r| r.peak_session_viewer_count = count).await
    }

    async fn peak_overall_viewer_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.record.lock().await.peak_overall_viewer_count)
    }

    async fn set_peak_overall_viewer_count(&self, count: u64) -> Result<(), RepositoryError> {
        self.update(|r| r.peak_overall_viewer_count = count).await
    }

    async fn last_disconnect_time(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.record.lock().await.last_disconnect_time)
    }

    async fn set_last_disconnect_time(&self, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.update(|r| r.last_disconnect_time = Some(at)).await
    }
}
