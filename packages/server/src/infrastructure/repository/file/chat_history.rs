//! JSON Lines ファイルに保存するチャット履歴 Repository
//!
//! 追記と可視フラグの変更を 1 行ずつ記録する。開くときに記録を再生して
//! メモリ上の履歴を組み立て、可視フラグの変更が含まれていれば
//! 最終状態だけを書き直す。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::{
    domain::{ChatHistoryRepository, ChatMessage, MessageId, RepositoryError},
    infrastructure::{dto::persistence::HistoryRecord, repository::inmemory::HistoryLog},
};

#[derive(Debug)]
struct HistoryFile {
    log: HistoryLog,
    file: File,
}

#[derive(Debug)]
pub struct JsonLinesChatHistoryRepository {
    path: PathBuf,
    inner: Mutex<HistoryFile>,
}

fn storage_error(e: std::io::Error) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

fn encode_line(record: &HistoryRecord) -> Result<Vec<u8>, RepositoryError> {
    let mut line =
        serde_json::to_vec(record).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// 記録を再生し、履歴と可視フラグ変更の有無を返す
fn replay(path: &Path, text: &str) -> Result<(HistoryLog, bool), RepositoryError> {
    let mut log = HistoryLog::default();
    let mut has_updates = false;
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: HistoryRecord = serde_json::from_str(line).map_err(|e| {
            RepositoryError::Serialization(format!(
                "{} line {}: {}",
                path.display(),
                number + 1,
                e
            ))
        })?;
        match record {
            HistoryRecord::Append { message } => {
                if let Err(e) = log.insert(message) {
                    tracing::warn!("Skipping history line {}: {}", number + 1, e);
                }
            }
            HistoryRecord::Visibility { ids, visible } => {
                log.set_visibility(&ids, visible);
                has_updates = true;
            }
        }
    }
    Ok((log, has_updates))
}

impl JsonLinesChatHistoryRepository {
    /// ファイルを開く。存在しなければ空の履歴から始める
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let (log, has_updates) = match tokio::fs::read_to_string(&path).await {
            Ok(text) => replay(&path, &text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No history file at {}, starting fresh", path.display());
                (HistoryLog::default(), false)
            }
            Err(e) => return Err(storage_error(e)),
        };

        if has_updates {
            compact(&path, &log).await?;
        }
        tracing::info!(
            "Loaded {} messages from {}",
            log.all().len(),
            path.display()
        );

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(storage_error)?;
        Ok(Self {
            path,
            inner: Mutex::new(HistoryFile { log, file }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 最終状態の追記記録だけでファイルを書き直す
async fn compact(path: &Path, log: &HistoryLog) -> Result<(), RepositoryError> {
    let mut bytes = Vec::new();
    for message in log.all() {
        bytes.extend(encode_line(&HistoryRecord::Append {
            message: message.clone(),
        })?);
    }
    let temp = path.with_extension("tmp");
    tokio::fs::write(&temp, bytes).await.map_err(storage_error)?;
    tokio::fs::rename(&temp, path).await.map_err(storage_error)
}

async fn write_record(file: &mut File, record: &HistoryRecord) -> Result<(), RepositoryError> {
    let line = encode_line(record)?;
    file.write_all(&line).await.map_err(storage_error)?;
    file.flush().await.map_err(storage_error)
}

#[async_trait]
impl ChatHistoryRepository for JsonLinesChatHistoryRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        if message.ephemeral {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        if inner.log.contains(&message.id) {
            return Err(RepositoryError::DuplicateMessage(message.id));
        }
        let record = HistoryRecord::Append {
            message: message.clone(),
        };
        write_record(&mut inner.file, &record).await?;
        inner.log.insert(message)
    }

    async fn get_by_id(&self, id: &MessageId) -> Result<ChatMessage, RepositoryError> {
        self.inner.lock().await.log.get(id)
    }

    async fn set_visibility(
        &self,
        ids: &[MessageId],
        visible: bool,
    ) -> Result<Vec<MessageId>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let existing: Vec<MessageId> = ids
            .iter()
            .filter(|id| inner.log.contains(id))
            .cloned()
            .collect();
        if existing.is_empty() {
            return Ok(existing);
        }

        let record = HistoryRecord::Visibility {
            ids: existing.clone(),
            visible,
        };
        write_record(&mut inner.file, &record).await?;
        Ok(inner.log.set_visibility(&existing, visible))
    }

    async fn list_visible(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self.inner.lock().await.log.visible())
    }

    async fn list_all(&self) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self.inner.lock().await.log.all().to_vec())
    }
}
