//! Completed test persistence.
//!
//! Each finished leak test is written once, as a standalone pretty-printed
//! JSON document named after its end time (`test_YYYYMMDD_HHMMSS.json`, local
//! time). Nothing is ever read back by the service.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use pool_core::session::CompletedTest;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for completed test records.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist one record, returning where it went.
    async fn save(&self, record: &CompletedTest) -> AppResult<PathBuf>;
}

/// Writes one JSON file per completed test into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `test_YYYYMMDD_HHMMSS.json` for an epoch timestamp, in local time.
    pub fn file_name_for(end_time: f64) -> String {
        let secs = end_time.floor() as i64;
        let stamp = DateTime::<Utc>::from_timestamp(secs, 0)
            .unwrap_or_default()
            .with_timezone(&Local)
            .format("%Y%m%d_%H%M%S");
        format!("test_{}.json", stamp)
    }

    async fn path_for(&self, record: &CompletedTest) -> PathBuf {
        let path = self.data_dir.join(Self::file_name_for(record.end_time));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return path;
        }
        // Two tests finishing in the same second: keep both.
        let id = record.session_id.simple().to_string();
        let stem = Self::file_name_for(record.end_time).replace(".json", "");
        self.data_dir
            .join(format!("{}_{}.json", stem, &id[..8]))
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save(&self, record: &CompletedTest) -> AppResult<PathBuf> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|source| AppError::Storage {
                path: self.data_dir.clone(),
                source,
            })?;

        let path = self.path_for(record).await;
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| AppError::Storage {
                path: path.clone(),
                source,
            })?;

        info!(
            session_id = %record.session_id,
            path = %path.display(),
            readings = record.readings_count,
            "Test saved"
        );
        Ok(path)
    }
}
