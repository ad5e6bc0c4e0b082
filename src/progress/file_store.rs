//! JSON progress file.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ProgressState, ProgressStore};
use crate::error::StoreError;

/// Progress persisted as pretty-printed JSON, rewritten wholesale on every
/// save through a sibling temp file and a rename.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence_error(&self, reason: impl std::fmt::Display) -> StoreError {
        StoreError::Persistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    async fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = self.temp_path();

        let write_result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if write_result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        write_result?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty())
            && let Ok(dir) = fs::File::open(parent).await
        {
            let _ = dir.sync_all().await;
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    async fn load(&self) -> Result<ProgressState, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No progress file, starting fresh");
                return Ok(ProgressState::new());
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("unreadable: {e}"),
                });
            }
        };

        let state: ProgressState =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        state.validate().map_err(|reason| StoreError::Corrupt {
            path: self.path.clone(),
            reason,
        })?;

        Ok(state)
    }

    async fn save(&self, state: &mut ProgressState) -> Result<(), StoreError> {
        state.last_run_time = Some(Utc::now());
        let json = serde_json::to_string_pretty(state).map_err(|e| self.persistence_error(e))?;
        self.write_atomic(json.as_bytes())
            .await
            .map_err(|e| self.persistence_error(e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
