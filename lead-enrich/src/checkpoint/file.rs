//! JSON file checkpoint store
//!
//! `{dir}/{batch_id}.json`, replaced atomically on every save.

use super::{CheckpointState, CheckpointStore};
use async_trait::async_trait;
use lead_common::config::write_atomic;
use lead_common::{Error, Result};
use std::path::{Path, PathBuf};

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for a batch id
    pub fn path_for(&self, batch_id: &str) -> Result<PathBuf> {
        let safe = !batch_id.is_empty()
            && !batch_id.starts_with('.')
            && batch_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(Error::InvalidInput(format!("Invalid batch id: {:?}", batch_id)));
        }
        Ok(self.dir.join(format!("{}.json", batch_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, batch_id: &str) -> Result<Option<CheckpointState>> {
        let path = self.path_for(batch_id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_str(&text)
            .map_err(|e| Error::Internal(format!("Failed to parse checkpoint {}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    async fn save(&self, state: &CheckpointState) -> Result<()> {
        let path = self.path_for(&state.batch_id)?;
        let bytes = serde_json::to_vec_pretty(state)?;

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| Error::Internal(format!("Checkpoint writer panicked: {}", e)))?
    }
}
