// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable LSN checkpoints.
//!
//! One entry per replicated table: the key is the canonical source table
//! name, the value is the textual LSN in the source's `X/X` form. The
//! engine advances a table's entry only at its durability barriers (end of
//! initial sync, end of promotion), and never backwards.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::lsn::Lsn;

/// Key-value persistence for per-table checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Persist an LSN in its canonical textual form.
    async fn write_lsn(&self, key: &str, lsn: Lsn) -> Result<()> {
        self.write(key, lsn.to_string().as_bytes()).await
    }

    /// Read back a previously persisted LSN.
    async fn read_lsn(&self, key: &str) -> Result<Option<Lsn>> {
        match self.read(key).await? {
            None => Ok(None),
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| EngineError::Checkpoint(format!("non-utf8 value for {key:?}")))?;
                Ok(Some(text.trim().parse()?))
            }
        }
    }
}

/// File-backed checkpoint store: one file per table under a base directory.
///
/// Writes go through a temp file and a rename so a crash mid-write never
/// leaves a torn checkpoint behind.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (and create if needed) the store directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::Checkpoint(format!("failed to create {dir:?}: {e}")))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key);
        let temp = self.dir.join(format!("{key}.tmp"));

        fs::write(&temp, value)
            .await
            .map_err(|e| EngineError::Checkpoint(format!("failed to write {temp:?}: {e}")))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| EngineError::Checkpoint(format!("failed to rename {temp:?}: {e}")))?;

        debug!(key, "checkpoint persisted");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Checkpoint(format!(
                "failed to read checkpoint {key:?}: {e}"
            ))),
        }
    }
}

/// In-memory checkpoint store for tests.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }
}
