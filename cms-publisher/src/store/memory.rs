use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{ScriptRecord, ScriptStore, StoreError, select_effective, select_published};
use crate::config::ResolutionStrategy;

pub const STORE_SCHEMA_VERSION: u32 = 1;

/// On-disk form of the script store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScriptStoreSnapshot {
    #[serde(default = "snapshot_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub scripts: Vec<ScriptRecord>,
}

fn snapshot_schema_version() -> u32 {
    STORE_SCHEMA_VERSION
}

/// Script store held in memory, optionally seeded from a JSON snapshot file.
pub struct MemoryScriptStore {
    records: RwLock<Vec<ScriptRecord>>,
    strategy: ResolutionStrategy,
    snapshot_path: Option<PathBuf>,
}

impl MemoryScriptStore {
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self::with_records(strategy, Vec::new())
    }

    pub fn with_records(strategy: ResolutionStrategy, records: Vec<ScriptRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            strategy,
            snapshot_path: None,
        }
    }

    /// Loads the snapshot at `path`. A missing file starts an empty store.
    pub fn load_from_path(strategy: ResolutionStrategy, path: &Path) -> Result<Self, StoreError> {
        let records = read_snapshot(path)?;
        info!(
            "loaded {} script records from {}",
            records.len(),
            path.display()
        );
        Ok(Self {
            records: RwLock::new(records),
            strategy,
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    pub async fn insert(&self, record: ScriptRecord) {
        self.records.write().await.push(record);
    }

    pub async fn replace_all(&self, records: Vec<ScriptRecord>) {
        *self.records.write().await = records;
    }

    /// Re-reads the snapshot file; on failure the current records stay in place.
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Err(StoreError::Unavailable(
                "store has no snapshot path to reload from".to_string(),
            ));
        };
        let records = read_snapshot_async(path).await?;
        let count = records.len();
        self.replace_all(records).await;
        Ok(count)
    }
}

#[async_trait]
impl ScriptStore for MemoryScriptStore {
    async fn effective_script(&self, endpoint_id: &str) -> Result<Option<ScriptRecord>, StoreError> {
        let guard = self.records.read().await;
        Ok(select_effective(&guard, endpoint_id, self.strategy, Utc::now()).cloned())
    }

    async fn published_scripts(&self) -> Result<Vec<ScriptRecord>, StoreError> {
        let guard = self.records.read().await;
        Ok(select_published(&guard, self.strategy, Utc::now()))
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<ScriptRecord>, StoreError> {
    if !path.exists() {
        warn_missing(path);
        return Ok(Vec::new());
    }
    let data = fs::read(path).map_err(|err| read_error(path, err))?;
    parse_snapshot(path, &data)
}

async fn read_snapshot_async(path: &Path) -> Result<Vec<ScriptRecord>, StoreError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn_missing(path);
        return Ok(Vec::new());
    }
    let data = tokio::fs::read(path)
        .await
        .map_err(|err| read_error(path, err))?;
    parse_snapshot(path, &data)
}

fn warn_missing(path: &Path) {
    warn!(
        "script store snapshot path={} does not exist; starting empty",
        path.display()
    );
}

fn read_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("failed to read {}: {err}", path.display()))
}

fn parse_snapshot(path: &Path, data: &[u8]) -> Result<Vec<ScriptRecord>, StoreError> {
    let snapshot = serde_json::from_slice::<ScriptStoreSnapshot>(data)
        .map_err(|err| StoreError::Snapshot(format!("{}: {err}", path.display())))?;
    if snapshot.schema_version != STORE_SCHEMA_VERSION {
        return Err(StoreError::Snapshot(format!(
            "{}: unsupported schema_version={}",
            path.display(),
            snapshot.schema_version
        )));
    }
    Ok(snapshot.scripts)
}
