//! Script records and the read-only store contract the dispatcher consumes.

mod memory;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ResolutionStrategy;

pub use memory::{MemoryScriptStore, STORE_SCHEMA_VERSION, ScriptStoreSnapshot};

pub type SharedScriptStore = Arc<dyn ScriptStore>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub endpoint_id: String,
    pub version: u32,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    /// Empty means the body lives in a pre-deployed file named after the endpoint.
    #[serde(default)]
    pub code: String,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_vars: Vec<String>,
}

impl ScriptRecord {
    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        self.published.is_some_and(|published| published <= now)
    }

    /// Fingerprint of this record's content version, used to key compiled scripts.
    pub fn cache_key(&self) -> String {
        self.updated.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Unavailable(String),
    Snapshot(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(message) => write!(f, "script store unavailable: {message}"),
            StoreError::Snapshot(message) => write!(f, "invalid script store snapshot: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// The record currently served for `endpoint_id`; `Ok(None)` when none is.
    async fn effective_script(&self, endpoint_id: &str) -> Result<Option<ScriptRecord>, StoreError>;

    /// One published record per endpoint, ordered by endpoint identifier.
    async fn published_scripts(&self) -> Result<Vec<ScriptRecord>, StoreError>;
}

/// Picks the record served for `endpoint_id` out of `records`.
pub fn select_effective<'a>(
    records: &'a [ScriptRecord],
    endpoint_id: &str,
    strategy: ResolutionStrategy,
    now: DateTime<Utc>,
) -> Option<&'a ScriptRecord> {
    let mut candidates = records
        .iter()
        .filter(|record| record.endpoint_id == endpoint_id);
    match strategy {
        ResolutionStrategy::Versioned => candidates
            .filter(|record| record.is_published_at(now))
            .max_by_key(|record| record.version),
        ResolutionStrategy::FirstMatch => candidates.next(),
    }
}

/// The records `select_effective` would serve, one per endpoint, kept only
/// when published and sorted by identifier.
pub fn select_published(
    records: &[ScriptRecord],
    strategy: ResolutionStrategy,
    now: DateTime<Utc>,
) -> Vec<ScriptRecord> {
    let mut selected: BTreeMap<&str, &ScriptRecord> = BTreeMap::new();
    for record in records {
        let endpoint_id = record.endpoint_id.as_str();
        match strategy {
            ResolutionStrategy::Versioned => {
                if !record.is_published_at(now) {
                    continue;
                }
                let replace = selected
                    .get(endpoint_id)
                    .is_none_or(|current| record.version > current.version);
                if replace {
                    selected.insert(endpoint_id, record);
                }
            }
            ResolutionStrategy::FirstMatch => {
                selected.entry(endpoint_id).or_insert(record);
            }
        }
    }
    selected
        .into_values()
        .filter(|record| record.is_published_at(now))
        .cloned()
        .collect()
}
