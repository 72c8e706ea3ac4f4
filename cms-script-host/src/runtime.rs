use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{ApiArgument, ScriptError};

pub type SharedScriptRuntime = Arc<dyn ScriptRuntime>;

/// Compiles and runs endpoint scripts.
///
/// Compiled forms may be reused across calls that present the same cache key.
/// Nothing survives [`ScriptRuntime::restart`], so callers must never rely on a
/// warm cache.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Runs an inline script body. `cache_key = None` disables reuse.
    async fn run_from_source(
        &self,
        code: &str,
        cache_key: Option<&str>,
        args: &[ApiArgument],
    ) -> Result<String, ScriptError>;

    /// Runs a pre-deployed script identified by `reference`.
    ///
    /// `None` means the caller had no arguments to offer at all, which scripts
    /// can tell apart from an empty list.
    async fn run_from_reference(
        &self,
        reference: &str,
        args: Option<Vec<String>>,
    ) -> Result<String, ScriptError>;

    fn restart(&self);

    fn stats(&self) -> RuntimeStats;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub compilations_total: u64,
    pub cache_hits_total: u64,
    pub cached_scripts: usize,
    pub restarts_total: u64,
}
