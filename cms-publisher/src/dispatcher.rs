use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use script_host::{ApiArgument, ScriptError, SharedScriptRuntime};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    arguments::{ExtractError, InboundRequest, extract_arguments},
    input_vars::{InputVarDefinition, InputVarError},
    logging::category_endpoint,
    result::ApiResult,
    store::{ScriptRecord, SharedScriptStore, StoreError},
};

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// No endpoint identifier was given; nothing was looked up.
    Default,
    NotFound,
    Envelope(ApiResult),
}

/// Failures before the script runs. These are reported against the endpoint
/// identifier rather than as script output.
#[derive(Debug)]
pub enum DispatchError {
    Store(StoreError),
    InputVars(InputVarError),
    Extract(ExtractError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Store(err) => write!(f, "{err}"),
            DispatchError::InputVars(err) => write!(f, "{err}"),
            DispatchError::Extract(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        DispatchError::Store(err)
    }
}

impl From<InputVarError> for DispatchError {
    fn from(err: InputVarError) -> Self {
        DispatchError::InputVars(err)
    }
}

impl From<ExtractError> for DispatchError {
    fn from(err: ExtractError) -> Self {
        DispatchError::Extract(err)
    }
}

#[derive(Default)]
struct DispatchMetrics {
    requests_total: AtomicU64,
    not_found_total: AtomicU64,
    executions_ok_total: AtomicU64,
    executions_error_total: AtomicU64,
    dispatch_errors_total: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchMetricsSnapshot {
    pub requests_total: u64,
    pub not_found_total: u64,
    pub executions_ok_total: u64,
    pub executions_error_total: u64,
    pub dispatch_errors_total: u64,
}

struct PreparedInvocation {
    script: ScriptRecord,
    arguments: Option<Vec<ApiArgument>>,
}

#[derive(Clone)]
pub struct EndpointDispatcher {
    store: SharedScriptStore,
    runtime: SharedScriptRuntime,
    metrics: Arc<DispatchMetrics>,
}

impl EndpointDispatcher {
    pub fn new(store: SharedScriptStore, runtime: SharedScriptRuntime) -> Self {
        Self {
            store,
            runtime,
            metrics: Arc::new(DispatchMetrics::default()),
        }
    }

    pub fn store(&self) -> &SharedScriptStore {
        &self.store
    }

    pub fn runtime(&self) -> &SharedScriptRuntime {
        &self.runtime
    }

    pub fn metrics(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            requests_total: self.metrics.requests_total.load(Ordering::Relaxed),
            not_found_total: self.metrics.not_found_total.load(Ordering::Relaxed),
            executions_ok_total: self.metrics.executions_ok_total.load(Ordering::Relaxed),
            executions_error_total: self.metrics.executions_error_total.load(Ordering::Relaxed),
            dispatch_errors_total: self.metrics.dispatch_errors_total.load(Ordering::Relaxed),
        }
    }

    /// Resolves, prepares and runs the script behind `endpoint_id`.
    ///
    /// Never fails: every error becomes a failure envelope.
    pub async fn handle(&self, endpoint_id: &str, request: &InboundRequest) -> DispatchOutcome {
        if endpoint_id.trim().is_empty() {
            return DispatchOutcome::Default;
        }
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        let prepared = match self.prepare(endpoint_id, request).await {
            Ok(Some(prepared)) => prepared,
            Ok(None) => {
                self.metrics.not_found_total.fetch_add(1, Ordering::Relaxed);
                info!(
                    "{} no published script for endpoint={endpoint_id}",
                    category_endpoint()
                );
                return DispatchOutcome::NotFound;
            }
            Err(err) => {
                self.metrics
                    .dispatch_errors_total
                    .fetch_add(1, Ordering::Relaxed);
                error!(
                    "{} failed to prepare endpoint={endpoint_id}: {err}",
                    category_endpoint()
                );
                let result = ApiResult::failure(format!("Error: {endpoint_id}."))
                    .with_error(endpoint_id, err.to_string());
                return DispatchOutcome::Envelope(result);
            }
        };

        match self.invoke(&prepared).await {
            Ok(output) => {
                self.metrics
                    .executions_ok_total
                    .fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Envelope(ApiResult::success(output))
            }
            Err(err) => {
                self.metrics
                    .executions_error_total
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    "{} script for endpoint={endpoint_id} version={} failed: {err}",
                    category_endpoint(),
                    prepared.script.version
                );
                DispatchOutcome::Envelope(ApiResult::failure(err.to_string()))
            }
        }
    }

    async fn prepare(
        &self,
        endpoint_id: &str,
        request: &InboundRequest,
    ) -> Result<Option<PreparedInvocation>, DispatchError> {
        let Some(script) = self.store.effective_script(endpoint_id).await? else {
            return Ok(None);
        };
        let definitions = InputVarDefinition::parse_all(&script.input_vars)?;
        let arguments = extract_arguments(request, &definitions).await?;
        Ok(Some(PreparedInvocation { script, arguments }))
    }

    async fn invoke(&self, prepared: &PreparedInvocation) -> Result<String, ScriptError> {
        let script = &prepared.script;
        if script.code.trim().is_empty() {
            let values = prepared.arguments.as_ref().map(|arguments| {
                arguments
                    .iter()
                    .map(|argument| argument.value.clone())
                    .collect::<Vec<_>>()
            });
            return self
                .runtime
                .run_from_reference(&script.endpoint_id, values)
                .await;
        }

        let cache_key = script.cache_key();
        let arguments = prepared.arguments.as_deref().unwrap_or_default();
        self.runtime
            .run_from_source(&script.code, Some(&cache_key), arguments)
            .await
    }
}
