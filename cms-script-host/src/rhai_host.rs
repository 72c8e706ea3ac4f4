//! Rhai-backed [`ScriptRuntime`].
//!
//! Compiled ASTs are cached per cache key together with a SHA-256 fingerprint of
//! the source they were built from. A key hit with a different fingerprint
//! recompiles and replaces the entry.

use std::{
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use rhai::{AST, Array, Dynamic, Engine, Map, Scope};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    ApiArgument, RuntimeStats, ScriptError, ScriptHostConfig, ScriptRuntime, create_engine,
};

type Fingerprint = [u8; 32];

/// One cache entry. The cell is filled by whichever caller compiles first;
/// concurrent callers for the same key and source wait on it.
struct CacheSlot {
    fingerprint: Fingerprint,
    ast: OnceCell<Arc<AST>>,
}

enum ScriptInput {
    Named(Vec<ApiArgument>),
    Positional(Option<Vec<String>>),
}

#[derive(Default)]
struct HostMetrics {
    compilations_total: AtomicU64,
    cache_hits_total: AtomicU64,
    restarts_total: AtomicU64,
}

pub struct RhaiScriptHost {
    engine: Arc<Engine>,
    config: ScriptHostConfig,
    source_cache: DashMap<String, Arc<CacheSlot>>,
    file_cache: DashMap<String, Arc<CacheSlot>>,
    metrics: HostMetrics,
}

impl RhaiScriptHost {
    pub fn new(config: ScriptHostConfig) -> Self {
        let engine = create_engine(&config);
        Self {
            engine: Arc::new(engine),
            config,
            source_cache: DashMap::new(),
            file_cache: DashMap::new(),
            metrics: HostMetrics::default(),
        }
    }

    fn fingerprint(source: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.finalize().into()
    }

    async fn compile(&self, source: &str) -> Result<Arc<AST>, ScriptError> {
        let engine = self.engine.clone();
        let source = source.to_string();
        let ast = tokio::task::spawn_blocking(move || engine.compile(source))
            .await
            .map_err(|err| ScriptError::TaskJoin(err.to_string()))?
            .map_err(|err| ScriptError::Compile(err.to_string()))?;
        self.metrics
            .compilations_total
            .fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(ast))
    }

    /// Returns the slot for `key` built from `fingerprint`, replacing a slot
    /// left behind by different source.
    fn slot_for(
        cache: &DashMap<String, Arc<CacheSlot>>,
        key: &str,
        fingerprint: Fingerprint,
    ) -> Arc<CacheSlot> {
        let fresh = || {
            Arc::new(CacheSlot {
                fingerprint,
                ast: OnceCell::new(),
            })
        };
        match cache.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().fingerprint != fingerprint {
                    entry.insert(fresh());
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(fresh()).value().clone(),
        }
    }

    async fn cached_or_compile(
        &self,
        cache: &DashMap<String, Arc<CacheSlot>>,
        key: &str,
        source: &str,
    ) -> Result<Arc<AST>, ScriptError> {
        let slot = Self::slot_for(cache, key, Self::fingerprint(source));
        let compiled_here = AtomicBool::new(false);
        let result = slot
            .ast
            .get_or_try_init(|| async {
                compiled_here.store(true, Ordering::Relaxed);
                debug!(cache_key = key, "compiling script");
                self.compile(source).await
            })
            .await
            .cloned();

        match &result {
            Ok(_) if !compiled_here.load(Ordering::Relaxed) => {
                self.metrics.cache_hits_total.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(_) => {
                cache.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
            }
        }
        result
    }

    fn resolve_reference(&self, reference: &str) -> Result<PathBuf, ScriptError> {
        let file_name = format!("{reference}.{}", self.config.file_extension);
        let relative = Path::new(&file_name);
        let mut components = relative.components();
        let is_plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if reference.trim().is_empty() || !is_plain_name || reference.contains("..") {
            return Err(ScriptError::InvalidReference(reference.to_string()));
        }
        Ok(self.config.scripts_dir.join(relative))
    }

    async fn evaluate(&self, ast: Arc<AST>, input: ScriptInput) -> Result<String, ScriptError> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            let mut scope = build_scope(input);
            let value = engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
                .map_err(|err| ScriptError::Execution(err.to_string()))?;
            Ok(render_value(value))
        })
        .await
        .map_err(|err| ScriptError::TaskJoin(err.to_string()))?
    }
}

#[async_trait]
impl ScriptRuntime for RhaiScriptHost {
    async fn run_from_source(
        &self,
        code: &str,
        cache_key: Option<&str>,
        args: &[ApiArgument],
    ) -> Result<String, ScriptError> {
        let ast = match cache_key {
            Some(key) => self.cached_or_compile(&self.source_cache, key, code).await?,
            None => self.compile(code).await?,
        };
        self.evaluate(ast, ScriptInput::Named(args.to_vec())).await
    }

    async fn run_from_reference(
        &self,
        reference: &str,
        args: Option<Vec<String>>,
    ) -> Result<String, ScriptError> {
        let path = self.resolve_reference(reference)?;
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|error| ScriptError::FileRead {
                path: path.clone(),
                error,
            })?;
        let ast = self
            .cached_or_compile(&self.file_cache, reference, &source)
            .await?;
        self.evaluate(ast, ScriptInput::Positional(args)).await
    }

    fn restart(&self) {
        self.source_cache.clear();
        self.file_cache.clear();
        self.metrics.restarts_total.fetch_add(1, Ordering::Relaxed);
        debug!("script host restarted; compiled scripts dropped");
    }

    fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            compilations_total: self.metrics.compilations_total.load(Ordering::Relaxed),
            cache_hits_total: self.metrics.cache_hits_total.load(Ordering::Relaxed),
            cached_scripts: self.source_cache.len() + self.file_cache.len(),
            restarts_total: self.metrics.restarts_total.load(Ordering::Relaxed),
        }
    }
}

fn build_scope(input: ScriptInput) -> Scope<'static> {
    let mut scope = Scope::new();
    match input {
        ScriptInput::Named(args) => {
            let mut list = Array::with_capacity(args.len());
            let mut params = Map::new();
            for arg in args {
                let mut entry = Map::new();
                entry.insert("key".into(), Dynamic::from(arg.key.clone()));
                entry.insert("value".into(), Dynamic::from(arg.value.clone()));
                list.push(Dynamic::from(entry));
                params.insert(arg.key.as_str().into(), Dynamic::from(arg.value));
            }
            scope.push("args", list);
            scope.push("params", params);
        }
        ScriptInput::Positional(Some(values)) => {
            let list = values.into_iter().map(Dynamic::from).collect::<Array>();
            scope.push("args", list);
        }
        ScriptInput::Positional(None) => {
            scope.push("args", ());
        }
    }
    scope
}

fn render_value(value: Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if value.is_string() {
        return value.into_string().unwrap_or_default();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn host() -> RhaiScriptHost {
        RhaiScriptHost::new(ScriptHostConfig::default())
    }

    fn host_with_dir(dir: &Path) -> RhaiScriptHost {
        RhaiScriptHost::new(ScriptHostConfig {
            scripts_dir: dir.to_path_buf(),
            ..ScriptHostConfig::default()
        })
    }

    #[tokio::test]
    async fn body_script_sees_named_arguments_in_order() {
        let host = host();
        let args = vec![ApiArgument::new("a", "hello"), ApiArgument::new("b", "abc")];
        let output = host
            .run_from_source(
                r#"
                let keys = "";
                for arg in args { keys += arg.key; }
                keys + ":" + params.a + "-" + params.b
                "#,
                Some("k1"),
                &args,
            )
            .await
            .expect("script should run");
        assert_eq!(output, "ab:hello-abc");
    }

    #[tokio::test]
    async fn same_cache_key_reuses_compiled_script() {
        let host = host();
        for _ in 0..3 {
            let output = host
                .run_from_source("\"ok\"", Some("2024-01-01T00:00:00Z"), &[])
                .await
                .expect("script should run");
            assert_eq!(output, "ok");
        }
        let stats = host.stats();
        assert_eq!(stats.compilations_total, 1);
        assert_eq!(stats.cache_hits_total, 2);
        assert_eq!(stats.cached_scripts, 1);
    }

    #[tokio::test]
    async fn changed_cache_key_forces_recompile() {
        let host = host();
        host.run_from_source("1 + 1", Some("v1"), &[])
            .await
            .expect("first run");
        host.run_from_source("1 + 1", Some("v2"), &[])
            .await
            .expect("second run");
        assert_eq!(host.stats().compilations_total, 2);
    }

    #[tokio::test]
    async fn shared_key_with_different_body_never_runs_stale_code() {
        let host = host();
        let first = host
            .run_from_source("\"first\"", Some("same"), &[])
            .await
            .expect("first run");
        let second = host
            .run_from_source("\"second\"", Some("same"), &[])
            .await
            .expect("second run");
        assert_eq!(first, "first");
        assert_eq!(second, "second");
        assert_eq!(host.stats().compilations_total, 2);
    }

    #[tokio::test]
    async fn missing_cache_key_never_caches() {
        let host = host();
        host.run_from_source("40 + 2", None, &[])
            .await
            .expect("first run");
        let output = host
            .run_from_source("40 + 2", None, &[])
            .await
            .expect("second run");
        assert_eq!(output, "42");
        let stats = host.stats();
        assert_eq!(stats.compilations_total, 2);
        assert_eq!(stats.cache_hits_total, 0);
        assert_eq!(stats.cached_scripts, 0);
    }

    #[tokio::test]
    async fn restart_drops_compiled_scripts() {
        let host = host();
        host.run_from_source("1", Some("k"), &[])
            .await
            .expect("first run");
        host.restart();
        assert_eq!(host.stats().cached_scripts, 0);
        host.run_from_source("1", Some("k"), &[])
            .await
            .expect("run after restart");
        let stats = host.stats();
        assert_eq!(stats.compilations_total, 2);
        assert_eq!(stats.restarts_total, 1);
    }

    #[tokio::test]
    async fn unit_result_renders_as_empty_string() {
        let output = host()
            .run_from_source("let x = 1;", None, &[])
            .await
            .expect("script should run");
        assert_eq!(output, "");
    }

    #[tokio::test]
    async fn syntax_error_is_a_compile_error() {
        let err = host()
            .run_from_source("let x = ;", Some("bad"), &[])
            .await
            .expect_err("script should not compile");
        assert!(matches!(err, ScriptError::Compile(_)), "{err}");
    }

    #[tokio::test]
    async fn failed_compile_leaves_no_cache_entry() {
        let host = host();
        host.run_from_source("let x = ;", Some("k"), &[])
            .await
            .expect_err("script should not compile");
        assert_eq!(host.stats().cached_scripts, 0);

        let output = host
            .run_from_source("\"fixed\"", Some("k"), &[])
            .await
            .expect("corrected script should run");
        assert_eq!(output, "fixed");
        assert_eq!(host.stats().cached_scripts, 1);
    }

    #[tokio::test]
    async fn thrown_error_is_an_execution_error() {
        let err = host()
            .run_from_source("throw \"boom\";", None, &[])
            .await
            .expect_err("script should fail");
        assert!(matches!(err, ScriptError::Execution(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn runaway_script_hits_operation_limit() {
        let host = RhaiScriptHost::new(ScriptHostConfig {
            max_operations: 1_000,
            ..ScriptHostConfig::default()
        });
        let err = host
            .run_from_source("let x = 0; loop { x += 1; }", None, &[])
            .await
            .expect_err("script should be stopped");
        assert!(matches!(err, ScriptError::Execution(_)));
    }

    #[tokio::test]
    async fn file_script_receives_positional_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("greet.rhai"),
            "if type_of(args) == \"()\" { \"none\" } else { `count=${args.len()}` }",
        )
        .expect("write script");
        let host = host_with_dir(dir.path());

        let without = host
            .run_from_reference("greet", None)
            .await
            .expect("run without args");
        let empty = host
            .run_from_reference("greet", Some(Vec::new()))
            .await
            .expect("run with empty args");
        let two = host
            .run_from_reference("greet", Some(vec!["a".into(), "b".into()]))
            .await
            .expect("run with args");

        assert_eq!(without, "none");
        assert_eq!(empty, "count=0");
        assert_eq!(two, "count=2");
        assert_eq!(host.stats().compilations_total, 1);
    }

    #[tokio::test]
    async fn edited_file_is_recompiled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sum.rhai");
        fs::write(&path, "1").expect("write script");
        let host = host_with_dir(dir.path());
        assert_eq!(
            host.run_from_reference("sum", None).await.expect("first"),
            "1"
        );
        fs::write(&path, "2").expect("rewrite script");
        assert_eq!(
            host.run_from_reference("sum", None).await.expect("second"),
            "2"
        );
        assert_eq!(host.stats().compilations_total, 2);
    }

    #[tokio::test]
    async fn reference_cannot_escape_scripts_dir() {
        let host = host();
        for reference in ["", "../secret", "nested/greet", ".."] {
            let err = host
                .run_from_reference(reference, None)
                .await
                .expect_err("reference should be rejected");
            assert!(
                matches!(err, ScriptError::InvalidReference(_)),
                "{reference}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn missing_file_reports_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = host_with_dir(dir.path())
            .run_from_reference("absent", None)
            .await
            .expect_err("file should be missing");
        assert!(matches!(err, ScriptError::FileRead { .. }));
    }
}
