use rhai::Engine;
use tracing::{debug, info};

use crate::ScriptHostConfig;

const DISABLED_SYMBOLS: &[&str] = &["eval", "import", "export"];

/// Builds a sandboxed Rhai engine: resource limits from `config`, no dynamic
/// evaluation or module loading, `print`/`debug` forwarded to tracing.
pub fn create_engine(config: &ScriptHostConfig) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);

    for &symbol in DISABLED_SYMBOLS {
        engine.disable_symbol(symbol);
    }

    engine.on_print(|text| info!(target: "script", "{text}"));
    engine.on_debug(|text, source, position| {
        debug!(
            target: "script",
            source = source.unwrap_or("<inline>"),
            position = %position,
            "{text}"
        );
    });

    engine
}
