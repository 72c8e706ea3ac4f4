mod argument;
mod config;
mod engine;
mod error;
mod rhai_host;
mod runtime;

pub use argument::ApiArgument;
pub use config::ScriptHostConfig;
pub use engine::create_engine;
pub use error::ScriptError;
pub use rhai_host::RhaiScriptHost;
pub use runtime::{RuntimeStats, ScriptRuntime, SharedScriptRuntime};
