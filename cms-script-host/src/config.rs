use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ScriptHostConfig {
    /// Directory holding pre-deployed scripts invoked by reference.
    pub scripts_dir: PathBuf,
    pub file_extension: String,
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
}

impl Default for ScriptHostConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            file_extension: "rhai".to_string(),
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
        }
    }
}
