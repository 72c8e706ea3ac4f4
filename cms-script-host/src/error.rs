use std::{io, path::PathBuf};

#[derive(Debug)]
pub enum ScriptError {
    Compile(String),
    Execution(String),
    InvalidReference(String),
    FileRead { path: PathBuf, error: io::Error },
    TaskJoin(String),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::Compile(message) => write!(f, "script compilation failed: {message}"),
            ScriptError::Execution(message) => write!(f, "script execution failed: {message}"),
            ScriptError::InvalidReference(reference) => {
                write!(f, "invalid script reference '{reference}'")
            }
            ScriptError::FileRead { path, error } => {
                write!(f, "failed to read script file {}: {error}", path.display())
            }
            ScriptError::TaskJoin(message) => write!(f, "script task failed: {message}"),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::FileRead { error, .. } => Some(error),
            _ => None,
        }
    }
}
