use serde::{Deserialize, Serialize};

/// A resolved name/value pair handed to a script invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiArgument {
    pub key: String,
    pub value: String,
}

impl ApiArgument {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
