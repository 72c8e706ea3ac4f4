use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Response envelope returned by script endpoints.
///
/// `is_success` is `false` for every failure path, including script errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult {
    date_time_stamp: DateTime<Utc>,
    pub return_data: String,
    pub is_success: bool,
    #[serde(default)]
    pub errors: IndexMap<String, String>,
}

impl ApiResult {
    fn new(return_data: String, is_success: bool) -> Self {
        Self {
            date_time_stamp: Utc::now(),
            return_data,
            is_success,
            errors: IndexMap::new(),
        }
    }

    pub fn success(return_data: impl Into<String>) -> Self {
        Self::new(return_data.into(), true)
    }

    pub fn failure(return_data: impl Into<String>) -> Self {
        Self::new(return_data.into(), false)
    }

    pub fn with_error(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.insert(key.into(), message.into());
        self
    }

    pub fn date_time_stamp(&self) -> DateTime<Utc> {
        self.date_time_stamp
    }
}
