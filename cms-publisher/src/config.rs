use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use script_host::ScriptHostConfig;
use serde::Serialize;

/// How the store picks the record served for an endpoint identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Highest version among records already published.
    #[default]
    Versioned,
    /// First stored record for the identifier, ignoring version and publish time.
    FirstMatch,
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "versioned" => Ok(Self::Versioned),
            "first_match" | "first-match" => Ok(Self::FirstMatch),
            other => Err(format!("unknown resolution strategy '{other}'")),
        }
    }
}

/// Shape of successful endpoint responses. Applies to every endpoint alike.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseMode {
    #[default]
    Envelope,
    Bare,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "envelope" => Ok(Self::Envelope),
            "bare" => Ok(Self::Bare),
            other => Err(format!("unknown response mode '{other}'")),
        }
    }
}

/// Where generated API documents say endpoint parameters are carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    #[default]
    Header,
    Query,
}

impl FromStr for ParameterLocation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(Self::Header),
            "query" => Ok(Self::Query),
            other => Err(format!("unknown parameter location '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SpecificationConfig {
    pub title: String,
    pub version: String,
    pub server_url: String,
    pub parameter_location: ParameterLocation,
}

impl Default for SpecificationConfig {
    fn default() -> Self {
        Self {
            title: "Script endpoints".to_string(),
            version: "1.0.0".to_string(),
            server_url: "/api".to_string(),
            parameter_location: ParameterLocation::Header,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub store_path: Option<PathBuf>,
    pub resolution: ResolutionStrategy,
    pub response_mode: ResponseMode,
    pub specification: SpecificationConfig,
    pub max_body_bytes: usize,
    pub script_host: ScriptHostConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            store_path: None,
            resolution: ResolutionStrategy::default(),
            response_mode: ResponseMode::default(),
            specification: SpecificationConfig::default(),
            max_body_bytes: 1024 * 1024,
            script_host: ScriptHostConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value '{}' for {}: {}",
            self.value, self.key, self.message
        )
    }
}

impl std::error::Error for ConfigError {}

impl PublisherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let script_defaults = ScriptHostConfig::default();
        let spec_defaults = SpecificationConfig::default();

        Ok(Self {
            addr: parse_value(&lookup, "PUBLISHER_ADDR", defaults.addr)?,
            admin_addr: parse_value(&lookup, "PUBLISHER_ADMIN_ADDR", defaults.admin_addr)?,
            store_path: parse_optional_path(
                &lookup,
                "PUBLISHER_STORE_PATH",
                ".cms-publisher/scripts.json",
            ),
            resolution: parse_value(&lookup, "PUBLISHER_RESOLUTION", defaults.resolution)?,
            response_mode: parse_value(&lookup, "PUBLISHER_RESPONSE_MODE", defaults.response_mode)?,
            specification: SpecificationConfig {
                title: lookup("PUBLISHER_API_TITLE").unwrap_or(spec_defaults.title),
                version: lookup("PUBLISHER_API_VERSION").unwrap_or(spec_defaults.version),
                server_url: lookup("PUBLISHER_SERVER_URL").unwrap_or(spec_defaults.server_url),
                parameter_location: parse_value(
                    &lookup,
                    "PUBLISHER_PARAMETER_LOCATION",
                    spec_defaults.parameter_location,
                )?,
            },
            max_body_bytes: parse_value(
                &lookup,
                "PUBLISHER_MAX_BODY_BYTES",
                defaults.max_body_bytes,
            )?,
            script_host: ScriptHostConfig {
                scripts_dir: lookup("PUBLISHER_SCRIPTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(script_defaults.scripts_dir.clone()),
                max_operations: parse_value(
                    &lookup,
                    "PUBLISHER_SCRIPT_MAX_OPERATIONS",
                    script_defaults.max_operations,
                )?,
                ..script_defaults
            },
        })
    }
}

fn parse_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError {
            key: key.to_string(),
            value,
            message: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_optional_path(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Option<PathBuf> {
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}
