//! Configuration management for the listmatch server

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::MAX_REQUEST_HASHES;
use crate::upload::{StoreLimits, MAX_QUERIES_PER_UPLOAD, MAX_TOTAL_HASHES, UPLOAD_RETENTION};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Path both endpoints are mounted under, always starting and ending in `/`
    pub path_prefix: String,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_request_hashes: usize,
    pub max_total_hashes: usize,
    pub max_queries_per_upload: usize,
    pub retention: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                path_prefix: "/".to_string(),
            },
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_request_hashes: MAX_REQUEST_HASHES,
            max_total_hashes: MAX_TOTAL_HASHES,
            max_queries_per_upload: MAX_QUERIES_PER_UPLOAD,
            retention: UPLOAD_RETENTION,
        }
    }
}

impl LimitsConfig {
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_total_hashes: self.max_total_hashes,
            max_queries_per_upload: self.max_queries_per_upload,
            retention: self.retention,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build the configuration from any variable source
    ///
    /// A malformed value is an error, never a silent fallback: the path
    /// prefix is what keeps the endpoints private.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LimitsConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var(&lookup, "SERVER_PORT", 8080)?,
                path_prefix: normalize_prefix(
                    &lookup("LISTMATCH_PATH_PREFIX").unwrap_or_else(|| "/".to_string()),
                ),
            },
            limits: LimitsConfig {
                max_request_hashes: parse_var(
                    &lookup,
                    "LISTMATCH_MAX_REQUEST_HASHES",
                    defaults.max_request_hashes,
                )?,
                max_total_hashes: parse_var(
                    &lookup,
                    "LISTMATCH_MAX_TOTAL_HASHES",
                    defaults.max_total_hashes,
                )?,
                max_queries_per_upload: parse_var(
                    &lookup,
                    "LISTMATCH_MAX_QUERIES_PER_UPLOAD",
                    defaults.max_queries_per_upload,
                )?,
                retention: Duration::from_secs(parse_var(
                    &lookup,
                    "LISTMATCH_RETENTION_SECS",
                    defaults.retention.as_secs(),
                )?),
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Make sure the prefix starts and ends with a slash
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
