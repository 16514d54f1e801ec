//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WORKERS: usize = 10;
const MAX_WORKERS: usize = 256;

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// SQLite database path for the relational backend
    pub db_path: PathBuf,
    /// MongoDB connection string for the document backend
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub mongodb_collection: String,
    /// Upper bound on repository calls in flight at once
    pub worker_pool_size: usize,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match get("PORT") {
            Some(s) => s.parse().map_err(|e| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}': {}", s, e),
            })?,
            None => DEFAULT_PORT,
        };

        // CORS allow origin
        let cors_origin_str = get("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Relational store
        let db_path = PathBuf::from(get("DB_PATH").unwrap_or_else(|| "./data/library.db".into()));

        // Document store
        let mongodb_uri = get("MONGODB_URI").unwrap_or_else(|| "mongodb://localhost:27017".into());
        if !mongodb_uri.starts_with("mongodb://") && !mongodb_uri.starts_with("mongodb+srv://") {
            return Err(ConfigError {
                field: "MONGODB_URI",
                message: "Must start with mongodb:// or mongodb+srv://".into(),
            });
        }
        let mongodb_database = non_empty(get("MONGODB_DATABASE"), "libraryDB");
        let mongodb_collection = non_empty(get("MONGODB_COLLECTION"), "books");

        // Worker pool
        let worker_pool_size = match get("WORKER_POOL_SIZE") {
            Some(s) => match s.parse::<usize>() {
                Ok(n) if (1..=MAX_WORKERS).contains(&n) => n,
                _ => {
                    return Err(ConfigError {
                        field: "WORKER_POOL_SIZE",
                        message: format!("Expected 1-{}, got '{}'", MAX_WORKERS, s),
                    })
                }
            },
            None => DEFAULT_WORKERS,
        };

        // Log format
        let log_format =
            LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            cors_allow_origin,
            db_path,
            mongodb_uri,
            mongodb_database,
            mongodb_collection,
            worker_pool_size,
            log_format,
        })
    }
}

fn non_empty(val: Option<String>, default: &str) -> String {
    val.filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
