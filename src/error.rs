use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreName;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Feed '{0}' is not configured")]
    UnknownFeed(String),

    #[error("Account '{0}' is not configured")]
    UnknownAccountName(String),

    #[error("Feed '{feed}' refers to unknown account '{account}'")]
    UnknownAccount { feed: String, account: String },

    #[error("Invalid {field} pattern '{pattern}' in feed '{feed}': {source}")]
    InvalidPattern {
        feed: String,
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No password or token for account '{0}' in config or keyring")]
    MissingCredentials(String),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors raised by a mail source. `Transient` faults are retried on the next
/// tick; `Config` faults need a user fix.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transient mail fetch failure: {0}")]
    Transient(String),

    #[error("Mail source misconfigured: {0}")]
    Config(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<imap::Error> for FetchError {
    fn from(err: imap::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}

impl From<native_tls::Error> for FetchError {
    fn from(err: native_tls::Error) -> Self {
        FetchError::Transient(format!("TLS: {err}"))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt value in store '{store}' for key '{key}': {source}")]
    Corrupt {
        store: StoreName,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode value for store '{store}': {source}")]
    Encode {
        store: StoreName,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures on generated files. Callers log these and carry on.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to write artifact '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove artifact '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize feed '{feed}': {message}")]
    Serialize { feed: String, message: String },
}

/// Reasons a single feed cycle is abandoned.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
