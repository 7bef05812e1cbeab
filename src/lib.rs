//! Catalog-Probe: an open-data catalog crawler and validator
//!
//! This crate fetches agency data catalogs (`data.json` documents), validates
//! them against a JSON Schema, and probes every dataset URL they list. Work is
//! split into small stages that pass an [`Envelope`] of payload and recorded
//! errors from one to the next, and the stages are run as independent tasks on
//! a bounded queue.

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod envelope;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Probe operations
///
/// Only persistence failures and workflow precondition failures surface as
/// a `ProbeError`. Everything that can go wrong while fetching, decoding or
/// validating a catalog is recorded into an [`Envelope`] instead.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Agency {0} has no data catalog URL")]
    MissingCatalogUrl(i64),

    #[error("Missing required task argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::WorkflowState,
        to: state::WorkflowState,
    },

    #[error("Invalid check transition: {from:?} -> {to:?}")]
    InvalidCheckTransition {
        from: state::CheckState,
        to: state::CheckState,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Returns true if the task queue should run the failing task again
    ///
    /// Persistence failures are transient from the queue's point of view.
    /// Precondition failures (unknown agency, missing argument) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::LockPoisoned => true,
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Catalog-Probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{CatalogSchema, CheckTask, ItemInfo, UrlType, Validity};
pub use config::Config;
pub use crawler::{Coordinator, TaskQueue};
pub use envelope::{Envelope, ErrorKind, ErrorRecord, StageError};
pub use state::{CheckState, WorkflowState};
pub use storage::ReportType;
pub use url::check_and_correct_url;
