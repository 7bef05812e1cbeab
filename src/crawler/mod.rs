//! Crawler module for catalog fetching and URL checking
//!
//! This module contains the core workflow logic, including:
//! - HTTP fetching with error classification
//! - Persisting every fetch as an inspection
//! - The task queue that runs workflows and URL checks
//! - Crawl and validation orchestration

mod coordinator;
mod fetcher;
mod inspection;
mod queue;

pub use coordinator::{Coordinator, ValidationRun};
pub use fetcher::{build_http_client, request_url, Fetched, FetchedResponse};
pub use inspection::InspectionStore;
pub use queue::{ErrorHook, Lane, LoggingErrorHook, QueueSnapshot, TaskFailure, TaskQueue};

use crate::storage::{SqliteStorage, StorageResult};
use crate::ProbeError;
use std::sync::{Arc, Mutex};

/// Storage handle shared by every task
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Runs one storage operation under the lock
///
/// The lock is released before this returns, so callers never hold it
/// across an `.await`.
pub fn with_storage<T>(
    storage: &SharedStorage,
    op: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
) -> Result<T, ProbeError> {
    let mut guard = storage.lock().map_err(|_| ProbeError::LockPoisoned)?;
    op(&mut guard).map_err(|e| {
        tracing::error!("Storage operation failed: {}", e);
        ProbeError::from(e)
    })
}
