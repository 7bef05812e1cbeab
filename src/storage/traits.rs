//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::envelope::ErrorRecord;
use crate::state::WorkflowState;
use crate::storage::{
    AgencyRecord, InspectionRecord, NewInspection, ReportRecord, ReportType, ReportUpdate,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Agency not found: {0}")]
    AgencyNotFound(i64),

    #[error("Report not found: {0}")]
    ReportNotFound(i64),

    #[error("Inspection not found: {0}")]
    InspectionNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Lookups of missing rows will not succeed on a second attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Sqlite(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Each method that writes is atomic: it either applies completely or not at
/// all. Message appends and inspection links only ever add rows, so two
/// writers touching the same report cannot overwrite each other.
pub trait Storage {
    // ===== Agencies =====

    /// Inserts an agency or updates the catalog URL of an existing one
    ///
    /// Agencies are matched by name. Returns the agency ID.
    fn upsert_agency(&mut self, name: &str, data_json_url: &str) -> StorageResult<i64>;

    /// Gets an agency by ID
    fn get_agency(&self, agency_id: i64) -> StorageResult<AgencyRecord>;

    /// Lists all agencies in ID order
    fn list_agencies(&self) -> StorageResult<Vec<AgencyRecord>>;

    // ===== Inspections =====

    /// Creates an inspection, linking it to its report when one is given
    fn create_inspection(&mut self, inspection: &NewInspection) -> StorageResult<i64>;

    /// Gets an inspection by ID
    fn get_inspection(&self, inspection_id: i64) -> StorageResult<InspectionRecord>;

    /// Timestamp of the most recently created inspection
    fn latest_inspection_time(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Finds the newest parentless GET inspection of `url` created on `day`
    /// (UTC)
    fn find_inspection_on_day(
        &self,
        url: &str,
        day: NaiveDate,
    ) -> StorageResult<Option<InspectionRecord>>;

    /// Appends errors to an inspection's error list
    fn append_inspection_errors(
        &mut self,
        inspection_id: i64,
        errors: &[ErrorRecord],
    ) -> StorageResult<()>;

    /// Merges entries into an inspection's info map
    fn merge_inspection_info(
        &mut self,
        inspection_id: i64,
        info: &Map<String, Value>,
    ) -> StorageResult<()>;

    /// Gets all inspections linked to a report
    fn inspections_for_report(&self, report_id: i64) -> StorageResult<Vec<InspectionRecord>>;

    /// Counts all inspections
    fn count_inspections(&self) -> StorageResult<u64>;

    // ===== Reports =====

    /// Creates a report and returns its ID
    fn create_report(
        &mut self,
        agency_id: Option<i64>,
        url: Option<&str>,
        report_type: ReportType,
        state: WorkflowState,
    ) -> StorageResult<i64>;

    /// Gets a report with its messages and linked inspection IDs
    fn get_report(&self, report_id: i64) -> StorageResult<ReportRecord>;

    /// Gets all reports of an agency, oldest first
    fn reports_for_agency(&self, agency_id: i64) -> StorageResult<Vec<ReportRecord>>;

    /// Appends a message to a report
    fn append_report_message(&mut self, report_id: i64, message: &str) -> StorageResult<()>;

    /// Adds an inspection to a report's inspection set
    ///
    /// Linking the same inspection twice is a no-op.
    fn attach_inspection(&mut self, report_id: i64, inspection_id: i64) -> StorageResult<()>;

    /// Records the workflow state on a report
    fn set_report_state(&mut self, report_id: i64, state: WorkflowState) -> StorageResult<()>;

    /// Applies several report and inspection changes in one transaction
    fn apply_report_update(&mut self, report_id: i64, update: &ReportUpdate)
        -> StorageResult<()>;

    /// Counts all reports
    fn count_reports(&self) -> StorageResult<u64>;
}
