//! Storage module for persisting agencies, inspections and reports
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Agency synchronization from the configuration
//! - Inspection records for every HTTP attempt
//! - Reports with append-only messages and linked inspections
//!
//! Every write runs in its own transaction, so sibling tasks writing to the
//! same report never observe or leave a half-applied update.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::AgencyEntry;
use crate::envelope::ErrorRecord;
use crate::state::WorkflowState;
use crate::ProbeError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ProbeError> {
    SqliteStorage::new(path)
}

/// Upserts every configured agency, returning their ids in configuration order
pub fn sync_agencies<S: Storage>(
    storage: &mut S,
    agencies: &[AgencyEntry],
) -> StorageResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(agencies.len());
    for agency in agencies {
        let id = storage.upsert_agency(agency.name.trim(), agency.data_json_url.trim())?;
        ids.push(id);
    }
    tracing::info!("Synchronized {} agencies", ids.len());
    Ok(ids)
}

/// An agency publishing a data catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyRecord {
    pub id: i64,
    pub name: String,
    pub data_json_url: String,
    pub created_at: String,
}

/// Kind of workflow a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportType {
    Generic,
    DataCatalogCrawl,
    DataCatalogValidation,
}

impl ReportType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::DataCatalogCrawl => "data_catalog_crawl",
            Self::DataCatalogValidation => "data_catalog_validation",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "generic" => Some(Self::Generic),
            "data_catalog_crawl" => Some(Self::DataCatalogCrawl),
            "data_catalog_validation" => Some(Self::DataCatalogValidation),
            _ => None,
        }
    }
}

/// A persisted report together with its messages and linked inspections
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub id: i64,
    pub agency_id: Option<i64>,
    pub url: Option<String>,
    pub report_type: ReportType,
    pub state: WorkflowState,
    pub created_at: String,
    pub messages: Vec<String>,
    pub inspection_ids: Vec<i64>,
}

/// Fields of an inspection to be created
#[derive(Debug, Clone, Default)]
pub struct NewInspection {
    pub requested_url: String,
    /// HTTP method of the attempt, upper case
    pub method: String,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub content: Option<Vec<u8>>,
    pub encoding: Option<String>,
    pub apparent_encoding: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub errors: Vec<ErrorRecord>,
    pub info: Map<String, Value>,
    pub report_id: Option<i64>,
    pub parent_id: Option<i64>,
}

impl NewInspection {
    pub fn for_url(url: &str) -> Self {
        Self {
            requested_url: url.to_string(),
            method: "GET".to_string(),
            ..Self::default()
        }
    }
}

/// A persisted record of one HTTP attempt
#[derive(Debug, Clone)]
pub struct InspectionRecord {
    pub id: i64,
    pub requested_url: String,
    pub method: String,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub content: Option<Vec<u8>>,
    pub encoding: Option<String>,
    pub apparent_encoding: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub errors: Vec<ErrorRecord>,
    pub info: Map<String, Value>,
    pub report_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub created_at: String,
}

impl InspectionRecord {
    /// Declared encoding if the server sent one, otherwise the guessed one
    pub fn effective_encoding(&self) -> Option<&str> {
        self.encoding
            .as_deref()
            .or(self.apparent_encoding.as_deref())
    }
}

/// Several report changes applied in one transaction
#[derive(Debug, Clone, Default)]
pub struct ReportUpdate {
    pub report_type: Option<ReportType>,
    pub state: Option<WorkflowState>,
    pub messages: Vec<String>,
    pub inspection: Option<InspectionUpdate>,
}

/// Changes to one inspection linked to a report
#[derive(Debug, Clone, Default)]
pub struct InspectionUpdate {
    pub inspection_id: i64,
    pub info: Map<String, Value>,
    pub errors: Vec<ErrorRecord>,
}
