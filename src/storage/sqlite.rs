//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::envelope::ErrorRecord;
use crate::state::WorkflowState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AgencyRecord, InspectionRecord, NewInspection, ReportRecord, ReportType, ReportUpdate,
};
use crate::ProbeError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

const INSPECTION_COLUMNS: &str = "id, requested_url, method, final_url, status_code, content, \
     encoding, apparent_encoding, headers, errors, info, report_id, parent_id, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ProbeError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ProbeError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, ProbeError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an inspection with an explicit creation time
    pub fn create_inspection_at(
        &mut self,
        inspection: &NewInspection,
        created_at: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let headers = serde_json::to_string(&inspection.headers)?;
        let errors = serde_json::to_string(&inspection.errors)?;
        let info = serde_json::to_string(&inspection.info)?;
        let created_at = timestamp(created_at);

        let tx = self.conn.transaction()?;
        if let Some(report_id) = inspection.report_id {
            ensure_report(&tx, report_id)?;
        }

        tx.execute(
            "INSERT INTO inspections (requested_url, method, final_url, status_code, content,
             encoding, apparent_encoding, headers, errors, info, report_id, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                inspection.requested_url,
                inspection.method,
                inspection.final_url,
                inspection.status_code,
                inspection.content,
                inspection.encoding,
                inspection.apparent_encoding,
                headers,
                errors,
                info,
                inspection.report_id,
                inspection.parent_id,
                created_at,
            ],
        )?;
        let inspection_id = tx.last_insert_rowid();

        if let Some(report_id) = inspection.report_id {
            link_inspection(&tx, report_id, inspection_id)?;
            touch_report(&tx, report_id)?;
        }

        tx.commit()?;
        Ok(inspection_id)
    }
}

/// Formats a timestamp so that string order matches time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

/// Reads a JSON text column
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn inspection_from_row(row: &Row<'_>) -> rusqlite::Result<InspectionRecord> {
    Ok(InspectionRecord {
        id: row.get(0)?,
        requested_url: row.get(1)?,
        method: row.get(2)?,
        final_url: row.get(3)?,
        status_code: row.get(4)?,
        content: row.get(5)?,
        encoding: row.get(6)?,
        apparent_encoding: row.get(7)?,
        headers: json_column(row, 8)?,
        errors: json_column(row, 9)?,
        info: json_column(row, 10)?,
        report_id: row.get(11)?,
        parent_id: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn agency_from_row(row: &Row<'_>) -> rusqlite::Result<AgencyRecord> {
    Ok(AgencyRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        data_json_url: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn ensure_report(conn: &Connection, report_id: i64) -> StorageResult<()> {
    conn.query_row(
        "SELECT id FROM reports WHERE id = ?1",
        params![report_id],
        |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(|_| ())
    .ok_or(StorageError::ReportNotFound(report_id))
}

fn touch_report(conn: &Connection, report_id: i64) -> StorageResult<()> {
    conn.execute(
        "UPDATE reports SET updated_at = ?1 WHERE id = ?2",
        params![now(), report_id],
    )?;
    Ok(())
}

fn insert_message(conn: &Connection, report_id: i64, message: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO report_messages (report_id, message, created_at) VALUES (?1, ?2, ?3)",
        params![report_id, message, now()],
    )?;
    Ok(())
}

fn link_inspection(conn: &Connection, report_id: i64, inspection_id: i64) -> StorageResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO report_inspections (report_id, inspection_id) VALUES (?1, ?2)",
        params![report_id, inspection_id],
    )?;
    conn.execute(
        "UPDATE inspections SET report_id = ?1 WHERE id = ?2 AND report_id IS NULL",
        params![report_id, inspection_id],
    )?;
    Ok(())
}

fn load_inspection_json(
    conn: &Connection,
    inspection_id: i64,
    column: &str,
) -> StorageResult<String> {
    conn.query_row(
        &format!("SELECT {} FROM inspections WHERE id = ?1", column),
        params![inspection_id],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or(StorageError::InspectionNotFound(inspection_id))
}

fn merge_info(
    conn: &Connection,
    inspection_id: i64,
    info: &Map<String, Value>,
) -> StorageResult<()> {
    let current = load_inspection_json(conn, inspection_id, "info")?;
    let mut merged: Map<String, Value> = serde_json::from_str(&current)?;
    merged.extend(info.iter().map(|(k, v)| (k.clone(), v.clone())));
    conn.execute(
        "UPDATE inspections SET info = ?1 WHERE id = ?2",
        params![serde_json::to_string(&merged)?, inspection_id],
    )?;
    Ok(())
}

fn append_errors(conn: &Connection, inspection_id: i64, errors: &[ErrorRecord]) -> StorageResult<()> {
    let current = load_inspection_json(conn, inspection_id, "errors")?;
    let mut all: Vec<ErrorRecord> = serde_json::from_str(&current)?;
    all.extend_from_slice(errors);
    conn.execute(
        "UPDATE inspections SET errors = ?1 WHERE id = ?2",
        params![serde_json::to_string(&all)?, inspection_id],
    )?;
    Ok(())
}

fn load_report(conn: &Connection, report_id: i64) -> StorageResult<ReportRecord> {
    let (id, agency_id, url, report_type, state, created_at) = conn
        .query_row(
            "SELECT id, agency_id, url, report_type, state, created_at FROM reports WHERE id = ?1",
            params![report_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?
        .ok_or(StorageError::ReportNotFound(report_id))?;

    let mut stmt =
        conn.prepare("SELECT message FROM report_messages WHERE report_id = ?1 ORDER BY id")?;
    let messages = stmt
        .query_map(params![report_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT inspection_id FROM report_inspections WHERE report_id = ?1 ORDER BY inspection_id",
    )?;
    let inspection_ids = stmt
        .query_map(params![report_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReportRecord {
        id,
        agency_id,
        url,
        report_type: ReportType::from_db_string(&report_type).unwrap_or(ReportType::Generic),
        state: WorkflowState::from_db_string(&state).unwrap_or(WorkflowState::Started),
        created_at,
        messages,
        inspection_ids,
    })
}

impl Storage for SqliteStorage {
    // ===== Agencies =====

    fn upsert_agency(&mut self, name: &str, data_json_url: &str) -> StorageResult<i64> {
        let now = now();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO agencies (name, data_json_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                data_json_url = excluded.data_json_url,
                updated_at = excluded.updated_at",
            params![name, data_json_url, now],
        )?;
        let id = tx.query_row(
            "SELECT id FROM agencies WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn get_agency(&self, agency_id: i64) -> StorageResult<AgencyRecord> {
        self.conn
            .query_row(
                "SELECT id, name, data_json_url, created_at FROM agencies WHERE id = ?1",
                params![agency_id],
                agency_from_row,
            )
            .optional()?
            .ok_or(StorageError::AgencyNotFound(agency_id))
    }

    fn list_agencies(&self) -> StorageResult<Vec<AgencyRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, data_json_url, created_at FROM agencies ORDER BY id")?;
        let agencies = stmt
            .query_map([], agency_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(agencies)
    }

    // ===== Inspections =====

    fn create_inspection(&mut self, inspection: &NewInspection) -> StorageResult<i64> {
        self.create_inspection_at(inspection, Utc::now())
    }

    fn get_inspection(&self, inspection_id: i64) -> StorageResult<InspectionRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM inspections WHERE id = ?1", INSPECTION_COLUMNS),
                params![inspection_id],
                inspection_from_row,
            )
            .optional()?
            .ok_or(StorageError::InspectionNotFound(inspection_id))
    }

    fn latest_inspection_time(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(created_at) FROM inspections", [], |row| {
                    row.get(0)
                })?;

        latest
            .map(|s| {
                s.parse::<DateTime<Utc>>().map_err(|e| {
                    StorageError::Database(format!("Bad inspection timestamp '{}': {}", s, e))
                })
            })
            .transpose()
    }

    fn find_inspection_on_day(
        &self,
        url: &str,
        day: NaiveDate,
    ) -> StorageResult<Option<InspectionRecord>> {
        let next_day = day
            .succ_opt()
            .ok_or_else(|| StorageError::Database(format!("No day after {}", day)))?;
        let start = format!("{}T00:00:00.000Z", day);
        let end = format!("{}T00:00:00.000Z", next_day);

        let inspection = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM inspections
                     WHERE requested_url = ?1 AND method = 'GET' AND parent_id IS NULL
                       AND created_at >= ?2 AND created_at < ?3
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    INSPECTION_COLUMNS
                ),
                params![url, start, end],
                inspection_from_row,
            )
            .optional()?;
        Ok(inspection)
    }

    fn append_inspection_errors(
        &mut self,
        inspection_id: i64,
        errors: &[ErrorRecord],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        append_errors(&tx, inspection_id, errors)?;
        tx.commit()?;
        Ok(())
    }

    fn merge_inspection_info(
        &mut self,
        inspection_id: i64,
        info: &Map<String, Value>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        merge_info(&tx, inspection_id, info)?;
        tx.commit()?;
        Ok(())
    }

    fn inspections_for_report(&self, report_id: i64) -> StorageResult<Vec<InspectionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inspections
             WHERE id IN (SELECT inspection_id FROM report_inspections WHERE report_id = ?1)
             ORDER BY id",
            INSPECTION_COLUMNS
        ))?;
        let inspections = stmt
            .query_map(params![report_id], inspection_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(inspections)
    }

    fn count_inspections(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM inspections", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Reports =====

    fn create_report(
        &mut self,
        agency_id: Option<i64>,
        url: Option<&str>,
        report_type: ReportType,
        state: WorkflowState,
    ) -> StorageResult<i64> {
        let now = now();
        self.conn.execute(
            "INSERT INTO reports (agency_id, url, report_type, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                agency_id,
                url,
                report_type.to_db_string(),
                state.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_report(&self, report_id: i64) -> StorageResult<ReportRecord> {
        load_report(&self.conn, report_id)
    }

    fn reports_for_agency(&self, agency_id: i64) -> StorageResult<Vec<ReportRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM reports WHERE agency_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![agency_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.into_iter()
            .map(|id| load_report(&self.conn, id))
            .collect()
    }

    fn append_report_message(&mut self, report_id: i64, message: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        ensure_report(&tx, report_id)?;
        insert_message(&tx, report_id, message)?;
        touch_report(&tx, report_id)?;
        tx.commit()?;
        Ok(())
    }

    fn attach_inspection(&mut self, report_id: i64, inspection_id: i64) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        ensure_report(&tx, report_id)?;
        load_inspection_json(&tx, inspection_id, "info")?;
        link_inspection(&tx, report_id, inspection_id)?;
        touch_report(&tx, report_id)?;
        tx.commit()?;
        Ok(())
    }

    fn set_report_state(&mut self, report_id: i64, state: WorkflowState) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE reports SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state.to_db_string(), now(), report_id],
        )?;
        if updated == 0 {
            return Err(StorageError::ReportNotFound(report_id));
        }
        Ok(())
    }

    fn apply_report_update(
        &mut self,
        report_id: i64,
        update: &ReportUpdate,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        ensure_report(&tx, report_id)?;

        if let Some(report_type) = update.report_type {
            tx.execute(
                "UPDATE reports SET report_type = ?1 WHERE id = ?2",
                params![report_type.to_db_string(), report_id],
            )?;
        }

        if let Some(state) = update.state {
            tx.execute(
                "UPDATE reports SET state = ?1 WHERE id = ?2",
                params![state.to_db_string(), report_id],
            )?;
        }

        for message in &update.messages {
            insert_message(&tx, report_id, message)?;
        }

        if let Some(inspection) = &update.inspection {
            merge_info(&tx, inspection.inspection_id, &inspection.info)?;
            append_errors(&tx, inspection.inspection_id, &inspection.errors)?;
            link_inspection(&tx, report_id, inspection.inspection_id)?;
        }

        touch_report(&tx, report_id)?;
        tx.commit()?;
        Ok(())
    }

    fn count_reports(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
