//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Catalog-Probe database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Agencies and the location of their data catalogs
CREATE TABLE IF NOT EXISTS agencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    data_json_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One report per crawl or validation run
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agency_id INTEGER REFERENCES agencies(id),
    url TEXT,
    report_type TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_agency ON reports(agency_id);

-- Report messages, append-only
CREATE TABLE IF NOT EXISTS report_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES reports(id),
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_report_messages_report ON report_messages(report_id);

-- Every HTTP attempt, successful or not
CREATE TABLE IF NOT EXISTS inspections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    requested_url TEXT NOT NULL,
    method TEXT NOT NULL DEFAULT 'GET',
    final_url TEXT,
    status_code INTEGER,
    content BLOB,
    encoding TEXT,
    apparent_encoding TEXT,
    headers TEXT NOT NULL DEFAULT '{}',
    errors TEXT NOT NULL DEFAULT '[]',
    info TEXT NOT NULL DEFAULT '{}',
    report_id INTEGER REFERENCES reports(id),
    parent_id INTEGER REFERENCES inspections(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inspections_url ON inspections(requested_url, created_at);
CREATE INDEX IF NOT EXISTS idx_inspections_created ON inspections(created_at);

-- Inspection set of each report
CREATE TABLE IF NOT EXISTS report_inspections (
    report_id INTEGER NOT NULL REFERENCES reports(id),
    inspection_id INTEGER NOT NULL REFERENCES inspections(id),
    PRIMARY KEY (report_id, inspection_id)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
