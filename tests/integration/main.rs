//! Integration tests for Catalog-Probe
//!
//! These tests drive the public API against wiremock servers, with the
//! configuration, schema and database written to a temporary directory.

mod crawl_tests;
mod validation_tests;

use catalog_probe::config::{load_config, Config};
use catalog_probe::crawler::{Coordinator, SharedStorage};
use catalog_probe::storage::{open_storage, sync_agencies};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A configured coordinator backed by an on-disk database
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub coordinator: Coordinator,
    pub agency_ids: Vec<i64>,
}

/// Writes a config listing `agencies` and builds a coordinator from it
///
/// `schema`, when given, is written next to the config and referenced
/// from it.
pub fn harness(agencies: &[(&str, String)], schema: Option<&str>) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("probe.db");

    let mut toml = format!(
        r#"
[crawler]
max-concurrent-tasks = 4
check-rate-limit = 500.0
max-task-retries = 1
retry-delay = 10

[http]
request-timeout = 5
connect-timeout = 2

[user-agent]
crawler-name = "TestProbe"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[storage]
database-path = "{}"
"#,
        toml_path(&db_path)
    );

    if let Some(schema) = schema {
        let schema_path = dir.path().join("catalog.schema.json");
        std::fs::write(&schema_path, schema).unwrap();
        toml.push_str(&format!(
            "\n[validation]\ncatalog-schema-path = \"{}\"\n",
            toml_path(&schema_path)
        ));
    }

    for (name, url) in agencies {
        toml.push_str(&format!(
            "\n[[agency]]\nname = \"{}\"\ndata-json-url = \"{}\"\n",
            name, url
        ));
    }

    let config_path = dir.path().join("catalog-probe.toml");
    std::fs::write(&config_path, toml).unwrap();
    let config = load_config(&config_path).unwrap();

    let mut storage = open_storage(&db_path).unwrap();
    let agency_ids = sync_agencies(&mut storage, &config.agencies).unwrap();
    let storage: SharedStorage = Arc::new(Mutex::new(storage));
    let coordinator = Coordinator::from_config(&config, storage).unwrap();

    Harness {
        dir,
        config,
        coordinator,
        agency_ids,
    }
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}
