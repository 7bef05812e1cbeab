//! End-to-end tests of the catalog validation workflow

use crate::harness;
use catalog_probe::crawler::with_storage;
use catalog_probe::storage::{ReportType, Storage};
use catalog_probe::{ErrorKind, WorkflowState};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-04/schema#",
    "type": "array",
    "items": {
        "type": "object",
        "required": ["title", "accessLevel"],
        "properties": {
            "title": {"type": "string"},
            "accessLevel": {"enum": ["public", "restricted public", "non-public"]}
        }
    }
}"#;

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_violations_are_capped() {
    let server = MockServer::start().await;
    let items: Vec<_> = (0..150)
        .map(|i| json!({"title": format!("Dataset {}", i), "accessLevel": "secret"}))
        .collect();
    serve(&server, "/data.json", json!(items).to_string()).await;

    let url = format!("{}/data.json", server.uri());
    let h = harness(&[("Interior", url.clone())], Some(SCHEMA));
    h.coordinator.validate_data_catalogs().unwrap();
    h.coordinator.queue().drain().await;

    let report = with_storage(h.coordinator.storage(), |s| {
        s.reports_for_agency(h.agency_ids[0])
    })
    .unwrap()
    .remove(0);
    assert_eq!(report.report_type, ReportType::DataCatalogValidation);
    assert_eq!(report.state, WorkflowState::Completed);
    assert_eq!(
        report.messages,
        vec![format!(
            "Data catalog at '{}' is not valid (100 schema violations recorded)",
            url
        )]
    );

    let inspection = with_storage(h.coordinator.storage(), |s| {
        s.get_inspection(report.inspection_ids[0])
    })
    .unwrap();
    let violations = inspection
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::SchemaViolation)
        .count();
    assert_eq!(violations, 100);
    assert_eq!(inspection.info["is_valid_data_catalog"], json!(false));
    assert_eq!(inspection.info["schema_validation"], json!("invalid"));
    assert_eq!(inspection.info["is_json"], json!(true));
    assert_eq!(inspection.info["json_errors"], json!(false));
    assert_eq!(inspection.info["status_code"], json!(200));
    assert!(inspection.content.is_some());
}

#[tokio::test]
async fn test_each_agency_gets_its_own_report() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/good.json",
        json!([{"title": "Parks", "accessLevel": "public"}]).to_string(),
    )
    .await;
    // Leading byte order mark plus trailing text only the lenient decoder accepts
    serve(
        &server,
        "/messy.json",
        "\u{feff}[{\"title\": \"Roads\", \"accessLevel\": \"public\"}] trailing".to_string(),
    )
    .await;

    let good = format!("{}/good.json", server.uri());
    let messy = format!("{}/messy.json", server.uri());
    let h = harness(
        &[("Parks", good.clone()), ("Roads", messy.clone())],
        Some(SCHEMA),
    );
    let queued = h.coordinator.validate_data_catalogs().unwrap();
    assert_eq!(queued.len(), 2);
    h.coordinator.queue().drain().await;

    let storage = h.coordinator.storage();
    let good_report = with_storage(storage, |s| s.reports_for_agency(h.agency_ids[0]))
        .unwrap()
        .remove(0);
    assert_eq!(
        good_report.messages,
        vec![format!("Data catalog at '{}' is valid", good)]
    );

    let messy_report = with_storage(storage, |s| s.reports_for_agency(h.agency_ids[1]))
        .unwrap()
        .remove(0);
    assert_eq!(messy_report.state, WorkflowState::Completed);
    let inspection = with_storage(storage, |s| {
        s.get_inspection(messy_report.inspection_ids[0])
    })
    .unwrap();
    assert_eq!(inspection.info["json_errors"], json!(true));
    assert_eq!(inspection.info["is_valid_data_catalog"], json!(true));
    assert_eq!(inspection.errors.len(), 1);
    assert_eq!(inspection.errors[0].kind, ErrorKind::DecodeError);
}

#[tokio::test]
async fn test_unreachable_catalog_still_gets_a_report() {
    let url = "http://127.0.0.1:1/data.json".to_string();
    let h = harness(&[("Offline", url.clone())], Some(SCHEMA));
    h.coordinator.validate_data_catalogs().unwrap();
    h.coordinator.queue().drain().await;

    let report = with_storage(h.coordinator.storage(), |s| {
        s.reports_for_agency(h.agency_ids[0])
    })
    .unwrap()
    .remove(0);
    assert_eq!(report.state, WorkflowState::FailedNoCatalog);
    assert_eq!(
        report.messages,
        vec![format!("Unable to load json data from '{}'", url)]
    );

    let inspection = with_storage(h.coordinator.storage(), |s| {
        s.get_inspection(report.inspection_ids[0])
    })
    .unwrap();
    assert!(inspection.status_code.is_none());
    let kinds: Vec<ErrorKind> = inspection.errors.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::ConnectionError, ErrorKind::NoContent]);
    assert_eq!(inspection.info["is_json"], json!(false));
    assert_eq!(inspection.info["schema_validation"], json!("no_document"));
}

#[tokio::test]
async fn test_validation_without_schema_file() {
    let server = MockServer::start().await;
    serve(&server, "/data.json", "[]".to_string()).await;

    let h = harness(&[("Treasury", format!("{}/data.json", server.uri()))], None);
    assert!(h.config.validation.catalog_schema_path.is_none());
    h.coordinator.validate_data_catalogs().unwrap();
    h.coordinator.queue().drain().await;

    let report = with_storage(h.coordinator.storage(), |s| {
        s.reports_for_agency(h.agency_ids[0])
    })
    .unwrap()
    .remove(0);
    assert!(report.messages[0].ends_with("was not validated: no schema configured"));
    assert!(h.dir.path().join("probe.db").exists());
}
