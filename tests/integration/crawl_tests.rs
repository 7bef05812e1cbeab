//! End-to-end tests of the catalog crawl workflow

use crate::harness;
use catalog_probe::crawler::with_storage;
use catalog_probe::storage::{InspectionUpdate, ReportType, ReportUpdate, Storage};
use catalog_probe::{CheckTask, ItemInfo, UrlType, WorkflowState};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_catalog(server: &MockServer, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_checks_every_dataset_url() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_catalog(
        &server,
        200,
        json!([
            {"title": "Budget", "accessURL": format!("{}/budget.csv", base)},
            {"title": "Staff", "webService": format!("{}/staff", base)},
            {"title": "Grants", "distribution": [{"accessURL": format!("{}/grants.zip", base)}]}
        ])
        .to_string(),
    )
    .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&[("Energy", format!("{}/data.json", base))], None);
    let queued = h.coordinator.crawl_all_agencies().unwrap();
    assert_eq!(queued.len(), 1);
    h.coordinator.queue().drain().await;

    let storage = h.coordinator.storage();
    let reports = with_storage(storage, |s| s.reports_for_agency(h.agency_ids[0])).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.report_type, ReportType::DataCatalogCrawl);
    assert_eq!(report.state, WorkflowState::Completed);
    assert_eq!(report.messages, vec!["Data catalog contains 3 items"]);
    assert_eq!(report.inspection_ids.len(), 4);

    let checks: Vec<_> = with_storage(storage, |s| s.inspections_for_report(report.id))
        .unwrap()
        .into_iter()
        .filter(|i| !i.requested_url.ends_with("/data.json"))
        .collect();
    assert_eq!(checks.len(), 3);
    for check in &checks {
        assert_eq!(check.status_code, Some(200));
        assert_eq!(check.report_id, Some(report.id));
        assert!(check.content.is_none());
        assert!(check.errors.is_empty());
    }

    let mut url_types: Vec<&str> = checks
        .iter()
        .filter_map(|c| c.info.get("urlType").and_then(|v| v.as_str()))
        .collect();
    url_types.sort_unstable();
    assert_eq!(
        url_types,
        vec!["accessURL", "distribution.accessURL", "webService"]
    );

    let stats = h.coordinator.queue().stats();
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_missing_catalog_is_reported_without_checks() {
    let server = MockServer::start().await;
    mount_catalog(&server, 404, String::new()).await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/data.json", server.uri());
    let h = harness(&[("Labor", url.clone())], None);
    h.coordinator.crawl_agency_datasets(h.agency_ids[0]).unwrap();
    h.coordinator.queue().drain().await;

    let reports = with_storage(h.coordinator.storage(), |s| {
        s.reports_for_agency(h.agency_ids[0])
    })
    .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, WorkflowState::FailedNoCatalog);
    assert_eq!(
        reports[0].messages,
        vec![format!("Unable to fetch data catalog from '{}'", url)]
    );
    assert_eq!(reports[0].inspection_ids.len(), 1);
    assert_eq!(h.coordinator.queue().stats().submitted, 1);
}

#[tokio::test]
async fn test_dataset_wrapper_and_items_without_urls() {
    let server = MockServer::start().await;
    mount_catalog(
        &server,
        200,
        json!({
            "conformsTo": "https://project-open-data.cio.gov/v1.1/schema",
            "dataset": [
                {"title": "Orphan", "accessURL": "  "},
                {"title": "Linked", "accessURL": format!("{}/linked.csv", server.uri())}
            ]
        })
        .to_string(),
    )
    .await;
    Mock::given(method("HEAD"))
        .and(path("/linked.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = harness(&[("Commerce", format!("{}/data.json", server.uri()))], None);
    h.coordinator.crawl_all_agencies().unwrap();
    h.coordinator.queue().drain().await;

    let report = with_storage(h.coordinator.storage(), |s| {
        s.reports_for_agency(h.agency_ids[0])
    })
    .unwrap()
    .remove(0);
    assert_eq!(
        report.messages,
        vec![
            "Data catalog contains 2 items",
            "No urls found for catalog item titled 'Orphan'"
        ]
    );

    // A failing dataset URL is a finding, not a failed task
    let linked = with_storage(h.coordinator.storage(), |s| {
        s.inspections_for_report(report.id)
    })
    .unwrap()
    .into_iter()
    .find(|i| i.requested_url.ends_with("/linked.csv"))
    .unwrap();
    assert_eq!(linked.status_code, Some(404));
    assert_eq!(linked.errors.len(), 1);
    assert_eq!(h.coordinator.queue().stats().failed, 0);
}

#[tokio::test]
async fn test_same_day_crawls_reuse_the_catalog_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&[("Justice", format!("{}/data.json", server.uri()))], None);
    for _ in 0..2 {
        h.coordinator.crawl_agency_datasets(h.agency_ids[0]).unwrap();
        h.coordinator.queue().drain().await;
    }

    let reports = with_storage(h.coordinator.storage(), |s| {
        s.reports_for_agency(h.agency_ids[0])
    })
    .unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].inspection_ids, reports[1].inspection_ids);
    assert_eq!(reports[1].messages, vec!["Data catalog contains 0 items"]);
}

#[tokio::test]
async fn test_sibling_checks_do_not_overwrite_each_other() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = harness(&[], None);
    let storage = h.coordinator.storage().clone();
    let report_id = with_storage(&storage, |s| {
        s.create_report(
            None,
            None,
            ReportType::DataCatalogCrawl,
            WorkflowState::ChecksDispatched,
        )
    })
    .unwrap();

    let check = |name: &str| CheckTask {
        url: format!("{}/{}", server.uri(), name),
        url_type: UrlType::AccessUrl,
        item_info: ItemInfo {
            title: Some(name.to_string()),
            ..ItemInfo::default()
        },
    };
    let (first, second) = (check("first.csv"), check("second.csv"));
    let (a, b) = tokio::join!(
        h.coordinator.inspect_item_url(&first, Some(report_id)),
        h.coordinator.inspect_item_url(&second, Some(report_id)),
    );
    assert!(a.is_ok() && b.is_ok());

    let writers: Vec<_> = ["first", "second"]
        .into_iter()
        .map(|name| {
            let storage = storage.clone();
            std::thread::spawn(move || {
                with_storage(&storage, |s| {
                    s.apply_report_update(
                        report_id,
                        &ReportUpdate {
                            messages: vec![format!("{} checked", name)],
                            ..ReportUpdate::default()
                        },
                    )
                })
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap().unwrap();
    }

    let report = with_storage(&storage, |s| s.get_report(report_id)).unwrap();
    assert_eq!(report.inspection_ids.len(), 2);
    let mut messages = report.messages.clone();
    messages.sort();
    assert_eq!(messages, vec!["first checked", "second checked"]);

    // Linking again changes nothing
    let inspection_id = report.inspection_ids[0];
    with_storage(&storage, |s| {
        s.apply_report_update(
            report_id,
            &ReportUpdate {
                inspection: Some(InspectionUpdate {
                    inspection_id,
                    ..InspectionUpdate::default()
                }),
                ..ReportUpdate::default()
            },
        )
    })
    .unwrap();
    let report = with_storage(&storage, |s| s.get_report(report_id)).unwrap();
    assert_eq!(report.inspection_ids.len(), 2);
}

#[tokio::test]
async fn test_crawl_skips_unknown_agency() {
    let h = harness(&[], None);
    assert!(h.coordinator.crawl_agency_datasets(42).is_err());
    assert!(h.coordinator.crawl_all_agencies().unwrap().is_empty());
    assert_eq!(h.config.agencies.len(), 0);
}
