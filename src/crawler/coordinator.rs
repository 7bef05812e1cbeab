//! Crawl and validation orchestration
//!
//! This module sequences fetching, parsing, validation and URL checks into
//! the two workflows:
//! - A catalog crawl fetches an agency's catalog, records a crawl report and
//!   submits one rate-limited check per dataset URL
//! - A catalog validation fetches the catalog, validates it against the
//!   schema and records a validation report
//!
//! Each workflow runs as one queue task. Within it, stages run strictly in
//! order and hand their typed output to the next stage. Check tasks are
//! submitted and never awaited.

use crate::catalog::{self, extract_checks, parse_json, CatalogSchema, CheckTask, Parsed, Validity};
use crate::config::Config;
use crate::crawler::inspection::InspectionStore;
use crate::crawler::queue::{Lane, TaskQueue};
use crate::crawler::{build_http_client, with_storage, SharedStorage};
use crate::envelope::{keys, Envelope, ErrorKind};
use crate::state::{CheckState, Workflow, WorkflowState};
use crate::storage::{InspectionUpdate, ReportType, ReportUpdate, Storage};
use crate::ProbeError;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

/// State carried through the validation chain
#[derive(Debug)]
pub struct ValidationRun {
    pub envelope: Envelope,
    pub report_id: i64,
    pub inspection_id: i64,
    pub json: Option<Value>,
    pub parse_errors: bool,
    pub validity: Option<Validity>,
    /// Errors at the front of the envelope already stored on the inspection
    stored_errors: usize,
    workflow: Workflow,
}

impl ValidationRun {
    pub fn state(&self) -> WorkflowState {
        self.workflow.state()
    }
}

/// Runs the crawl and validation workflows
///
/// Cloning is cheap: clones share the HTTP client, storage, schema and
/// queue.
#[derive(Clone)]
pub struct Coordinator {
    inspections: InspectionStore,
    schema: Option<Arc<CatalogSchema>>,
    queue: TaskQueue,
}

impl Coordinator {
    pub fn new(
        client: Client,
        storage: SharedStorage,
        schema: Option<Arc<CatalogSchema>>,
        queue: TaskQueue,
        max_content_bytes: usize,
    ) -> Self {
        Self {
            inspections: InspectionStore::new(client, storage, max_content_bytes),
            schema,
            queue,
        }
    }

    /// Creates a coordinator from the configuration
    ///
    /// Builds the shared HTTP client, compiles the catalog schema if one is
    /// configured, and creates a queue that logs failed tasks.
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to accept workflows
    /// * `Err(ProbeError)` - The client could not be built or the schema
    ///   could not be loaded
    pub fn from_config(config: &Config, storage: SharedStorage) -> Result<Self, ProbeError> {
        let client = build_http_client(&config.user_agent, &config.http)?;

        let schema = match &config.validation.catalog_schema_path {
            Some(path) => Some(Arc::new(CatalogSchema::load(path)?)),
            None => {
                tracing::warn!("No catalog schema configured, catalogs will not be validated");
                None
            }
        };

        let queue = TaskQueue::with_logging_hook(&config.crawler);

        Ok(Self::new(
            client,
            storage,
            schema,
            queue,
            config.http.max_content_bytes,
        ))
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn storage(&self) -> &SharedStorage {
        self.inspections.storage()
    }

    // ===== Crawl workflow =====

    /// Submits a crawl of one agency's catalog
    ///
    /// A missing agency or an empty catalog URL fails here, before anything
    /// is queued. Returns the id of the queued task.
    pub fn crawl_agency_datasets(&self, agency_id: i64) -> Result<u64, ProbeError> {
        let agency = with_storage(self.storage(), |s| s.get_agency(agency_id))?;
        let catalog_url = agency.data_json_url.trim().to_string();
        if catalog_url.is_empty() {
            return Err(ProbeError::MissingCatalogUrl(agency_id));
        }

        let coordinator = self.clone();
        let task_id = self.queue.submit(
            format!("crawl_agency_datasets[{}]", agency.name),
            Lane::Default,
            move || {
                let coordinator = coordinator.clone();
                let catalog_url = catalog_url.clone();
                async move {
                    coordinator
                        .create_data_crawl_report(agency_id, &catalog_url)
                        .await
                        .map(|_| ())
                }
            },
        );

        tracing::info!(
            "Queued crawl of {} ({}) as task {}",
            agency.name,
            agency.data_json_url,
            task_id
        );
        Ok(task_id)
    }

    /// Submits a crawl of every agency
    ///
    /// Agencies that cannot be crawled are logged and skipped.
    pub fn crawl_all_agencies(&self) -> Result<Vec<u64>, ProbeError> {
        let agencies = with_storage(self.storage(), |s| s.list_agencies())?;
        let mut task_ids = Vec::with_capacity(agencies.len());

        for agency in agencies {
            match self.crawl_agency_datasets(agency.id) {
                Ok(task_id) => task_ids.push(task_id),
                Err(e) => tracing::warn!("Skipping crawl of {}: {}", agency.name, e),
            }
        }

        Ok(task_ids)
    }

    /// The body of a crawl
    ///
    /// Fetches the catalog (reusing today's inspection if there is one),
    /// creates the crawl report and submits one check task per dataset URL.
    /// A catalog that cannot be fetched or decoded still produces a report
    /// explaining why.
    pub async fn create_data_crawl_report(
        &self,
        agency_id: i64,
        catalog_url: &str,
    ) -> Result<Envelope, ProbeError> {
        let mut workflow = Workflow::start("crawl");
        let mut envelope = Envelope::new()
            .with(keys::AGENCY_ID, agency_id)
            .with(keys::CATALOG_URL, catalog_url);

        let inspection_id = self.inspections.get_or_create(catalog_url).await?;
        envelope.insert(keys::RESPONSE_ID, inspection_id);
        let inspection = with_storage(self.storage(), |s| s.get_inspection(inspection_id))?;

        let fetched = inspection.status_code.map_or(false, |status| status < 400);
        if !fetched {
            workflow.advance(WorkflowState::FailedNoCatalog)?;
            let report_id = self.open_crawl_report(
                agency_id,
                catalog_url,
                inspection_id,
                workflow.state(),
                format!("Unable to fetch data catalog from '{}'", catalog_url),
            )?;
            tracing::warn!("Crawl of {} failed: catalog not fetched", catalog_url);
            return Ok(envelope.with(keys::REPORT_ID, report_id));
        }
        workflow.advance(WorkflowState::CatalogFetched)?;

        let Parsed {
            envelope: parse_envelope,
            json,
            ..
        } = parse_json(inspection.content.as_deref(), inspection.effective_encoding());
        envelope.merge(parse_envelope);

        let extraction = match json.as_ref().map(extract_checks) {
            Some(Ok(extraction)) => {
                workflow.advance(WorkflowState::CatalogParsed)?;
                extraction
            }
            not_a_catalog => {
                if let Some(Err(e)) = not_a_catalog {
                    workflow.advance(WorkflowState::CatalogParsed)?;
                    envelope.record(e);
                }
                workflow.advance(WorkflowState::FailedNoCatalog)?;
                let report_id = self.open_crawl_report(
                    agency_id,
                    catalog_url,
                    inspection_id,
                    workflow.state(),
                    format!(
                        "Unable to load json data from '{}'. Cannot find urls for datasets",
                        catalog_url
                    ),
                )?;
                for error in envelope.errors() {
                    tracing::warn!("{}: {}", catalog_url, error);
                }
                return Ok(envelope.with(keys::REPORT_ID, report_id));
            }
        };

        let report_id = self.open_crawl_report(
            agency_id,
            catalog_url,
            inspection_id,
            workflow.state(),
            format!("Data catalog contains {} items", extraction.item_count),
        )?;
        envelope.insert(keys::REPORT_ID, report_id);

        workflow.advance(WorkflowState::ItemsExtracted)?;
        with_storage(self.storage(), |s| {
            s.apply_report_update(
                report_id,
                &ReportUpdate {
                    state: Some(workflow.state()),
                    messages: extraction.messages.clone(),
                    ..ReportUpdate::default()
                },
            )
        })?;

        let check_count = extraction.checks.len();
        for check in extraction.checks {
            self.submit_check(check, report_id);
        }

        workflow.advance(WorkflowState::ChecksDispatched)?;
        with_storage(self.storage(), |s| s.set_report_state(report_id, workflow.state()))?;
        workflow.advance(WorkflowState::Completed)?;
        with_storage(self.storage(), |s| s.set_report_state(report_id, workflow.state()))?;

        tracing::info!(
            "Crawl report {} for {}: {} items, {} checks queued",
            report_id,
            catalog_url,
            extraction.item_count,
            check_count
        );
        Ok(envelope)
    }

    /// Creates a crawl report linked to the catalog inspection, with its
    /// first message
    fn open_crawl_report(
        &self,
        agency_id: i64,
        catalog_url: &str,
        inspection_id: i64,
        state: WorkflowState,
        message: String,
    ) -> Result<i64, ProbeError> {
        with_storage(self.storage(), |s| {
            let report_id = s.create_report(
                Some(agency_id),
                Some(catalog_url),
                ReportType::DataCatalogCrawl,
                state,
            )?;
            s.apply_report_update(
                report_id,
                &ReportUpdate {
                    messages: vec![message],
                    inspection: Some(InspectionUpdate {
                        inspection_id,
                        ..InspectionUpdate::default()
                    }),
                    ..ReportUpdate::default()
                },
            )?;
            Ok(report_id)
        })
    }

    fn submit_check(&self, check: CheckTask, report_id: i64) -> u64 {
        tracing::debug!("{} ({}): {}", check.url, check.url_type, CheckState::Dispatched);
        let coordinator = self.clone();
        self.queue.submit(
            format!("inspect_item_url[{}]", check.url),
            Lane::RateLimited,
            move || {
                let coordinator = coordinator.clone();
                let check = check.clone();
                async move {
                    coordinator
                        .inspect_item_url(&check, Some(report_id))
                        .await
                        .map(|_| ())
                }
            },
        )
    }

    /// Checks one dataset URL with a HEAD request and stores the outcome
    ///
    /// The inspection's info holds the item metadata and the URL type, and
    /// its errors hold whatever went wrong with the request.
    pub async fn inspect_item_url(
        &self,
        check: &CheckTask,
        report_id: Option<i64>,
    ) -> Result<Envelope, ProbeError> {
        let state = CheckState::Dispatched;
        let fetched = self.inspections.fetch(&check.url, "HEAD").await;
        let state = state.advance(CheckState::Fetched, &check.url)?;

        let info = check.item_info.to_info(check.url_type);
        let inspection_id = self
            .inspections
            .persist_check(&check.url, "HEAD", &fetched, report_id, info)?;
        state.advance(CheckState::Persisted, &check.url)?;
        tracing::debug!(
            "{} ({}): {} error(s), inspection {}",
            check.url,
            check.url_type,
            fetched.envelope.errors().len(),
            inspection_id
        );

        let mut envelope = Envelope::from_prior(&fetched.envelope)
            .with(keys::URL, check.url.as_str())
            .with(keys::URL_TYPE, check.url_type.as_str())
            .with(keys::RESPONSE_ID, inspection_id);
        if let Some(report_id) = report_id {
            envelope.insert(keys::REPORT_ID, report_id);
        }
        envelope.insert(keys::ITEM_INFO, json!(check.item_info));
        Ok(envelope)
    }

    // ===== Validation workflow =====

    /// Submits one validation chain per agency
    pub fn validate_data_catalogs(&self) -> Result<Vec<u64>, ProbeError> {
        let agencies = with_storage(self.storage(), |s| s.list_agencies())?;

        let task_ids = agencies
            .into_iter()
            .map(|agency| {
                let coordinator = self.clone();
                let agency_id = agency.id;
                let url = agency.data_json_url.clone();
                self.queue.submit(
                    format!("validate_data_catalog[{}]", agency.name),
                    Lane::Default,
                    move || {
                        let coordinator = coordinator.clone();
                        let url = url.clone();
                        async move {
                            coordinator
                                .validate_agency_catalog(agency_id, &url)
                                .await
                                .map(|_| ())
                        }
                    },
                )
            })
            .collect::<Vec<_>>();

        tracing::info!("Queued {} catalog validations", task_ids.len());
        Ok(task_ids)
    }

    /// Runs the validation chain for one catalog
    pub async fn validate_agency_catalog(
        &self,
        agency_id: i64,
        url: &str,
    ) -> Result<Envelope, ProbeError> {
        let run = self.report_for_agency_url(agency_id, url).await?;
        let run = self.parse_json_from_inspection(run)?;
        let run = self.validate_json_catalog(run)?;
        self.save_response_info(run)
    }

    /// Fetches a catalog and creates a validation report linked to the
    /// stored inspection
    ///
    /// An error status is recorded but does not stop the chain.
    pub async fn report_for_agency_url(
        &self,
        agency_id: i64,
        url: &str,
    ) -> Result<ValidationRun, ProbeError> {
        let mut workflow = Workflow::start("validate");
        let (inspection_id, fetched) = self.inspections.create_from_fetch(url, "GET").await?;

        let mut envelope = Envelope::from_prior(&fetched.envelope)
            .with(keys::AGENCY_ID, agency_id)
            .with(keys::URL, url)
            .with(keys::RESPONSE_ID, inspection_id);

        if let Some(response) = &fetched.response {
            workflow.advance(WorkflowState::CatalogFetched)?;
            envelope
                .object_mut(keys::RESPONSE_INFO)
                .insert("status_code".to_string(), json!(response.status.as_u16()));
        } else {
            envelope.object_mut(keys::RESPONSE_INFO);
        }

        let report_id = with_storage(self.storage(), |s| {
            let report_id = s.create_report(
                Some(agency_id),
                Some(url),
                ReportType::DataCatalogValidation,
                workflow.state(),
            )?;
            s.attach_inspection(report_id, inspection_id)?;
            Ok(report_id)
        })?;
        envelope.insert(keys::REPORT_ID, report_id);

        let stored_errors = envelope.errors().len();
        Ok(ValidationRun {
            envelope,
            report_id,
            inspection_id,
            json: None,
            parse_errors: false,
            validity: None,
            stored_errors,
            workflow,
        })
    }

    /// Decodes the stored catalog content
    ///
    /// Uses the declared encoding, or the apparent one when the server did
    /// not declare any. Sets `is_json` and `json_errors` in `response_info`.
    pub fn parse_json_from_inspection(
        &self,
        mut run: ValidationRun,
    ) -> Result<ValidationRun, ProbeError> {
        let inspection = with_storage(self.storage(), |s| s.get_inspection(run.inspection_id))?;
        let parsed = parse_json(inspection.content.as_deref(), inspection.effective_encoding());

        run.envelope.merge(parsed.envelope);
        let info = run.envelope.object_mut(keys::RESPONSE_INFO);
        info.insert("is_json".to_string(), json!(parsed.json.is_some()));
        info.insert("json_errors".to_string(), json!(parsed.parse_errors));

        if parsed.json.is_some() && run.workflow.state() == WorkflowState::CatalogFetched {
            run.workflow.advance(WorkflowState::CatalogParsed)?;
        }
        run.json = parsed.json;
        run.parse_errors = parsed.parse_errors;
        Ok(run)
    }

    /// Validates the decoded catalog against the configured schema
    pub fn validate_json_catalog(&self, run: ValidationRun) -> Result<ValidationRun, ProbeError> {
        let ValidationRun {
            envelope,
            report_id,
            inspection_id,
            json,
            parse_errors,
            stored_errors,
            mut workflow,
            ..
        } = run;

        let validated = catalog::validate_json_catalog(
            Parsed {
                envelope,
                json,
                parse_errors,
            },
            self.schema.as_deref(),
        );

        if workflow.state() == WorkflowState::CatalogParsed {
            workflow.advance(WorkflowState::CatalogValidated)?;
        }

        Ok(ValidationRun {
            envelope: validated.envelope,
            report_id,
            inspection_id,
            json: validated.json,
            parse_errors,
            validity: Some(validated.validity),
            stored_errors,
            workflow,
        })
    }

    /// Persists the outcome of the validation chain in one transaction
    ///
    /// Sets the report type and final state, merges `response_info` into the
    /// inspection's info, appends the errors recorded after the fetch to the
    /// inspection, and adds a summary message to the report.
    pub fn save_response_info(&self, mut run: ValidationRun) -> Result<Envelope, ProbeError> {
        let final_state = if run.workflow.state() == WorkflowState::CatalogValidated {
            WorkflowState::Completed
        } else {
            WorkflowState::FailedNoCatalog
        };
        run.workflow.advance(final_state)?;

        let url = run.envelope.get_str(keys::URL).unwrap_or_default().to_string();
        let report_type = run
            .envelope
            .get_str(keys::REPORT_TYPE)
            .and_then(ReportType::from_db_string)
            .unwrap_or(ReportType::Generic);

        let mut info = run.envelope.object_mut(keys::RESPONSE_INFO).clone();
        info.remove("content");
        info.remove("json");
        let info_json = Value::Object(info.clone());
        tracing::info!("Saving report info {}", info_json);

        let new_errors = run
            .envelope
            .errors()
            .get(run.stored_errors..)
            .unwrap_or_default()
            .to_vec();
        let violations = new_errors
            .iter()
            .filter(|e| e.kind == ErrorKind::SchemaViolation)
            .count();
        let message = summary_message(&url, run.validity, violations);

        let update = ReportUpdate {
            report_type: Some(report_type),
            state: Some(final_state),
            messages: vec![message],
            inspection: Some(InspectionUpdate {
                inspection_id: run.inspection_id,
                info,
                errors: new_errors,
            }),
        };
        with_storage(self.storage(), |s| s.apply_report_update(run.report_id, &update))?;

        tracing::info!(
            "Validation report {} for {}: {}",
            run.report_id,
            url,
            final_state
        );
        Ok(run.envelope.with(keys::SAVED, true))
    }
}

fn summary_message(url: &str, validity: Option<Validity>, violation_count: usize) -> String {
    match validity {
        Some(Validity::Valid) => format!("Data catalog at '{}' is valid", url),
        Some(Validity::Invalid) => format!(
            "Data catalog at '{}' is not valid ({} schema violations recorded)",
            url, violation_count
        ),
        Some(Validity::NoSchema) => format!(
            "Data catalog at '{}' was not validated: no schema configured",
            url
        ),
        Some(Validity::NoDocument) | None => {
            format!("Unable to load json data from '{}'", url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, HttpConfig, UserAgentConfig};
    use crate::envelope::ErrorKind;
    use crate::storage::SqliteStorage;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_coordinator(schema: Option<CatalogSchema>) -> Coordinator {
        let user_agent = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        let client = build_http_client(&user_agent, &HttpConfig::default()).unwrap();
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let queue = TaskQueue::with_logging_hook(&CrawlerConfig {
            check_rate_limit: 1000.0,
            ..CrawlerConfig::default()
        });
        Coordinator::new(client, storage, schema.map(Arc::new), queue, 1024 * 1024)
    }

    fn add_agency(coordinator: &Coordinator, url: &str) -> i64 {
        with_storage(coordinator.storage(), |s| s.upsert_agency("Testing", url)).unwrap()
    }

    async fn serve_catalog(server: &MockServer, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body, "application/json"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_crawl_reports_item_count_and_missing_urls() {
        let server = MockServer::start().await;
        serve_catalog(
            &server,
            200,
            &format!(
                r#"[{{"title": "Has url", "accessURL": "{0}/a.csv"}}, {{"title": "Bare"}}]"#,
                server.uri()
            ),
        )
        .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let coordinator = create_test_coordinator(None);
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .create_data_crawl_report(agency_id, &url)
            .await
            .unwrap();
        coordinator.queue().drain().await;

        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(report.report_type, ReportType::DataCatalogCrawl);
        assert_eq!(report.state, WorkflowState::Completed);
        assert_eq!(
            report.messages,
            vec![
                "Data catalog contains 2 items",
                "No urls found for catalog item titled 'Bare'"
            ]
        );
        // catalog inspection plus one check
        assert_eq!(report.inspection_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_crawl_of_missing_catalog() {
        let server = MockServer::start().await;
        serve_catalog(&server, 404, "").await;

        let coordinator = create_test_coordinator(None);
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .create_data_crawl_report(agency_id, &url)
            .await
            .unwrap();

        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(report.state, WorkflowState::FailedNoCatalog);
        assert_eq!(
            report.messages,
            vec![format!("Unable to fetch data catalog from '{}'", url)]
        );
        assert_eq!(coordinator.queue().stats().submitted, 0);
    }

    #[tokio::test]
    async fn test_crawl_of_unparseable_catalog() {
        let server = MockServer::start().await;
        serve_catalog(&server, 200, "<html>Not here</html>").await;

        let coordinator = create_test_coordinator(None);
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .create_data_crawl_report(agency_id, &url)
            .await
            .unwrap();

        assert!(envelope.errors_of_kind(ErrorKind::DecodeError).count() >= 1);
        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(report.state, WorkflowState::FailedNoCatalog);
        assert_eq!(
            report.messages,
            vec![format!(
                "Unable to load json data from '{}'. Cannot find urls for datasets",
                url
            )]
        );
    }

    #[tokio::test]
    async fn test_crawl_of_json_that_is_not_a_catalog() {
        let server = MockServer::start().await;
        serve_catalog(&server, 200, r#"{"status": "maintenance"}"#).await;

        let coordinator = create_test_coordinator(None);
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .create_data_crawl_report(agency_id, &url)
            .await
            .unwrap();

        assert_eq!(envelope.errors_of_kind(ErrorKind::NotACatalog).count(), 1);
        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(report.state, WorkflowState::FailedNoCatalog);
    }

    #[tokio::test]
    async fn test_crawl_preconditions() {
        let coordinator = create_test_coordinator(None);

        let err = coordinator.crawl_agency_datasets(404).unwrap_err();
        assert!(!err.is_retryable());

        let agency_id = add_agency(&coordinator, "   ");
        assert!(matches!(
            coordinator.crawl_agency_datasets(agency_id),
            Err(ProbeError::MissingCatalogUrl(id)) if id == agency_id
        ));
        assert_eq!(coordinator.queue().stats().submitted, 0);
    }

    #[tokio::test]
    async fn test_inspect_item_url_stores_item_info() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone.csv"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let coordinator = create_test_coordinator(None);
        let check = CheckTask {
            url: format!("{}/gone.csv", server.uri()),
            url_type: catalog::UrlType::DistributionAccessUrl,
            item_info: catalog::ItemInfo {
                title: Some("Old data".to_string()),
                ..catalog::ItemInfo::default()
            },
        };

        let envelope = coordinator.inspect_item_url(&check, None).await.unwrap();
        assert_eq!(envelope.errors()[0].kind, ErrorKind::HttpError);

        let id = envelope.get_i64(keys::RESPONSE_ID).unwrap();
        let inspection = with_storage(coordinator.storage(), |s| s.get_inspection(id)).unwrap();
        assert_eq!(inspection.status_code, Some(410));
        assert_eq!(inspection.info["title"], json!("Old data"));
        assert_eq!(inspection.info["urlType"], json!("distribution.accessURL"));
        assert!(inspection.report_id.is_none());
    }

    #[tokio::test]
    async fn test_validation_without_schema() {
        let server = MockServer::start().await;
        serve_catalog(&server, 200, "[]").await;

        let coordinator = create_test_coordinator(None);
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .validate_agency_catalog(agency_id, &url)
            .await
            .unwrap();
        assert_eq!(envelope.get(keys::SAVED), Some(&json!(true)));

        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(report.report_type, ReportType::DataCatalogValidation);
        assert_eq!(report.state, WorkflowState::Completed);

        let inspection =
            with_storage(coordinator.storage(), |s| s.get_inspection(report.inspection_ids[0]))
                .unwrap();
        assert_eq!(inspection.info["is_json"], json!(true));
        assert_eq!(inspection.info["is_valid_data_catalog"], json!(false));
        assert_eq!(inspection.info["schema_validation"], json!("no_schema"));
    }

    #[tokio::test]
    async fn test_validation_continues_past_error_status() {
        let server = MockServer::start().await;
        serve_catalog(&server, 500, "oops").await;

        let schema = CatalogSchema::from_value(json!({"type": "array"})).unwrap();
        let coordinator = create_test_coordinator(Some(schema));
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .validate_agency_catalog(agency_id, &url)
            .await
            .unwrap();

        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(report.state, WorkflowState::FailedNoCatalog);
        assert_eq!(
            report.messages,
            vec![format!("Unable to load json data from '{}'", url)]
        );

        // The status error was stored with the fetch and is not repeated
        let inspection =
            with_storage(coordinator.storage(), |s| s.get_inspection(report.inspection_ids[0]))
                .unwrap();
        assert_eq!(
            inspection
                .errors
                .iter()
                .filter(|e| e.kind == ErrorKind::HttpError)
                .count(),
            1
        );
        assert!(inspection
            .errors
            .iter()
            .any(|e| e.kind == ErrorKind::DecodeError));
        assert_eq!(inspection.info["status_code"], json!(500));
    }

    #[tokio::test]
    async fn test_invalid_summary_counts_only_violations() {
        let server = MockServer::start().await;
        serve_catalog(&server, 200, "\u{feff}[1, 2]").await;

        let schema = CatalogSchema::from_value(json!({"type": "object"})).unwrap();
        let coordinator = create_test_coordinator(Some(schema));
        let url = format!("{}/data.json", server.uri());
        let agency_id = add_agency(&coordinator, &url);

        let envelope = coordinator
            .validate_agency_catalog(agency_id, &url)
            .await
            .unwrap();
        assert_eq!(envelope.errors_of_kind(ErrorKind::DecodeError).count(), 1);

        let report_id = envelope.get_i64(keys::REPORT_ID).unwrap();
        let report = with_storage(coordinator.storage(), |s| s.get_report(report_id)).unwrap();
        assert_eq!(
            report.messages,
            vec![format!(
                "Data catalog at '{}' is not valid (1 schema violations recorded)",
                url
            )]
        );
    }

    #[test]
    fn test_summary_messages() {
        assert_eq!(
            summary_message("http://a.gov", Some(Validity::Invalid), 3),
            "Data catalog at 'http://a.gov' is not valid (3 schema violations recorded)"
        );
        assert_eq!(
            summary_message("http://a.gov", None, 0),
            "Unable to load json data from 'http://a.gov'"
        );
    }
}
