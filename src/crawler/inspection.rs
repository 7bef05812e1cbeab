//! Bridge between fetches and persisted inspections
//!
//! Every HTTP attempt made by a workflow ends up as an inspection row, even
//! when no response came back. Catalog fetches made on the same day as the
//! most recent inspection reuse the stored record instead of fetching again.

use crate::crawler::fetcher::{request_url, Fetched};
use crate::crawler::{with_storage, SharedStorage};
use crate::storage::{NewInspection, Storage};
use crate::ProbeError;
use reqwest::Client;
use serde_json::{Map, Value};

/// Creates inspections from fetches
#[derive(Clone)]
pub struct InspectionStore {
    client: Client,
    storage: SharedStorage,
    max_content_bytes: usize,
}

impl InspectionStore {
    pub fn new(client: Client, storage: SharedStorage, max_content_bytes: usize) -> Self {
        Self {
            client,
            storage,
            max_content_bytes,
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Returns the id of today's inspection of `url`, fetching it if needed
    ///
    /// "Today" is the UTC calendar day of the most recent inspection of any
    /// URL. Only parentless GET inspections requested with exactly this URL
    /// are reused; HEAD checks carry no body.
    pub async fn get_or_create(&self, url: &str) -> Result<i64, ProbeError> {
        let existing = with_storage(&self.storage, |s| match s.latest_inspection_time()? {
            Some(latest) => s.find_inspection_on_day(url, latest.date_naive()),
            None => Ok(None),
        })?;

        if let Some(inspection) = existing {
            tracing::debug!(
                "Reusing inspection {} of {} from {}",
                inspection.id,
                url,
                inspection.created_at
            );
            return Ok(inspection.id);
        }

        tracing::info!("No stored response for {}, fetching", url);
        let fetched = request_url(&self.client, url, "GET", self.max_content_bytes).await;
        let inspection = to_inspection(url, "GET", &fetched, true);
        with_storage(&self.storage, |s| s.create_inspection(&inspection))
    }

    /// Checks a URL and stores the outcome without the body
    ///
    /// `info` is stored as the inspection's info map, and the inspection is
    /// linked to `report_id` in the same transaction.
    pub async fn create_from_check(
        &self,
        url: &str,
        method: &str,
        report_id: Option<i64>,
        info: Map<String, Value>,
    ) -> Result<(i64, Fetched), ProbeError> {
        let fetched = self.fetch(url, method).await;
        let id = self.persist_check(url, method, &fetched, report_id, info)?;
        Ok((id, fetched))
    }

    /// Requests a URL without storing anything
    pub async fn fetch(&self, url: &str, method: &str) -> Fetched {
        request_url(&self.client, url, method, self.max_content_bytes).await
    }

    /// Stores a check made with [`fetch`](Self::fetch), dropping the body
    pub fn persist_check(
        &self,
        url: &str,
        method: &str,
        fetched: &Fetched,
        report_id: Option<i64>,
        info: Map<String, Value>,
    ) -> Result<i64, ProbeError> {
        let mut inspection = to_inspection(url, method, fetched, false);
        inspection.info = info;
        inspection.report_id = report_id;

        with_storage(&self.storage, |s| s.create_inspection(&inspection))
    }

    /// Fetches a URL and stores the outcome with its body, never reusing a
    /// stored inspection
    pub async fn create_from_fetch(
        &self,
        url: &str,
        method: &str,
    ) -> Result<(i64, Fetched), ProbeError> {
        let fetched = request_url(&self.client, url, method, self.max_content_bytes).await;
        let inspection = to_inspection(url, method, &fetched, true);
        let id = with_storage(&self.storage, |s| s.create_inspection(&inspection))?;
        Ok((id, fetched))
    }
}

/// Builds the row for one fetch
fn to_inspection(
    url: &str,
    method: &str,
    fetched: &Fetched,
    keep_content: bool,
) -> NewInspection {
    let mut inspection = NewInspection::for_url(url);
    inspection.method = method.trim().to_ascii_uppercase();
    inspection.errors = fetched.envelope.errors().to_vec();

    if let Some(response) = &fetched.response {
        inspection.final_url = Some(response.final_url.clone());
        inspection.status_code = Some(response.status.as_u16());
        inspection.headers = response.headers.clone();
        inspection.encoding = response.encoding.clone();
        inspection.apparent_encoding = response.apparent_encoding.clone();
        if keep_content {
            inspection.content = response.content.clone();
        }
    }

    inspection
}
