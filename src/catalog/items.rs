//! Extraction of checkable URLs from catalog items

use crate::envelope::{keys, StageError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const DEFAULT_TITLE: &str = "No title provided.";

/// Which field of a catalog item a URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlType {
    #[serde(rename = "accessURL")]
    AccessUrl,
    #[serde(rename = "webService")]
    WebService,
    #[serde(rename = "distribution.accessURL")]
    DistributionAccessUrl,
}

impl UrlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessUrl => "accessURL",
            Self::WebService => "webService",
            Self::DistributionAccessUrl => "distribution.accessURL",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata copied from a catalog item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub title: Option<String>,
    #[serde(rename = "accessLevel")]
    pub access_level: Option<String>,
    pub publisher: Option<String>,
    pub modified: Option<String>,
}

impl ItemInfo {
    /// Reads the metadata fields of an item
    ///
    /// Values that are not strings (a publisher object, a numeric year) are
    /// kept as compact JSON text.
    pub fn from_item(item: &Map<String, Value>) -> Self {
        Self {
            title: metadata_text(item.get("title")),
            access_level: metadata_text(item.get("accessLevel")),
            publisher: metadata_text(item.get("publisher")),
            modified: metadata_text(item.get("modified")),
        }
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Inspection info for a check of one of this item's URLs
    pub fn to_info(&self, url_type: UrlType) -> Map<String, Value> {
        let mut info = Map::new();
        for (key, value) in [
            ("title", &self.title),
            ("accessLevel", &self.access_level),
            ("publisher", &self.publisher),
            ("modified", &self.modified),
        ] {
            info.insert(
                key.to_string(),
                value.clone().map_or(Value::Null, Value::String),
            );
        }
        info.insert(keys::URL_TYPE.to_string(), Value::from(url_type.as_str()));
        info
    }
}

fn metadata_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// One URL to check, with the item it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTask {
    pub url: String,
    pub url_type: UrlType,
    pub item_info: ItemInfo,
}

/// Everything extracted from a catalog
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub checks: Vec<CheckTask>,
    /// Report messages about items without any URL
    pub messages: Vec<String>,
    pub item_count: usize,
}

/// Returns the dataset list of a catalog
///
/// Both the bare array form and the `{"dataset": [...]}` form are accepted.
pub fn catalog_items(json: &Value) -> Result<&[Value], StageError> {
    match json {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Object(map) => match map.get("dataset") {
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(StageError::NotACatalog(
                "The 'dataset' member of the catalog is not a list".to_string(),
            )),
            None => Err(StageError::NotACatalog(
                "Expected a list of datasets or an object with a 'dataset' list".to_string(),
            )),
        },
        _ => Err(StageError::NotACatalog(
            "Expected a list of datasets or an object with a 'dataset' list".to_string(),
        )),
    }
}

/// Builds one check per checkable URL of every catalog item
///
/// URLs are taken in the order `accessURL`, `webService`, then each
/// distribution's `accessURL`. Blank URLs are skipped.
pub fn extract_checks(json: &Value) -> Result<Extraction, StageError> {
    let items = catalog_items(json)?;
    let mut extraction = Extraction {
        item_count: items.len(),
        ..Extraction::default()
    };

    for (index, item) in items.iter().enumerate() {
        let item = match item {
            Value::Object(item) => item,
            other => {
                tracing::warn!("Catalog item {} is not an object: {}", index, other);
                extraction.messages.push(format!(
                    "No urls found for catalog item titled '{}'",
                    DEFAULT_TITLE
                ));
                continue;
            }
        };

        let item_info = ItemInfo::from_item(item);
        let before = extraction.checks.len();

        for url_type in [UrlType::AccessUrl, UrlType::WebService] {
            match url_field(item.get(url_type.as_str())) {
                Some(url) => extraction.checks.push(CheckTask {
                    url,
                    url_type,
                    item_info: item_info.clone(),
                }),
                None => tracing::debug!("No '{}' in item {}", url_type, index),
            }
        }

        if let Some(Value::Array(distribution)) = item.get("distribution") {
            for entry in distribution {
                if let Some(url) = url_field(entry.get("accessURL")) {
                    extraction.checks.push(CheckTask {
                        url,
                        url_type: UrlType::DistributionAccessUrl,
                        item_info: item_info.clone(),
                    });
                }
            }
        }

        if extraction.checks.len() == before {
            extraction.messages.push(format!(
                "No urls found for catalog item titled '{}'",
                item_info.title_or_default()
            ));
        }
    }

    Ok(extraction)
}

fn url_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
}
