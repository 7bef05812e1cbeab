//! Result envelope passed between pipeline stages
//!
//! Every stage takes the previous stage's envelope, adds its own payload
//! entries and recorded errors, and hands the envelope on. Errors are only
//! ever appended: merging one envelope into another concatenates the error
//! lists and never replaces one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Well-known payload keys
pub mod keys {
    pub const INITIAL_URL: &str = "initial_url";
    pub const CORRECTED_URL: &str = "corrected_url";
    pub const URL: &str = "url";
    pub const URL_TYPE: &str = "urlType";
    pub const AGENCY_ID: &str = "agency_id";
    pub const CATALOG_URL: &str = "catalog_url";
    pub const REPORT_ID: &str = "report_id";
    pub const RESPONSE_ID: &str = "response_id";
    pub const RESPONSE_INFO: &str = "response_info";
    pub const ITEM_INFO: &str = "item_info";
    pub const REPORT_TYPE: &str = "report_type";
    pub const SAVED: &str = "saved";
}

/// Category of a recorded error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MissingSchema,
    InvalidSchema,
    InvalidUrl,
    InvalidMethod,
    ConnectionError,
    Timeout,
    TooManyRedirects,
    RequestError,
    HttpError,
    ContentTooLarge,
    NoContent,
    DecodeError,
    LenientDecodeError,
    SchemaViolation,
    NotACatalog,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSchema => "MissingSchema",
            Self::InvalidSchema => "InvalidSchema",
            Self::InvalidUrl => "InvalidURL",
            Self::InvalidMethod => "InvalidMethod",
            Self::ConnectionError => "ConnectionError",
            Self::Timeout => "Timeout",
            Self::TooManyRedirects => "TooManyRedirects",
            Self::RequestError => "RequestException",
            Self::HttpError => "HTTPError",
            Self::ContentTooLarge => "ContentTooLarge",
            Self::NoContent => "NoContent",
            Self::DecodeError => "JSONDecodeError",
            Self::LenientDecodeError => "LenientDecodeError",
            Self::SchemaViolation => "ValidationError",
            Self::NotACatalog => "NotACatalog",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded error: its kind plus a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors a stage records instead of returning
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Invalid URL '{url}': No schema supplied. Perhaps you meant http://{url}?")]
    MissingSchema { url: String },

    #[error("No connection adapters were found for '{url}' (scheme '{scheme}')")]
    InvalidSchema { url: String, scheme: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("Failed to connect to {url}: {source}")]
    Connection { url: String, source: reqwest::Error },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Exceeded the redirect limit while requesting {url}")]
    TooManyRedirects { url: String },

    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("{status} for url: {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Response body of {url} exceeds {limit} bytes")]
    ContentTooLarge { url: String, limit: usize },

    #[error("No content to parse")]
    NoContent,

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    LenientDecode(String),

    #[error("{message} at '{instance_path}' >>\n {schema}")]
    SchemaViolation {
        message: String,
        instance_path: String,
        schema: String,
    },

    #[error("{0}")]
    NotACatalog(String),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSchema { .. } => ErrorKind::MissingSchema,
            Self::InvalidSchema { .. } => ErrorKind::InvalidSchema,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::InvalidMethod(_) => ErrorKind::InvalidMethod,
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            Self::Request { .. } => ErrorKind::RequestError,
            Self::Status { .. } => ErrorKind::HttpError,
            Self::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
            Self::NoContent => ErrorKind::NoContent,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::LenientDecode(_) => ErrorKind::LenientDecodeError,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::NotACatalog(_) => ErrorKind::NotACatalog,
        }
    }
}

impl From<StageError> for ErrorRecord {
    fn from(err: StageError) -> Self {
        ErrorRecord {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Payload plus accumulated errors, threaded through a chain of stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    payload: Map<String, Value>,
    errors: Vec<ErrorRecord>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an envelope from a prior stage's output, keeping its payload
    /// and its errors
    pub fn from_prior(prior: &Envelope) -> Self {
        prior.clone()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.payload.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.payload.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Returns the object stored under `key`, creating an empty one if the
    /// key is absent or holds a non-object value
    pub fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let slot = self
            .payload
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot replaced with an object above"),
        }
    }

    /// Records an error without interrupting the stage
    pub fn record(&mut self, error: impl Into<ErrorRecord>) {
        let record = error.into();
        tracing::debug!("Recorded {}", record);
        self.errors.push(record);
    }

    pub fn extend_errors(&mut self, errors: impl IntoIterator<Item = ErrorRecord>) {
        self.errors.extend(errors);
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors_of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    /// Folds another envelope into this one
    ///
    /// Payload entries from `other` are inserted, replacing entries with the
    /// same key. Errors from `other` are appended after this envelope's own.
    pub fn merge(&mut self, other: Envelope) {
        self.payload.extend(other.payload);
        self.errors.extend(other.errors);
    }

    /// Splits the envelope into its payload and error list
    pub fn into_parts(self) -> (Map<String, Value>, Vec<ErrorRecord>) {
        (self.payload, self.errors)
    }
}
