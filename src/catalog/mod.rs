//! Data catalog handling
//!
//! This module turns fetched catalog bytes into something the workflows can
//! act on:
//! - Decoding content to JSON, strictly and then leniently
//! - Validating the JSON against the catalog schema
//! - Extracting the URLs of every dataset for reachability checks

mod items;
mod parser;
mod validator;

pub use items::{catalog_items, extract_checks, CheckTask, Extraction, ItemInfo, UrlType};
pub use parser::{parse_json, Parsed};
pub use validator::{
    validate_json_catalog, CatalogSchema, Validated, Validity, SCHEMA_ERROR_LIMIT,
};
