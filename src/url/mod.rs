//! URL handling module for Catalog-Probe
//!
//! Catalog URLs are typed by hand and are frequently missing their scheme.
//! This module turns a raw URL and method name into a request target,
//! correcting what it can and recording the rest.

mod normalize;

pub use normalize::{check_and_correct_url, normalize_request, NormalizedRequest, RequestTarget};
