use crate::envelope::{keys, Envelope, StageError};
use reqwest::Method;
use url::{ParseError, Url};

/// A request that is ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub method: Method,
    pub url: Url,
}

/// Output of URL normalization
///
/// The envelope always carries `initial_url`, and `corrected_url` when the
/// scheme had to be added. `target` is `None` when no usable request could
/// be built; the reasons are in the envelope's errors.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub envelope: Envelope,
    pub target: Option<RequestTarget>,
}

/// Checks a URL for problems, records them, and tries to correct the URL
///
/// # Correction Rules
///
/// 1. Surrounding whitespace is ignored
/// 2. A URL without a scheme (`example.gov/data.json`, `localhost:8080/x`)
///    is retried once as `http://...`
/// 3. Only `http` and `https` are accepted
/// 4. A URL must name a host
///
/// Every failure is recorded in the returned envelope; this never fails.
///
/// # Examples
///
/// ```
/// use catalog_probe::url::check_and_correct_url;
///
/// let env = check_and_correct_url("www.example.gov/data.json", "GET");
/// assert_eq!(env.get_str("corrected_url"), Some("http://www.example.gov/data.json"));
/// assert_eq!(env.errors().len(), 1);
/// ```
pub fn check_and_correct_url(url: &str, method: &str) -> Envelope {
    normalize_request(url, method).envelope
}

/// Builds a request target from a raw URL and method name
///
/// This is [`check_and_correct_url`] plus the resulting request target.
pub fn normalize_request(url: &str, method: &str) -> NormalizedRequest {
    let mut envelope = Envelope::new().with(keys::INITIAL_URL, url);

    let method = match Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()) {
        Ok(m) => Some(m),
        Err(_) => {
            envelope.record(StageError::InvalidMethod(method.to_string()));
            None
        }
    };

    let trimmed = url.trim();
    let parsed = match parse_http_url(trimmed) {
        Ok(parsed) => Some(parsed),
        Err(err @ StageError::MissingSchema { .. }) => {
            envelope.record(err);
            let retry = format!("http://{}", trimmed);
            match parse_http_url(&retry) {
                Ok(corrected) => {
                    envelope.insert(keys::CORRECTED_URL, corrected.as_str());
                    Some(corrected)
                }
                Err(retry_err) => {
                    envelope.record(retry_err);
                    None
                }
            }
        }
        Err(err) => {
            envelope.record(err);
            None
        }
    };

    let target = match (method, parsed) {
        (Some(method), Some(url)) => Some(RequestTarget { method, url }),
        _ => None,
    };

    NormalizedRequest { envelope, target }
}

/// Parses a URL and checks that it can be requested over HTTP
fn parse_http_url(raw: &str) -> Result<Url, StageError> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => {
            return Err(StageError::MissingSchema {
                url: raw.to_string(),
            })
        }
        Err(ParseError::EmptyHost) => {
            return Err(StageError::InvalidUrl {
                url: raw.to_string(),
                reason: "No host supplied".to_string(),
            })
        }
        Err(e) => {
            return Err(StageError::InvalidUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        // `host:8080/path` parses with `host` as the scheme
        if is_bare_host_port(raw) {
            return Err(StageError::MissingSchema {
                url: raw.to_string(),
            });
        }
        return Err(StageError::InvalidSchema {
            url: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(StageError::InvalidUrl {
            url: raw.to_string(),
            reason: "No host supplied".to_string(),
        });
    }

    Ok(url)
}

fn is_bare_host_port(raw: &str) -> bool {
    !raw.contains("://")
        && raw
            .split_once(':')
            .map_or(false, |(_, rest)| rest.starts_with(|c: char| c.is_ascii_digit()))
}
