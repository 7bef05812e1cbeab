//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests, including:
//! - Building the shared HTTP client with the configured user agent
//! - URL correction before a request is sent
//! - GET requests that keep a size-bounded body, HEAD requests that do not
//! - Error classification into recorded envelope errors

use crate::config::{HttpConfig, UserAgentConfig};
use crate::envelope::{Envelope, StageError};
use crate::url::{normalize_request, NormalizedRequest};
use reqwest::{redirect::Policy, Client, Method, Response, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;

/// Snapshot of an HTTP response, detached from the connection
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// Final URL after redirects
    pub final_url: String,
    pub status: StatusCode,
    /// Header names are lowercase; repeated headers are joined with ", "
    pub headers: BTreeMap<String, String>,
    /// Body, absent for HEAD requests and oversize bodies
    pub content: Option<Vec<u8>>,
    /// Charset declared by the server
    pub encoding: Option<String>,
    /// Charset guessed from the body
    pub apparent_encoding: Option<String>,
}

impl FetchedResponse {
    /// True unless the status is a client or server error
    pub fn is_ok(&self) -> bool {
        !(self.status.is_client_error() || self.status.is_server_error())
    }
}

/// Result of a fetch operation
///
/// `response` is `None` when no request could be sent or the transport
/// failed; the envelope says why.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub envelope: Envelope,
    pub response: Option<FetchedResponse>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `http` - Timeouts and redirect limit
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use catalog_probe::config::{HttpConfig, UserAgentConfig};
/// use catalog_probe::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "CatalogProbe".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.gov/about".to_string(),
///     contact_email: "ops@example.gov".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    http: &HttpConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(http.request_timeout))
        .connect_timeout(Duration::from_secs(http.connect_timeout))
        .redirect(Policy::limited(http.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Requests a URL, recording every problem instead of failing
///
/// # Request Flow
///
/// 1. Correct the URL (add a missing `http://`) and check the method
/// 2. Send the request, following redirects up to the client's limit
/// 3. Record a 4xx/5xx status as an error but keep the response
/// 4. For anything but HEAD, read the body up to `max_content_bytes`
///
/// # Error Classification
///
/// | Condition | Recorded as |
/// |-----------|-------------|
/// | Connection refused, DNS, TLS | `ConnectionError` |
/// | Timeout | `Timeout` |
/// | Redirect chain over the limit | `TooManyRedirects` |
/// | Anything else on the transport | `RequestError` |
/// | HTTP 4xx/5xx | `HttpError` |
/// | Body over the limit | `ContentTooLarge` |
pub async fn request_url(
    client: &Client,
    url: &str,
    method: &str,
    max_content_bytes: usize,
) -> Fetched {
    let NormalizedRequest {
        mut envelope,
        target,
    } = normalize_request(url, method);

    let target = match target {
        Some(target) => target,
        None => {
            tracing::debug!("No usable request for '{}'", url);
            return Fetched {
                envelope,
                response: None,
            };
        }
    };

    let is_head = target.method == Method::HEAD;
    let request_url = target.url.to_string();
    tracing::debug!("{} {}", target.method, request_url);

    let response = match client.request(target.method, target.url).send().await {
        Ok(response) => response,
        Err(e) => {
            envelope.record(classify_error(&request_url, e));
            return Fetched {
                envelope,
                response: None,
            };
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();
    let headers = collect_headers(&response);
    let encoding = declared_encoding(headers.get("content-type").map(String::as_str));

    if status.is_client_error() || status.is_server_error() {
        envelope.record(StageError::Status {
            status,
            url: final_url.clone(),
        });
    }

    let content = if is_head {
        None
    } else {
        match read_body(response, &final_url, max_content_bytes).await {
            Ok(body) => Some(body),
            Err(e) => {
                envelope.record(e);
                None
            }
        }
    };
    let apparent_encoding = content.as_deref().map(apparent_encoding);

    Fetched {
        envelope,
        response: Some(FetchedResponse {
            final_url,
            status,
            headers,
            content,
            encoding,
            apparent_encoding,
        }),
    }
}

fn classify_error(url: &str, e: reqwest::Error) -> StageError {
    if e.is_timeout() {
        StageError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_redirect() {
        StageError::TooManyRedirects {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        StageError::Connection {
            url: url.to_string(),
            source: e,
        }
    } else {
        StageError::Request {
            url: url.to_string(),
            source: e,
        }
    }
}

fn collect_headers(response: &Response) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    headers
}

async fn read_body(mut response: Response, url: &str, limit: usize) -> Result<Vec<u8>, StageError> {
    let too_large = || StageError::ContentTooLarge {
        url: url.to_string(),
        limit,
    };

    if response.content_length().map_or(false, |len| len > limit as u64) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_error(url, e))?
    {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Charset from a Content-Type header
///
/// Text types without a charset default to ISO-8859-1.
fn declared_encoding(content_type: Option<&str>) -> Option<String> {
    let content_type = content_type?;
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();

    let charset = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    });

    match charset {
        Some(charset) if !charset.is_empty() => Some(charset),
        _ if mime.starts_with("text/") => Some("ISO-8859-1".to_string()),
        _ => None,
    }
}

fn apparent_encoding(body: &[u8]) -> String {
    if std::str::from_utf8(body).is_ok() {
        "utf-8".to_string()
    } else {
        "windows-1252".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIMIT: usize = 1024 * 1024;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn test_client() -> Client {
        build_http_client(&create_test_config(), &HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_config(), &HttpConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_declared_encoding() {
        assert_eq!(
            declared_encoding(Some("application/json; charset=UTF-8")),
            Some("UTF-8".to_string())
        );
        assert_eq!(
            declared_encoding(Some("text/html;charset=\"windows-1252\"")),
            Some("windows-1252".to_string())
        );
        assert_eq!(
            declared_encoding(Some("text/plain")),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(declared_encoding(Some("application/json")), None);
        assert_eq!(declared_encoding(None), None);
    }

    #[test]
    fn test_apparent_encoding() {
        assert_eq!(apparent_encoding("Señor".as_bytes()), "utf-8");
        assert_eq!(apparent_encoding(b"Se\xf1or"), "windows-1252");
    }

    #[tokio::test]
    async fn test_get_keeps_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("[]", "application/json; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/data.json", server.uri());
        let fetched = request_url(&test_client(), &url, "GET", LIMIT).await;

        assert!(!fetched.envelope.has_errors());
        let response = fetched.response.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.content.as_deref(), Some(&b"[]"[..]));
        assert_eq!(response.encoding.as_deref(), Some("utf-8"));
        assert_eq!(response.apparent_encoding.as_deref(), Some("utf-8"));
        assert_eq!(response.final_url, url);
    }

    #[tokio::test]
    async fn test_error_status_is_recorded_and_response_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing.json", server.uri());
        let fetched = request_url(&test_client(), &url, "GET", LIMIT).await;

        let response = fetched.response.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.is_ok());
        assert_eq!(fetched.envelope.errors().len(), 1);
        assert_eq!(fetched.envelope.errors()[0].kind, ErrorKind::HttpError);
        assert!(fetched.envelope.errors()[0].message.starts_with("404"));
    }

    #[tokio::test]
    async fn test_head_has_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.csv"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/file.csv", server.uri());
        let fetched = request_url(&test_client(), &url, "HEAD", LIMIT).await;

        let response = fetched.response.unwrap();
        assert!(response.content.is_none());
        assert!(response.apparent_encoding.is_none());
    }

    #[tokio::test]
    async fn test_missing_scheme_is_corrected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let address = server.address();
        let url = format!("{}:{}/data.json", address.ip(), address.port());
        let fetched = request_url(&test_client(), &url, "GET", LIMIT).await;

        assert_eq!(fetched.envelope.errors().len(), 1);
        assert_eq!(fetched.envelope.errors()[0].kind, ErrorKind::MissingSchema);
        assert_eq!(
            fetched.envelope.get_str("corrected_url"),
            Some(format!("http://{}/data.json", address).as_str())
        );
        assert!(fetched.response.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_sends_nothing() {
        let fetched = request_url(&test_client(), "ftp://files.gov/data.json", "GET", LIMIT).await;

        assert!(fetched.response.is_none());
        assert_eq!(fetched.envelope.errors()[0].kind, ErrorKind::InvalidSchema);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let fetched = request_url(&test_client(), "http://127.0.0.1:1/", "GET", LIMIT).await;

        assert!(fetched.response.is_none());
        assert_eq!(fetched.envelope.errors()[0].kind, ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn test_oversize_body_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let fetched = request_url(&test_client(), &server.uri(), "GET", 1024).await;

        let response = fetched.response.unwrap();
        assert!(response.content.is_none());
        assert_eq!(fetched.envelope.errors()[0].kind, ErrorKind::ContentTooLarge);
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/loop"),
            )
            .mount(&server)
            .await;

        let http = HttpConfig {
            max_redirects: 3,
            ..HttpConfig::default()
        };
        let client = build_http_client(&create_test_config(), &http).unwrap();
        let url = format!("{}/loop", server.uri());
        let fetched = request_url(&client, &url, "GET", LIMIT).await;

        assert!(fetched.response.is_none());
        assert_eq!(
            fetched.envelope.errors()[0].kind,
            ErrorKind::TooManyRedirects
        );
    }
}
