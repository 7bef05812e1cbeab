//! JSON decoding of fetched catalog content
//!
//! Catalogs are decoded twice if needed. The primary decoder is strict about
//! both the text encoding and the JSON grammar. When it fails, the bytes are
//! decoded again with replacement characters and handed to a lenient decoder
//! that skips a byte order mark and ignores anything after the first JSON
//! value.

use crate::envelope::{Envelope, StageError};
use encoding_rs::{Encoding, WINDOWS_1252};
use serde_json::{Deserializer, Value};

/// Output of [`parse_json`]
#[derive(Debug, Clone)]
pub struct Parsed {
    pub envelope: Envelope,
    pub json: Option<Value>,
    /// True when the primary decoder failed, even if the lenient one succeeded
    pub parse_errors: bool,
}

impl Parsed {
    pub fn is_json(&self) -> bool {
        self.json.is_some()
    }
}

/// Decodes catalog bytes into JSON
///
/// `encoding` is a charset label such as `utf-8` or `ISO-8859-1`. Without a
/// label, or with one that is not recognized, the content is decoded as
/// windows-1252 (a superset of Latin-1). Every problem is recorded in the
/// returned envelope; this never fails.
///
/// # Examples
///
/// ```
/// use catalog_probe::catalog::parse_json;
///
/// let parsed = parse_json(Some(br#"[{"title": "Budget"}]"#), Some("utf-8"));
/// assert!(parsed.is_json());
/// assert!(!parsed.parse_errors);
/// ```
pub fn parse_json(content: Option<&[u8]>, encoding: Option<&str>) -> Parsed {
    let mut envelope = Envelope::new();

    let content = match content {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            envelope.record(StageError::NoContent);
            return Parsed {
                envelope,
                json: None,
                parse_errors: false,
            };
        }
    };

    let encoding = resolve_encoding(encoding, &mut envelope);

    match decode_strict(content, encoding) {
        Ok(json) => Parsed {
            envelope,
            json: Some(json),
            parse_errors: false,
        },
        Err(err) => {
            envelope.record(err);
            let (text, _, _) = encoding.decode(content);
            let json = match decode_lenient(&text) {
                Ok(json) => Some(json),
                Err(err) => {
                    envelope.record(err);
                    None
                }
            };
            Parsed {
                envelope,
                json,
                parse_errors: true,
            }
        }
    }
}

fn resolve_encoding(label: Option<&str>, envelope: &mut Envelope) -> &'static Encoding {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        None => WINDOWS_1252,
        Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            envelope.record(StageError::Decode(format!(
                "Unknown encoding '{}', decoding as {}",
                label,
                WINDOWS_1252.name()
            )));
            WINDOWS_1252
        }),
    }
}

fn decode_strict(content: &[u8], encoding: &'static Encoding) -> Result<Value, StageError> {
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(content)
        .ok_or_else(|| {
            StageError::Decode(format!(
                "'{}' codec can't decode the content",
                encoding.name()
            ))
        })?;

    serde_json::from_str(&text).map_err(|e| StageError::Decode(e.to_string()))
}

fn decode_lenient(text: &str) -> Result<Value, StageError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut values = Deserializer::from_str(text).into_iter::<Value>();

    match values.next() {
        Some(Ok(json)) => Ok(json),
        Some(Err(e)) => Err(StageError::LenientDecode(e.to_string())),
        None => Err(StageError::LenientDecode(
            "Expected a JSON value but found none".to_string(),
        )),
    }
}
