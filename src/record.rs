//! Captured request/response records

use std::collections::BTreeMap;

use hyper::HeaderMap;
use serde::{Deserialize, Serialize};

/// Marker appended to a body preview that was cut at the cap
pub const TRUNCATION_MARKER: &str = "...";

/// Header multimap: name to every value sent under that name, in order
pub type Headers = BTreeMap<String, Vec<String>>;

/// One captured HTTP exchange
///
/// Records are never patched field by field. Completing an exchange
/// produces a new `Record` with the same id, which replaces the old one
/// in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique capture id
    pub id: String,
    /// HTTP method
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Request headers
    #[serde(rename = "headers")]
    pub request_headers: Headers,
    /// Truncated request body
    #[serde(
        rename = "requestBody",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_body_preview: Option<String>,
    /// Capture time, milliseconds since the Unix epoch
    #[serde(rename = "timestamp")]
    pub created_at: u64,
    /// HTTP status code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Response headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Headers>,
    /// Truncated response body
    #[serde(
        rename = "responseBody",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_body_preview: Option<String>,
    /// Milliseconds from capture to completion
    #[serde(rename = "duration", default, skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<u64>,
    /// Transport error, if the exchange failed
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Whether a response or an error has been recorded
    #[serde(rename = "isCompleted", default)]
    pub completed: bool,
}

/// Successful outcome of an exchange
#[derive(Debug, Clone, Default)]
pub struct ResponseSummary {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Already truncated response body preview
    pub body_preview: Option<String>,
}

impl Record {
    /// Create a pending record
    #[must_use]
    pub fn pending(
        id: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        request_headers: Headers,
        request_body_preview: Option<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            url: url.into(),
            request_headers,
            request_body_preview,
            created_at,
            status_code: None,
            response_headers: None,
            response_body_preview: None,
            duration_millis: None,
            error_message: None,
            completed: false,
        }
    }

    /// Copy of this record completed with a response
    #[must_use]
    pub fn with_response(&self, response: ResponseSummary, duration_millis: u64) -> Self {
        Self {
            status_code: Some(response.status),
            response_headers: Some(response.headers),
            response_body_preview: response.body_preview,
            duration_millis: Some(duration_millis),
            completed: true,
            ..self.clone()
        }
    }

    /// Copy of this record completed with a transport error
    ///
    /// Any response fields already present are kept, so a failure after the
    /// headers arrived records both the status and the error.
    #[must_use]
    pub fn with_error(&self, error_message: impl Into<String>, duration_millis: u64) -> Self {
        Self {
            error_message: Some(error_message.into()),
            duration_millis: Some(duration_millis),
            completed: true,
            ..self.clone()
        }
    }
}

/// Truncate a body preview to `limit` characters
///
/// Longer text is cut at a character boundary and gets
/// [`TRUNCATION_MARKER`] appended.
#[must_use]
pub fn truncate_preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut preview = String::with_capacity(cut + TRUNCATION_MARKER.len());
            preview.push_str(&text[..cut]);
            preview.push_str(TRUNCATION_MARKER);
            preview
        }
        None => text.to_string(),
    }
}

/// Build a preview from raw body bytes
///
/// Empty bodies have no preview. Invalid UTF-8 is replaced rather than
/// rejected.
#[must_use]
pub fn body_preview(body: &[u8], limit: usize) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    Some(truncate_preview(&String::from_utf8_lossy(body), limit))
}

/// Convert a `HeaderMap` into the record's header multimap
#[must_use]
pub fn headers_from_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}
