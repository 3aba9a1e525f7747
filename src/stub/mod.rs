//! Stub definitions and the request shape they are matched against

mod path;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use path::{split_request_path, PathPattern, PathSegment};

use crate::{MockError, Result};

/// A stored predicate plus the canned response served when it matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubDefinition {
    /// Unique identifier; empty until the registry assigns one
    #[serde(default)]
    pub id: String,
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Path pattern, literal or with `{param}` segments
    #[serde(default)]
    pub path: String,
    /// HTTP method, compared case-insensitively
    #[serde(default)]
    pub method: String,
    /// Headers that must be present with exactly these values
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    /// Expected request body; `None` or empty matches any body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Status code to respond with
    #[serde(default = "default_status")]
    pub status_code: u16,
    /// Headers to respond with
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    /// Body to respond with, returned byte-for-byte
    #[serde(default)]
    pub response_body: String,
    /// Documentation only; never consulted while matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl StubDefinition {
    /// Create a stub for `method path` answering `200` with an empty body
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: None,
            path: path.into(),
            method: method.into(),
            request_headers: HashMap::new(),
            request_body: None,
            status_code: default_status(),
            response_headers: HashMap::new(),
            response_body: String::new(),
            error_message: None,
        }
    }

    /// Set the id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require a request header
    #[must_use]
    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    /// Require an exact request body
    #[must_use]
    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    /// Set the response status
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = status;
        self
    }

    /// Add a response header
    #[must_use]
    pub fn with_response_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.response_headers.insert(name.into(), value.into());
        self
    }

    /// Set the response body
    #[must_use]
    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = body.into();
        self
    }

    /// Check the fields the matcher cannot work without
    ///
    /// # Errors
    ///
    /// Returns [`MockError::Validation`] if method or path is blank, or the
    /// status code is outside 100..=999
    pub fn validate(&self) -> Result<()> {
        if self.method.trim().is_empty() {
            return Err(MockError::Validation("method cannot be empty".to_string()));
        }

        if self.path.trim().is_empty() {
            return Err(MockError::Validation("path cannot be empty".to_string()));
        }

        if !(100..=999).contains(&self.status_code) {
            return Err(MockError::Validation(format!(
                "status code out of range: {}",
                self.status_code
            )));
        }

        Ok(())
    }
}

/// Already-parsed incoming request handed to the matcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: String,
    /// Request path, without query string
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// Request headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
}

impl RequestDescriptor {
    /// Create a descriptor with no headers or body
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, looked up case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path plus query string, as sent on the wire
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match self.query.as_deref() {
            Some(q) if !q.is_empty() => format!("{}?{q}", self.path),
            _ => self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_wire_shape() {
        let json = r#"{
            "id": "abc",
            "name": "Envelope",
            "path": "/envelopes/{id}",
            "method": "get",
            "requestHeaders": {"Authorization": "Bearer *"},
            "requestBody": "",
            "statusCode": 201,
            "responseHeaders": {"Content-Type": "application/json"},
            "responseBody": "{\"ok\":true}",
            "errorMessage": null
        }"#;

        let stub: StubDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(stub.id, "abc");
        assert_eq!(stub.method, "get");
        assert_eq!(stub.status_code, 201);
        assert_eq!(
            stub.request_headers.get("Authorization").map(String::as_str),
            Some("Bearer *")
        );
        assert_eq!(stub.response_body, "{\"ok\":true}");
    }

    #[test]
    fn test_status_defaults_to_ok() {
        let stub: StubDefinition =
            serde_json::from_str(r#"{"path": "/a", "method": "GET"}"#).unwrap();
        assert_eq!(stub.status_code, 200);
        assert!(stub.id.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(StubDefinition::new("GET", "/a").validate().is_ok());
        assert!(StubDefinition::new("", "/a").validate().is_err());
        assert!(StubDefinition::new("GET", "  ").validate().is_err());
        assert!(StubDefinition::new("GET", "/a")
            .with_status(42)
            .validate()
            .is_err());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let request = RequestDescriptor::new("GET", "/").with_header("Content-Type", "text/plain");
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn test_path_and_query() {
        let mut request = RequestDescriptor::new("GET", "/search");
        assert_eq!(request.path_and_query(), "/search");

        request.query = Some("q=rust".to_string());
        assert_eq!(request.path_and_query(), "/search?q=rust");
    }
}
