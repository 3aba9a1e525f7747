//! Response synthesis from matched stubs

use crate::stub::StubDefinition;

/// Body served when no stub matches
pub const NO_MATCH_BODY: &str = r#"{"error":"not_found","message":"No matching stub found"}"#;

/// Response produced from a stub, before it is handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl SynthesizedResponse {
    /// The fixed response for unmatched requests
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            status: 404,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: NO_MATCH_BODY.as_bytes().to_vec(),
        }
    }

    /// First value of a header, looked up case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Build the response for a stub
///
/// Status, headers and body are copied verbatim. Headers are sorted by name so
/// the output does not depend on map iteration order.
#[must_use]
pub fn synthesize(stub: &StubDefinition) -> SynthesizedResponse {
    let mut headers: Vec<(String, String)> = stub
        .response_headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    headers.sort();

    SynthesizedResponse {
        status: stub.status_code,
        headers,
        body: stub.response_body.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_copies_verbatim() {
        let body = "{\n  \"ok\" : true }  ";
        let stub = StubDefinition::new("GET", "/x")
            .with_status(201)
            .with_response_header("Content-Type", "application/json")
            .with_response_header("X-Trace", "abc")
            .with_response_body(body);

        let response = synthesize(&stub);
        assert_eq!(response.status, 201);
        assert_eq!(response.body, body.as_bytes());
        assert_eq!(response.header("x-trace"), Some("abc"));
        assert_eq!(response.headers.len(), 2);
    }

    #[test]
    fn test_synthesize_is_referentially_transparent() {
        let stub = StubDefinition::new("GET", "/x")
            .with_response_header("B", "2")
            .with_response_header("A", "1")
            .with_response_body("same");

        assert_eq!(synthesize(&stub), synthesize(&stub));
    }

    #[test]
    fn test_no_match_response() {
        let response = SynthesizedResponse::no_match();
        assert_eq!(response.status, 404);
        assert_eq!(response.header("content-type"), Some("application/json"));
    }
}
