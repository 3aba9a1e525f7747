//! Request matching
//!
//! Stubs are evaluated in registration order and the first one whose
//! predicate holds wins. There is no specificity ranking: a templated stub
//! registered before a literal one shadows it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::registry::RegisteredStub;
use crate::stub::{split_request_path, RequestDescriptor, StubDefinition};

/// Outcome of a successful match
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The winning stub
    pub stub: Arc<RegisteredStub>,
    /// Values captured by `{param}` segments
    pub path_params: HashMap<String, String>,
}

impl MatchResult {
    /// Definition of the winning stub
    #[must_use]
    pub fn definition(&self) -> &StubDefinition {
        &self.stub.definition
    }
}

/// Find the first stub matching `request`, or `None`
#[must_use]
pub fn find_match(stubs: &[Arc<RegisteredStub>], request: &RequestDescriptor) -> Option<MatchResult> {
    let segments = split_request_path(&request.path);

    for stub in stubs {
        if let Some(path_params) = matches_stub(stub, request, &segments) {
            trace!(id = %stub.id(), "Stub predicate satisfied");
            return Some(MatchResult {
                stub: Arc::clone(stub),
                path_params,
            });
        }
    }

    None
}

fn matches_stub(
    stub: &RegisteredStub,
    request: &RequestDescriptor,
    segments: &[String],
) -> Option<HashMap<String, String>> {
    let definition = &stub.definition;

    if !matches_method(&definition.method, &request.method) {
        return None;
    }

    let params = stub.pattern.matches(segments)?;

    if !matches_headers(&definition.request_headers, request) {
        return None;
    }

    if !matches_body(definition.request_body.as_deref(), &request.body) {
        return None;
    }

    Some(params)
}

fn matches_method(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Every required header must be present with exactly the expected value.
/// Extra request headers are ignored.
fn matches_headers(required: &HashMap<String, String>, request: &RequestDescriptor) -> bool {
    required
        .iter()
        .all(|(name, expected)| request.header(name) == Some(expected.as_str()))
}

/// Empty or absent expectation matches any body; otherwise exact equality.
fn matches_body(expected: Option<&str>, actual: &[u8]) -> bool {
    match expected {
        None | Some("") => true,
        Some(expected) => expected.as_bytes() == actual,
    }
}
