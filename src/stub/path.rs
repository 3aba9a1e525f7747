//! Path patterns with `{param}` segments

use std::collections::HashMap;

/// One component of a compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Must equal the request segment exactly
    Literal(String),
    /// Matches any non-empty request segment
    Param(String),
}

/// A stub path compiled into segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<PathSegment>,
}

impl PathPattern {
    /// Compile a path pattern
    ///
    /// Empty segments are dropped, so `/a//b/` and `/a/b` compile identically.
    /// A segment is a parameter only when it is wholly wrapped in braces.
    /// Literal segments are percent-decoded like request segments.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.split('?').next().unwrap_or_default();
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.len() > 2 && s.starts_with('{') && s.ends_with('}') {
                    PathSegment::Param(s[1..s.len() - 1].to_string())
                } else {
                    PathSegment::Literal(decode_segment(s))
                }
            })
            .collect();

        Self { segments }
    }

    /// Compiled segments
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Match already-split request segments, returning captured parameters
    #[must_use]
    pub fn matches(&self, request_segments: &[String]) -> Option<HashMap<String, String>> {
        if request_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(request_segments) {
            match pattern {
                PathSegment::Literal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    if actual.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), actual.clone());
                }
            }
        }

        Some(params)
    }
}

/// Split a request path into percent-decoded, non-empty segments
#[must_use]
pub fn split_request_path(path: &str) -> Vec<String> {
    let path = path.split('?').next().unwrap_or_default();
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect()
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment).map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned)
}
