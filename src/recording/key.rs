//! Endpoint keys: stable names derived from request paths
//!
//! Captures of the same logical endpoint must land on the same key so the
//! stored document is overwritten instead of duplicated, while a collection
//! (`/envelopes`) and one of its items (`/envelopes/{id}`) get distinct keys.

use std::sync::OnceLock;

use regex::Regex;

/// Key used when a path has no meaningful segment
pub const UNKNOWN_KEY: &str = "Unknown";

fn account_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| {
        Regex::new(r"^/*restapi/v\d+(?:\.\d+)?/accounts/[^/]+(?:/|$)").expect("valid regex")
    })
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{[^}]*\}").expect("valid regex"))
}

/// One path component after placeholder stripping
struct Token {
    text: String,
    /// The component consisted only of `{param}` placeholders, or is a
    /// concrete identifier standing where a placeholder would be
    is_param: bool,
}

/// Derive the endpoint key for a request path or path template
///
/// - `/restapi/v2.1/accounts/123/envelopes` → `EnvelopesList`
/// - `/restapi/v2.1/accounts/123/envelopes/{envelopeId}` → `EnvelopeResponse`
/// - `/restapi/v2.1/accounts/123/envelopes/{envelopeId}/recipients` → `RecipientsResponse`
///
/// Concrete ids count as placeholders, so `/envelopes/98765` and
/// `/envelopes/{envelopeId}` share a key.
#[must_use]
pub fn endpoint_key(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let path = account_prefix().replace(path, "");

    let tokens: Vec<Token> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let text = placeholder().replace_all(s, "").into_owned();
            Token {
                is_param: text.is_empty() || is_identifier(&text),
                text,
            }
        })
        .collect();

    let named: Vec<&str> = tokens
        .iter()
        .filter(|t| !t.is_param)
        .map(|t| t.text.as_str())
        .collect();

    let Some(last_named) = named.last() else {
        return UNKNOWN_KEY.to_string();
    };

    // Bare collection root: `/envelopes`
    if tokens.len() == 1 && is_plural(last_named) {
        return format!("{}List", capitalize(last_named));
    }

    // Single item of a collection: `/envelopes/{envelopeId}`
    if let [.., collection, id] = tokens.as_slice() {
        if id.is_param && !collection.is_param && is_plural(&collection.text) {
            return format!("{}Response", capitalize(&singularize(&collection.text)));
        }
    }

    format!("{}Response", capitalize(last_named))
}

/// Numeric ids, UUIDs and long hex digests
fn is_identifier(segment: &str) -> bool {
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    if uuid::Uuid::try_parse(segment).is_ok() {
        return true;
    }
    segment.len() >= 16
        && segment.bytes().all(|b| b.is_ascii_hexdigit())
        && segment.bytes().any(|b| b.is_ascii_digit())
}

fn is_plural(segment: &str) -> bool {
    segment.len() > 1
        && segment.ends_with('s')
        && !segment.ends_with("ss")
        && !segment.ends_with("us")
        && !segment.ends_with("is")
}

fn singularize(segment: &str) -> String {
    if let Some(stem) = segment.strip_suffix("ies") {
        format!("{stem}y")
    } else {
        segment.strip_suffix('s').unwrap_or(segment).to_string()
    }
}

/// Uppercase the first character and replace anything that is not safe in a
/// file name with `_`
fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    first
        .to_uppercase()
        .chain(chars)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
