//! MIME type helpers

/// JSON content type
pub const APPLICATION_JSON: &str = "application/json";

/// The `type/subtype` part of a content type, lower-cased, parameters dropped.
///
/// `Application/JSON; charset=utf-8` becomes `application/json`.
#[must_use]
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
