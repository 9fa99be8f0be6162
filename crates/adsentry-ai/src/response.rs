//! Defensive parsing of model output.

use serde::de::DeserializeOwned;

/// A model response after parsing. Malformed output keeps the raw text for
/// logging.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    WellFormed(T),
    Malformed { reason: String, raw: String },
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::WellFormed(v) => Some(v),
            Self::Malformed { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        match self {
            Self::WellFormed(v) => Parsed::WellFormed(f(v)),
            Self::Malformed { reason, raw } => Parsed::Malformed { reason, raw },
        }
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (`json`, `JSON`, or nothing) up to the first newline.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a JSON document out of a model response.
///
/// Tries the fence-stripped text first, then the outermost `{ ... }` span to
/// cope with prose around the object.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Parsed<T> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Parsed::Malformed {
            reason: "empty response".into(),
            raw: raw.to_string(),
        };
    }
    let first_error = match serde_json::from_str::<T>(body) {
        Ok(v) => return Parsed::WellFormed(v),
        Err(e) => e,
    };
    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}'))
        && start < end
        && let Ok(v) = serde_json::from_str::<T>(&body[start..=end])
    {
        return Parsed::WellFormed(v);
    }
    Parsed::Malformed {
        reason: first_error.to_string(),
        raw: raw.to_string(),
    }
}

/// Deserialize each element on its own, skipping the ones that fail.
pub(crate) fn parse_array_lenient<T: DeserializeOwned>(items: Option<&[serde_json::Value]>) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    }
}

/// A list of strings the model may have given as a single string.
pub(crate) fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => vec![],
    }
}
