//! Defensive field access on raw provider JSON
//!
//! Upstream records are third-party JSON: keys go missing, numbers arrive as
//! strings and vice versa. Accessors here never fail; they return `None` and
//! let the caller decide whether the record is skipped.

use serde_json::Value;

/// Text value of `key`; numbers are rendered, blanks count as absent
pub fn text(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unsigned integer value of `key`, accepting `"9"` as well as `9`
pub fn number(record: &Value, key: &str) -> Option<u32> {
    match record.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ordered list of keys tried in turn, with an optional final placeholder.
///
/// ```
/// use serde_json::json;
/// use transit_harvester::normalize::fields::FallbackChain;
///
/// let destination = FallbackChain::new(&["dest_en", "dest_tc"]).or("Unknown Destination");
/// assert_eq!(destination.resolve(&json!({"dest_tc": "中環"})), "中環");
/// assert_eq!(destination.resolve(&json!({})), "Unknown Destination");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FallbackChain<'a> {
    keys: &'a [&'a str],
    placeholder: Option<&'a str>,
}

impl<'a> FallbackChain<'a> {
    /// Chain over `keys`, in priority order
    pub const fn new(keys: &'a [&'a str]) -> Self {
        Self {
            keys,
            placeholder: None,
        }
    }

    /// Value used when no key is present
    pub const fn or(self, placeholder: &'a str) -> Self {
        Self {
            keys: self.keys,
            placeholder: Some(placeholder),
        }
    }

    /// First present key
    pub fn first(&self, record: &Value) -> Option<String> {
        self.keys.iter().find_map(|key| text(record, key))
    }

    /// First present key, else the placeholder, else an empty string
    pub fn resolve(&self, record: &Value) -> String {
        self.first(record)
            .or_else(|| self.placeholder.map(str::to_string))
            .unwrap_or_default()
    }
}

/// First candidate that is present, across values taken from different records
pub fn first_present<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates.into_iter().flatten().next()
}

/// The `data` array of a standard API envelope
pub fn data_list(payload: &Value) -> Option<&Vec<Value>> {
    payload.get("data")?.as_array()
}
