use serde::{Deserialize, Serialize};

/// Construction flags of a [`Dome`](crate::Dome).
///
/// Deserializes from the camelCase object form, with every missing field
/// taking its default:
///
/// ```
/// let opts: json_dome::Options = serde_json::from_str(r#"{"recordDiff": false}"#).unwrap();
/// assert!(!opts.record_diff);
/// assert!(opts.emit_change);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Keep a diff log and notify diff listeners.
    pub record_diff: bool,
    /// Capture old values and notify change listeners.
    pub emit_change: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            record_diff: true,
            emit_change: true,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_diff(mut self, on: bool) -> Self {
        self.record_diff = on;
        self
    }

    pub fn emit_change(mut self, on: bool) -> Self {
        self.emit_change = on;
        self
    }
}
