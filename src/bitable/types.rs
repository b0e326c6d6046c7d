//! Record and wire types for the Bitable open API.
//!
//! Raw field maps arrive as loosely typed JSON. They are decoded exactly once,
//! at the fetch boundary, into [`FieldValue`]; nothing past the pager ever
//! sees a `serde_json::Value` from a list response.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field map sent to the batch-create endpoint.
pub type WriteFields = serde_json::Map<String, Value>;

/// A decoded Bitable field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain text, or rich-text segments flattened into one string.
    Text(String),
    /// Any JSON number (dates arrive as epoch seconds or millis).
    Number(f64),
    /// JSON `null`.
    Absent,
    /// A shape the pipeline does not interpret (bool, person, attachment...).
    /// Only the JSON kind is kept.
    Unsupported { kind: &'static str },
}

static ABSENT: FieldValue = FieldValue::Absent;

impl FieldValue {
    /// Decode a raw JSON field value.
    #[must_use]
    pub fn decode(raw: &Value) -> Self {
        match raw {
            Value::String(text) => Self::Text(text.clone()),
            Value::Number(number) => number
                .as_f64()
                .map_or(Self::Unsupported { kind: "number" }, Self::Number),
            Value::Null => Self::Absent,
            Value::Bool(_) => Self::Unsupported { kind: "bool" },
            // Formula and lookup cells: {"type": 1, "value": [{"text": "..."}]}
            Value::Object(map) => match map.get("value") {
                Some(Value::Array(segments)) => {
                    text_segments(segments).map_or(Self::Unsupported { kind: "object" }, Self::Text)
                }
                _ => Self::Unsupported { kind: "object" },
            },
            // Multi-line text cells: [{"type": "text", "text": "..."}]
            Value::Array(segments) => {
                text_segments(segments).map_or(Self::Unsupported { kind: "array" }, Self::Text)
            }
        }
    }

    /// The text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text rendering that also accepts numbers (`3.0` renders as `"3"`).
    ///
    /// Absent and unsupported values render as the empty string.
    #[must_use]
    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Number(number) => Cow::Owned(number.to_string()),
            Self::Absent | Self::Unsupported { .. } => Cow::Borrowed(""),
        }
    }

    /// Whether the value was quarantined during decoding.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Concatenate the `text` of every segment that has one.
///
/// Returns `None` when a non-empty array carries no text segment at all,
/// which is how person and attachment arrays look.
fn text_segments(segments: &[Value]) -> Option<String> {
    let mut out = String::new();
    let mut found = segments.is_empty();
    for segment in segments {
        if let Some(text) = segment.get("text").and_then(Value::as_str) {
            out.push_str(text);
            found = true;
        }
    }
    found.then_some(out)
}

/// A record read from a Bitable table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: String,
    pub fields: HashMap<String, FieldValue>,
}

impl SourceRecord {
    /// Build a record from already decoded fields.
    pub fn new(id: impl Into<String>, fields: impl IntoIterator<Item = (String, FieldValue)>) -> Self {
        Self {
            id: id.into(),
            fields: fields.into_iter().collect(),
        }
    }

    pub(crate) fn from_wire(wire: WireRecord) -> Self {
        let fields = wire
            .fields
            .iter()
            .map(|(key, raw)| (key.clone(), FieldValue::decode(raw)))
            .collect();
        Self {
            id: wire.record_id,
            fields,
        }
    }

    /// Field lookup; a missing key reads as [`FieldValue::Absent`].
    #[must_use]
    pub fn field(&self, key: &str) -> &FieldValue {
        self.fields.get(key).unwrap_or(&ABSENT)
    }

    /// Plain-text field lookup; anything that is not text reads as `""`.
    #[must_use]
    pub fn text(&self, key: &str) -> &str {
        self.field(key).as_text().unwrap_or("")
    }

    /// Number of fields quarantined at decode time.
    #[must_use]
    pub fn unsupported_fields(&self) -> usize {
        self.fields.values().filter(|v| v.is_unsupported()).count()
    }
}

// ── Wire formats ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct WireRecord {
    pub record_id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListRecordsResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<ListRecordsData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListRecordsData {
    /// `null` when the table or view is empty.
    pub items: Option<Vec<WireRecord>>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchCreateRequest<'a> {
    pub records: Vec<NewRecord<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRecord<'a> {
    pub fields: &'a WriteFields,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchCreateResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<BatchCreateData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchCreateData {
    #[serde(default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub app_id: &'a str,
    pub app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tenant_access_token: String,
    #[serde(default)]
    pub expire: i64,
}
