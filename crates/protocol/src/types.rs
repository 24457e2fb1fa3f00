use serde::{Deserialize, Serialize};

/// Body returned by a successful finalize call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(default)]
    pub message: String,
    pub file_name: String,
    pub file_directory: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_path: String,
}

/// JSON error body the backend may return on a failed request.
///
/// Both fields are optional: plain `{"message": ...}` bodies and the
/// missing-chunk report share this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_chunks: Vec<u64>,
}

impl ErrorBody {
    /// Parses a response body as an error object. Returns `None` for
    /// plain-text bodies or JSON that is not an object.
    pub fn parse(body: &str) -> Option<Self> {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    /// Human-readable description of the error, if the body carried one.
    pub fn describe(&self) -> Option<String> {
        match (&self.message, self.missing_chunks.is_empty()) {
            (Some(msg), true) => Some(msg.clone()),
            (Some(msg), false) => Some(format!("{msg}: {:?}", self.missing_chunks)),
            (None, false) => Some(format!("missing chunks {:?}", self.missing_chunks)),
            (None, true) => None,
        }
    }
}
