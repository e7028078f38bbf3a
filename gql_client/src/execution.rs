//! Execution results and variable bindings exchanged with transports.

use derive_more::with_trait::Display;
use serde::{Deserialize, Serialize};

/// Variable bindings accompanying an operation, keyed by variable name.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// A position inside the source document attached to an [`ErrorEntry`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorLocation {
    /// 1-based line.
    pub line: u64,
    /// 1-based column.
    pub column: u64,
}

/// A single entry of a GraphQL `errors` list.
///
/// Opaque to the client except for structural access: anything beyond the
/// specified keys is preserved in [`extra`](ErrorEntry::extra).
#[derive(Clone, Debug, Default, Deserialize, Display, PartialEq, Serialize)]
#[display("{message}")]
pub struct ErrorEntry {
    /// The error message.
    pub message: String,
    /// Source locations the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ErrorLocation>>,
    /// The response path the error occurred at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
    /// Vendor extensions, such as error codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
    /// Any further fields the server attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ErrorEntry {
    /// Creates an entry carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// The outcome of executing an operation: optional data plus an optional
/// ordered list of errors.
///
/// Any response actually delivered by a server carries at least one of the
/// two; [`has_payload`](ExecutionResult::has_payload) checks that invariant.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// The `data` field. `Some(Value::Null)` when the server returned an
    /// explicit `null`, `None` when the key was absent.
    #[serde(
        default,
        deserialize_with = "crate::util::some_for_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<serde_json::Value>,
    /// The `errors` list, when the key was present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorEntry>>,
}

impl ExecutionResult {
    /// Creates a result carrying only data.
    pub fn from_data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Whether the response carried a `data` or `errors` key at all.
    pub fn has_payload(&self) -> bool {
        self.data.is_some() || self.errors.is_some()
    }

    /// The first error entry, if any.
    pub fn first_error(&self) -> Option<&ErrorEntry> {
        self.errors.as_deref().and_then(<[_]>::first)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn explicit_null_data_stays_present() {
        let result: ExecutionResult = serde_json::from_value(json!({"data": null})).unwrap();
        assert_eq!(result.data, Some(serde_json::Value::Null));
        assert!(result.has_payload());
    }

    #[test]
    fn empty_object_has_no_payload() {
        let result: ExecutionResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(result, ExecutionResult::default());
        assert!(!result.has_payload());
    }

    #[test]
    fn non_array_errors_are_rejected() {
        assert!(serde_json::from_value::<ExecutionResult>(json!({"errors": "nope"})).is_err());
    }

    #[test]
    fn error_entries_keep_unknown_fields() {
        let entry: ErrorEntry = serde_json::from_value(json!({
            "message": "boom",
            "locations": [{"line": 4, "column": 5}],
            "extensions": {"code": "INTERNAL_SERVER_ERROR"},
            "severity": "fatal",
        }))
        .unwrap();
        assert_eq!(entry.message, "boom");
        assert_eq!(
            entry.locations,
            Some(vec![ErrorLocation { line: 4, column: 5 }])
        );
        assert_eq!(
            entry.extensions.as_ref().unwrap()["code"],
            json!("INTERNAL_SERVER_ERROR")
        );
        assert_eq!(entry.extra["severity"], json!("fatal"));
    }
}
