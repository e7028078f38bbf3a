use gql_client::{ErrorEntry, ExecutionResult, TransportError};
use serde::Deserialize;

/// ServerMessage defines the message types that servers can send.
///
/// Anything that fails to deserialize into one of these shapes (unknown
/// types, missing ids, missing or malformed payloads) is a protocol
/// violation and fatal to the connection.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// ConnectionAck is sent in response to the client's ConnectionInit
    /// message if the server accepted the connection.
    ConnectionAck,
    /// ConnectionKeepAlive is sent periodically after accepting a
    /// connection.
    #[serde(rename = "ka")]
    ConnectionKeepAlive,
    /// ConnectionError reports a failure that is not tied to an operation.
    /// Fatal to the connection.
    ConnectionError {
        /// The error the server reported.
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    /// Data carries one execution result for an operation.
    Data {
        /// The id of the operation the data is for.
        id: String,
        /// The result; at least one of `data` and `errors` must be present.
        payload: ExecutionResult,
    },
    /// Error reports that an operation failed before producing a result.
    Error {
        /// The id of the operation that failed.
        id: String,
        /// A single error object or a list of them.
        payload: serde_json::Value,
    },
    /// Complete indicates that no more data will be sent for the operation.
    Complete {
        /// The id of the operation that has completed.
        id: String,
    },
}

/// Normalizes an `error` frame payload into a list of error entries.
///
/// The legacy protocol allows both a single error object and a list of
/// errors; any other shape is a protocol violation.
pub(crate) fn error_entries(payload: serde_json::Value) -> Result<Vec<ErrorEntry>, TransportError> {
    let malformed =
        |e: serde_json::Error| TransportError::Protocol(format!("malformed error payload: {e}"));
    match payload {
        serde_json::Value::Array(_) => serde_json::from_value(payload).map_err(malformed),
        serde_json::Value::Object(_) => serde_json::from_value::<ErrorEntry>(payload)
            .map(|entry| vec![entry])
            .map_err(malformed),
        other => Err(TransportError::Protocol(format!(
            "error payload must be an object or a list, got: {other}",
        ))),
    }
}
