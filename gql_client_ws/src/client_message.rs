use gql_client::Variables;
use serde::Serialize;

/// The payload of a client's `start` message. This triggers execution of a
/// query, mutation, or subscription.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    /// The document body, printed to GraphQL source.
    pub query: String,

    /// The variable bindings; omitted from the frame when empty.
    #[serde(skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,

    /// The operation name (required if the document contains multiple
    /// operations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// ClientMessage defines the message types that clients can send.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// ConnectionInit is sent by the client upon connecting. The optional
    /// payload is often used for authentication.
    ConnectionInit {
        /// Arbitrary parameters forwarded to the server.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    /// Start messages are used to execute a GraphQL operation.
    Start {
        /// The id of the operation. Unique per connection.
        id: String,
        /// The query, variables, and operation name.
        payload: StartPayload,
    },
    /// Stop messages are used to unsubscribe from a subscription.
    Stop {
        /// The id of the operation to stop.
        id: String,
    },
    /// ConnectionTerminate is used to terminate the connection.
    ConnectionTerminate,
}
