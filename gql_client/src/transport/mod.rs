//! The uniform transport interface every backend implements, and the shared
//! transport error taxonomy.

mod local;

pub use self::local::{JsonResolver, LocalSchemaTransport, Resolver};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_more::with_trait::Display;
use futures::stream::BoxStream;
use itertools::Itertools as _;

use crate::{
    ast::Document,
    execution::{ErrorEntry, ExecutionResult, Variables},
};

/// A single operation handed to a transport.
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    /// The document to execute.
    pub document: &'a Document,
    /// Variable bindings, if any.
    pub variables: Option<&'a Variables>,
    /// The operation to run when the document contains several.
    pub operation_name: Option<&'a str>,
    /// Per-call timeout overriding the transport default.
    pub timeout: Option<Duration>,
}

impl<'a> Request<'a> {
    /// A request for `document` with no variables, name or timeout.
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            variables: None,
            operation_name: None,
            timeout: None,
        }
    }

    /// Attaches variable bindings.
    #[must_use]
    pub fn variables(mut self, variables: &'a Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Selects the operation to execute.
    #[must_use]
    pub fn operation_name(mut self, name: &'a str) -> Self {
        self.operation_name = Some(name);
        self
    }

    /// Bounds the call in time.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The document printed to GraphQL source, as transports put it on the
    /// wire.
    pub fn query(&self) -> String {
        self.document.to_string()
    }
}

/// A failure inside a transport.
///
/// `Protocol`, `Query` and `AlreadyConnected` describe requests that would
/// fail identically if repeated; everything else may be transient and is
/// eligible for the client's retry policy.
#[derive(Clone, Debug, Display)]
pub enum TransportError {
    /// The peer violated the wire protocol (malformed JSON, missing fields,
    /// unknown frame types, binary frames). Fatal to the whole connection.
    #[display("transport protocol violation: {_0}")]
    Protocol(String),
    /// The server answered a specific operation with an `error` frame.
    #[display("server rejected the operation: {}", _0.iter().format("; "))]
    Query(Vec<ErrorEntry>),
    /// The connection is closed (or was never opened).
    #[display("transport is closed")]
    Closed,
    /// `connect` was called while a connection attempt or connection was
    /// already in place.
    #[display("transport is already connected")]
    AlreadyConnected,
    /// The server answered with an unexpected HTTP status.
    #[display("unexpected HTTP status {status}")]
    Http {
        /// The status code received.
        status: u16,
    },
    /// The underlying network stack failed.
    #[display("network error: {_0}")]
    Network(Arc<dyn std::error::Error + Send + Sync>),
    /// The operation did not complete within its timeout.
    #[display("operation timed out")]
    Timeout,
}

impl TransportError {
    /// Wraps an arbitrary network-layer failure.
    pub fn network(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Network(Arc::new(error))
    }

    /// Whether the client-level retry policy may repeat the request after
    /// this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Network(_) | Self::Timeout => true,
            Self::Protocol(_) | Self::Query(_) | Self::Closed | Self::AlreadyConnected => false,
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(source) => Some(&**source),
            _ => None,
        }
    }
}

/// The stream of results produced by a long-lived operation.
pub type ExecutionResultStream = BoxStream<'static, Result<ExecutionResult, TransportError>>;

/// Uniform interface over request/response backends.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes a single unary operation and returns its result.
    async fn execute(&self, request: Request<'_>) -> Result<ExecutionResult, TransportError>;

    /// Releases whatever the transport holds. The default does nothing.
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Transports that hold a bidirectional connection able to multiplex
/// long-lived operations.
#[async_trait]
pub trait SubscriptionTransport: Transport {
    /// Opens the connection. Fails with
    /// [`TransportError::AlreadyConnected`] unless the transport is in its
    /// initial state.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Starts a long-lived operation, yielding the server's pushes for it in
    /// arrival order. The stream ends cleanly when the server completes the
    /// operation; dropping it cancels the operation best-effort.
    async fn subscribe(&self, request: Request<'_>)
        -> Result<ExecutionResultStream, TransportError>;
}
