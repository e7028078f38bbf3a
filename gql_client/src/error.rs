use derive_more::with_trait::{Display, From};
use itertools::Itertools as _;

use crate::{
    adaptor::AdaptorError, dsl::DslError, execution::ErrorEntry, schema::SchemaError,
    transport::TransportError, validation::RuleError,
};

/// An error raised at the public [`Client`](crate::Client) boundary.
///
/// The variants keep "the server said no", "the wire broke" and "you
/// configured me wrong" distinguishable.
#[derive(Debug, Display, From)]
pub enum Error {
    /// Incompatible constructor arguments.
    #[display("configuration error: {_0}")]
    #[from(skip)]
    Config(String),
    /// A document could not be parsed, or validation was requested without a
    /// schema to validate against.
    #[display("syntax error: {_0}")]
    #[from(skip)]
    Syntax(String),
    /// Schema validation of a document failed.
    #[display("{}", _0.iter().format("\n"))]
    Validation(Vec<RuleError>),
    /// A unary result carried a non-empty `errors` list; wraps the first
    /// entry.
    #[display("server returned an error: {_0}")]
    Server(ErrorEntry),
    /// All retries were exhausted; carries the last transport failure.
    #[display("failed {attempts} retries: {source}")]
    Retry {
        /// How many attempts were made.
        attempts: u32,
        /// The failure of the final attempt.
        source: TransportError,
    },
    /// The transport failed.
    Transport(TransportError),
    /// The request builder was misused.
    Dsl(DslError),
    /// A custom scalar adaptor rejected a value.
    Adaptor(AdaptorError),
    /// A schema could not be built.
    Schema(SchemaError),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(errors) => errors.first().map(|e| e as _),
            Self::Retry { source, .. } | Self::Transport(source) => Some(source),
            Self::Dsl(e) => Some(e),
            Self::Adaptor(e) => Some(e),
            Self::Schema(e) => Some(e),
            Self::Config(_) | Self::Syntax(_) | Self::Server(_) => None,
        }
    }
}
