#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod adaptor;
pub mod ast;
mod client;
pub mod dsl;
mod error;
mod execution;
pub mod schema;
pub mod transport;
mod util;
pub mod validation;

pub use self::{
    adaptor::{AdaptorError, ScalarAdaptor, ScalarAdaptors, TypeAdaptor},
    ast::{Document, OperationKind},
    client::{Client, ClientBuilder, DataStream, Session},
    error::Error,
    execution::{ErrorEntry, ErrorLocation, ExecutionResult, Variables},
    schema::{Schema, SchemaError},
    transport::{
        ExecutionResultStream, LocalSchemaTransport, Request, SubscriptionTransport, Transport,
        TransportError,
    },
    validation::RuleError,
};

/// Parses a GraphQL document from source text.
///
/// This is the usual entry point for turning a query string into a
/// [`Document`] that can be validated, executed or subscribed:
///
/// ```
/// let document = gql_client::gql("{ hero { name } }").unwrap();
/// ```
pub fn gql(source: &str) -> Result<Document, Error> {
    ast::parse(source).map_err(|e| Error::Syntax(e.to_string()))
}
