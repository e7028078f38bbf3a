//! Aliases over the [`graphql-parser`] query AST, pinned to owned text, plus
//! small helpers for working with parsed documents.
//!
//! Parsing, printing and the AST itself are delegated to [`graphql-parser`];
//! this module only fixes the text type to [`String`] so documents can be
//! moved around freely, and adds the handful of lookups the client needs.
//!
//! [`graphql-parser`]: https://docs.rs/graphql-parser

use derive_more::with_trait::Display;

pub use graphql_parser::Pos;

/// A parsed GraphQL document holding owned strings.
pub type Document = graphql_parser::query::Document<'static, String>;
/// A top-level definition of a [`Document`].
pub type Definition = graphql_parser::query::Definition<'static, String>;
/// An operation definition (query, mutation, subscription or bare selection
/// set).
pub type OperationDefinition = graphql_parser::query::OperationDefinition<'static, String>;
/// A named fragment definition.
pub type FragmentDefinition = graphql_parser::query::FragmentDefinition<'static, String>;
/// A query operation.
pub type Query = graphql_parser::query::Query<'static, String>;
/// A mutation operation.
pub type Mutation = graphql_parser::query::Mutation<'static, String>;
/// A subscription operation.
pub type Subscription = graphql_parser::query::Subscription<'static, String>;
/// A set of selections between braces.
pub type SelectionSet = graphql_parser::query::SelectionSet<'static, String>;
/// A single selection: field, fragment spread or inline fragment.
pub type Selection = graphql_parser::query::Selection<'static, String>;
/// A field selection.
pub type Field = graphql_parser::query::Field<'static, String>;
/// An inline fragment.
pub type InlineFragment = graphql_parser::query::InlineFragment<'static, String>;
/// A fragment spread.
pub type FragmentSpread = graphql_parser::query::FragmentSpread<'static, String>;
/// A fragment type condition.
pub type TypeCondition = graphql_parser::query::TypeCondition<'static, String>;
/// A variable definition attached to an operation.
pub type VariableDefinition = graphql_parser::query::VariableDefinition<'static, String>;
/// An input value literal.
pub type Value = graphql_parser::query::Value<'static, String>;
/// A type reference as written in a document.
pub type Type = graphql_parser::query::Type<'static, String>;

/// The three GraphQL operation kinds.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum OperationKind {
    /// A read-only fetch.
    #[display("query")]
    Query,
    /// A write followed by a fetch.
    #[display("mutation")]
    Mutation,
    /// A long-lived operation fed by server pushes.
    #[display("subscription")]
    Subscription,
}

pub(crate) fn parse(source: &str) -> Result<Document, graphql_parser::query::ParseError> {
    graphql_parser::parse_query::<String>(source).map(|doc| doc.into_static())
}

/// Returns the kind of an operation definition.
pub fn operation_kind(operation: &OperationDefinition) -> OperationKind {
    match operation {
        OperationDefinition::SelectionSet(_) | OperationDefinition::Query(_) => {
            OperationKind::Query
        }
        OperationDefinition::Mutation(_) => OperationKind::Mutation,
        OperationDefinition::Subscription(_) => OperationKind::Subscription,
    }
}

/// Returns the name of an operation definition, if it has one.
pub fn operation_name(operation: &OperationDefinition) -> Option<&str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

/// Returns the top-level selection set of an operation definition.
pub fn operation_selection_set(operation: &OperationDefinition) -> &SelectionSet {
    match operation {
        OperationDefinition::SelectionSet(s) => s,
        OperationDefinition::Query(q) => &q.selection_set,
        OperationDefinition::Mutation(m) => &m.selection_set,
        OperationDefinition::Subscription(s) => &s.selection_set,
    }
}

/// Returns the variable definitions of an operation definition.
pub fn operation_variable_definitions(operation: &OperationDefinition) -> &[VariableDefinition] {
    match operation {
        OperationDefinition::SelectionSet(_) => &[],
        OperationDefinition::Query(q) => &q.variable_definitions,
        OperationDefinition::Mutation(m) => &m.variable_definitions,
        OperationDefinition::Subscription(s) => &s.variable_definitions,
    }
}

/// Iterates over every operation definition in a document.
pub fn operations(document: &Document) -> impl Iterator<Item = &OperationDefinition> {
    document.definitions.iter().filter_map(|def| match def {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    })
}

/// Iterates over every fragment definition in a document.
pub fn fragments(document: &Document) -> impl Iterator<Item = &FragmentDefinition> {
    document.definitions.iter().filter_map(|def| match def {
        Definition::Fragment(frag) => Some(frag),
        Definition::Operation(_) => None,
    })
}

/// Selects the operation of a document to execute.
///
/// Follows the usual server-side rules: an unnamed request requires the
/// document to contain exactly one operation, a named request selects the
/// operation of that name.
pub fn find_operation<'d>(
    document: &'d Document,
    name: Option<&str>,
) -> Result<&'d OperationDefinition, String> {
    match name {
        Some(wanted) => operations(document)
            .find(|op| operation_name(op) == Some(wanted))
            .ok_or_else(|| format!("Unknown operation named \"{wanted}\".")),
        None => {
            let mut ops = operations(document);
            let first = ops
                .next()
                .ok_or_else(|| "Must provide an operation.".to_string())?;
            if ops.next().is_some() {
                return Err(
                    "Must provide operation name if query contains multiple operations."
                        .to_string(),
                );
            }
            Ok(first)
        }
    }
}

pub(crate) fn empty_selection_set() -> SelectionSet {
    SelectionSet {
        span: (Pos::default(), Pos::default()),
        items: vec![],
    }
}
