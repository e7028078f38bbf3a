//! Schema-aware programmatic construction of GraphQL documents.
//!
//! The builder mirrors the shape of the request: a [`DslSchema`] hands out
//! [`DslType`]s, types hand out [`DslField`]s, and fields are chained by
//! value into selections, arguments and aliases before [`dsl_gql`] turns a
//! set of root fields into an executable [`Document`]:
//!
//! ```
//! use std::sync::Arc;
//! use gql_client::{dsl::DslSchema, Schema};
//!
//! let schema = Schema::from_type_definitions(
//!     "type Query { hero: Character } type Character { name: String }",
//! )?;
//! let ds = DslSchema::new(Arc::new(schema));
//!
//! let hero = ds.query()?.field("hero")?.select([ds.type_named("Character")?.field("name")?]);
//! assert_eq!(hero.to_string(), "hero {\n  name\n}");
//! # Ok::<(), gql_client::Error>(())
//! ```

use std::fmt;
use std::sync::Arc;

use derive_more::with_trait::Display;

use crate::{
    ast::{self, Document, OperationKind, Pos},
    schema::{FieldMeta, MetaType, Schema, TypeRef},
    util::to_camel_case,
};

/// Errors raised by misusing the request builder.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum DslError {
    /// The requested type is not in the schema (or cannot carry fields).
    #[display("type \"{_0}\" not found in the schema")]
    SchemaLookup(String),
    /// The requested field does not exist on its type.
    #[display("field \"{name}\" does not exist in type \"{type_name}\"")]
    UnknownField {
        /// The type the lookup ran on.
        type_name: String,
        /// The missing field (or input field) name.
        name: String,
    },
    /// The supplied argument does not exist on the field.
    #[display("argument \"{name}\" does not exist on field \"{field}\"")]
    UnknownArgument {
        /// The field the lookup ran on.
        field: String,
        /// The missing argument name.
        name: String,
    },
    /// A value (or field) was of the wrong shape for its declared type.
    #[display("type mismatch: {_0}")]
    TypeMismatch(String),
    /// Root fields of different operation kinds were mixed.
    #[display("cannot mix {_0} and {_1} root fields in one operation")]
    RootKindMismatch(OperationKind, OperationKind),
}

impl std::error::Error for DslError {}

/// The root of the DSL: a handle on a schema that resolves type names.
#[derive(Clone, Debug)]
pub struct DslSchema {
    schema: Arc<Schema>,
}

impl DslSchema {
    /// Wraps a schema for request building.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Resolves a named object or interface type.
    pub fn type_named(&self, name: &str) -> Result<DslType, DslError> {
        match self.schema.type_named(name) {
            Some(meta) if meta.fields().is_some() => Ok(DslType {
                schema: Arc::clone(&self.schema),
                name: meta.name().to_owned(),
            }),
            _ => Err(DslError::SchemaLookup(name.into())),
        }
    }

    /// Resolves the query root type.
    pub fn query(&self) -> Result<DslType, DslError> {
        self.root(OperationKind::Query)
    }

    /// Resolves the mutation root type.
    pub fn mutation(&self) -> Result<DslType, DslError> {
        self.root(OperationKind::Mutation)
    }

    /// Resolves the subscription root type.
    pub fn subscription(&self) -> Result<DslType, DslError> {
        self.root(OperationKind::Subscription)
    }

    fn root(&self, kind: OperationKind) -> Result<DslType, DslError> {
        let name = self
            .schema
            .root_type_name(kind)
            .ok_or_else(|| DslError::SchemaLookup(kind.to_string()))?;
        self.type_named(&name.to_owned())
    }
}

/// A named composite type resolved from a [`DslSchema`].
#[derive(Clone, Debug)]
pub struct DslType {
    schema: Arc<Schema>,
    name: String,
}

impl DslType {
    /// The type's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves a field on this type.
    ///
    /// The name is tried verbatim first, then in camelCase, so snake_case
    /// callers keep working against camelCase schemas.
    pub fn field(&self, name: &str) -> Result<DslField, DslError> {
        let lookup = |n: &str| {
            self.schema
                .field_of(&self.name, n)
                .map(|meta| (n.to_owned(), meta.clone()))
        };
        let (wire_name, meta) = lookup(name)
            .or_else(|| lookup(&to_camel_case(name)))
            .ok_or_else(|| DslError::UnknownField {
                type_name: self.name.clone(),
                name: name.into(),
            })?;

        Ok(DslField {
            schema: Arc::clone(&self.schema),
            parent_type: self.name.clone(),
            meta,
            ast: ast::Field {
                position: Pos::default(),
                alias: None,
                name: wire_name,
                arguments: vec![],
                directives: vec![],
                selection_set: ast::empty_selection_set(),
            },
        })
    }
}

/// A field under construction, chained by value.
#[derive(Clone, Debug)]
pub struct DslField {
    schema: Arc<Schema>,
    parent_type: String,
    meta: FieldMeta,
    ast: ast::Field,
}

impl DslField {
    /// The name of the type this field was resolved on.
    pub fn parent_type_name(&self) -> &str {
        &self.parent_type
    }

    /// Sets the response alias.
    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        self.ast.alias = Some(alias.to_owned());
        self
    }

    /// Appends child fields to the selection set.
    ///
    /// Repeated calls are cumulative.
    #[must_use]
    pub fn select(mut self, fields: impl IntoIterator<Item = DslField>) -> Self {
        self.ast
            .selection_set
            .items
            .extend(fields.into_iter().map(|f| ast::Selection::Field(f.ast)));
        self
    }

    /// Appends one argument, serializing `value` against the argument's
    /// declared input type.
    pub fn arg(
        mut self,
        name: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self, DslError> {
        let declaration =
            self.meta
                .argument(name)
                .cloned()
                .ok_or_else(|| DslError::UnknownArgument {
                    field: self.meta.name.clone(),
                    name: name.into(),
                })?;
        let serialized = serialize_value(&self.schema, &declaration.value_type, &value.into())?;
        self.ast.arguments.push((name.to_owned(), serialized));
        Ok(self)
    }

    /// Appends several arguments at once; calls are cumulative like
    /// [`arg`](Self::arg).
    pub fn args<V>(
        mut self,
        arguments: impl IntoIterator<Item = (&'static str, V)>,
    ) -> Result<Self, DslError>
    where
        V: Into<serde_json::Value>,
    {
        for (name, value) in arguments {
            self = self.arg(name, value)?;
        }
        Ok(self)
    }

    fn into_ast(self) -> ast::Field {
        self.ast
    }
}

impl fmt::Display for DslField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ast.to_string().trim_end())
    }
}

/// Builds a single-operation document from root fields.
///
/// Every field must belong to the same root operation type of its schema
/// (`Query`, `Mutation` or `Subscription`).
pub fn dsl_gql(fields: impl IntoIterator<Item = DslField>) -> Result<Document, DslError> {
    let fields: Vec<DslField> = fields.into_iter().collect();

    let mut kind = None;
    for field in &fields {
        let field_kind = field
            .schema
            .root_kind(&field.parent_type)
            .ok_or_else(|| {
                DslError::TypeMismatch(format!(
                    "field \"{}\" is selected on \"{}\", which is not a root operation type",
                    field.meta.name, field.parent_type,
                ))
            })?;
        match kind {
            None => kind = Some(field_kind),
            Some(k) if k != field_kind => {
                return Err(DslError::RootKindMismatch(k, field_kind));
            }
            Some(_) => {}
        }
    }
    let Some(kind) = kind else {
        return Err(DslError::TypeMismatch(
            "at least one root field is required".into(),
        ));
    };

    let selection_set = ast::SelectionSet {
        span: (Pos::default(), Pos::default()),
        items: fields
            .into_iter()
            .map(|f| ast::Selection::Field(f.into_ast()))
            .collect(),
    };

    let operation = match kind {
        OperationKind::Query => ast::OperationDefinition::Query(ast::Query {
            position: Pos::default(),
            name: None,
            variable_definitions: vec![],
            directives: vec![],
            selection_set,
        }),
        OperationKind::Mutation => ast::OperationDefinition::Mutation(ast::Mutation {
            position: Pos::default(),
            name: None,
            variable_definitions: vec![],
            directives: vec![],
            selection_set,
        }),
        OperationKind::Subscription => {
            ast::OperationDefinition::Subscription(ast::Subscription {
                position: Pos::default(),
                name: None,
                variable_definitions: vec![],
                directives: vec![],
                selection_set,
            })
        }
    };

    Ok(Document {
        definitions: vec![ast::Definition::Operation(operation)],
    })
}

/// Serializes a JSON value into an AST value guided by the declared input
/// type.
///
/// Recursion is driven by the value tree, so self-referencing input object
/// types terminate naturally once the value bottoms out.
fn serialize_value(
    schema: &Schema,
    ty: &TypeRef,
    value: &serde_json::Value,
) -> Result<ast::Value, DslError> {
    use serde_json::Value as Json;

    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(DslError::TypeMismatch(format!(
                    "null is not allowed for non-null type \"{ty}\"",
                )));
            }
            serialize_value(schema, inner, value)
        }
        TypeRef::List(inner) => match value {
            Json::Null => Ok(ast::Value::Null),
            Json::Array(items) => Ok(ast::Value::List(
                items
                    .iter()
                    .map(|item| serialize_value(schema, inner, item))
                    .collect::<Result<_, _>>()?,
            )),
            _ => Err(DslError::TypeMismatch(format!(
                "expected a list for type \"{ty}\"",
            ))),
        },
        TypeRef::Named(name) => {
            if value.is_null() {
                return Ok(ast::Value::Null);
            }
            match schema.type_named(name) {
                Some(MetaType::Enum { values, .. }) => match value.as_str() {
                    Some(s) if values.iter().any(|v| v == s) => {
                        Ok(ast::Value::Enum(s.to_owned()))
                    }
                    _ => Err(DslError::TypeMismatch(format!(
                        "\"{value}\" is not a value of enum \"{name}\"",
                    ))),
                },
                Some(MetaType::InputObject { fields, .. }) => {
                    let Json::Object(entries) = value else {
                        return Err(DslError::TypeMismatch(format!(
                            "expected an object for input type \"{name}\"",
                        )));
                    };
                    let mut serialized = std::collections::BTreeMap::new();
                    for (key, entry) in entries {
                        let field = fields
                            .iter()
                            .find(|f| f.name == *key)
                            .ok_or_else(|| DslError::UnknownField {
                                type_name: name.clone(),
                                name: key.clone(),
                            })?;
                        serialized
                            .insert(key.clone(), serialize_value(schema, &field.value_type, entry)?);
                    }
                    Ok(ast::Value::Object(serialized))
                }
                Some(MetaType::Scalar { .. }) | None => schema
                    .serialize_scalar(name, value)
                    .map_err(|e| DslError::TypeMismatch(e.to_string())),
                Some(_) => Err(DslError::TypeMismatch(format!(
                    "type \"{name}\" cannot be used as an input",
                ))),
            }
        }
    }
}
