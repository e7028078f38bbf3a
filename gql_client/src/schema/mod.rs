//! Client-side schema model: a registry of named types with root operation
//! bindings, built from SDL or from an introspection result.
//!
//! The model keeps only what a client needs: type and field
//! lookup, document validation and scalar serialization. Resolvers,
//! directives and descriptions have no client-side meaning and are dropped
//! during translation.

mod introspection;
mod sdl;

use std::fmt;

use derive_more::with_trait::Display;
use fnv::FnvHashMap;

use crate::{
    ast::{self, OperationKind},
    validation::{self, RuleError},
};

pub use self::introspection::INTROSPECTION_QUERY;

/// Names of the scalars every schema carries implicitly.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A reference to a (possibly wrapped) schema type, as it appears in field
/// and argument positions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeRef {
    /// A bare named type.
    Named(String),
    /// A list wrapper.
    List(Box<TypeRef>),
    /// A non-null wrapper.
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// The innermost named type.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.name(),
        }
    }

    fn from_ast(ty: &graphql_parser::schema::Type<'static, String>) -> Self {
        use graphql_parser::schema::Type as Ast;
        match ty {
            Ast::NamedType(name) => Self::Named(name.clone()),
            Ast::ListType(inner) => Self::List(Self::from_ast(inner).into()),
            Ast::NonNullType(inner) => Self::NonNull(Self::from_ast(inner).into()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// An argument or input-object field declaration.
#[derive(Clone, Debug)]
pub struct InputValueMeta {
    /// The declared name.
    pub name: String,
    /// The declared input type.
    pub value_type: TypeRef,
}

/// A field declared on an object or interface type.
#[derive(Clone, Debug)]
pub struct FieldMeta {
    /// The wire name of the field.
    pub name: String,
    /// The declared arguments.
    pub arguments: Vec<InputValueMeta>,
    /// The declared result type.
    pub field_type: TypeRef,
}

impl FieldMeta {
    /// Looks up an argument declaration by name.
    pub fn argument(&self, name: &str) -> Option<&InputValueMeta> {
        self.arguments.iter().find(|arg| arg.name == name)
    }
}

/// A named type registered in a [`Schema`].
#[derive(Clone, Debug)]
pub enum MetaType {
    /// A scalar leaf type.
    Scalar {
        /// The type name.
        name: String,
    },
    /// An object type.
    Object {
        /// The type name.
        name: String,
        /// Names of the interfaces the object implements.
        interfaces: Vec<String>,
        /// The declared fields.
        fields: Vec<FieldMeta>,
    },
    /// An interface type.
    Interface {
        /// The type name.
        name: String,
        /// The declared fields.
        fields: Vec<FieldMeta>,
    },
    /// A union type.
    Union {
        /// The type name.
        name: String,
        /// Names of the member object types.
        members: Vec<String>,
    },
    /// An enum leaf type.
    Enum {
        /// The type name.
        name: String,
        /// The declared values.
        values: Vec<String>,
    },
    /// An input object type.
    InputObject {
        /// The type name.
        name: String,
        /// The declared input fields.
        fields: Vec<InputValueMeta>,
    },
}

impl MetaType {
    /// The name of the type.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar { name }
            | Self::Object { name, .. }
            | Self::Interface { name, .. }
            | Self::Union { name, .. }
            | Self::Enum { name, .. }
            | Self::InputObject { name, .. } => name,
        }
    }

    /// The declared output fields, for object and interface types.
    pub fn fields(&self) -> Option<&[FieldMeta]> {
        match self {
            Self::Object { fields, .. } | Self::Interface { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Looks up an output field by wire name.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields()?.iter().find(|field| field.name == name)
    }

    /// The declared input fields, for input object types.
    pub fn input_fields(&self) -> Option<&[InputValueMeta]> {
        match self {
            Self::InputObject { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Whether the type can carry a selection set.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::Object { .. } | Self::Interface { .. } | Self::Union { .. }
        )
    }

    /// Whether the type is a response leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar { .. } | Self::Enum { .. })
    }
}

/// A value could not be coerced into a scalar type.
#[derive(Clone, Debug, Display)]
#[display("cannot represent value as \"{type_name}\": {detail}")]
pub struct CoercionError {
    /// The scalar the value was coerced towards.
    pub type_name: String,
    /// What went wrong.
    pub detail: String,
}

impl std::error::Error for CoercionError {}

/// Errors raised while building a [`Schema`].
#[derive(Debug, Display)]
pub enum SchemaError {
    /// The SDL source did not parse.
    #[display("failed to parse type definitions: {_0}")]
    Parse(String),
    /// A type name was defined more than once.
    #[display("type \"{_0}\" is defined more than once")]
    DuplicateType(String),
    /// The schema names a root operation type that is not defined.
    #[display("root {_0} type \"{_1}\" is not defined")]
    UnknownRoot(OperationKind, String),
    /// No query root type could be determined.
    #[display("the schema defines no query root type")]
    MissingQueryRoot,
    /// The introspection result did not have the expected shape.
    #[display("malformed introspection result: {_0}")]
    Introspection(String),
    /// The SDL used a construct the client-side model does not support.
    #[display("unsupported type definition construct: {_0}")]
    Unsupported(String),
}

impl std::error::Error for SchemaError {}

/// An immutable client-side schema.
///
/// Supports the four things a client needs from a schema: type lookup by
/// name, field lookup on composite types, validation of a document, and
/// scalar serialization for the request builder.
#[derive(Clone, Debug)]
pub struct Schema {
    types: FnvHashMap<String, MetaType>,
    query_type_name: String,
    mutation_type_name: Option<String>,
    subscription_type_name: Option<String>,
}

impl Schema {
    /// Builds a schema from SDL type definitions.
    pub fn from_type_definitions(sdl: &str) -> Result<Self, SchemaError> {
        sdl::build(sdl)
    }

    /// Builds a schema from the JSON result of an introspection query.
    ///
    /// Accepts the full response `data` (an object holding `__schema`) or
    /// the `__schema` object itself.
    pub fn from_introspection(introspection: &serde_json::Value) -> Result<Self, SchemaError> {
        introspection::build(introspection)
    }

    fn assemble(
        mut types: FnvHashMap<String, MetaType>,
        query: Option<String>,
        mutation: Option<String>,
        subscription: Option<String>,
    ) -> Result<Self, SchemaError> {
        for scalar in BUILTIN_SCALARS {
            types
                .entry(scalar.into())
                .or_insert_with(|| MetaType::Scalar {
                    name: scalar.into(),
                });
        }

        let query_type_name = match query {
            Some(name) => {
                if !types.contains_key(&name) {
                    return Err(SchemaError::UnknownRoot(OperationKind::Query, name));
                }
                name
            }
            None if types.contains_key("Query") => "Query".into(),
            None => return Err(SchemaError::MissingQueryRoot),
        };
        let mutation_type_name =
            Self::optional_root(&types, mutation, "Mutation", OperationKind::Mutation)?;
        let subscription_type_name = Self::optional_root(
            &types,
            subscription,
            "Subscription",
            OperationKind::Subscription,
        )?;

        Ok(Self {
            types,
            query_type_name,
            mutation_type_name,
            subscription_type_name,
        })
    }

    fn optional_root(
        types: &FnvHashMap<String, MetaType>,
        explicit: Option<String>,
        default: &str,
        kind: OperationKind,
    ) -> Result<Option<String>, SchemaError> {
        match explicit {
            Some(name) => {
                if !types.contains_key(&name) {
                    return Err(SchemaError::UnknownRoot(kind, name));
                }
                Ok(Some(name))
            }
            None => Ok(types.contains_key(default).then(|| default.into())),
        }
    }

    /// Looks up a type by name.
    pub fn type_named(&self, name: &str) -> Option<&MetaType> {
        self.types.get(name)
    }

    /// Looks up a field declared on the named object or interface type.
    pub fn field_of(&self, type_name: &str, field_name: &str) -> Option<&FieldMeta> {
        self.type_named(type_name)?.field(field_name)
    }

    /// The name of the root type serving the given operation kind.
    pub fn root_type_name(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(&self.query_type_name),
            OperationKind::Mutation => self.mutation_type_name.as_deref(),
            OperationKind::Subscription => self.subscription_type_name.as_deref(),
        }
    }

    /// The operation kind the named type is the root of, if any.
    pub fn root_kind(&self, type_name: &str) -> Option<OperationKind> {
        [
            OperationKind::Query,
            OperationKind::Mutation,
            OperationKind::Subscription,
        ]
        .into_iter()
        .find(|kind| self.root_type_name(*kind) == Some(type_name))
    }

    /// Serializes a JSON value into an AST value of the named scalar type.
    ///
    /// Built-in scalars coerce the way servers do (`String` and `ID` accept
    /// numbers and render their decimal form); custom scalars convert
    /// structurally.
    pub fn serialize_scalar(
        &self,
        type_name: &str,
        value: &serde_json::Value,
    ) -> Result<ast::Value, CoercionError> {
        use serde_json::Value as Json;

        let fail = |detail: &str| {
            Err(CoercionError {
                type_name: type_name.into(),
                detail: detail.into(),
            })
        };

        match type_name {
            "String" | "ID" => match value {
                Json::String(s) => Ok(ast::Value::String(s.clone())),
                Json::Number(n) => Ok(ast::Value::String(n.to_string())),
                Json::Bool(b) => Ok(ast::Value::String(b.to_string())),
                _ => fail("expected a string, number or boolean"),
            },
            "Int" => match value.as_i64() {
                Some(n) if i32::try_from(n).is_ok() => Ok(ast::Value::Int((n as i32).into())),
                _ => fail("expected a 32-bit integer"),
            },
            "Float" => match value.as_f64() {
                Some(f) => Ok(ast::Value::Float(f)),
                None => fail("expected a number"),
            },
            "Boolean" => match value {
                Json::Bool(b) => Ok(ast::Value::Boolean(*b)),
                _ => fail("expected a boolean"),
            },
            _ => Ok(json_to_ast(value)),
        }
    }

    /// Validates a document against this schema, returning every rule
    /// violation found.
    pub fn validate(&self, document: &ast::Document) -> Vec<RuleError> {
        validation::validate(self, document)
    }
}

/// Structural JSON → AST value conversion, used for custom scalars.
fn json_to_ast(value: &serde_json::Value) -> ast::Value {
    use serde_json::Value as Json;
    match value {
        Json::Null => ast::Value::Null,
        Json::Bool(b) => ast::Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => ast::Value::Int((i as i32).into()),
            _ => ast::Value::Float(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => ast::Value::String(s.clone()),
        Json::Array(items) => ast::Value::List(items.iter().map(json_to_ast).collect()),
        Json::Object(map) => ast::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_ast(v)))
                .collect(),
        ),
    }
}
