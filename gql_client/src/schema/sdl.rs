//! Schema construction from SDL type definitions.

use fnv::FnvHashMap;
use graphql_parser::schema::{Definition, TypeDefinition};

use super::{BUILTIN_SCALARS, FieldMeta, InputValueMeta, MetaType, Schema, SchemaError, TypeRef};

type SchemaDocument = graphql_parser::schema::Document<'static, String>;
type SchemaField = graphql_parser::schema::Field<'static, String>;
type SchemaInputValue = graphql_parser::schema::InputValue<'static, String>;

pub(super) fn build(sdl: &str) -> Result<Schema, SchemaError> {
    let document: SchemaDocument = graphql_parser::parse_schema::<String>(sdl)
        .map_err(|e| SchemaError::Parse(e.to_string()))?
        .into_static();

    let mut types = FnvHashMap::default();
    let mut query = None;
    let mut mutation = None;
    let mut subscription = None;

    for definition in &document.definitions {
        match definition {
            Definition::SchemaDefinition(schema_def) => {
                query = schema_def.query.clone();
                mutation = schema_def.mutation.clone();
                subscription = schema_def.subscription.clone();
            }
            Definition::TypeDefinition(type_def) => {
                let meta = translate_type(type_def);
                let name = meta.name().to_owned();
                // Re-declaring a built-in scalar is tolerated; it carries no
                // information the registry does not already have.
                if types.insert(name.clone(), meta).is_some()
                    && !BUILTIN_SCALARS.contains(&name.as_str())
                {
                    return Err(SchemaError::DuplicateType(name));
                }
            }
            Definition::TypeExtension(_) => {
                return Err(SchemaError::Unsupported("type extensions".into()));
            }
            Definition::DirectiveDefinition(_) => {}
        }
    }

    Schema::assemble(types, query, mutation, subscription)
}

fn translate_type(definition: &TypeDefinition<'static, String>) -> MetaType {
    match definition {
        TypeDefinition::Scalar(scalar) => MetaType::Scalar {
            name: scalar.name.clone(),
        },
        TypeDefinition::Object(object) => MetaType::Object {
            name: object.name.clone(),
            interfaces: object.implements_interfaces.clone(),
            fields: object.fields.iter().map(translate_field).collect(),
        },
        TypeDefinition::Interface(interface) => MetaType::Interface {
            name: interface.name.clone(),
            fields: interface.fields.iter().map(translate_field).collect(),
        },
        TypeDefinition::Union(union) => MetaType::Union {
            name: union.name.clone(),
            members: union.types.clone(),
        },
        TypeDefinition::Enum(enum_type) => MetaType::Enum {
            name: enum_type.name.clone(),
            values: enum_type.values.iter().map(|v| v.name.clone()).collect(),
        },
        TypeDefinition::InputObject(input) => MetaType::InputObject {
            name: input.name.clone(),
            fields: input.fields.iter().map(translate_input_value).collect(),
        },
    }
}

fn translate_field(field: &SchemaField) -> FieldMeta {
    FieldMeta {
        name: field.name.clone(),
        arguments: field.arguments.iter().map(translate_input_value).collect(),
        field_type: TypeRef::from_ast(&field.field_type),
    }
}

fn translate_input_value(input: &SchemaInputValue) -> InputValueMeta {
    InputValueMeta {
        name: input.name.clone(),
        value_type: TypeRef::from_ast(&input.value_type),
    }
}
