//! Schema construction from the JSON result of an introspection query.

use fnv::FnvHashMap;
use serde::Deserialize;

use super::{FieldMeta, InputValueMeta, MetaType, Schema, SchemaError, TypeRef};

/// The standard introspection document (without descriptions), as issued by
/// [`Session::fetch_schema`](crate::Session::fetch_schema).
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      ...FullType
    }
  }
}

fragment FullType on __Type {
  kind
  name
  fields(includeDeprecated: true) {
    name
    args { ...InputValue }
    type { ...TypeRef }
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) { name }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: NamedTypeRef,
    #[serde(default)]
    mutation_type: Option<NamedTypeRef>,
    #[serde(default)]
    subscription_type: Option<NamedTypeRef>,
    types: Vec<IntrospectionType>,
}

#[derive(Debug, Deserialize)]
struct NamedTypeRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionType {
    kind: String,
    name: Option<String>,
    #[serde(default)]
    fields: Option<Vec<IntrospectionField>>,
    #[serde(default)]
    input_fields: Option<Vec<IntrospectionInputValue>>,
    #[serde(default)]
    interfaces: Option<Vec<IntrospectionTypeRef>>,
    #[serde(default)]
    enum_values: Option<Vec<IntrospectionEnumValue>>,
    #[serde(default)]
    possible_types: Option<Vec<IntrospectionTypeRef>>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionField {
    name: String,
    #[serde(default)]
    args: Vec<IntrospectionInputValue>,
    #[serde(rename = "type")]
    field_type: IntrospectionTypeRef,
}

#[derive(Debug, Deserialize)]
struct IntrospectionInputValue {
    name: String,
    #[serde(rename = "type")]
    value_type: IntrospectionTypeRef,
}

#[derive(Debug, Deserialize)]
struct IntrospectionEnumValue {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionTypeRef {
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    of_type: Option<Box<IntrospectionTypeRef>>,
}

pub(super) fn build(introspection: &serde_json::Value) -> Result<Schema, SchemaError> {
    let root = if let Some(schema) = introspection.get("__schema") {
        schema
    } else if let Some(schema) = introspection.get("data").and_then(|d| d.get("__schema")) {
        schema
    } else {
        introspection
    };

    let parsed: IntrospectionSchema = serde_json::from_value(root.clone())
        .map_err(|e| SchemaError::Introspection(e.to_string()))?;

    let mut types = FnvHashMap::default();
    for ty in &parsed.types {
        let Some(name) = ty.name.as_deref() else {
            return Err(SchemaError::Introspection("type without a name".into()));
        };
        if name.starts_with("__") {
            continue;
        }
        let meta = translate_type(name, ty)?;
        if types.insert(name.to_owned(), meta).is_some() {
            return Err(SchemaError::DuplicateType(name.to_owned()));
        }
    }

    Schema::assemble(
        types,
        Some(parsed.query_type.name),
        parsed.mutation_type.map(|t| t.name),
        parsed.subscription_type.map(|t| t.name),
    )
}

fn translate_type(name: &str, ty: &IntrospectionType) -> Result<MetaType, SchemaError> {
    let name = name.to_owned();
    match ty.kind.as_str() {
        "SCALAR" => Ok(MetaType::Scalar { name }),
        "OBJECT" => Ok(MetaType::Object {
            name,
            interfaces: named_refs(ty.interfaces.as_deref().unwrap_or_default())?,
            fields: translate_fields(ty.fields.as_deref().unwrap_or_default())?,
        }),
        "INTERFACE" => Ok(MetaType::Interface {
            name,
            fields: translate_fields(ty.fields.as_deref().unwrap_or_default())?,
        }),
        "UNION" => Ok(MetaType::Union {
            name,
            members: named_refs(ty.possible_types.as_deref().unwrap_or_default())?,
        }),
        "ENUM" => Ok(MetaType::Enum {
            name,
            values: ty
                .enum_values
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|v| v.name.clone())
                .collect(),
        }),
        "INPUT_OBJECT" => Ok(MetaType::InputObject {
            name,
            fields: translate_input_values(ty.input_fields.as_deref().unwrap_or_default())?,
        }),
        other => Err(SchemaError::Introspection(format!(
            "unknown type kind \"{other}\" on type \"{name}\"",
        ))),
    }
}

fn translate_fields(fields: &[IntrospectionField]) -> Result<Vec<FieldMeta>, SchemaError> {
    fields
        .iter()
        .map(|field| {
            Ok(FieldMeta {
                name: field.name.clone(),
                arguments: translate_input_values(&field.args)?,
                field_type: type_ref(&field.field_type)?,
            })
        })
        .collect()
}

fn translate_input_values(
    inputs: &[IntrospectionInputValue],
) -> Result<Vec<InputValueMeta>, SchemaError> {
    inputs
        .iter()
        .map(|input| {
            Ok(InputValueMeta {
                name: input.name.clone(),
                value_type: type_ref(&input.value_type)?,
            })
        })
        .collect()
}

fn named_refs(refs: &[IntrospectionTypeRef]) -> Result<Vec<String>, SchemaError> {
    refs.iter()
        .map(|r| {
            r.name
                .clone()
                .ok_or_else(|| SchemaError::Introspection("unnamed type reference".into()))
        })
        .collect()
}

fn type_ref(r: &IntrospectionTypeRef) -> Result<TypeRef, SchemaError> {
    match r.kind.as_str() {
        "NON_NULL" => {
            let inner = r.of_type.as_deref().ok_or_else(|| {
                SchemaError::Introspection("NON_NULL reference without ofType".into())
            })?;
            Ok(TypeRef::NonNull(type_ref(inner)?.into()))
        }
        "LIST" => {
            let inner = r.of_type.as_deref().ok_or_else(|| {
                SchemaError::Introspection("LIST reference without ofType".into())
            })?;
            Ok(TypeRef::List(type_ref(inner)?.into()))
        }
        _ => r
            .name
            .clone()
            .map(TypeRef::Named)
            .ok_or_else(|| SchemaError::Introspection("unnamed type reference".into())),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::ast::OperationKind;

    use super::super::Schema;

    fn introspection() -> serde_json::Value {
        json!({
            "__schema": {
                "queryType": {"name": "Query"},
                "mutationType": null,
                "subscriptionType": null,
                "types": [
                    {
                        "kind": "OBJECT",
                        "name": "Query",
                        "fields": [
                            {
                                "name": "hero",
                                "args": [
                                    {
                                        "name": "episode",
                                        "type": {"kind": "ENUM", "name": "Episode", "ofType": null},
                                    },
                                ],
                                "type": {"kind": "INTERFACE", "name": "Character", "ofType": null},
                            },
                        ],
                        "interfaces": [],
                    },
                    {
                        "kind": "INTERFACE",
                        "name": "Character",
                        "fields": [
                            {
                                "name": "id",
                                "args": [],
                                "type": {
                                    "kind": "NON_NULL",
                                    "name": null,
                                    "ofType": {"kind": "SCALAR", "name": "String", "ofType": null},
                                },
                            },
                            {
                                "name": "name",
                                "args": [],
                                "type": {"kind": "SCALAR", "name": "String", "ofType": null},
                            },
                        ],
                    },
                    {
                        "kind": "ENUM",
                        "name": "Episode",
                        "enumValues": [
                            {"name": "NEWHOPE"},
                            {"name": "EMPIRE"},
                            {"name": "JEDI"},
                        ],
                    },
                    {"kind": "SCALAR", "name": "String"},
                ],
            },
        })
    }

    #[test]
    fn builds_from_introspection_result() {
        let schema = Schema::from_introspection(&introspection()).unwrap();
        assert_eq!(schema.root_type_name(OperationKind::Query), Some("Query"));
        let id = schema.field_of("Character", "id").unwrap();
        assert_eq!(id.field_type.to_string(), "String!");
        let hero = schema.field_of("Query", "hero").unwrap();
        assert_eq!(hero.argument("episode").unwrap().value_type.name(), "Episode");
    }

    #[test]
    fn accepts_the_bare_schema_object() {
        let wrapped = introspection();
        let bare = wrapped["__schema"].clone();
        assert!(Schema::from_introspection(&bare).is_ok());
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!(Schema::from_introspection(&json!({"__schema": {"types": []}})).is_err());
        assert!(
            Schema::from_introspection(&json!({
                "__schema": {"queryType": {"name": "Query"}, "types": "nope"},
            }))
            .is_err()
        );
    }
}
