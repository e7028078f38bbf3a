//! Custom scalar decoding applied to execution results.
//!
//! Servers deliver custom scalars in their wire form (strings, numbers,
//! nested JSON). A [`ScalarAdaptor`] converts such a leaf into its domain
//! form, and a [`TypeAdaptor`] walks a whole result tree applying the
//! registered adaptors wherever the schema declares a mapped scalar.

use std::collections::HashMap;
use std::sync::Arc;

use derive_more::with_trait::Display;

use crate::schema::{MetaType, Schema, TypeRef};

/// A scalar adaptor rejected a value.
#[derive(Clone, Debug, Display)]
#[display("{message}")]
pub struct AdaptorError {
    /// What went wrong.
    pub message: String,
}

impl AdaptorError {
    /// Creates an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::error::Error for AdaptorError {}

/// Capability for decoding a wire-format scalar into a domain value.
///
/// Implemented for any compatible `Fn`, so a closure is usually enough:
///
/// ```
/// use gql_client::{AdaptorError, ScalarAdaptor};
///
/// let lowercase = |value: &serde_json::Value| match value.as_str() {
///     Some(s) => Ok(serde_json::Value::String(s.to_lowercase())),
///     None => Err(AdaptorError::new("expected a string")),
/// };
/// let _adaptor: &dyn ScalarAdaptor = &lowercase;
/// ```
pub trait ScalarAdaptor: Send + Sync {
    /// Parses a single scalar leaf.
    fn parse_value(&self, value: &serde_json::Value) -> Result<serde_json::Value, AdaptorError>;
}

impl<F> ScalarAdaptor for F
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, AdaptorError> + Send + Sync,
{
    fn parse_value(&self, value: &serde_json::Value) -> Result<serde_json::Value, AdaptorError> {
        self(value)
    }
}

/// Scalar-name → adaptor map, fixed at client construction.
pub type ScalarAdaptors = HashMap<String, Arc<dyn ScalarAdaptor>>;

/// Walks result trees, replacing mapped scalar leaves with their parsed
/// form.
///
/// Traversal is directed by declared field types: response keys are looked
/// up as fields of the current composite type, lists recurse element-wise,
/// and anything the schema cannot account for (aliases, unknown keys,
/// unmapped scalars) passes through untouched.
pub struct TypeAdaptor<'a> {
    schema: &'a Schema,
    adaptors: &'a ScalarAdaptors,
}

impl<'a> TypeAdaptor<'a> {
    /// Creates an adaptor walking `schema` with the given map.
    pub fn new(schema: &'a Schema, adaptors: &'a ScalarAdaptors) -> Self {
        Self { schema, adaptors }
    }

    /// Applies the adaptors to `data` produced by an operation rooted at
    /// `root_type`.
    pub fn apply(
        &self,
        root_type: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, AdaptorError> {
        self.adapt_composite(root_type, data)
    }

    fn adapt_composite(
        &self,
        type_name: &str,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, AdaptorError> {
        let serde_json::Value::Object(entries) = data else {
            return Ok(data);
        };
        let meta = self.schema.type_named(type_name);

        let mut adapted = serde_json::Map::with_capacity(entries.len());
        for (key, value) in entries {
            let value = match meta.and_then(|m| m.field(&key)) {
                Some(field) => self.adapt_value(&field.field_type, value)?,
                None => value,
            };
            adapted.insert(key, value);
        }
        Ok(serde_json::Value::Object(adapted))
    }

    fn adapt_value(
        &self,
        ty: &TypeRef,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, AdaptorError> {
        if value.is_null() {
            return Ok(value);
        }
        match ty {
            TypeRef::NonNull(inner) => self.adapt_value(inner, value),
            TypeRef::List(inner) => match value {
                serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
                    items
                        .into_iter()
                        .map(|item| self.adapt_value(inner, item))
                        .collect::<Result<_, _>>()?,
                )),
                other => self.adapt_value(inner, other),
            },
            TypeRef::Named(name) => match self.schema.type_named(name) {
                Some(MetaType::Scalar { .. }) => match self.adaptors.get(name) {
                    Some(adaptor) => adaptor.parse_value(&value).map_err(|e| {
                        AdaptorError::new(format!("decoding scalar \"{name}\": {e}"))
                    }),
                    None => Ok(value),
                },
                Some(meta) if meta.is_composite() => self.adapt_composite(name, value),
                _ => Ok(value),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn schema() -> Schema {
        Schema::from_type_definitions(
            "type Query { shuttle: Shuttle shuttles: [Shuttle] } \
             type Shuttle { name: String launched: Date crew: Int } \
             scalar Date",
        )
        .unwrap()
    }

    fn year_adaptor() -> ScalarAdaptors {
        let mut adaptors = ScalarAdaptors::new();
        adaptors.insert(
            "Date".into(),
            Arc::new(|value: &serde_json::Value| match value.as_str() {
                Some(s) => s
                    .split('-')
                    .next()
                    .and_then(|year| year.parse::<i64>().ok())
                    .map(serde_json::Value::from)
                    .ok_or_else(|| AdaptorError::new("expected an ISO date")),
                None => Err(AdaptorError::new("expected a string")),
            }),
        );
        adaptors
    }

    #[test]
    fn mapped_scalars_are_rewritten_in_place() {
        let schema = schema();
        let adaptors = year_adaptor();
        let data = json!({
            "shuttle": {"name": "Atlantis", "launched": "1985-10-03", "crew": 5},
        });
        let adapted = TypeAdaptor::new(&schema, &adaptors)
            .apply("Query", data)
            .unwrap();
        assert_eq!(
            adapted,
            json!({"shuttle": {"name": "Atlantis", "launched": 1985, "crew": 5}}),
        );
    }

    #[test]
    fn lists_and_nulls_pass_through_the_walk() {
        let schema = schema();
        let adaptors = year_adaptor();
        let data = json!({
            "shuttles": [
                {"name": "Atlantis", "launched": "1985-10-03"},
                {"name": "Enterprise", "launched": null},
            ],
        });
        let adapted = TypeAdaptor::new(&schema, &adaptors)
            .apply("Query", data)
            .unwrap();
        assert_eq!(
            adapted,
            json!({
                "shuttles": [
                    {"name": "Atlantis", "launched": 1985},
                    {"name": "Enterprise", "launched": null},
                ],
            }),
        );
    }

    #[test]
    fn unmapped_keys_and_scalars_are_untouched() {
        let schema = schema();
        let adaptors = year_adaptor();
        let data = json!({"shuttle": {"name": "Atlantis", "unknown": "x"}, "alien": 1});
        let adapted = TypeAdaptor::new(&schema, &adaptors)
            .apply("Query", data.clone())
            .unwrap();
        assert_eq!(adapted, data);
    }

    #[test]
    fn adaptor_failures_carry_the_scalar_name() {
        let schema = schema();
        let adaptors = year_adaptor();
        let data = json!({"shuttle": {"launched": 19851003}});
        let err = TypeAdaptor::new(&schema, &adaptors)
            .apply("Query", data)
            .unwrap_err();
        assert_eq!(err.to_string(), "decoding scalar \"Date\": expected a string");
    }
}
