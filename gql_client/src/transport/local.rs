//! In-process execution of documents against a held schema, for tests and
//! offline use.
//!
//! The executor walks the operation's selection set over a source value.
//! Field values come from a [`Resolver`]; the default [`JsonResolver`]
//! simply looks response keys up in a JSON tree, which is enough to serve
//! canned data. Resolution failures become entries of the result's `errors`
//! list, never transport failures.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    ast::{self, Field, Selection, SelectionSet, TypeCondition},
    execution::{ErrorEntry, ExecutionResult, Variables},
    schema::{MetaType, Schema, TypeRef},
    transport::{Request, Transport, TransportError},
};

/// Resolves field values for the local-schema transport.
pub trait Resolver: Send + Sync {
    /// Produces the raw value of `field` on `parent_type`, given the
    /// parent's own resolved value as `source`. An `Err` becomes an entry in
    /// the result's `errors` list and the field resolves to `null`.
    fn resolve_field(
        &self,
        parent_type: &str,
        field: &str,
        arguments: &Variables,
        source: &serde_json::Value,
    ) -> Result<serde_json::Value, String>;
}

/// The default resolver: fields are keys of the source JSON object.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonResolver;

impl Resolver for JsonResolver {
    fn resolve_field(
        &self,
        _parent_type: &str,
        field: &str,
        _arguments: &Variables,
        source: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Ok(source.get(field).cloned().unwrap_or(serde_json::Value::Null))
    }
}

/// Synchronous in-process execution of documents against a schema.
pub struct LocalSchemaTransport {
    schema: Arc<Schema>,
    root_value: serde_json::Value,
    resolver: Arc<dyn Resolver>,
}

impl LocalSchemaTransport {
    /// A transport over `schema` resolving from an empty source.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            root_value: serde_json::Value::Null,
            resolver: Arc::new(JsonResolver),
        }
    }

    /// Sets the source value operations resolve against.
    #[must_use]
    pub fn with_root_value(mut self, value: serde_json::Value) -> Self {
        self.root_value = value;
        self
    }

    /// Replaces the field resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The schema operations execute against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn run(&self, request: Request<'_>) -> ExecutionResult {
        let operation = match ast::find_operation(request.document, request.operation_name) {
            Ok(operation) => operation,
            Err(message) => return error_result(message),
        };
        let kind = ast::operation_kind(operation);
        let Some(root_name) = self.schema.root_type_name(kind) else {
            return error_result(format!("Schema is not configured for {kind} operations."));
        };

        let variables = request.variables.cloned().unwrap_or_default();
        let mut executor = Executor {
            schema: &self.schema,
            resolver: self.resolver.as_ref(),
            document: request.document,
            variables: &variables,
            errors: vec![],
        };
        let data = executor.execute_selection_set(
            &root_name.to_owned(),
            ast::operation_selection_set(operation),
            &self.root_value,
        );

        ExecutionResult {
            data: Some(data),
            errors: (!executor.errors.is_empty()).then_some(executor.errors),
        }
    }
}

fn error_result(message: String) -> ExecutionResult {
    ExecutionResult {
        data: None,
        errors: Some(vec![ErrorEntry::new(message)]),
    }
}

#[async_trait]
impl Transport for LocalSchemaTransport {
    async fn execute(&self, request: Request<'_>) -> Result<ExecutionResult, TransportError> {
        Ok(self.run(request))
    }
}

struct Executor<'e> {
    schema: &'e Schema,
    resolver: &'e dyn Resolver,
    document: &'e ast::Document,
    variables: &'e Variables,
    errors: Vec<ErrorEntry>,
}

impl Executor<'_> {
    fn execute_selection_set(
        &mut self,
        type_name: &str,
        set: &SelectionSet,
        source: &serde_json::Value,
    ) -> serde_json::Value {
        let mut output = serde_json::Map::new();
        self.collect(type_name, set, source, &mut output);
        serde_json::Value::Object(output)
    }

    fn collect(
        &mut self,
        type_name: &str,
        set: &SelectionSet,
        source: &serde_json::Value,
        output: &mut serde_json::Map<String, serde_json::Value>,
    ) {
        for selection in &set.items {
            match selection {
                Selection::Field(field) => self.collect_field(type_name, field, source, output),
                Selection::InlineFragment(inline) => {
                    let applies = match &inline.type_condition {
                        Some(TypeCondition::On(condition)) => {
                            self.fragment_applies(condition, type_name)
                        }
                        None => true,
                    };
                    if applies {
                        self.collect(type_name, &inline.selection_set, source, output);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let fragment = ast::fragments(self.document)
                        .find(|frag| frag.name == spread.fragment_name);
                    if let Some(fragment) = fragment {
                        let TypeCondition::On(condition) = &fragment.type_condition;
                        if self.fragment_applies(condition, type_name) {
                            self.collect(type_name, &fragment.selection_set, source, output);
                        }
                    } else {
                        self.errors.push(ErrorEntry::new(format!(
                            "Unknown fragment \"{}\".",
                            spread.fragment_name,
                        )));
                    }
                }
            }
        }
    }

    /// A condition applies when it names the current type, or an interface
    /// the current type implements, or a union it belongs to. With plain
    /// JSON sources there is no runtime type information, so a concrete
    /// condition under an abstract parent is skipped.
    fn fragment_applies(&self, condition: &str, type_name: &str) -> bool {
        if condition == type_name {
            return true;
        }
        match self.schema.type_named(condition) {
            Some(MetaType::Interface { .. }) => match self.schema.type_named(type_name) {
                Some(MetaType::Object { interfaces, .. }) => {
                    interfaces.iter().any(|i| i == condition)
                }
                _ => false,
            },
            Some(MetaType::Union { members, .. }) => members.iter().any(|m| m == type_name),
            _ => false,
        }
    }

    fn collect_field(
        &mut self,
        type_name: &str,
        field: &Field,
        source: &serde_json::Value,
        output: &mut serde_json::Map<String, serde_json::Value>,
    ) {
        let key = field.alias.clone().unwrap_or_else(|| field.name.clone());

        if field.name == "__typename" {
            output.insert(key, type_name.into());
            return;
        }

        let Some(field_meta) = self.schema.field_of(type_name, &field.name) else {
            self.errors.push(ErrorEntry::new(format!(
                "Cannot query field \"{}\" on type \"{}\".",
                field.name, type_name,
            )));
            output.insert(key, serde_json::Value::Null);
            return;
        };
        let field_type = field_meta.field_type.clone();

        let arguments = field
            .arguments
            .iter()
            .map(|(name, value)| (name.clone(), self.ast_value_to_json(value)))
            .collect();

        let value =
            match self
                .resolver
                .resolve_field(type_name, &field.name, &arguments, source)
            {
                Ok(value) => self.complete(&field_type, field, value),
                Err(message) => {
                    self.errors.push(ErrorEntry::new(message));
                    serde_json::Value::Null
                }
            };
        output.insert(key, value);
    }

    fn complete(
        &mut self,
        ty: &TypeRef,
        field: &Field,
        value: serde_json::Value,
    ) -> serde_json::Value {
        match ty {
            TypeRef::NonNull(inner) => {
                let completed = self.complete(inner, field, value);
                if completed.is_null() {
                    self.errors.push(ErrorEntry::new(format!(
                        "Cannot return null for non-nullable field \"{}\".",
                        field.name,
                    )));
                }
                completed
            }
            TypeRef::List(inner) => match value {
                serde_json::Value::Null => serde_json::Value::Null,
                serde_json::Value::Array(items) => serde_json::Value::Array(
                    items
                        .into_iter()
                        .map(|item| self.complete(inner, field, item))
                        .collect(),
                ),
                _ => {
                    self.errors.push(ErrorEntry::new(format!(
                        "Expected a list for field \"{}\".",
                        field.name,
                    )));
                    serde_json::Value::Null
                }
            },
            TypeRef::Named(name) => {
                if value.is_null() {
                    return serde_json::Value::Null;
                }
                match self.schema.type_named(name) {
                    Some(meta) if meta.is_composite() => {
                        self.execute_selection_set(&name.to_owned(), &field.selection_set, &value)
                    }
                    _ => value,
                }
            }
        }
    }

    fn ast_value_to_json(&self, value: &ast::Value) -> serde_json::Value {
        use serde_json::Value as Json;
        match value {
            ast::Value::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .unwrap_or(Json::Null),
            ast::Value::Int(n) => n.as_i64().map(Json::from).unwrap_or(Json::Null),
            ast::Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            ast::Value::String(s) => Json::String(s.clone()),
            ast::Value::Boolean(b) => Json::Bool(*b),
            ast::Value::Null => Json::Null,
            ast::Value::Enum(name) => Json::String(name.clone()),
            ast::Value::List(items) => {
                Json::Array(items.iter().map(|v| self.ast_value_to_json(v)).collect())
            }
            ast::Value::Object(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.ast_value_to_json(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::gql;

    use super::*;

    fn transport() -> LocalSchemaTransport {
        let schema = Schema::from_type_definitions(
            "type Query { station: Station stations: [Station!] } \
             type Station { name: String! altitude: Int crew: [String] }",
        )
        .unwrap();
        LocalSchemaTransport::new(Arc::new(schema)).with_root_value(json!({
            "station": {"name": "ISS", "altitude": 408, "crew": ["cmdr", "pilot"]},
            "stations": [
                {"name": "ISS", "altitude": 408},
                {"name": "Tiangong", "altitude": 389},
            ],
        }))
    }

    async fn run(transport: &LocalSchemaTransport, source: &str) -> ExecutionResult {
        let document = gql(source).unwrap();
        transport.execute(Request::new(&document)).await.unwrap()
    }

    #[tokio::test]
    async fn walks_the_source_tree() {
        let result = run(&transport(), "{ station { name altitude } }").await;
        assert_eq!(result.errors, None);
        assert_eq!(
            result.data,
            Some(json!({"station": {"name": "ISS", "altitude": 408}})),
        );
    }

    #[tokio::test]
    async fn aliases_and_typename_shape_the_response() {
        let result = run(
            &transport(),
            "{ outpost: station { __typename callsign: name } }",
        )
        .await;
        assert_eq!(
            result.data,
            Some(json!({"outpost": {"__typename": "Station", "callsign": "ISS"}})),
        );
    }

    #[tokio::test]
    async fn lists_complete_element_wise() {
        let result = run(&transport(), "{ stations { name } }").await;
        assert_eq!(
            result.data,
            Some(json!({"stations": [{"name": "ISS"}, {"name": "Tiangong"}]})),
        );
    }

    #[tokio::test]
    async fn missing_nullable_fields_resolve_to_null() {
        let result = run(&transport(), "{ station { name crew altitude } stations { crew } }")
            .await;
        // crew is nullable and simply missing from the list source objects
        assert_eq!(result.errors, None);
        assert_eq!(
            result.data,
            Some(json!({
                "station": {"name": "ISS", "altitude": 408, "crew": ["cmdr", "pilot"]},
                "stations": [{"crew": null}, {"crew": null}],
            })),
        );
    }

    #[tokio::test]
    async fn resolver_errors_surface_as_error_entries() {
        struct Failing;
        impl Resolver for Failing {
            fn resolve_field(
                &self,
                _parent_type: &str,
                field: &str,
                _arguments: &Variables,
                _source: &serde_json::Value,
            ) -> Result<serde_json::Value, String> {
                Err(format!("no resolver for {field}"))
            }
        }

        let t = transport().with_resolver(Arc::new(Failing));
        let result = run(&t, "{ station { name } }").await;
        assert_eq!(result.data, Some(json!({"station": null})));
        assert_eq!(
            result.errors.unwrap()[0].message,
            "no resolver for station",
        );
    }

    #[tokio::test]
    async fn operation_selection_failures_are_result_errors() {
        let t = transport();
        let document = gql("query A { station { name } } query B { station { name } }").unwrap();
        let result = t.execute(Request::new(&document)).await.unwrap();
        assert_eq!(result.data, None);
        assert_eq!(
            result.errors.unwrap()[0].message,
            "Must provide operation name if query contains multiple operations.",
        );

        let picked = t
            .execute(Request::new(&document).operation_name("B"))
            .await
            .unwrap();
        assert!(picked.data.is_some());
    }
}
