//! Pre-flight validation of documents against a [`Schema`].
//!
//! Covers the rules a client can and should check before putting an
//! operation on the wire: known fields and arguments, leaf/composite
//! selection shape, resolvable fragments and declared variables. Anything
//! requiring execution-time knowledge is left to the server.

use std::collections::HashSet;
use std::fmt;

use fnv::FnvHashMap;

use crate::{
    ast::{
        self, Document, Field, FragmentDefinition, OperationDefinition, Pos, Selection,
        SelectionSet, TypeCondition, Value,
    },
    schema::{MetaType, Schema},
};

/// A single validation failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleError {
    message: String,
    locations: Vec<Pos>,
}

impl RuleError {
    /// Creates an error from a message and the positions it refers to.
    pub fn new(message: &str, locations: &[Pos]) -> Self {
        Self {
            message: message.into(),
            locations: locations.to_vec(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source positions the failure refers to.
    pub fn locations(&self) -> &[Pos] {
        &self.locations
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for location in &self.locations {
            write!(f, " At {}:{}.", location.line, location.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuleError {}

/// Validates `document` against `schema`, returning every violation found
/// in document order.
pub fn validate(schema: &Schema, document: &Document) -> Vec<RuleError> {
    let mut ctx = ValidatorContext {
        schema,
        fragments: ast::fragments(document)
            .map(|frag| (frag.name.as_str(), frag))
            .collect(),
        spread: HashSet::new(),
        errors: vec![],
    };

    for operation in ast::operations(document) {
        ctx.validate_operation(operation);
    }
    // Fragments reached from an operation were walked there; only the
    // never-spread ones still need a standalone pass.
    for fragment in ast::fragments(document) {
        if !ctx.spread.contains(fragment.name.as_str()) {
            ctx.validate_fragment(fragment);
        }
    }

    ctx.errors
}

struct ValidatorContext<'a> {
    schema: &'a Schema,
    fragments: FnvHashMap<&'a str, &'a FragmentDefinition>,
    spread: HashSet<&'a str>,
    errors: Vec<RuleError>,
}

impl<'a> ValidatorContext<'a> {
    fn error(&mut self, message: String, location: Pos) {
        self.errors.push(RuleError {
            message,
            locations: vec![location],
        });
    }

    fn validate_operation(&mut self, operation: &'a OperationDefinition) {
        let kind = ast::operation_kind(operation);
        let Some(root_name) = self.schema.root_type_name(kind) else {
            self.errors.push(RuleError::new(
                &format!("Schema is not configured for {kind} operations."),
                &[],
            ));
            return;
        };
        let Some(root) = self.schema.type_named(root_name) else {
            // Roots are checked at construction; a missing entry here means
            // the schema was assembled by hand.
            return;
        };

        let mut declared = HashSet::new();
        for var in ast::operation_variable_definitions(operation) {
            declared.insert(var.name.as_str());
            let named = type_name_of(&var.var_type);
            if self.schema.type_named(named).is_none() {
                self.error(format!("Unknown type \"{named}\"."), var.position);
            }
        }

        let mut visited = vec![];
        self.validate_selection_set(
            root,
            ast::operation_selection_set(operation),
            Some(&declared),
            &mut visited,
        );
    }

    fn validate_fragment(&mut self, fragment: &'a FragmentDefinition) {
        if let Some(parent) = self.resolve_type_condition(&fragment.type_condition, fragment.position)
        {
            let mut visited = vec![fragment.name.as_str()];
            // Variable usage inside a fragment is checked where the fragment
            // is spread, with the spreading operation's declarations.
            self.validate_selection_set(parent, &fragment.selection_set, None, &mut visited);
        }
    }

    fn resolve_type_condition(
        &mut self,
        condition: &TypeCondition,
        position: Pos,
    ) -> Option<&'a MetaType> {
        let TypeCondition::On(name) = condition;
        match self.schema.type_named(name) {
            Some(meta) if meta.is_composite() => Some(meta),
            Some(_) => {
                self.error(
                    format!("Fragment cannot condition on non composite type \"{name}\"."),
                    position,
                );
                None
            }
            None => {
                self.error(format!("Unknown type \"{name}\"."), position);
                None
            }
        }
    }

    fn validate_selection_set(
        &mut self,
        parent: &'a MetaType,
        set: &'a SelectionSet,
        variables: Option<&HashSet<&'a str>>,
        visited: &mut Vec<&'a str>,
    ) {
        for selection in &set.items {
            match selection {
                Selection::Field(field) => self.validate_field(parent, field, variables, visited),
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = self.fragments.get(spread.fragment_name.as_str()).copied()
                    else {
                        self.error(
                            format!("Unknown fragment \"{}\".", spread.fragment_name),
                            spread.position,
                        );
                        continue;
                    };
                    self.spread.insert(fragment.name.as_str());
                    if visited.contains(&fragment.name.as_str()) {
                        continue;
                    }
                    visited.push(fragment.name.as_str());
                    if let Some(parent) =
                        self.resolve_type_condition(&fragment.type_condition, fragment.position)
                    {
                        self.validate_selection_set(
                            parent,
                            &fragment.selection_set,
                            variables,
                            visited,
                        );
                    }
                    visited.pop();
                }
                Selection::InlineFragment(inline) => {
                    let parent = match &inline.type_condition {
                        Some(condition) => {
                            match self.resolve_type_condition(condition, inline.position) {
                                Some(meta) => meta,
                                None => continue,
                            }
                        }
                        None => parent,
                    };
                    self.validate_selection_set(parent, &inline.selection_set, variables, visited);
                }
            }
        }
    }

    fn validate_field(
        &mut self,
        parent: &'a MetaType,
        field: &'a Field,
        variables: Option<&HashSet<&'a str>>,
        visited: &mut Vec<&'a str>,
    ) {
        // Meta fields (__typename, __schema, __type) resolve outside the
        // declared type system.
        if field.name.starts_with("__") {
            return;
        }

        let Some(field_meta) = parent.field(&field.name) else {
            self.error(
                format!(
                    "Cannot query field \"{}\" on type \"{}\".",
                    field.name,
                    parent.name(),
                ),
                field.position,
            );
            return;
        };

        for (name, value) in &field.arguments {
            if field_meta.argument(name).is_none() {
                self.error(
                    format!(
                        "Unknown argument \"{}\" on field \"{}\" of type \"{}\".",
                        name,
                        field.name,
                        parent.name(),
                    ),
                    field.position,
                );
            }
            self.validate_value_variables(value, variables, field.position);
        }

        let type_name = field_meta.field_type.name();
        let Some(field_type) = self.schema.type_named(type_name) else {
            self.error(format!("Unknown type \"{type_name}\"."), field.position);
            return;
        };

        if field_type.is_composite() {
            if field.selection_set.items.is_empty() {
                self.error(
                    format!(
                        "Field \"{}\" of type \"{}\" must have a selection of subfields.",
                        field.name, field_meta.field_type,
                    ),
                    field.position,
                );
            } else {
                self.validate_selection_set(field_type, &field.selection_set, variables, visited);
            }
        } else if !field.selection_set.items.is_empty() {
            self.error(
                format!(
                    "Field \"{}\" must not have a selection since type \"{}\" has no subfields.",
                    field.name, field_meta.field_type,
                ),
                field.position,
            );
        }
    }

    fn validate_value_variables(
        &mut self,
        value: &Value,
        variables: Option<&HashSet<&'a str>>,
        position: Pos,
    ) {
        match value {
            Value::Variable(name) => {
                if let Some(declared) = variables {
                    if !declared.contains(name.as_str()) {
                        self.error(format!("Variable \"${name}\" is not defined."), position);
                    }
                }
            }
            Value::List(items) => {
                for item in items {
                    self.validate_value_variables(item, variables, position);
                }
            }
            Value::Object(fields) => {
                for item in fields.values() {
                    self.validate_value_variables(item, variables, position);
                }
            }
            _ => {}
        }
    }
}

fn type_name_of(ty: &ast::Type) -> &str {
    match ty {
        ast::Type::NamedType(name) => name,
        ast::Type::ListType(inner) | ast::Type::NonNullType(inner) => type_name_of(inner),
    }
}
