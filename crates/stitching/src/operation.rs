//! An owned, mutable GraphQL operation. This is what transforms rewrite and what executors
//! receive once printed.

mod parse;
mod print;
mod value;
mod walk;

use std::collections::BTreeSet;

use graphql_stitching_schema::{OperationType, TypeRef};
use serde_json::{Map, Value as JsonValue};

pub use value::Value;
pub(crate) use walk::{TypeLookup, collect_fields};

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operation_type: OperationType,
    pub name: Option<String>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub items: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Operation {
    pub fn new(operation_type: OperationType, selection_set: SelectionSet) -> Self {
        Operation {
            operation_type,
            name: None,
            variable_definitions: Vec::new(),
            directives: Vec::new(),
            selection_set,
        }
    }

    pub fn variable_definition(&self, name: &str) -> Option<&VariableDefinition> {
        self.variable_definitions
            .iter()
            .find(|definition| definition.name == name)
    }

    /// Names of the variables referenced anywhere in the operation.
    pub fn used_variables(&self) -> BTreeSet<String> {
        let mut used = BTreeSet::new();
        for directive in &self.directives {
            directive.collect_variables(&mut used);
        }
        self.selection_set.collect_variables(&mut used);
        used
    }

    /// Drops variable definitions nothing references, and the values of variables the
    /// operation does not define.
    pub fn retain_used_variables(&mut self, variables: &mut Map<String, JsonValue>) {
        let used = self.used_variables();
        self.variable_definitions
            .retain(|definition| used.contains(&definition.name));
        variables.retain(|name, _| self.variable_definition(name).is_some());
    }
}

impl SelectionSet {
    pub fn new(items: Vec<Selection>) -> Self {
        SelectionSet { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_field(&mut self, field: Field) {
        self.items.push(Selection::Field(field));
    }

    /// Fields directly in this selection set, not looking into fragments.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.items.iter().filter_map(|selection| match selection {
            Selection::Field(field) => Some(field),
            Selection::InlineFragment(_) => None,
        })
    }

    /// Whether a field with this response key is selected, directly or through a fragment.
    pub fn selects_response_key(&self, response_key: &str) -> bool {
        self.items.iter().any(|selection| match selection {
            Selection::Field(field) => field.response_key() == response_key,
            Selection::InlineFragment(fragment) => fragment.selection_set.selects_response_key(response_key),
        })
    }

    fn collect_variables(&self, used: &mut BTreeSet<String>) {
        for selection in &self.items {
            match selection {
                Selection::Field(field) => {
                    for argument in &field.arguments {
                        argument.value.collect_variables(used);
                    }
                    for directive in &field.directives {
                        directive.collect_variables(used);
                    }
                    field.selection_set.collect_variables(used);
                }
                Selection::InlineFragment(fragment) => {
                    for directive in &fragment.directives {
                        directive.collect_variables(used);
                    }
                    fragment.selection_set.collect_variables(used);
                }
            }
        }
    }

    /// Applies `f` to every variable reference of the selection set.
    pub fn visit_variables_mut(&mut self, f: &mut impl FnMut(&mut String)) {
        for selection in &mut self.items {
            match selection {
                Selection::Field(field) => {
                    for argument in &mut field.arguments {
                        argument.value.visit_variables_mut(f);
                    }
                    for directive in &mut field.directives {
                        directive.visit_variables_mut(f);
                    }
                    field.selection_set.visit_variables_mut(f);
                }
                Selection::InlineFragment(fragment) => {
                    for directive in &mut fragment.directives {
                        directive.visit_variables_mut(f);
                    }
                    fragment.selection_set.visit_variables_mut(f);
                }
            }
        }
    }
}

impl From<Vec<Field>> for SelectionSet {
    fn from(fields: Vec<Field>) -> Self {
        SelectionSet {
            items: fields.into_iter().map(Selection::Field).collect(),
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn with_selection_set(mut self, selection_set: impl Into<SelectionSet>) -> Self {
        self.selection_set = selection_set.into();
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|argument| argument.name == name)
            .map(|argument| &argument.value)
    }
}

impl Directive {
    fn collect_variables(&self, used: &mut BTreeSet<String>) {
        for argument in &self.arguments {
            argument.value.collect_variables(used);
        }
    }

    fn visit_variables_mut(&mut self, f: &mut impl FnMut(&mut String)) {
        for argument in &mut self.arguments {
            argument.value.visit_variables_mut(f);
        }
    }
}

/// Evaluates `@skip` and `@include`. Unresolvable conditions include the selection.
pub(crate) fn is_included(directives: &[Directive], variables: &Map<String, JsonValue>) -> bool {
    let condition = |directive: &Directive| {
        directive
            .arguments
            .iter()
            .find(|argument| argument.name == "if")
            .and_then(|argument| argument.value.to_json(variables).as_bool())
    };

    directives.iter().all(|directive| match directive.name.as_str() {
        "skip" => condition(directive) != Some(true),
        "include" => condition(directive) != Some(false),
        _ => true,
    })
}
