use graphql_stitching_schema::{FieldDefinition, OperationType, SchemaDefinition, TypeDefinition, TypeRef};
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::PathSegment;

use super::{Capabilities, StepState, TransformContext, TransformError, TransformStep};
use crate::{
    delegate::{DelegatedRequest, DelegatedResult},
    operation::{InlineFragment, Selection, SelectionSet},
};

/// Nests all root fields of one operation type of a subschema under a single field, e.g.
/// `{ repository }` becomes `{ github { repository } }` with `github: GitHubQuery!`.
pub struct WrapRootField {
    operation_type: OperationType,
    type_name: String,
    field_name: String,
}

impl WrapRootField {
    pub fn new(operation_type: OperationType, type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        WrapRootField {
            operation_type,
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl TransformStep for WrapRootField {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SCHEMA | Capabilities::REQUEST | Capabilities::RESULT
    }

    fn transform_schema(&mut self, mut schema: SchemaDefinition) -> Result<SchemaDefinition, TransformError> {
        let Some(root_name) = schema.root_type_name(self.operation_type).map(str::to_string) else {
            return Err(TransformError(format!(
                "cannot wrap the {} root fields, the subschema has no {} root type",
                self.operation_type, self.operation_type
            )));
        };

        if schema.types.contains_key(&self.type_name) {
            return Err(TransformError(format!(
                "cannot wrap the {} root fields in `{}`, the type already exists",
                self.operation_type, self.type_name
            )));
        }

        let Some(root) = schema.types.get_mut(&root_name) else {
            return Err(TransformError(format!("the root type `{root_name}` is not defined")));
        };

        let mut wrapper = TypeDefinition::object(self.type_name.clone());
        wrapper.fields = std::mem::take(&mut root.fields);
        root.fields.insert(
            self.field_name.clone(),
            FieldDefinition::new(self.field_name.clone(), TypeRef::named(self.type_name.clone()).non_null()),
        );

        schema.insert_type(wrapper);

        Ok(schema)
    }

    fn transform_request(&self, request: &mut DelegatedRequest, _: TransformContext<'_>) -> StepState {
        let operation = &mut request.operation;
        if operation.operation_type != self.operation_type {
            return StepState::None;
        }

        let wrappers = operation
            .selection_set
            .fields()
            .filter(|field| field.name == self.field_name)
            .count();
        let prefixed = wrappers > 1;

        let mut response_keys = Vec::new();
        let mut items = Vec::with_capacity(operation.selection_set.items.len());

        for selection in std::mem::take(&mut operation.selection_set.items) {
            match selection {
                Selection::Field(mut field) if field.name == self.field_name => {
                    let response_key = field.response_key().to_string();
                    if prefixed {
                        prefix_response_keys(&mut field.selection_set, &wrapper_prefix(&response_key));
                    }
                    response_keys.push(response_key);

                    if field.directives.is_empty() {
                        items.extend(field.selection_set.items);
                    } else {
                        items.push(Selection::InlineFragment(InlineFragment {
                            type_condition: None,
                            directives: field.directives,
                            selection_set: field.selection_set,
                        }));
                    }
                }
                other => items.push(other),
            }
        }

        operation.selection_set.items = items;

        StepState::WrappedRoot {
            response_keys,
            prefixed,
        }
    }

    fn transform_result(&self, result: &mut DelegatedResult, state: &StepState) {
        let StepState::WrappedRoot {
            response_keys,
            prefixed,
        } = state
        else {
            return;
        };
        let Some(first_key) = response_keys.first() else {
            return;
        };

        if let Some(data) = result.data.take() {
            result.data = Some(if *prefixed {
                unwrap_prefixed(data, response_keys)
            } else {
                let (mut unwrapped, wrapped): (Map<String, JsonValue>, Map<String, JsonValue>) =
                    data.into_iter().partition(|(key, _)| key == "__typename");
                unwrapped.insert(first_key.clone(), JsonValue::Object(wrapped));
                unwrapped
            });
        }

        for error in &mut result.errors {
            let Some(path) = &mut error.path else {
                continue;
            };
            if path.is_empty() {
                continue;
            }

            let wrapper = match path.first_mut() {
                Some(PathSegment::Field(first)) if *prefixed => match strip_wrapper_prefix(first, response_keys) {
                    Some((wrapper, inner)) => {
                        let wrapper = wrapper.to_string();
                        *first = inner;
                        wrapper
                    }
                    None => continue,
                },
                _ => first_key.clone(),
            };
            *path = path.prefixed_with(&[PathSegment::Field(wrapper)]);
        }
    }
}

fn wrapper_prefix(response_key: &str) -> String {
    format!("{response_key}__")
}

/// Aliases every field selected directly under the wrapper, looking through inline fragments.
fn prefix_response_keys(selection_set: &mut SelectionSet, prefix: &str) {
    for selection in &mut selection_set.items {
        match selection {
            Selection::Field(field) => {
                let alias = format!("{prefix}{}", field.response_key());
                field.alias = Some(alias);
            }
            Selection::InlineFragment(fragment) => prefix_response_keys(&mut fragment.selection_set, prefix),
        }
    }
}

/// The wrapper response key of a prefixed native response key, and the key under the wrapper.
/// The longest matching wrapper wins, so `a__b__x` goes to `a__b` rather than `a`.
fn strip_wrapper_prefix<'a>(native_key: &str, response_keys: &'a [String]) -> Option<(&'a str, String)> {
    response_keys
        .iter()
        .filter_map(|response_key| {
            let inner = native_key.strip_prefix(&wrapper_prefix(response_key))?;
            Some((response_key.as_str(), inner.to_string()))
        })
        .max_by_key(|(response_key, _)| response_key.len())
}

fn unwrap_prefixed(data: Map<String, JsonValue>, response_keys: &[String]) -> Map<String, JsonValue> {
    let mut unwrapped = Map::new();
    for response_key in response_keys {
        unwrapped.insert(response_key.clone(), JsonValue::Object(Map::new()));
    }

    for (native_key, value) in data {
        match strip_wrapper_prefix(&native_key, response_keys) {
            Some((response_key, inner)) => {
                if let Some(JsonValue::Object(wrapper)) = unwrapped.get_mut(response_key) {
                    wrapper.insert(inner, value);
                }
            }
            None => {
                unwrapped.insert(native_key, value);
            }
        }
    }

    unwrapped
}
