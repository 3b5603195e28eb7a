use graphql_stitching_schema::SchemaDefinition;

use super::{Capabilities, StepState, TransformContext, TransformStep};
use crate::{
    delegate::DelegatedRequest,
    operation::{Field, Selection, SelectionSet, TypeLookup},
};

/// Removes from a native request what the subschema does not define: unknown fields,
/// arguments and fragment types, then unused variables. Selection sets left empty select
/// `__typename`.
pub struct FilterToSchema {
    schema: SchemaDefinition,
}

impl FilterToSchema {
    pub fn new(schema: SchemaDefinition) -> Self {
        FilterToSchema { schema }
    }

    fn filter_selection_set(&self, selection_set: &mut SelectionSet, parent_type: &str) {
        selection_set.items.retain_mut(|selection| match selection {
            Selection::Field(field) => {
                if field.name == "__typename" {
                    return true;
                }

                let Some(definition) = self.schema.field(parent_type, &field.name) else {
                    tracing::debug!(parent_type, field = %field.name, "dropping field unknown to the subschema");
                    return false;
                };

                field
                    .arguments
                    .retain(|argument| definition.arguments.contains_key(&argument.name));

                let field_type = definition.ty.name();
                if self.schema.type_kind(field_type).is_some_and(|kind| kind.is_composite()) {
                    self.filter_selection_set(&mut field.selection_set, field_type);
                    if field.selection_set.is_empty() {
                        field.selection_set.push_field(Field::new("__typename"));
                    }
                } else {
                    field.selection_set.items.clear();
                }

                true
            }
            Selection::InlineFragment(fragment) => {
                let type_condition = fragment
                    .type_condition
                    .clone()
                    .unwrap_or_else(|| parent_type.to_string());

                if !self.schema.has_type(&type_condition) {
                    return false;
                }

                self.filter_selection_set(&mut fragment.selection_set, &type_condition);
                !fragment.selection_set.is_empty()
            }
        });
    }
}

impl TransformStep for FilterToSchema {
    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUEST
    }

    fn transform_request(&self, request: &mut DelegatedRequest, _: TransformContext<'_>) -> StepState {
        let operation = &mut request.operation;

        match self.schema.root_type_name(operation.operation_type) {
            Some(root) => self.filter_selection_set(&mut operation.selection_set, root),
            None => operation.selection_set.items.clear(),
        }

        if operation.selection_set.is_empty() {
            operation.selection_set.push_field(Field::new("__typename"));
        }

        operation.retain_used_variables(&mut request.variables);

        StepState::None
    }
}
