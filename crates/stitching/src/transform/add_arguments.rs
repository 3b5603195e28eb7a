use std::collections::HashSet;

use super::{Capabilities, StepState, TransformContext, TransformStep};
use crate::{
    delegate::DelegatedRequest,
    operation::{Selection, TypeLookup, Value, VariableDefinition},
};

/// Moves literal arguments of the given root fields into typed variables. Used for merge
/// entrypoints, whose arguments are computed from keys.
pub struct AddArgumentsAsVariables {
    field_names: HashSet<String>,
}

impl AddArgumentsAsVariables {
    pub fn new(field_names: impl IntoIterator<Item = String>) -> Self {
        AddArgumentsAsVariables {
            field_names: field_names.into_iter().collect(),
        }
    }
}

impl TransformStep for AddArgumentsAsVariables {
    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUEST
    }

    fn transform_request(&self, request: &mut DelegatedRequest, context: TransformContext<'_>) -> StepState {
        let operation = &mut request.operation;
        let Some(root) = context.merged.root_type_name(operation.operation_type) else {
            return StepState::None;
        };

        for selection in &mut operation.selection_set.items {
            let Selection::Field(field) = selection else {
                continue;
            };
            if !self.field_names.contains(&field.name) {
                continue;
            }

            let response_key = field.response_key().to_string();

            for argument in &mut field.arguments {
                if argument.value.is_variable() {
                    continue;
                }
                let Some(ty) = context.merged.argument_type(root, &field.name, &argument.name) else {
                    continue;
                };

                let mut name = format!("{response_key}_{}", argument.name);
                let mut suffix = 1;
                while operation.variable_definitions.iter().any(|definition| definition.name == name) {
                    name = format!("{response_key}_{}_{suffix}", argument.name);
                    suffix += 1;
                }

                request
                    .variables
                    .insert(name.clone(), argument.value.to_json(&request.variables));
                operation.variable_definitions.push(VariableDefinition {
                    name: name.clone(),
                    ty: ty.clone(),
                    default_value: None,
                });
                argument.value = Value::Variable(name);
            }
        }

        StepState::None
    }
}
