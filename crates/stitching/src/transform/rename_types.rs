use std::{collections::HashMap, sync::Arc};

use graphql_stitching_schema::{SchemaDefinition, TypeRef};
use serde_json::Value as JsonValue;

use super::{Capabilities, StepState, TransformContext, TransformError, TransformStep};
use crate::{
    delegate::{DelegatedRequest, DelegatedResult},
    operation::{Selection, SelectionSet},
};

type Renamer = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Gives types of a subschema a different name in the logical schema. Root types and builtin
/// scalars keep their names.
pub struct RenameTypes {
    renamer: Renamer,
    to_logical: HashMap<String, String>,
    to_native: HashMap<String, String>,
}

impl RenameTypes {
    /// `renamer` returns the logical name of a native type, or `None` to keep it.
    pub fn new(renamer: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        RenameTypes {
            renamer: Arc::new(renamer),
            to_logical: HashMap::new(),
            to_native: HashMap::new(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        RenameTypes::new(move |name| Some(format!("{prefix}{name}")))
    }

    pub fn logical_name<'a>(&'a self, native: &'a str) -> &'a str {
        self.to_logical.get(native).map(String::as_str).unwrap_or(native)
    }

    pub fn native_name<'a>(&'a self, logical: &'a str) -> &'a str {
        self.to_native.get(logical).map(String::as_str).unwrap_or(logical)
    }

    fn rename_type_ref(&self, ty: &mut TypeRef) {
        if let Some(logical) = self.to_logical.get(ty.name()) {
            let logical = logical.clone();
            ty.rename(logical);
        }
    }

    fn rename_selection_set(&self, selection_set: &mut SelectionSet) {
        for selection in &mut selection_set.items {
            match selection {
                Selection::Field(field) => self.rename_selection_set(&mut field.selection_set),
                Selection::InlineFragment(fragment) => {
                    if let Some(native) = fragment
                        .type_condition
                        .as_deref()
                        .and_then(|logical| self.to_native.get(logical))
                    {
                        fragment.type_condition = Some(native.clone());
                    }
                    self.rename_selection_set(&mut fragment.selection_set);
                }
            }
        }
    }

    fn rename_typenames(&self, value: &mut JsonValue) {
        match value {
            JsonValue::Object(object) => {
                for (key, value) in object.iter_mut() {
                    if key == "__typename" {
                        if let Some(logical) = value.as_str().and_then(|native| self.to_logical.get(native)) {
                            *value = JsonValue::String(logical.clone());
                        }
                    } else {
                        self.rename_typenames(value);
                    }
                }
            }
            JsonValue::Array(items) => items.iter_mut().for_each(|item| self.rename_typenames(item)),
            _ => (),
        }
    }
}

impl TransformStep for RenameTypes {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SCHEMA | Capabilities::REQUEST | Capabilities::RESULT
    }

    fn transform_schema(&mut self, schema: SchemaDefinition) -> Result<SchemaDefinition, TransformError> {
        for name in schema.types.keys() {
            if BUILTIN_SCALARS.contains(&name.as_str())
                || name.starts_with("__")
                || schema.root_operation_of(name).is_some()
            {
                continue;
            }
            let Some(logical) = (self.renamer)(name).filter(|logical| logical != name) else {
                continue;
            };
            if schema.types.contains_key(&logical) && !self.to_logical.contains_key(&logical) {
                return Err(TransformError(format!(
                    "renaming `{name}` to `{logical}` collides with an existing type"
                )));
            }
            if let Some(previous) = self.to_native.get(&logical) {
                return Err(TransformError(format!(
                    "both `{previous}` and `{name}` are renamed to `{logical}`"
                )));
            }
            self.to_native.insert(logical.clone(), name.clone());
            self.to_logical.insert(name.clone(), logical);
        }

        let SchemaDefinition {
            query_type,
            mutation_type,
            subscription_type,
            types,
        } = schema;

        let mut renamed = SchemaDefinition {
            query_type,
            mutation_type,
            subscription_type,
            types: Default::default(),
        };

        for (_, mut definition) in types {
            definition.name = self.logical_name(&definition.name).to_string();
            for field in definition.fields.values_mut() {
                self.rename_type_ref(&mut field.ty);
                for argument in field.arguments.values_mut() {
                    self.rename_type_ref(&mut argument.ty);
                }
            }
            for input_field in definition.input_fields.values_mut() {
                self.rename_type_ref(&mut input_field.ty);
            }
            for name in definition.interfaces.iter_mut().chain(definition.members.iter_mut()) {
                *name = self.logical_name(name).to_string();
            }
            renamed.insert_type(definition);
        }

        Ok(renamed)
    }

    fn transform_request(&self, request: &mut DelegatedRequest, _: TransformContext<'_>) -> StepState {
        for definition in &mut request.operation.variable_definitions {
            if let Some(native) = self.to_native.get(definition.ty.name()) {
                let native = native.clone();
                definition.ty.rename(native);
            }
        }
        self.rename_selection_set(&mut request.operation.selection_set);
        StepState::None
    }

    fn transform_result(&self, result: &mut DelegatedResult, _: &StepState) {
        if let Some(data) = &mut result.data {
            for value in data.values_mut() {
                self.rename_typenames(value);
            }
        }
    }
}
