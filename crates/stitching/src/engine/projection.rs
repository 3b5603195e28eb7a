use graphql_stitching_schema::{MergedSchema, TypeRef};
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{ErrorPath, GraphqlError};

use crate::operation::{SelectionSet, TypeLookup, collect_fields};

/// Shapes the stitched data after the caller's selection: requested response keys only, in
/// requested order, with nulls propagated to the closest nullable parent.
pub(super) struct Projection<'a> {
    merged: &'a MergedSchema,
    variables: &'a Map<String, JsonValue>,
    errors: &'a mut Vec<GraphqlError>,
}

impl<'a> Projection<'a> {
    pub(super) fn new(
        merged: &'a MergedSchema,
        variables: &'a Map<String, JsonValue>,
        errors: &'a mut Vec<GraphqlError>,
    ) -> Self {
        Projection {
            merged,
            variables,
            errors,
        }
    }

    pub(super) fn project(
        &mut self,
        data: &Map<String, JsonValue>,
        selection_set: &SelectionSet,
        root_type: &str,
    ) -> Option<Map<String, JsonValue>> {
        self.object(data, selection_set, root_type, &mut ErrorPath::default())
    }

    fn object(
        &mut self,
        source: &Map<String, JsonValue>,
        selection_set: &SelectionSet,
        static_type: &str,
        path: &mut ErrorPath,
    ) -> Option<Map<String, JsonValue>> {
        let concrete_type = source
            .get("__typename")
            .and_then(JsonValue::as_str)
            .filter(|name| self.merged.type_definition(name).is_some())
            .unwrap_or(static_type)
            .to_string();

        let mut projected = Map::new();

        for (response_key, field) in collect_fields(selection_set, &concrete_type, self.merged, self.variables) {
            if field.name == "__typename" {
                projected.insert(response_key, JsonValue::String(concrete_type.clone()));
                continue;
            }

            let Some(ty) = self
                .merged
                .field_type(&concrete_type, &field.name)
                .or_else(|| self.merged.field_type(static_type, &field.name))
                .cloned()
            else {
                projected.insert(response_key, JsonValue::Null);
                continue;
            };

            path.push(response_key.as_str());
            let value = self.value(
                source.get(&response_key).unwrap_or(&JsonValue::Null),
                &ty,
                &field.selection_set,
                path,
            );

            if value.is_null() && ty.is_non_null() {
                self.null_error(path, || {
                    format!("Cannot return null for non-nullable field {concrete_type}.{}", field.name)
                });
                path.pop();
                return None;
            }

            path.pop();
            projected.insert(response_key, value);
        }

        Some(projected)
    }

    fn value(&mut self, value: &JsonValue, ty: &TypeRef, selection_set: &SelectionSet, path: &mut ErrorPath) -> JsonValue {
        if value.is_null() {
            return JsonValue::Null;
        }

        if let Some(item_type) = ty.list_item() {
            let JsonValue::Array(items) = value else {
                return JsonValue::Null;
            };

            let mut projected = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(index);
                let item = self.value(item, &item_type, selection_set, path);
                if item.is_null() && item_type.is_non_null() {
                    self.null_error(path, || "Cannot return null for a non-nullable list item".to_string());
                    path.pop();
                    return JsonValue::Null;
                }
                path.pop();
                projected.push(item);
            }
            return JsonValue::Array(projected);
        }

        let is_composite = self.merged.type_kind(ty.name()).is_some_and(|kind| kind.is_composite());
        match value {
            JsonValue::Object(object) if is_composite => self
                .object(object, selection_set, ty.name(), path)
                .map(JsonValue::Object)
                .unwrap_or_default(),
            _ if is_composite => JsonValue::Null,
            leaf => leaf.clone(),
        }
    }

    /// Reports a null in a non-null position, unless an error already explains it.
    fn null_error(&mut self, path: &ErrorPath, message: impl FnOnce() -> String) {
        let explained = self
            .errors
            .iter()
            .any(|error| error.path.as_ref().is_some_and(|error_path| error_path.starts_with(path.segments())));

        if !explained {
            self.errors.push(GraphqlError::new(message()).with_path(path.clone()));
        }
    }
}
