//! Merges delegated results into the aggregate response and finds what is still missing.

use graphql_stitching_schema::{MergedSchema, SubschemaId};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{ErrorPath, GraphqlError, PathSegment};

use crate::{
    delegate::DelegatedResult,
    error::{PendingResolutionError, PendingResolutionReason},
    operation::{Field, SelectionSet, TypeLookup, collect_fields},
};

/// The response being assembled for one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StitchedResult {
    pub data: Map<String, JsonValue>,
    pub errors: Vec<GraphqlError>,
}

/// An object of the aggregate response lacking fields that other subschemas own.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExternalObject {
    pub path: ErrorPath,
    /// Concrete logical type of the object.
    pub type_name: String,
    /// The missing fields, grouped by the subschema chosen to resolve them.
    pub missing: IndexMap<SubschemaId, Vec<Field>>,
}

impl PendingExternalObject {
    pub fn pending_subschemas(&self) -> impl Iterator<Item = SubschemaId> + '_ {
        self.missing.keys().copied()
    }
}

#[derive(Debug, Default)]
pub struct Pending {
    pub objects: Vec<PendingExternalObject>,
    pub errors: Vec<PendingResolutionError>,
}

pub struct ResultStitcher<'a> {
    merged: &'a MergedSchema,
}

impl<'a> ResultStitcher<'a> {
    pub fn new(merged: &'a MergedSchema) -> Self {
        ResultStitcher { merged }
    }

    /// Merges `partial` into the object found at `path`. Error paths of `partial` are relative
    /// to that object and get prefixed with `path`. Data for an object that no longer exists,
    /// because it was nulled in the meantime, is dropped.
    pub fn merge(&self, target: &mut StitchedResult, path: &[PathSegment], partial: DelegatedResult) {
        for mut error in partial.errors {
            error.path = match error.path {
                Some(relative) => Some(relative.prefixed_with(path)),
                None if !path.is_empty() => Some(ErrorPath::new(path.to_vec())),
                None => None,
            };
            target.errors.push(error);
        }

        let Some(data) = partial.data else {
            return;
        };

        match object_at_mut(&mut target.data, path) {
            Some(object) => merge_objects(object, data),
            None => tracing::debug!(path = %ErrorPath::new(path.to_vec()), "dropping data for a missing object"),
        }
    }

    /// Sets the given response keys to null on the object at `path` when they are still
    /// absent, so that the next round does not look for them again.
    pub fn settle(&self, target: &mut StitchedResult, path: &[PathSegment], response_keys: &[&str]) {
        if let Some(object) = object_at_mut(&mut target.data, path) {
            for key in response_keys {
                if !object.contains_key(*key) {
                    object.insert((*key).to_string(), JsonValue::Null);
                }
            }
        }
    }

    /// Walks the response along the caller's selection and collects every object missing
    /// fields, choosing for each field the first owner whose merge key the object satisfies.
    /// Fields that no subschema can provide are set to null and reported.
    pub fn find_pending(
        &self,
        target: &mut StitchedResult,
        selection_set: &SelectionSet,
        root_type: &str,
        variables: &Map<String, JsonValue>,
    ) -> Pending {
        let mut pending = Pending::default();
        let mut walker = Walker {
            merged: self.merged,
            variables,
            pending: &mut pending,
        };
        walker.walk_object(&mut target.data, selection_set, root_type, &mut ErrorPath::default());
        pending
    }
}

struct Walker<'a, 'p> {
    merged: &'a MergedSchema,
    variables: &'a Map<String, JsonValue>,
    pending: &'p mut Pending,
}

impl Walker<'_, '_> {
    fn walk_object(
        &mut self,
        object: &mut Map<String, JsonValue>,
        selection_set: &SelectionSet,
        static_type: &str,
        path: &mut ErrorPath,
    ) {
        let concrete_type = object
            .get("__typename")
            .and_then(JsonValue::as_str)
            .filter(|name| self.merged.type_definition(name).is_some())
            .unwrap_or(static_type)
            .to_string();

        let fields = collect_fields(selection_set, &concrete_type, self.merged, self.variables);
        let mut missing: IndexMap<SubschemaId, Vec<Field>> = IndexMap::new();

        for (response_key, field) in fields {
            if field.name == "__typename" {
                continue;
            }

            if let Some(value) = object.get_mut(&response_key) {
                let composite_type = self
                    .merged
                    .field_type_name(&concrete_type, &field.name)
                    .and_then(|type_name| self.merged.type_kind(type_name).map(|kind| (type_name, kind)))
                    .filter(|(_, kind)| kind.is_composite())
                    .map(|(type_name, _)| type_name.to_string());

                if let Some(field_type) = composite_type {
                    path.push(response_key.as_str());
                    self.walk_value(value, &field.selection_set, &field_type, path);
                    path.pop();
                }
                continue;
            }

            let Some(definition) = self.merged.field(&concrete_type, &field.name) else {
                continue;
            };

            let owner = self.merged.type_definition(&concrete_type).and_then(|ty| {
                definition.owners.iter().copied().find(|owner| {
                    ty.merge_target(*owner).is_some_and(|target| {
                        let key_fields = target.key_selection.key_fields(object);
                        target.key_selection.is_satisfied_by(&key_fields)
                    })
                })
            });

            match owner {
                Some(owner) => missing.entry(owner).or_default().push(field),
                None => {
                    let field_path = path.child(response_key.as_str());
                    tracing::debug!(path = %field_path, "no subschema can resolve the field");
                    self.pending.errors.push(PendingResolutionError {
                        type_name: concrete_type.clone(),
                        field: field.name.clone(),
                        path: field_path,
                        reason: PendingResolutionReason::NoMergeTarget,
                    });
                    object.insert(response_key, JsonValue::Null);
                }
            }
        }

        if !missing.is_empty() {
            self.pending.objects.push(PendingExternalObject {
                path: path.clone(),
                type_name: concrete_type,
                missing,
            });
        }
    }

    fn walk_value(&mut self, value: &mut JsonValue, selection_set: &SelectionSet, static_type: &str, path: &mut ErrorPath) {
        match value {
            JsonValue::Object(object) => self.walk_object(object, selection_set, static_type, path),
            JsonValue::Array(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    path.push(index);
                    self.walk_value(item, selection_set, static_type, path);
                    path.pop();
                }
            }
            _ => (),
        }
    }
}

fn object_at_mut<'a>(data: &'a mut Map<String, JsonValue>, path: &[PathSegment]) -> Option<&'a mut Map<String, JsonValue>> {
    let Some((first, rest)) = path.split_first() else {
        return Some(data);
    };

    let PathSegment::Field(key) = first else {
        return None;
    };

    let mut current = data.get_mut(key)?;
    for segment in rest {
        current = match segment {
            PathSegment::Field(key) => current.as_object_mut()?.get_mut(key)?,
            PathSegment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }

    current.as_object_mut()
}

/// Deep merge. A null never overwrites a value, objects merge key by key, and lists of the
/// same length merge item by item.
fn merge_objects(target: &mut Map<String, JsonValue>, source: Map<String, JsonValue>) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => merge_values(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_values(target: &mut JsonValue, source: JsonValue) {
    match (target, source) {
        (_, JsonValue::Null) => (),
        (JsonValue::Object(target), JsonValue::Object(source)) => merge_objects(target, source),
        (JsonValue::Array(target), JsonValue::Array(source)) if target.len() == source.len() => {
            for (target, source) in target.iter_mut().zip(source) {
                merge_values(target, source);
            }
        }
        (target, source) => *target = source,
    }
}
