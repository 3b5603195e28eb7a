use futures_util::future::join_all;
use graphql_stitching_schema::{MergeTypeConfig, OperationType, SubschemaId};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{ErrorPath, GraphqlError, PathSegment};

use super::{EngineInner, PreparedOperation};
use crate::{
    delegate::{DelegatedResult, DelegationRequest, Delegator},
    error::{DelegationError, PendingResolutionError, PendingResolutionReason},
    operation::{Field, InlineFragment, Selection, SelectionSet, TypeLookup, Value},
    stitch::{PendingExternalObject, ResultStitcher, StitchedResult},
};

/// One entrypoint call completing one or more objects.
struct FollowUp {
    request: DelegationRequest,
    response_key: String,
    returns_list: bool,
    targets: Vec<Target>,
}

/// An object completed by a follow-up, and the response keys it asked for.
struct Target {
    path: ErrorPath,
    response_keys: Vec<String>,
}

impl Target {
    fn keys(&self) -> Vec<&str> {
        self.response_keys.iter().map(String::as_str).collect()
    }
}

impl EngineInner {
    /// Completes partially resolved objects until none remain. Every follow-up of a round is
    /// issued in the same tick, so fetches to the same subschema end up in one batch. A round
    /// only starts once the previous one is merged, as its keys may come from it.
    pub(super) async fn resolve_pending(
        &self,
        delegator: &Delegator<'_>,
        prepared: &PreparedOperation,
        result: &mut StitchedResult,
    ) {
        let stitcher = ResultStitcher::new(self.merged());

        for round in 0.. {
            let pending = stitcher.find_pending(
                &mut *result,
                &prepared.operation.selection_set,
                &prepared.root_type,
                &prepared.variables,
            );
            result
                .errors
                .extend(pending.errors.into_iter().map(GraphqlError::from));

            if pending.objects.is_empty() {
                return;
            }

            if prepared.abort.is_aborted() {
                tracing::debug!(round, "operation aborted, skipping follow-ups");
                for object in &pending.objects {
                    let keys = missing_response_keys(object);
                    stitcher.settle(result, object.path.segments(), &keys.iter().map(String::as_str).collect::<Vec<_>>());
                }
                result.errors.push(
                    GraphqlError::new("The operation was cancelled before it completed").with_code("CANCELLED"),
                );
                return;
            }

            if round >= self.config.max_resolution_rounds {
                tracing::warn!(round, objects = pending.objects.len(), "too many resolution rounds");
                for object in &pending.objects {
                    for field in object.missing.values().flatten() {
                        result.errors.push(
                            PendingResolutionError {
                                type_name: object.type_name.clone(),
                                field: field.name.clone(),
                                path: object.path.child(field.response_key()),
                                reason: PendingResolutionReason::TooManyRounds,
                            }
                            .into(),
                        );
                    }
                    let keys = missing_response_keys(object);
                    stitcher.settle(result, object.path.segments(), &keys.iter().map(String::as_str).collect::<Vec<_>>());
                }
                return;
            }

            tracing::debug!(round, objects = pending.objects.len(), "resolving pending objects");

            let follow_ups = self.plan(prepared, result, pending.objects, &stitcher);
            let outcomes = join_all(
                follow_ups
                    .iter()
                    .map(|follow_up| delegator.delegate(follow_up.request.clone())),
            )
            .await;

            for (follow_up, outcome) in follow_ups.into_iter().zip(outcomes) {
                apply(&stitcher, result, follow_up, outcome);
            }
        }
    }

    fn plan(
        &self,
        prepared: &PreparedOperation,
        result: &mut StitchedResult,
        objects: Vec<PendingExternalObject>,
        stitcher: &ResultStitcher<'_>,
    ) -> Vec<FollowUp> {
        let mut follow_ups = Vec::new();
        // Entrypoints taking every key at once: one follow-up per subschema and type.
        let mut lists: IndexMap<(SubschemaId, String), (Vec<JsonValue>, Vec<Target>, Vec<Field>)> = IndexMap::new();

        for object in objects {
            for (subschema, fields) in object.missing {
                let target = Target {
                    path: object.path.clone(),
                    response_keys: fields.iter().map(|field| field.response_key().to_string()).collect(),
                };

                let entrypoint = self.entrypoint(subschema, &object.type_name);
                let key = entrypoint.and_then(|(config, key_selection)| {
                    object_at(&result.data, object.path.segments())
                        .map(|source| config.key(&key_selection.key_fields(source), key_selection))
                });

                let (Some((config, _)), Some(key)) = (entrypoint, key) else {
                    stitcher.settle(result, target.path.segments(), &target.keys());
                    continue;
                };

                if config.returns_list {
                    let (keys, targets, selection) = lists
                        .entry((subschema, object.type_name.clone()))
                        .or_insert_with(|| (Vec::new(), Vec::new(), Vec::new()));
                    keys.push(key);
                    targets.push(target);
                    merge_fields(selection, fields);
                } else {
                    let field = self.entrypoint_field(config, &object.type_name, &[key], fields);
                    follow_ups.push(FollowUp {
                        request: self.follow_up_request(prepared, subschema, &target.path, field),
                        response_key: config.field_name.clone(),
                        returns_list: false,
                        targets: vec![target],
                    });
                }
            }
        }

        for ((subschema, type_name), (keys, targets, fields)) in lists {
            let Some((config, _)) = self.entrypoint(subschema, &type_name) else {
                continue;
            };
            let field = self.entrypoint_field(config, &type_name, &keys, fields);
            let path = targets.first().map(|target| target.path.clone()).unwrap_or_default();
            follow_ups.push(FollowUp {
                request: self.follow_up_request(prepared, subschema, &path, field),
                response_key: config.field_name.clone(),
                returns_list: true,
                targets,
            });
        }

        follow_ups
    }

    fn entrypoint(
        &self,
        subschema: SubschemaId,
        type_name: &str,
    ) -> Option<(&MergeTypeConfig, &graphql_stitching_schema::KeySelection)> {
        let config = self.registry.subschema(subschema).merge_config(type_name)?;
        let target = self.merged().type_definition(type_name)?.merge_target(subschema)?;
        Some((config, &target.key_selection))
    }

    /// `userById(id: "1") { email }`, or `node(id: "1") { ... on User { email } }` when the
    /// entrypoint returns another type.
    fn entrypoint_field(&self, config: &MergeTypeConfig, type_name: &str, keys: &[JsonValue], fields: Vec<Field>) -> Field {
        let mut field = Field::new(config.field_name.clone());
        for (name, value) in config.args_from_keys(keys) {
            field = field.with_argument(name, Value::from_json(&value));
        }

        let returned_type = self
            .merged()
            .root_type_name(OperationType::Query)
            .and_then(|root| self.merged().field_type_name(root, &config.field_name));

        if returned_type == Some(type_name) {
            field.with_selection_set(fields)
        } else {
            field.with_selection_set(SelectionSet::new(vec![Selection::InlineFragment(InlineFragment {
                type_condition: Some(type_name.to_string()),
                directives: Vec::new(),
                selection_set: fields.into(),
            })]))
        }
    }

    fn follow_up_request(
        &self,
        prepared: &PreparedOperation,
        subschema: SubschemaId,
        path: &ErrorPath,
        field: Field,
    ) -> DelegationRequest {
        DelegationRequest {
            subschema,
            operation_type: OperationType::Query,
            field_path: path.clone(),
            selection_set: vec![field].into(),
            variable_definitions: prepared.operation.variable_definitions.clone(),
            variables: prepared.variables.clone(),
            operation_name: prepared.operation.name.clone(),
            context: prepared.context.clone(),
            abort: prepared.abort.clone(),
        }
    }
}

fn apply(
    stitcher: &ResultStitcher<'_>,
    result: &mut StitchedResult,
    follow_up: FollowUp,
    outcome: Result<DelegatedResult, DelegationError>,
) {
    let FollowUp {
        response_key,
        returns_list,
        targets,
        ..
    } = follow_up;

    let partial = match outcome {
        Ok(partial) => partial,
        Err(error) => {
            for target in &targets {
                result.errors.push(error.to_graphql_error(target.path.clone()));
                stitcher.settle(result, target.path.segments(), &target.keys());
            }
            return;
        }
    };

    let value = partial.data.and_then(|mut data| data.remove(&response_key));
    let mut objects: Vec<Option<Map<String, JsonValue>>> = if returns_list {
        match value {
            Some(JsonValue::Array(items)) => items.into_iter().map(into_object).collect(),
            _ => Vec::new(),
        }
    } else {
        vec![value.and_then(into_object)]
    };
    objects.resize(targets.len(), None);

    let mut errors: Vec<Vec<GraphqlError>> = vec![Vec::new(); targets.len()];
    for mut error in partial.errors {
        let (index, relative) = match error.path.as_ref().map(ErrorPath::segments) {
            Some([PathSegment::Field(key), PathSegment::Index(item), ..])
                if returns_list && *key == response_key && *item < targets.len() =>
            {
                (*item, error.path.as_ref().map(|path| path.strip_leading(2)))
            }
            Some([PathSegment::Field(key), ..]) if *key == response_key => {
                (0, error.path.as_ref().map(|path| path.strip_leading(1)))
            }
            // Unattributed errors land on the first object.
            _ => (0, error.path.clone()),
        };
        error.path = relative;
        if let Some(errors) = errors.get_mut(index) {
            errors.push(error);
        }
    }

    for ((target, data), errors) in targets.into_iter().zip(objects).zip(errors) {
        stitcher.merge(result, target.path.segments(), DelegatedResult { data, errors });
        stitcher.settle(result, target.path.segments(), &target.keys());
    }
}

fn into_object(value: JsonValue) -> Option<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(object) => Some(object),
        _ => None,
    }
}

fn object_at<'a>(data: &'a Map<String, JsonValue>, path: &[PathSegment]) -> Option<&'a Map<String, JsonValue>> {
    let mut current = data;
    let mut segments = path.iter().peekable();
    while let Some(segment) = segments.next() {
        let PathSegment::Field(key) = segment else {
            return None;
        };
        let mut value = current.get(key)?;
        while let Some(PathSegment::Index(index)) = segments.peek() {
            value = value.as_array()?.get(*index)?;
            segments.next();
        }
        current = value.as_object()?;
    }
    Some(current)
}

fn missing_response_keys(object: &PendingExternalObject) -> Vec<String> {
    object
        .missing
        .values()
        .flatten()
        .map(|field| field.response_key().to_string())
        .collect()
}

/// Adds `fields` to `selection`, merging the selections of fields sharing a response key.
fn merge_fields(selection: &mut Vec<Field>, fields: Vec<Field>) {
    for field in fields {
        match selection
            .iter_mut()
            .find(|existing| existing.response_key() == field.response_key())
        {
            Some(existing) => existing.selection_set.items.extend(field.selection_set.items),
            None => selection.push(field),
        }
    }
}
