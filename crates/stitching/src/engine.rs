//! Runs operations against the logical schema: routes root fields to their subschemas,
//! completes partially resolved objects in follow-up rounds and projects the result onto the
//! caller's selection.

mod projection;
mod request;
mod rounds;

use std::sync::Arc;

use futures_util::{
    StreamExt,
    future::join_all,
    stream::{self, BoxStream},
};
use graphql_stitching_schema::{MergedSchema, OperationType, SubschemaId};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{AbortSignal, Context, ErrorPath, PathSegment};

pub use request::{Request, Response};

use self::projection::Projection;
use crate::{
    config::StitchingConfig,
    delegate::{DelegatedResult, DelegationRequest, Delegator},
    error::{BuildError, DelegationError, OperationError},
    operation::{Field, Operation, collect_fields},
    registry::{Registry, SubschemaConfig},
    stitch::{ResultStitcher, StitchedResult},
};

/// Entry point of the stitching runtime. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: Registry,
    config: StitchingConfig,
}

/// A parsed operation with its variables coerced, ready to run.
struct PreparedOperation {
    operation: Operation,
    root_type: String,
    variables: Map<String, JsonValue>,
    context: Context,
    abort: AbortSignal,
}

impl Engine {
    pub fn new(registry: Registry, config: StitchingConfig) -> Self {
        Engine {
            inner: Arc::new(EngineInner { registry, config }),
        }
    }

    pub fn build(subschemas: Vec<SubschemaConfig>, config: StitchingConfig) -> Result<Self, BuildError> {
        let registry = Registry::build(subschemas, &config)?;
        Ok(Engine::new(registry, config))
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The logical schema served by this engine.
    pub fn schema(&self) -> &MergedSchema {
        self.inner.registry.merged()
    }

    pub fn config(&self) -> &StitchingConfig {
        &self.inner.config
    }

    /// Executes a query or a mutation.
    #[tracing::instrument(name = "execute", skip_all, fields(operation_name = request.operation_name.as_deref()))]
    pub async fn execute(&self, request: Request) -> Response {
        let prepared = match self.inner.prepare(request) {
            Ok(prepared) => prepared,
            Err(error) => return Response::from_error(error),
        };

        if prepared.operation.operation_type == OperationType::Subscription {
            return Response::from_error(OperationError::UnsupportedOperationType(OperationType::Subscription));
        }

        let delegator = Delegator::new(&self.inner.registry, &self.inner.config.batching);
        let mut result = StitchedResult::default();

        self.inner.execute_root(&delegator, &prepared, &mut result).await;
        self.inner.resolve_pending(&delegator, &prepared, &mut result).await;

        self.inner.project(&prepared, result)
    }

    /// Executes a subscription. Each event of the subschema's stream is completed and projected
    /// like a query result. Errors preventing the subscription from starting are reported as a
    /// single response.
    #[tracing::instrument(name = "subscribe", skip_all, fields(operation_name = request.operation_name.as_deref()))]
    pub async fn subscribe(&self, request: Request) -> BoxStream<'static, Response> {
        let prepared = match self.inner.prepare(request) {
            Ok(prepared) if prepared.operation.operation_type == OperationType::Subscription => prepared,
            Ok(prepared) => {
                return single(Response::from_error(OperationError::UnsupportedOperationType(
                    prepared.operation.operation_type,
                )));
            }
            Err(error) => return single(Response::from_error(error)),
        };

        let inner = &self.inner;
        let fields = collect_fields(
            &prepared.operation.selection_set,
            &prepared.root_type,
            inner.registry.merged(),
            &prepared.variables,
        );
        let Some((response_key, field, owner)) = fields
            .into_iter()
            .filter(|(_, field)| field.name != "__typename")
            .find_map(|(response_key, field)| {
                let owner = inner.owner(&prepared.root_type, &field)?;
                Some((response_key, field, owner))
            })
        else {
            return single(Response::from_error(OperationError::SubscriptionRootFields));
        };

        let delegator = Delegator::new(&inner.registry, &inner.config.batching);
        let stream = match delegator
            .subscribe(inner.delegation_request(&prepared, owner, vec![field]))
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                let mut result = StitchedResult::default();
                inner.fail_root_fields(&mut result, &error, &[response_key]);
                return single(inner.project(&prepared, result));
            }
        };

        let inner = Arc::clone(&self.inner);
        let prepared = Arc::new(prepared);

        stream
            .then(move |item| {
                let inner = Arc::clone(&inner);
                let prepared = Arc::clone(&prepared);
                let response_key = response_key.clone();
                async move { inner.subscription_event(&prepared, &response_key, item).await }
            })
            .boxed()
    }
}

impl EngineInner {
    fn merged(&self) -> &MergedSchema {
        self.registry.merged()
    }

    fn prepare(&self, request: Request) -> Result<PreparedOperation, OperationError> {
        let Request {
            document,
            operation_name,
            mut variables,
            operation,
            context,
            abort,
        } = request;

        let operation = match operation {
            Some(operation) => operation,
            None => Operation::parse(&document, operation_name.as_deref())?,
        };
        let root_type = self
            .merged()
            .root_type_name(operation.operation_type)
            .ok_or(OperationError::UnsupportedOperationType(operation.operation_type))?
            .to_string();

        for definition in &operation.variable_definitions {
            if let Some(default_value) = &definition.default_value {
                if !variables.contains_key(&definition.name) {
                    variables.insert(definition.name.clone(), default_value.to_json(&Map::new()));
                }
            }
        }

        let fields = collect_fields(&operation.selection_set, &root_type, self.merged(), &variables);
        for field in fields.values() {
            if field.name != "__typename" && self.merged().field(&root_type, &field.name).is_none() {
                return Err(OperationError::UnknownField {
                    type_name: root_type,
                    field: field.name.clone(),
                });
            }
        }

        if operation.operation_type == OperationType::Subscription
            && fields.values().filter(|field| field.name != "__typename").count() != 1
        {
            return Err(OperationError::SubscriptionRootFields);
        }

        Ok(PreparedOperation {
            operation,
            root_type,
            variables,
            context,
            abort,
        })
    }

    /// The subschema a root field is routed to: the first in routing order.
    fn owner(&self, root_type: &str, field: &Field) -> Option<SubschemaId> {
        self.merged().field(root_type, &field.name)?.owners.first().copied()
    }

    fn delegation_request(&self, prepared: &PreparedOperation, subschema: SubschemaId, fields: Vec<Field>) -> DelegationRequest {
        DelegationRequest {
            subschema,
            operation_type: prepared.operation.operation_type,
            field_path: ErrorPath::default(),
            selection_set: fields.into(),
            variable_definitions: prepared.operation.variable_definitions.clone(),
            variables: prepared.variables.clone(),
            operation_name: prepared.operation.name.clone(),
            context: prepared.context.clone(),
            abort: prepared.abort.clone(),
        }
    }

    /// Queries send one operation per subschema, all in the same tick. Mutations run serially,
    /// consecutive root fields of the same subschema sharing one operation.
    async fn execute_root(&self, delegator: &Delegator<'_>, prepared: &PreparedOperation, result: &mut StitchedResult) {
        let fields = collect_fields(
            &prepared.operation.selection_set,
            &prepared.root_type,
            self.merged(),
            &prepared.variables,
        );

        let mut groups: Vec<(SubschemaId, Vec<String>, Vec<Field>)> = Vec::new();
        let mut by_subschema: IndexMap<SubschemaId, usize> = IndexMap::new();
        let is_mutation = prepared.operation.operation_type == OperationType::Mutation;

        for (response_key, field) in fields {
            if field.name == "__typename" {
                continue;
            }
            let Some(owner) = self.owner(&prepared.root_type, &field) else {
                continue;
            };

            let existing = if is_mutation {
                groups.last().filter(|(id, _, _)| *id == owner).map(|_| groups.len() - 1)
            } else {
                by_subschema.get(&owner).copied()
            };

            match existing {
                Some(index) => {
                    groups[index].1.push(response_key);
                    groups[index].2.push(field);
                }
                None => {
                    by_subschema.insert(owner, groups.len());
                    groups.push((owner, vec![response_key], vec![field]));
                }
            }
        }

        let stitcher = ResultStitcher::new(self.merged());

        if is_mutation {
            for (subschema, response_keys, fields) in groups {
                if prepared.abort.is_aborted() {
                    self.fail_root_fields(result, &cancelled(self, subschema), &response_keys);
                    continue;
                }
                let outcome = delegator
                    .delegate(self.delegation_request(prepared, subschema, fields))
                    .await;
                self.merge_root(&stitcher, result, outcome, &response_keys);
            }
        } else {
            let (response_keys, requests): (Vec<_>, Vec<_>) = groups
                .into_iter()
                .map(|(subschema, response_keys, fields)| {
                    (response_keys, self.delegation_request(prepared, subschema, fields))
                })
                .unzip();

            let outcomes = join_all(requests.into_iter().map(|request| delegator.delegate(request))).await;

            for (outcome, response_keys) in outcomes.into_iter().zip(response_keys) {
                self.merge_root(&stitcher, result, outcome, &response_keys);
            }
        }
    }

    fn merge_root(
        &self,
        stitcher: &ResultStitcher<'_>,
        result: &mut StitchedResult,
        outcome: Result<DelegatedResult, DelegationError>,
        response_keys: &[String],
    ) {
        match outcome {
            Ok(partial) => {
                stitcher.merge(result, &[], partial);
                let keys = response_keys.iter().map(String::as_str).collect::<Vec<_>>();
                stitcher.settle(result, &[], &keys);
            }
            Err(error) => self.fail_root_fields(result, &error, response_keys),
        }
    }

    /// One error per root field, each set to null.
    fn fail_root_fields(&self, result: &mut StitchedResult, error: &DelegationError, response_keys: &[String]) {
        for response_key in response_keys {
            result
                .errors
                .push(error.to_graphql_error(ErrorPath::new(vec![PathSegment::from(response_key.as_str())])));
            result.data.insert(response_key.clone(), JsonValue::Null);
        }
    }

    async fn subscription_event(
        &self,
        prepared: &PreparedOperation,
        response_key: &str,
        event: Result<DelegatedResult, DelegationError>,
    ) -> Response {
        tracing::debug!(response_key, "subscription event");

        let delegator = Delegator::new(&self.registry, &self.config.batching);
        let stitcher = ResultStitcher::new(self.merged());
        let mut result = StitchedResult::default();

        self.merge_root(&stitcher, &mut result, event, &[response_key.to_string()]);
        self.resolve_pending(&delegator, prepared, &mut result).await;

        self.project(prepared, result)
    }

    fn project(&self, prepared: &PreparedOperation, result: StitchedResult) -> Response {
        let StitchedResult { data, mut errors } = result;
        let data = Projection::new(self.merged(), &prepared.variables, &mut errors).project(
            &data,
            &prepared.operation.selection_set,
            &prepared.root_type,
        );
        Response { data, errors }
    }
}

fn cancelled(inner: &EngineInner, subschema: SubschemaId) -> DelegationError {
    let name = inner.registry.subschema(subschema).name().to_string();
    DelegationError {
        subschema: name.clone(),
        path: ErrorPath::default(),
        source: stitching_runtime::ExecutorError::Cancelled { subschema: name },
    }
}

fn single(response: Response) -> BoxStream<'static, Response> {
    stream::once(std::future::ready(response)).boxed()
}
