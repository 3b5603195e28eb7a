use futures_util::{StreamExt, stream::BoxStream};
use graphql_stitching_schema::{OperationType, SubschemaId};
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{AbortSignal, Context, ErrorPath, ExecutorError, ExecutorRequest, ExecutorResponse, GraphqlError};

use crate::{
    batch::BatchCoordinator,
    config::BatchingConfig,
    error::DelegationError,
    operation::{Operation, SelectionSet, VariableDefinition},
    registry::{Registry, Subschema},
    transform::{RequestState, TransformContext},
};

/// A selection to resolve against one subschema, expressed against the logical schema.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    pub subschema: SubschemaId,
    pub operation_type: OperationType,
    /// Where the delegated selection starts in the aggregate response.
    pub field_path: ErrorPath,
    /// Root level selection of the sub-operation.
    pub selection_set: SelectionSet,
    pub variable_definitions: Vec<VariableDefinition>,
    pub variables: Map<String, JsonValue>,
    pub operation_name: Option<String>,
    pub context: Context,
    pub abort: AbortSignal,
}

impl DelegationRequest {
    pub fn new(subschema: SubschemaId, operation_type: OperationType, selection_set: SelectionSet) -> Self {
        DelegationRequest {
            subschema,
            operation_type,
            field_path: ErrorPath::default(),
            selection_set,
            variable_definitions: Vec::new(),
            variables: Map::new(),
            operation_name: None,
            context: Context::default(),
            abort: AbortSignal::new(),
        }
    }
}

/// The request a transform step rewrites.
#[derive(Debug, Clone)]
pub struct DelegatedRequest {
    pub operation: Operation,
    pub variables: Map<String, JsonValue>,
}

impl DelegatedRequest {
    pub fn new(operation: Operation) -> Self {
        DelegatedRequest {
            operation,
            variables: Map::new(),
        }
    }
}

/// The result a transform step rewrites back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelegatedResult {
    pub data: Option<Map<String, JsonValue>>,
    pub errors: Vec<GraphqlError>,
}

impl From<ExecutorResponse> for DelegatedResult {
    fn from(response: ExecutorResponse) -> Self {
        DelegatedResult {
            data: match response.data {
                Some(JsonValue::Object(data)) => Some(data),
                _ => None,
            },
            errors: response.errors,
        }
    }
}

pub type DelegatedStream = BoxStream<'static, Result<DelegatedResult, DelegationError>>;

/// Sends logical selections to subschemas and brings their results back into the logical
/// schema. One delegator serves one aggregate operation: the batching state lives as long as
/// it does.
pub struct Delegator<'a> {
    registry: &'a Registry,
    batcher: BatchCoordinator,
    batching_enabled: bool,
}

impl<'a> Delegator<'a> {
    pub fn new(registry: &'a Registry, batching: &BatchingConfig) -> Self {
        Delegator {
            registry,
            batcher: BatchCoordinator::new(batching.max_batch_size),
            batching_enabled: batching.enabled,
        }
    }

    #[tracing::instrument(
        name = "delegate",
        skip_all,
        fields(subschema = %self.registry.subschema(request.subschema).name(), path = %request.field_path)
    )]
    pub async fn delegate(&self, request: DelegationRequest) -> Result<DelegatedResult, DelegationError> {
        let subschema = self.registry.subschema(request.subschema);
        let (native, state) = self.forward(subschema, &request);

        let response = if self.batching_enabled && subschema.is_batchable() {
            self.batcher
                .enqueue(subschema, native.operation, native.variables, &request.context, &request.abort)
                .await
        } else {
            let document = native.operation.to_string();
            tracing::debug!(document, "executing");
            subschema
                .executor()
                .execute(ExecutorRequest {
                    subschema_name: subschema.name_arc(),
                    document,
                    operation_name: native.operation.name.clone(),
                    variables: native.variables,
                    context: request.context.clone(),
                    abort: request.abort.clone(),
                })
                .await
        };

        match response {
            Ok(response) => Ok(backward(subschema, response, &state)),
            Err(source) => {
                tracing::warn!(error = %source, "delegation failed");
                Err(delegation_error(subschema, &request, source))
            }
        }
    }

    /// Opens a subscription. Every item goes through the same backward transforms as a single
    /// result; dropping the stream or aborting the request stops the executor's stream.
    #[tracing::instrument(
        name = "delegate_subscription",
        skip_all,
        fields(subschema = %self.registry.subschema(request.subschema).name())
    )]
    pub async fn subscribe(&self, request: DelegationRequest) -> Result<DelegatedStream, DelegationError> {
        let subschema = self.registry.subschema(request.subschema);
        let (native, state) = self.forward(subschema, &request);

        let stream = subschema
            .executor()
            .subscribe(ExecutorRequest {
                subschema_name: subschema.name_arc(),
                document: native.operation.to_string(),
                operation_name: native.operation.name.clone(),
                variables: native.variables,
                context: request.context.clone(),
                abort: request.abort.clone(),
            })
            .await
            .map_err(|source| delegation_error(subschema, &request, source))?;

        let subschema = self.registry.subschema_arc(request.subschema);
        let field_path = request.field_path.clone();

        Ok(stream
            .map(move |item| match item {
                Ok(response) => Ok(backward(&subschema, response, &state)),
                Err(source) => Err(DelegationError {
                    subschema: subschema.name().to_string(),
                    path: field_path.clone(),
                    source,
                }),
            })
            .boxed())
    }

    fn forward(&self, subschema: &Subschema, request: &DelegationRequest) -> (DelegatedRequest, RequestState) {
        let mut operation = Operation::new(request.operation_type, request.selection_set.clone());
        operation.name = request.operation_name.clone();
        operation.variable_definitions = request.variable_definitions.clone();

        let mut native = DelegatedRequest {
            operation,
            variables: request.variables.clone(),
        };
        let state = subschema.pipeline().transform_request(
            &mut native,
            TransformContext {
                merged: self.registry.merged(),
            },
        );

        (native, state)
    }
}

fn backward(subschema: &Subschema, response: ExecutorResponse, state: &RequestState) -> DelegatedResult {
    let mut result = DelegatedResult::from(response);
    subschema.pipeline().transform_result(&mut result, state);
    result
}

fn delegation_error(subschema: &Subschema, request: &DelegationRequest, source: ExecutorError) -> DelegationError {
    DelegationError {
        subschema: subschema.name().to_string(),
        path: request.field_path.clone(),
        source,
    }
}
