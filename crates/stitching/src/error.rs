use graphql_stitching_schema::{ConflictError, IngestError};
use stitching_runtime::{ErrorPath, ExecutorError, GraphqlError};

pub(crate) const DELEGATION_ERROR: &str = "DELEGATION_ERROR";
pub(crate) const PENDING_RESOLUTION_ERROR: &str = "PENDING_RESOLUTION_ERROR";

/// Failure to assemble the registry from the subschema configurations.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("Invalid schema for the subschema `{subschema}`: {source}")]
    Schema {
        subschema: String,
        #[source]
        source: IngestError,
    },
    #[error("The subschema `{subschema}` has an invalid transform: {message}")]
    InvalidTransform { subschema: String, message: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    #[error("Could not parse the operation: {0}")]
    Parse(String),
    #[error("The document does not contain any operation")]
    NoOperation,
    #[error("Unknown operation named `{0}`")]
    UnknownOperation(String),
    #[error("The document contains several operations, an operation name is required")]
    MissingOperationName,
    #[error("Unknown fragment `{0}`")]
    UnknownFragment(String),
    #[error("The fragment `{0}` spreads itself")]
    FragmentCycle(String),
    #[error("The schema does not support {0} operations")]
    UnsupportedOperationType(graphql_stitching_schema::OperationType),
    #[error("Cannot query field `{field}` on type `{type_name}`")]
    UnknownField { type_name: String, field: String },
    #[error("Subscriptions must select exactly one root field")]
    SubscriptionRootFields,
}

/// The executor of a subschema failed, as opposed to returning a well-formed response with
/// errors in it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Delegation to the `{subschema}` subschema failed: {source}")]
pub struct DelegationError {
    pub subschema: String,
    /// Where in the aggregate response the delegated selection starts.
    pub path: ErrorPath,
    #[source]
    pub source: ExecutorError,
}

impl DelegationError {
    pub fn to_graphql_error(&self, path: ErrorPath) -> GraphqlError {
        GraphqlError::new(self.to_string())
            .with_path(path)
            .with_code(DELEGATION_ERROR)
            .with_extension("subschema", self.subschema.clone().into())
    }
}

/// A partially resolved object could not be completed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}: cannot resolve `{type_name}.{field}`")]
pub struct PendingResolutionError {
    pub type_name: String,
    pub field: String,
    pub path: ErrorPath,
    pub reason: PendingResolutionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingResolutionReason {
    /// No subschema owning the field has a merge configuration usable with the object.
    NoMergeTarget,
    /// The resolution rounds bound was reached.
    TooManyRounds,
}

impl std::fmt::Display for PendingResolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingResolutionReason::NoMergeTarget => f.write_str("No subschema can complete this object"),
            PendingResolutionReason::TooManyRounds => f.write_str("Too many resolution rounds"),
        }
    }
}

impl From<PendingResolutionError> for GraphqlError {
    fn from(error: PendingResolutionError) -> Self {
        GraphqlError::new(error.to_string())
            .with_path(error.path)
            .with_code(PENDING_RESOLUTION_ERROR)
    }
}

impl From<OperationError> for GraphqlError {
    fn from(error: OperationError) -> Self {
        GraphqlError::new(error.to_string()).with_code("OPERATION_ERROR")
    }
}
