#![deny(clippy::future_not_send)]

//! Serves one logical GraphQL schema stitched together from several subschemas, each reached
//! through its own [Executor].
//!
//! ```no_run
//! # async fn run(accounts: impl graphql_stitching::Executor + 'static, emails: impl graphql_stitching::Executor + 'static) -> Result<(), graphql_stitching::BuildError> {
//! use graphql_stitching::{Engine, MergeTypeConfig, Request, StitchingConfig, SubschemaConfig};
//!
//! let engine = Engine::build(
//!     vec![
//!         SubschemaConfig::from_sdl("accounts", "type User { id: ID! name: String } type Query { me: User }", accounts)?,
//!         SubschemaConfig::from_sdl("emails", "type User { id: ID! email: String } type Query { userById(id: ID!): User }", emails)?
//!             .merge("User", MergeTypeConfig::by_key("id", "userById", "id")),
//!     ],
//!     StitchingConfig::default(),
//! )?;
//!
//! let response = engine.execute(Request::new("{ me { name email } }")).await;
//! # Ok(())
//! # }
//! ```

mod batch;
mod config;
mod delegate;
mod engine;
mod error;
mod operation;
mod registry;
mod stitch;
mod transform;

pub use config::{BatchingConfig, StitchingConfig};
pub use delegate::{DelegatedRequest, DelegatedResult, DelegatedStream, DelegationRequest, Delegator};
pub use engine::{Engine, Request, Response};
pub use error::{BuildError, DelegationError, OperationError, PendingResolutionError, PendingResolutionReason};
pub use operation::{
    Argument, Directive, Field, InlineFragment, Operation, Selection, SelectionSet, Value, VariableDefinition,
};
pub use registry::{Registry, Subschema, SubschemaConfig};
pub use stitch::{Pending, PendingExternalObject, ResultStitcher, StitchedResult};
pub use transform::{
    AddArgumentsAsVariables, AddSelectionSet, Capabilities, FilterToSchema, RenameTypes, RequestState, StepState,
    Transform, TransformContext, TransformError, TransformPipeline, WrapRootField,
};

pub use graphql_stitching_schema::{
    KeySelection, MergeTypeConfig, MergedSchema, OperationType, SchemaDefinition, SubschemaId, TypeConflictStrategy,
};
pub use stitching_runtime::{
    AbortSignal, Context, ErrorPath, Executor, ExecutorError, ExecutorHandle, ExecutorRequest, ExecutorResponse,
    GraphqlError, PathSegment, ResponseStream,
};
