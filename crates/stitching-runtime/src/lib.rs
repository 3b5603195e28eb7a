#![deny(clippy::future_not_send)]

//! The contract between the stitching engine and the transports that reach a subschema.
//!
//! Nothing in here knows about merged schemas or delegation: an [Executor] receives a printed
//! GraphQL document with its variables and returns a GraphQL response, once or as a stream.

pub mod abort;
pub mod context;
pub mod error;
pub mod executor;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use abort::AbortSignal;
pub use context::Context;
pub use error::{ErrorPath, GraphqlError, PathSegment};
pub use executor::{
    Executor, ExecutorError, ExecutorHandle, ExecutorRequest, ExecutorResponse, ExecutorResult, ResponseStream,
};
