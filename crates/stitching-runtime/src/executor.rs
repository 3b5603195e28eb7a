use std::{sync::Arc, time::Duration};

use futures_util::{StreamExt, stream::BoxStream};
use serde::Deserialize;

use crate::{AbortSignal, Context, GraphqlError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Transport(String),
    #[error("Request to the `{subschema}` subschema timed out")]
    Timeout { subschema: String },
    #[error("Request to the `{subschema}` subschema was cancelled")]
    Cancelled { subschema: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("{0} are not supported by this executor")]
    Unsupported(&'static str),
}

impl ExecutorError {
    pub fn transport(error: impl ToString) -> Self {
        ExecutorError::Transport(error.to_string())
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

pub type ResponseStream = BoxStream<'static, ExecutorResult<ExecutorResponse>>;

/// A fully printed operation ready to be sent to a subschema.
#[derive(Clone, Debug)]
pub struct ExecutorRequest {
    pub subschema_name: Arc<str>,
    pub document: String,
    pub operation_name: Option<String>,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub context: Context,
    pub abort: AbortSignal,
}

/// `{ data, errors }` as returned by a subschema.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ExecutorResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "deserialize_errors")]
    pub errors: Vec<GraphqlError>,
}

fn deserialize_errors<'de, D>(deserializer: D) -> Result<Vec<GraphqlError>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<GraphqlError>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExecutorResponse {
    pub fn from_data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<GraphqlError>) -> Self {
        Self { data: None, errors }
    }

    /// Parses a GraphQL-over-HTTP JSON body.
    pub fn from_slice(bytes: &[u8]) -> ExecutorResult<Self> {
        let response: ExecutorResponse =
            serde_json::from_slice(bytes).map_err(|err| ExecutorError::MalformedResponse(err.to_string()))?;

        match &response.data {
            None | Some(serde_json::Value::Null | serde_json::Value::Object(_)) => Ok(response),
            Some(_) => Err(ExecutorError::MalformedResponse(
                "`data` must be an object or null".to_string(),
            )),
        }
    }
}

/// Capability to run an operation against one subschema, locally or over the network.
///
/// The engine may call an executor several times with identical requests and expects the
/// same outcome each time.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutorRequest) -> ExecutorResult<ExecutorResponse>;

    async fn subscribe(&self, request: ExecutorRequest) -> ExecutorResult<ResponseStream> {
        let _ = request;
        Err(ExecutorError::Unsupported("subscriptions"))
    }
}

/// Shared handle to an [Executor] that enforces the timeout and the abort signal of every call.
#[derive(Clone)]
pub struct ExecutorHandle {
    inner: Arc<dyn Executor>,
    timeout: Option<Duration>,
}

impl ExecutorHandle {
    pub fn new(executor: impl Executor + 'static) -> ExecutorHandle {
        ExecutorHandle {
            inner: Arc::new(executor),
            timeout: None,
        }
    }

    pub fn from_arc(executor: Arc<dyn Executor>) -> ExecutorHandle {
        ExecutorHandle {
            inner: executor,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> ExecutorHandle {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn execute(&self, request: ExecutorRequest) -> ExecutorResult<ExecutorResponse> {
        let subschema = request.subschema_name.clone();
        let abort = request.abort.clone();
        if abort.is_aborted() {
            return Err(ExecutorError::Cancelled {
                subschema: subschema.to_string(),
            });
        }

        let timeout = async {
            match self.timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        let execution = self.inner.execute(request);

        // A result that is already there wins over a concurrent abort.
        tokio::select! {
            biased;
            result = execution => result,
            _ = timeout => {
                tracing::warn!(subschema = %subschema, "executor call timed out");
                Err(ExecutorError::Timeout { subschema: subschema.to_string() })
            }
            _ = abort.aborted() => Err(ExecutorError::Cancelled { subschema: subschema.to_string() }),
        }
    }

    /// Opens a subscription. The returned stream ends as soon as the request's abort signal
    /// is triggered, and dropping it drops the executor's stream.
    pub async fn subscribe(&self, request: ExecutorRequest) -> ExecutorResult<ResponseStream> {
        let subschema = request.subschema_name.clone();
        let abort = request.abort.clone();
        if abort.is_aborted() {
            return Err(ExecutorError::Cancelled {
                subschema: subschema.to_string(),
            });
        }

        let stream = tokio::select! {
            biased;
            result = self.inner.subscribe(request) => result?,
            _ = abort.aborted() => {
                return Err(ExecutorError::Cancelled { subschema: subschema.to_string() });
            }
        };

        Ok(stream.take_until(abort.into_aborted()).boxed())
    }
}

impl std::ops::Deref for ExecutorHandle {
    type Target = dyn Executor;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}
