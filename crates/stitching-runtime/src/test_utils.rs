//! In-process executors for tests.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;

use crate::{Executor, ExecutorRequest, ExecutorResponse, ExecutorResult, ResponseStream};

type Handler = dyn Fn(&ExecutorRequest) -> ExecutorResult<ExecutorResponse> + Send + Sync;
type StreamHandler = dyn Fn(&ExecutorRequest) -> ExecutorResult<Vec<ExecutorResponse>> + Send + Sync;

/// Executor answering with a closure and recording every request it receives.
#[derive(Clone)]
pub struct MockExecutor {
    handler: Arc<Handler>,
    stream_handler: Option<Arc<StreamHandler>>,
    requests: Arc<Mutex<Vec<ExecutorRequest>>>,
}

impl MockExecutor {
    pub fn new(handler: impl Fn(&ExecutorRequest) -> ExecutorResult<ExecutorResponse> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            stream_handler: None,
            requests: Default::default(),
        }
    }

    /// Subscriptions emit the returned responses one after the other, then end.
    #[must_use]
    pub fn with_subscriptions(
        mut self,
        handler: impl Fn(&ExecutorRequest) -> ExecutorResult<Vec<ExecutorResponse>> + Send + Sync + 'static,
    ) -> Self {
        self.stream_handler = Some(Arc::new(handler));
        self
    }

    pub fn requests(&self) -> Vec<ExecutorRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }

    pub fn documents(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.document).collect()
    }

    pub fn invocations(&self) -> usize {
        self.requests.lock().map(|requests| requests.len()).unwrap_or_default()
    }

    fn record(&self, request: &ExecutorRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }
}

#[async_trait::async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, request: ExecutorRequest) -> ExecutorResult<ExecutorResponse> {
        self.record(&request);
        // Give other tasks a chance to run, as a network call would.
        tokio::task::yield_now().await;
        (self.handler)(&request)
    }

    async fn subscribe(&self, request: ExecutorRequest) -> ExecutorResult<ResponseStream> {
        self.record(&request);
        let Some(handler) = &self.stream_handler else {
            return Err(crate::ExecutorError::Unsupported("subscriptions"));
        };
        let responses = handler(&request)?;
        Ok(futures_util::stream::iter(responses.into_iter().map(Ok)).boxed())
    }
}
