use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Cooperative cancellation shared by an aggregate operation and every executor call it issues.
///
/// Aborting never rolls anything back: it only prevents new work and asks in-flight executor
/// calls and subscription streams to stop.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A signal that is aborted whenever this one is, but that can also be aborted on its own
    /// without affecting the parent.
    pub fn child(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.child_token(),
        }
    }

    /// Resolves once the signal is aborted.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    pub fn into_aborted(self) -> impl Future<Output = ()> + Send + 'static {
        self.token.cancelled_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent() {
        let parent = AbortSignal::new();
        let child = parent.child();
        assert!(!child.is_aborted());

        parent.abort();
        assert!(child.is_aborted());
    }

    #[test]
    fn child_does_not_abort_parent() {
        let parent = AbortSignal::new();
        let child = parent.child();

        child.abort();
        assert!(child.is_aborted());
        assert!(!parent.is_aborted());
    }
}
