use std::future::Future;

use tokio_util::sync::CancellationToken;

/// One-shot cancellation signal shared by a task and everything it spawns.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Resolves once [`Shutdown::shutdown`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        self.token.clone().cancelled_owned()
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_the_signal() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        let waiter = other.wait();
        assert!(!other.is_terminated());
        shutdown.shutdown();
        waiter.await;
        assert!(other.is_terminated());
    }
}
