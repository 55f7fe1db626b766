use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use crate::dialer::{BoxedConnection, CancellableDialer, Dialer, Network};
use crate::error::DialError;

/// Gives every dialer variant a cancellable dial.
///
/// Dialers with a native cancellable dial are called directly. For the rest the
/// plain dial runs on its own task and races the cancellation token; the losing
/// task is aborted and whatever connection it still produces is dropped.
#[derive(Clone)]
pub struct ContextDialer {
    inner: Option<Arc<dyn Dialer>>,
    kind: String,
}

impl ContextDialer {
    pub fn new(inner: Arc<dyn Dialer>) -> Self {
        Self {
            inner: Some(inner),
            kind: String::new(),
        }
    }

    /// Wrapper with no dialer behind it, for a proxy type nothing understands.
    pub fn unset(kind: impl Into<String>) -> Self {
        Self {
            inner: None,
            kind: kind.into(),
        }
    }

    pub fn inner(&self) -> Option<&Arc<dyn Dialer>> {
        self.inner.as_ref()
    }

    fn dialer(&self) -> Result<&Arc<dyn Dialer>, DialError> {
        self.inner
            .as_ref()
            .ok_or_else(|| DialError::UnsupportedProxyType(self.kind.clone()))
    }

    /// Cancellable dial that gives up after `timeout`.
    pub async fn dial_timeout(
        &self,
        timeout: Duration,
        network: Network,
        addr: &str,
    ) -> Result<BoxedConnection, DialError> {
        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };

        let result = self.dial_with_cancel(&cancel, network, addr).await;
        timer.abort();

        match result {
            Err(DialError::Cancelled) => Err(DialError::TimedOut(timeout)),
            other => other,
        }
    }

    async fn race(
        dialer: Arc<dyn Dialer>,
        cancel: &CancellationToken,
        network: Network,
        addr: &str,
    ) -> Result<BoxedConnection, DialError> {
        let (tx, rx) = oneshot::channel();
        let target = addr.to_owned();

        // dropping the caller's future aborts the dial as well
        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            let result = dialer.dial(network, &target).await;
            if let Err(Ok(_abandoned)) = tx.send(result) {
                warn!(addr = %target, "discarding connection from a cancelled dial");
            }
        }));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                task.abort();
                debug!(addr, "dial cancelled before completion");
                Err(DialError::Cancelled)
            }
            result = rx => match result {
                Ok(result) => result,
                Err(_) => {
                    let reason = match task.await {
                        Err(e) if e.is_panic() => "dial task panicked".to_string(),
                        Err(e) => e.to_string(),
                        Ok(()) => "dial task dropped its result".to_string(),
                    };
                    Err(DialError::DialTaskFailed(reason))
                }
            },
        }
    }
}

#[async_trait]
impl Dialer for ContextDialer {
    async fn dial(&self, network: Network, addr: &str) -> Result<BoxedConnection, DialError> {
        self.dialer()?.dial(network, addr).await
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableDialer> {
        Some(self)
    }
}

#[async_trait]
impl CancellableDialer for ContextDialer {
    async fn dial_with_cancel(
        &self,
        cancel: &CancellationToken,
        network: Network,
        addr: &str,
    ) -> Result<BoxedConnection, DialError> {
        let dialer = self.dialer()?;

        if let Some(native) = dialer.as_cancellable() {
            return native.dial_with_cancel(cancel, network, addr).await;
        }

        Self::race(Arc::clone(dialer), cancel, network, addr).await
    }
}

impl std::fmt::Debug for ContextDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextDialer")
            .field("set", &self.inner.is_some())
            .field("kind", &self.kind)
            .finish()
    }
}
