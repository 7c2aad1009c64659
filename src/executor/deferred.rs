//! Deferred executor over a pending executor future.
//!
//! Wraps an eventually-available [`CommandExecutor`], typically one
//! waiting on a [`DriverService`](crate::service::DriverService) to finish
//! starting, so callers can issue commands before startup completes.
//! Every call awaits the wrapped future, then delegates; there is no queue
//! and no ordering policy beyond the runtime's own.
//!
//! # Example
//!
//! ```ignore
//! let deferred = DeferredExecutor::new(async move {
//!     let address = service.start().await?;
//!     Ok(Arc::new(HttpExecutor::new(address)) as Arc<dyn CommandExecutor>)
//! });
//!
//! // Issued immediately; delivered once the service is up.
//! let status = deferred.execute(Command::new(name::STATUS)).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Command;

use super::CommandExecutor;

// ============================================================================
// Types
// ============================================================================

/// Shared resolution of the underlying executor.
///
/// The error side is a memoized message rather than [`enum@Error`] because
/// every waiter receives its own clone of the outcome.
type ExecutorFuture =
    Shared<BoxFuture<'static, std::result::Result<Arc<dyn CommandExecutor>, Arc<str>>>>;

// ============================================================================
// DeferredExecutor
// ============================================================================

/// Transparent one-level indirection over an executor still starting up.
///
/// Cloning is cheap; all clones await the same resolution. A failed
/// resolution is memoized and surfaces as a lifecycle error on every
/// subsequent call.
#[derive(Clone)]
pub struct DeferredExecutor {
    /// The pending (or resolved) delegate.
    inner: ExecutorFuture,
}

impl DeferredExecutor {
    /// Wraps a future that resolves to the real executor.
    #[must_use]
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Arc<dyn CommandExecutor>>> + Send + 'static,
    {
        let inner = async move {
            future
                .await
                .map_err(|e| Arc::<str>::from(e.to_string().as_str()))
        }
        .boxed()
        .shared();

        Self { inner }
    }

    /// Wraps an executor that is already available.
    #[must_use]
    pub fn resolved(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::new(async move { Ok(executor) })
    }

    /// Awaits the delegate, translating a memoized startup failure.
    async fn delegate(&self) -> Result<Arc<dyn CommandExecutor>> {
        self.inner.clone().await.map_err(|message| {
            debug!(%message, "deferred executor resolution had failed");
            Error::ProcessLaunch {
                message: message.to_string(),
            }
        })
    }
}

// ============================================================================
// CommandExecutor Implementation
// ============================================================================

#[async_trait]
impl CommandExecutor for DeferredExecutor {
    async fn execute(&self, command: Command) -> Result<Value> {
        let executor = self.delegate().await?;
        executor.execute(command).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::oneshot;

    use crate::protocol::name;

    /// Executor stub recording every command name it receives.
    struct RecordingExecutor {
        log: Mutex<Vec<String>>,
        reply: Value,
    }

    impl RecordingExecutor {
        fn new(reply: Value) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute(&self, command: Command) -> Result<Value> {
            self.log.lock().push(command.name().to_string());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_resolved_delegates_immediately() {
        let real = RecordingExecutor::new(json!({"ready": true}));
        let deferred = DeferredExecutor::resolved(Arc::clone(&real) as Arc<dyn CommandExecutor>);

        let value = deferred
            .execute(Command::new(name::STATUS))
            .await
            .expect("status");

        assert_eq!(value, json!({"ready": true}));
        assert_eq!(real.log.lock().as_slice(), ["status"]);
    }

    #[tokio::test]
    async fn test_commands_issued_before_resolution_are_delivered() {
        let real = RecordingExecutor::new(json!(null));
        let (tx, rx) = oneshot::channel::<Arc<dyn CommandExecutor>>();

        let deferred = DeferredExecutor::new(async move {
            rx.await.map_err(Error::ChannelClosed)
        });

        // Issue before the underlying future resolves.
        let pending_a = {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.execute(Command::new(name::GET_TITLE)).await })
        };
        let pending_b = {
            let deferred = deferred.clone();
            tokio::spawn(async move { deferred.execute(Command::new(name::REFRESH)).await })
        };

        // Neither call can have reached the stub yet.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(real.log.lock().is_empty());

        tx.send(Arc::clone(&real) as Arc<dyn CommandExecutor>)
            .map_err(|_| ())
            .expect("resolve");

        pending_a.await.expect("join").expect("title");
        pending_b.await.expect("join").expect("refresh");

        let mut log = real.log.lock().clone();
        log.sort();
        assert_eq!(log, ["getTitle", "refresh"]);
    }

    #[tokio::test]
    async fn test_failed_resolution_surfaces_on_every_call() {
        let deferred = DeferredExecutor::new(async {
            Err(Error::startup_timeout(250))
        });

        for _ in 0..2 {
            let err = deferred
                .execute(Command::new(name::STATUS))
                .await
                .expect_err("must fail");

            match err {
                Error::ProcessLaunch { message } => {
                    assert!(message.contains("250"), "carries the startup failure text");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
