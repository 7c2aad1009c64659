//! Command executors.
//!
//! A [`CommandExecutor`] turns a [`Command`](crate::protocol::Command) into
//! a wire exchange and its decoded result. Three implementations:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HttpExecutor`] | JSON-over-HTTP against a driver endpoint |
//! | [`SocketExecutor`] | JSON envelopes over an inbound socket (legacy family) |
//! | [`DeferredExecutor`] | Transparent wrapper over an executor still starting up |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::Command;

// ============================================================================
// Submodules
// ============================================================================

/// Deferred executor over a pending executor future.
pub mod deferred;

/// HTTP command executor.
pub mod http;

/// Socket session executor for the legacy browser family.
pub mod socket;

// ============================================================================
// CommandExecutor
// ============================================================================

/// Executes named commands against a session endpoint.
///
/// Implementations serialize the command, perform the exchange, and decode
/// the reply through the error translator, so `execute` either yields the
/// result payload or a typed error. Ordering of back-to-back calls is the
/// caller's responsibility; the executor holds no queue.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Executes one command and returns its decoded result payload.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::UnknownCommand`] for names the executor has no
    ///   mapping for, raised before any I/O
    /// - [`crate::Error::Wire`] for endpoint-rejected commands
    /// - transport-kind errors when the endpoint is unreachable
    async fn execute(&self, command: Command) -> Result<Value>;
}

// ============================================================================
// Re-exports
// ============================================================================

pub use deferred::DeferredExecutor;
pub use http::{CommandSpec, HttpExecutor};
pub use socket::{SocketExecutor, SocketExecutorBuilder};
