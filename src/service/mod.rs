//! Driver subprocess lifecycle.
//!
//! A [`DriverService`] owns the subprocess that implements the wire
//! protocol endpoint: it locates the executable, binds it to a free
//! loopback port, waits for it to answer its status check, and tears it
//! down deterministically.
//!
//! # Lifecycle
//!
//! 1. [`DriverService::builder`] - locate the executable, configure port
//!    and arguments
//! 2. [`DriverService::start`] - spawn and poll until ready (single-flight)
//! 3. Commands flow through an executor pointed at the returned address
//! 4. [`DriverService::kill`] - terminate the subprocess (idempotent)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `driver` | Subprocess spawn, readiness poll, teardown |
//! | `port` | Free loopback port probing |

// ============================================================================
// Submodules
// ============================================================================

/// Subprocess spawn, readiness poll and teardown.
pub mod driver;

/// Free loopback port probing.
pub mod port;

// ============================================================================
// Re-exports
// ============================================================================

pub use driver::{DriverService, DriverServiceBuilder, ServiceState};
pub use port::free_port;
