//! Free loopback port probing.
//!
//! The driver subprocess takes its listening port on the command line, so
//! the port must be chosen before the process exists. Binding an ephemeral
//! listener and reading back the assigned port is the only portable way to
//! find one that is currently unused.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tracing::trace;

use crate::error::Result;

// ============================================================================
// Port Probing
// ============================================================================

/// Finds an unused TCP port on the given interface.
///
/// Binds port 0, reads the OS-assigned port, and releases the listener.
/// The port is not reserved after return; the window between probing and
/// the subprocess binding it is inherent to the handoff.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if binding fails.
pub async fn free_port(ip: IpAddr) -> Result<u16> {
    let listener = TcpListener::bind(SocketAddr::new(ip, 0)).await?;
    let port = listener.local_addr()?.port();

    trace!(port, "probed free port");

    Ok(port)
}

// ============================================================================
// Tests
// ============================================================================
