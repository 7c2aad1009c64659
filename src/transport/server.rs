//! Listening endpoint for the legacy browser family.
//!
//! The legacy family inverts the usual connection direction: the local end
//! binds a loopback server, launches the application pointed at the server's
//! address, and waits for the application to connect back.
//!
//! # Connection Flow
//!
//! 1. Bind to loopback (port 0 for an OS-assigned port)
//! 2. Launch the application with the server URL
//! 3. Wait (bounded) for the inbound connection
//! 4. Upgrade to WebSocket and hand off to [`Connection`]

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::Connection;

// ============================================================================
// PendingServer
// ============================================================================

/// A bound listening endpoint that has not yet accepted its connection.
///
/// Represents the state between binding a port and the launched
/// application connecting back.
///
/// # Example
///
/// ```ignore
/// let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// let ws_url = server.ws_url();
///
/// // Launch the application with ws_url...
///
/// let connection = server.accept(Duration::from_secs(30)).await?;
/// ```
pub struct PendingServer {
    /// TCP listener for the inbound connection.
    listener: TcpListener,
    /// Address the server is bound to.
    addr: SocketAddr,
}

impl PendingServer {
    /// Binds a listening endpoint to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        debug!(port = addr.port(), "listening endpoint bound");

        Ok(Self { listener, addr })
    }

    /// Binds to the loopback interface on an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_local() -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts the application's inbound connection.
    ///
    /// Waits at most `connect_timeout` for the TCP connection, then
    /// upgrades it to WebSocket.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if nothing connects in time
    /// - [`Error::Transport`] if the WebSocket upgrade fails
    pub async fn accept(self, connect_timeout: Duration) -> Result<Connection> {
        let accept_result = timeout(connect_timeout, self.listener.accept()).await;

        let (stream, peer) = accept_result
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        debug!(?peer, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::transport(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.addr.port(), "application connected");

        Ok(Connection::new(ws_stream))
    }
}

// ============================================================================
// Tests
// ============================================================================
