//! Socket connection and its event loop.
//!
//! Handles the established connection to the launched application:
//! outbound command envelopes, inbound replies, and correlation of the two
//! by id.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that multiplexes:
//!
//! - Incoming reply envelopes from the application
//! - Outgoing command envelopes from the executor
//! - Correlation-map bookkeeping for timed-out requests

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{CommandEnvelope, ResponseEnvelope, ResponsePayload};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for one command exchange.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum outstanding requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Map of correlation ids to reply channels.
type CorrelationMap = FxHashMap<CorrelationId, oneshot::Sender<Result<ResponsePayload>>>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send an envelope and wait for its reply.
    Send {
        envelope: CommandEnvelope,
        response_tx: oneshot::Sender<Result<ResponsePayload>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(CorrelationId),
    /// Shut the connection down.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Established socket connection to the launched application.
///
/// Handles request/reply correlation. The connection spawns an internal
/// event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
/// All operations are non-blocking.
#[derive(Debug)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with the event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
        }
    }
}

impl Connection {
    /// Creates a connection from an upgraded WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new(ws_stream: WebSocketStream<TcpStream>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
        ));

        Self {
            command_tx,
            correlation,
        }
    }

    /// Sends an envelope and waits for its reply with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::ConnectionTimeout`] if no reply arrives in time
    /// - [`Error::Transport`] if too many requests are outstanding
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponsePayload> {
        self.send_with_timeout(envelope, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends an envelope and waits for its reply with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_with_timeout(
        &self,
        envelope: CommandEnvelope,
        request_timeout: Duration,
    ) -> Result<ResponsePayload> {
        let correlation_id = envelope.id();

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "too many outstanding requests"
                );
                return Err(Error::transport(format!(
                    "too many outstanding requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                envelope,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timed out: drop the correlation entry so a late reply
                // doesn't leak.
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(correlation_id));

                Err(Error::connection_timeout(request_timeout.as_millis() as u64))
            }
        }
    }

    /// Returns the number of outstanding requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Returns `true` while the event loop is accepting commands.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Shuts the connection down gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop handling socket I/O.
    async fn run_event_loop(
        ws_stream: WebSocketStream<TcpStream>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the application
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("socket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "socket error");
                            break;
                        }

                        None => {
                            debug!("socket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the executor
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { envelope, response_tx }) => {
                            Self::handle_send_command(
                                envelope,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(id)) => {
                            correlation.lock().remove(&id);
                            debug!(%id, "removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Self::fail_pending_requests(&correlation);

        debug!("event loop terminated");
    }

    /// Routes an incoming text frame to the waiting caller.
    fn handle_incoming_message(text: &str, correlation: &Arc<Mutex<CorrelationMap>>) {
        match from_str::<ResponseEnvelope>(text) {
            Ok(envelope) => {
                let id = envelope.response.id;
                let tx = correlation.lock().remove(&id);

                if let Some(tx) = tx {
                    let _ = tx.send(Ok(envelope.response));
                } else {
                    warn!(%id, "reply for unknown request");
                }
            }
            Err(_) => {
                warn!(text = %text, "failed to parse incoming message");
            }
        }
    }

    /// Serializes and writes one command envelope.
    async fn handle_send_command(
        envelope: CommandEnvelope,
        response_tx: oneshot::Sender<Result<ResponsePayload>>,
        ws_write: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let correlation_id = envelope.id();

        let json = match to_string(&envelope) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(correlation_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(tx) = correlation.lock().remove(&correlation_id) {
                let _ = tx.send(Err(Error::transport(e.to_string())));
            }
        }

        trace!(%correlation_id, "envelope sent");
    }

    /// Fails all outstanding requests with ConnectionClosed.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "failed outstanding requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
