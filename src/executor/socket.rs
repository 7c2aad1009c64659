//! Socket session executor for the legacy browser family.
//!
//! The legacy family has no driver subprocess speaking HTTP. Instead the
//! local end listens, launches the application pointed at the listener's
//! address, and exchanges JSON envelopes over the connection the
//! application dials back. Replies use the legacy numeric-status scheme
//! and run through the same translator as HTTP responses.
//!
//! # Session Lifecycle
//!
//! 1. `newSession` - bind a [`PendingServer`], launch the application,
//!    wait (bounded) for it to connect back
//! 2. Commands flow as correlated envelopes over the [`Connection`]
//! 3. `quit` - close the connection, terminate the application, clear all
//!    handles so a later `newSession` is possible

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::{Child, Command as ProcessCommand};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{Command, CommandEnvelope, name};
use crate::transport::{Connection, PendingServer};

use super::CommandExecutor;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the application's connect-back wait.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SocketExecutorBuilder
// ============================================================================

/// Builder for configuring a [`SocketExecutor`].
///
/// Use [`SocketExecutor::builder`] to create one.
#[derive(Debug, Clone)]
pub struct SocketExecutorBuilder {
    /// Path to the application binary.
    binary: Option<PathBuf>,
    /// Extra launch arguments.
    args: Vec<String>,
    /// Listener URL argument template containing a `{url}` placeholder.
    url_arg: Option<String>,
    /// Interface the listener binds.
    bind_address: IpAddr,
    /// Pinned listener port; OS-assigned when zero.
    port: u16,
    /// Bound on the connect-back wait.
    connect_timeout: Duration,
}

impl Default for SocketExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketExecutorBuilder {
    /// Creates a builder with loopback binding and default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: None,
            args: Vec::new(),
            url_arg: None,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the path to the application binary.
    #[inline]
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Appends one launch argument.
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several launch arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overrides how the listener URL is passed to the application.
    ///
    /// The template must contain a `{url}` placeholder, e.g.
    /// `"--connect={url}"`. By default the URL is appended as the final
    /// bare argument.
    #[inline]
    #[must_use]
    pub fn url_arg(mut self, template: impl Into<String>) -> Self {
        self.url_arg = Some(template.into());
        self
    }

    /// Overrides the interface the listener binds.
    #[inline]
    #[must_use]
    pub fn bind_address(mut self, ip: IpAddr) -> Self {
        self.bind_address = ip;
        self
    }

    /// Pins the listener port instead of taking an OS-assigned one.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the bound on the connect-back wait.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the executor with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if no binary was set, the binary path
    ///   does not exist, or the URL template has no `{url}` placeholder
    pub fn build(self) -> Result<SocketExecutor> {
        if let Some(template) = &self.url_arg
            && !template.contains("{url}")
        {
            return Err(Error::invalid_argument(format!(
                "URL argument template '{template}' has no {{url}} placeholder"
            )));
        }

        let binary = self.binary.ok_or_else(|| {
            Error::invalid_argument(
                "application binary is required. Use .binary() to set it.",
            )
        })?;

        if !binary.is_file() {
            return Err(Error::invalid_argument(format!(
                "application binary not found at: {}",
                binary.display()
            )));
        }

        Ok(SocketExecutor {
            binary,
            args: self.args,
            url_arg: self.url_arg,
            bind_address: self.bind_address,
            port: self.port,
            connect_timeout: self.connect_timeout,
            session: tokio::sync::Mutex::new(None),
        })
    }
}

// ============================================================================
// ActiveSession
// ============================================================================

/// Connection and subprocess handles for one live session.
#[derive(Debug)]
struct ActiveSession {
    /// Established connection to the application.
    connection: Connection,
    /// The launched application process.
    child: Child,
    /// Locally-issued session id.
    session_id: SessionId,
}

// ============================================================================
// SocketExecutor
// ============================================================================

/// Command executor for applications that dial back over a socket.
///
/// Holds at most one live session. Commands outside an active session
/// fail immediately with [`Error::ConnectionClosed`] rather than hanging.
#[derive(Debug)]
pub struct SocketExecutor {
    /// Path to the application binary.
    binary: PathBuf,
    /// Extra launch arguments.
    args: Vec<String>,
    /// Listener URL argument template, appended bare when absent.
    url_arg: Option<String>,
    /// Interface the listener binds.
    bind_address: IpAddr,
    /// Pinned listener port; OS-assigned when zero.
    port: u16,
    /// Bound on the connect-back wait.
    connect_timeout: Duration,
    /// The live session, if any. Session start and stop serialize here.
    session: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl SocketExecutor {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SocketExecutorBuilder {
        SocketExecutorBuilder::new()
    }

    /// Returns `true` while a session connection is open.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.connection.is_open())
    }

    /// Starts a session: bind, launch, await the connect-back.
    async fn start_session(&self, command: Command) -> Result<Value> {
        let mut guard = self.session.lock().await;

        if guard.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let server = PendingServer::bind(self.bind_address, self.port).await?;
        let ws_url = server.ws_url();

        debug!(url = %ws_url, "listening for the application");

        let mut child = self.launch(&ws_url)?;

        let connection = match server.accept(self.connect_timeout).await {
            Ok(connection) => connection,
            Err(e) => {
                // Never leave a half-launched application behind.
                if let Err(kill_err) = child.kill().await {
                    warn!(error = %kill_err, "failed to kill unconnected application");
                }
                let _ = child.wait().await;

                return Err(Error::session_not_created(format!(
                    "application did not connect back within {}ms ({e}); \
                     ensure the companion extension is installed",
                    self.connect_timeout.as_millis()
                )));
            }
        };

        let session_id = SessionId::new(Uuid::new_v4().to_string());
        let capabilities = negotiated_capabilities(command.parameters());

        info!(session_id = %session_id, "socket session established");

        *guard = Some(ActiveSession {
            connection,
            child,
            session_id: session_id.clone(),
        });

        Ok(json!({
            "sessionId": session_id,
            "capabilities": capabilities,
        }))
    }

    /// Stops the session, clearing handles unconditionally.
    async fn stop_session(&self) -> Result<Value> {
        let mut guard = self.session.lock().await;

        let Some(mut session) = guard.take() else {
            return Ok(Value::Null);
        };

        debug!(session_id = %session.session_id, "stopping socket session");

        session.connection.shutdown();

        if let Err(e) = session.child.kill().await {
            warn!(error = %e, "application kill reported an error");
        }
        let _ = session.child.wait().await;

        info!(session_id = %session.session_id, "socket session stopped");

        Ok(Value::Null)
    }

    /// Sends one command envelope over the live connection.
    async fn dispatch(&self, command: Command) -> Result<Value> {
        let connection = {
            let guard = self.session.lock().await;
            let session = guard.as_ref().ok_or(Error::ConnectionClosed)?;

            if !session.connection.is_open() {
                return Err(Error::ConnectionClosed);
            }
            session.connection.clone()
        };

        let envelope = CommandEnvelope::new(command);
        let reply = connection.send(envelope).await?;

        reply.into_result()
    }

    /// Launches the application pointed at the listener URL.
    fn launch(&self, ws_url: &str) -> Result<Child> {
        let mut cmd = ProcessCommand::new(&self.binary);
        cmd.args(&self.args);

        match &self.url_arg {
            Some(template) => {
                for arg in template.split_whitespace() {
                    cmd.arg(arg.replace("{url}", ws_url));
                }
            }
            None => {
                cmd.arg(ws_url);
            }
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd.spawn().map_err(Error::process_launch)
    }
}

/// Extracts the capability map the caller asked for, either generation.
fn negotiated_capabilities(parameters: &Map<String, Value>) -> Map<String, Value> {
    parameters
        .get("desiredCapabilities")
        .or_else(|| {
            parameters
                .get("capabilities")
                .and_then(|c| c.get("alwaysMatch"))
        })
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

// ============================================================================
// CommandExecutor Implementation
// ============================================================================

#[async_trait]
impl CommandExecutor for SocketExecutor {
    async fn execute(&self, command: Command) -> Result<Value> {
        match command.name() {
            name::NEW_SESSION => self.start_session(command).await,
            name::QUIT => self.stop_session().await,
            _ => self.dispatch(command).await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_binary() {
        let err = SocketExecutor::builder().build().expect_err("must fail");
        assert!(err.is_usage());
        assert!(err.to_string().contains("binary"));
    }

    #[test]
    fn test_build_rejects_missing_binary() {
        let err = SocketExecutor::builder()
            .binary("/nonexistent/application")
            .build()
            .expect_err("must fail");

        assert!(err.is_usage());
    }

    #[test]
    fn test_url_arg_requires_placeholder() {
        let err = SocketExecutor::builder()
            .url_arg("--connect")
            .build()
            .expect_err("must fail");

        assert!(err.is_usage());
    }

    #[test]
    fn test_negotiated_capabilities_both_generations() {
        let mut legacy = Map::new();
        legacy.insert(
            "desiredCapabilities".into(),
            json!({"browserName": "safari"}),
        );
        assert_eq!(
            negotiated_capabilities(&legacy).get("browserName"),
            Some(&json!("safari"))
        );

        let mut current = Map::new();
        current.insert(
            "capabilities".into(),
            json!({"alwaysMatch": {"browserName": "safari"}}),
        );
        assert_eq!(
            negotiated_capabilities(&current).get("browserName"),
            Some(&json!("safari"))
        );

        assert!(negotiated_capabilities(&Map::new()).is_empty());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Duration;

        use futures_util::{SinkExt, StreamExt};
        use serde_json::json;
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        use crate::error::WireErrorKind;
        use crate::service::free_port;

        /// Writes a dummy application that never connects back.
        fn dummy_app(dir: &Path) -> PathBuf {
            let path = dir.join("fake-app");
            fs::write(&path, "#!/bin/sh\nexec sleep 30\n").expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("chmod script");
            path
        }

        /// Dials the executor's listener and answers every command with
        /// the given legacy status and value.
        fn fake_remote_end(port: u16, status: u64, value: Value) -> tokio::task::JoinHandle<()> {
            tokio::spawn(async move {
                let url = format!("ws://127.0.0.1:{port}");

                // The listener binds inside new-session; retry until it is up.
                let mut ws = loop {
                    match connect_async(&url).await {
                        Ok((ws, _)) => break ws,
                        Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
                    }
                };

                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let incoming: Value = serde_json::from_str(&text).expect("parse");
                    let reply = json!({
                        "origin": "webdriver",
                        "type": "response",
                        "response": {
                            "id": incoming["command"]["id"],
                            "status": status,
                            "value": value,
                        }
                    });
                    ws.send(Message::Text(reply.to_string().into()))
                        .await
                        .expect("send reply");
                }
            })
        }

        #[tokio::test]
        async fn test_execute_without_session_fails_immediately() {
            let dir = tempfile::tempdir().expect("tempdir");
            let executor = SocketExecutor::builder()
                .binary(dummy_app(dir.path()))
                .build()
                .expect("build");

            let err = executor
                .execute(Command::new(name::GET_TITLE))
                .await
                .expect_err("must fail");

            assert!(matches!(err, Error::ConnectionClosed));
        }

        #[tokio::test]
        async fn test_quit_without_session_is_noop() {
            let dir = tempfile::tempdir().expect("tempdir");
            let executor = SocketExecutor::builder()
                .binary(dummy_app(dir.path()))
                .build()
                .expect("build");

            let value = executor
                .execute(Command::new(name::QUIT))
                .await
                .expect("quit");
            assert!(value.is_null());
        }

        #[tokio::test]
        async fn test_connect_timeout_names_likely_cause() {
            let dir = tempfile::tempdir().expect("tempdir");
            let executor = SocketExecutor::builder()
                .binary(dummy_app(dir.path()))
                .connect_timeout(Duration::from_millis(200))
                .build()
                .expect("build");

            let err = executor
                .execute(Command::new(name::NEW_SESSION))
                .await
                .expect_err("must time out");

            assert!(matches!(err, Error::SessionNotCreated { .. }));
            assert!(err.to_string().contains("companion extension"));

            // Handles were cleared; a later start is possible.
            assert!(!executor.is_connected().await);
        }

        #[tokio::test]
        async fn test_full_session_lifecycle() {
            let dir = tempfile::tempdir().expect("tempdir");
            let port = free_port(IpAddr::V4(Ipv4Addr::LOCALHOST))
                .await
                .expect("probe");

            let executor = SocketExecutor::builder()
                .binary(dummy_app(dir.path()))
                .port(port)
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("build");

            let remote = fake_remote_end(port, 0, json!({"title": "Example"}));

            let reply = executor
                .execute(
                    Command::new(name::NEW_SESSION)
                        .param("desiredCapabilities", json!({"browserName": "safari"})),
                )
                .await
                .expect("new session");

            assert!(reply["sessionId"].is_string());
            assert_eq!(reply["capabilities"]["browserName"], "safari");
            assert!(executor.is_connected().await);

            let value = executor
                .execute(Command::new(name::GET_TITLE))
                .await
                .expect("title");
            assert_eq!(value["title"], "Example");

            let value = executor
                .execute(Command::new(name::QUIT))
                .await
                .expect("quit");
            assert!(value.is_null());
            assert!(!executor.is_connected().await);

            remote.abort();
        }

        #[tokio::test]
        async fn test_second_new_session_conflicts() {
            let dir = tempfile::tempdir().expect("tempdir");
            let port = free_port(IpAddr::V4(Ipv4Addr::LOCALHOST))
                .await
                .expect("probe");

            let executor = SocketExecutor::builder()
                .binary(dummy_app(dir.path()))
                .port(port)
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("build");

            let remote = fake_remote_end(port, 0, json!(null));

            executor
                .execute(Command::new(name::NEW_SESSION))
                .await
                .expect("new session");

            let err = executor
                .execute(Command::new(name::NEW_SESSION))
                .await
                .expect_err("must conflict");
            assert!(matches!(err, Error::AlreadyRunning));

            executor.execute(Command::new(name::QUIT)).await.expect("quit");
            remote.abort();
        }

        #[tokio::test]
        async fn test_legacy_failure_translates() {
            let dir = tempfile::tempdir().expect("tempdir");
            let port = free_port(IpAddr::V4(Ipv4Addr::LOCALHOST))
                .await
                .expect("probe");

            let executor = SocketExecutor::builder()
                .binary(dummy_app(dir.path()))
                .port(port)
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("build");

            let remote = fake_remote_end(port, 7, json!({"message": "nothing there"}));

            executor
                .execute(Command::new(name::NEW_SESSION))
                .await
                .expect("new session");

            let err = executor
                .execute(Command::new(name::FIND_ELEMENT))
                .await
                .expect_err("must raise");
            assert_eq!(err.wire_kind(), Some(WireErrorKind::NoSuchElement));

            executor.execute(Command::new(name::QUIT)).await.expect("quit");
            remote.abort();
        }
    }
}
