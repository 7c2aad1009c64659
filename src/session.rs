//! Session bootstrap.
//!
//! A [`Session`] issues the distinguished new-session command, binds the
//! endpoint-issued id, and scopes every subsequent command to it. Quitting
//! consumes the session, so a terminated session cannot be reused.
//!
//! # Example
//!
//! ```ignore
//! use webdriver_remote::{Capabilities, Session};
//! use webdriver_remote::protocol::name;
//!
//! let mut capabilities = Capabilities::new();
//! capabilities.insert("browserName".into(), "chrome".into());
//!
//! let session = Session::start(executor, capabilities).await?;
//! let title = session.execute(name::GET_TITLE, None).await?;
//! session.quit().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::identifiers::SessionId;
use crate::protocol::{Command, name};

// ============================================================================
// Capabilities
// ============================================================================

/// Negotiated key/value description of the automation environment.
///
/// Sent as the new-session payload; the endpoint answers with the
/// capabilities it actually granted.
pub type Capabilities = Map<String, Value>;

// ============================================================================
// Session
// ============================================================================

/// One server-issued automation context.
///
/// Owns the executor reference and the bound session id. Dropping a
/// session does not terminate it on the endpoint; call [`Session::quit`].
pub struct Session {
    /// Executor all commands flow through.
    executor: Arc<dyn CommandExecutor>,
    /// Endpoint-issued session id.
    id: SessionId,
    /// Capabilities the endpoint granted.
    capabilities: Capabilities,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session by sending the new-session command.
    ///
    /// The request carries the capabilities in both generations' shapes,
    /// so either endpoint generation can negotiate.
    ///
    /// # Errors
    ///
    /// - any error the executor raises
    /// - [`Error::SessionNotCreated`] if the reply carries no session id
    pub async fn start(
        executor: Arc<dyn CommandExecutor>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let command = Command::new(name::NEW_SESSION)
            .param(
                "capabilities",
                json!({ "alwaysMatch": capabilities.clone() }),
            )
            .param("desiredCapabilities", Value::Object(capabilities));

        let reply = executor.execute(command).await?;

        let id = reply
            .get("sessionId")
            .and_then(Value::as_str)
            .map(SessionId::new)
            .ok_or_else(|| Error::session_not_created("endpoint reply carried no session id"))?;

        let capabilities = reply
            .get("capabilities")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        info!(session_id = %id, "session created");

        Ok(Self {
            executor,
            id,
            capabilities,
        })
    }

    /// Joins an existing session without issuing new-session.
    #[must_use]
    pub fn attach(
        executor: Arc<dyn CommandExecutor>,
        id: SessionId,
        capabilities: Capabilities,
    ) -> Self {
        debug!(session_id = %id, "attached to existing session");
        Self {
            executor,
            id,
            capabilities,
        }
    }

    /// Returns the endpoint-issued session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the capabilities the endpoint granted.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Executes a named command scoped to this session.
    ///
    /// # Errors
    ///
    /// Any error the executor raises.
    pub async fn execute(
        &self,
        command_name: &str,
        parameters: Option<Map<String, Value>>,
    ) -> Result<Value> {
        let mut command = Command::new(command_name).session(self.id.clone());
        if let Some(parameters) = parameters {
            command = command.params(parameters);
        }

        self.executor.execute(command).await
    }

    /// Executes an assembled command, binding this session's id.
    ///
    /// # Errors
    ///
    /// Any error the executor raises.
    pub async fn execute_command(&self, command: Command) -> Result<Value> {
        self.executor
            .execute(command.session(self.id.clone()))
            .await
    }

    /// Terminates the session on the endpoint.
    ///
    /// Consumes the session; after quit the id must not be reused, which
    /// the ownership system enforces.
    ///
    /// # Errors
    ///
    /// Any error the executor raises for the terminate command.
    pub async fn quit(self) -> Result<()> {
        let reply = self
            .executor
            .execute(Command::new(name::QUIT).session(self.id.clone()))
            .await;

        info!(session_id = %self.id, "session terminated");

        reply.map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Executor stub answering from a fixed script and recording commands.
    struct ScriptedExecutor {
        replies: Mutex<Vec<Result<Value>>>,
        log: Mutex<Vec<(String, Option<String>, Map<String, Value>)>>,
    }

    impl ScriptedExecutor {
        fn new(replies: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                log: Mutex::new(Vec::new()),
            })
        }

        fn logged(&self) -> Vec<(String, Option<String>, Map<String, Value>)> {
            self.log.lock().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(&self, command: Command) -> Result<Value> {
            self.log.lock().push((
                command.name().to_string(),
                command.session_id().map(|s| s.as_str().to_string()),
                command.parameters().clone(),
            ));
            self.replies.lock().remove(0)
        }
    }

    fn new_session_reply() -> Value {
        json!({
            "sessionId": "s-42",
            "capabilities": {"browserName": "chrome"},
        })
    }

    #[tokio::test]
    async fn test_start_binds_id_and_capabilities() {
        let executor = ScriptedExecutor::new(vec![Ok(new_session_reply())]);

        let mut requested = Capabilities::new();
        requested.insert("browserName".into(), json!("chrome"));

        let session = Session::start(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            requested,
        )
        .await
        .expect("start");

        assert_eq!(session.id().as_str(), "s-42");
        assert_eq!(
            session.capabilities().get("browserName"),
            Some(&json!("chrome"))
        );

        // The request carried both capability generations.
        let (cmd, session_id, params) = executor.logged().remove(0);
        assert_eq!(cmd, "newSession");
        assert!(session_id.is_none());
        assert_eq!(
            params["capabilities"]["alwaysMatch"]["browserName"],
            "chrome"
        );
        assert_eq!(params["desiredCapabilities"]["browserName"], "chrome");
    }

    #[tokio::test]
    async fn test_start_without_session_id_fails() {
        let executor = ScriptedExecutor::new(vec![Ok(json!({"capabilities": {}}))]);

        let err = Session::start(executor as Arc<dyn CommandExecutor>, Capabilities::new())
            .await
            .expect_err("must fail");

        assert!(matches!(err, Error::SessionNotCreated { .. }));
    }

    #[tokio::test]
    async fn test_execute_injects_session_id() {
        let executor = ScriptedExecutor::new(vec![
            Ok(new_session_reply()),
            Ok(json!("Example Domain")),
        ]);

        let session = Session::start(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Capabilities::new(),
        )
        .await
        .expect("start");

        let title = session
            .execute(name::GET_TITLE, None)
            .await
            .expect("title");
        assert_eq!(title, json!("Example Domain"));

        let (cmd, session_id, _) = executor.logged().remove(1);
        assert_eq!(cmd, "getTitle");
        assert_eq!(session_id.as_deref(), Some("s-42"));
    }

    #[tokio::test]
    async fn test_execute_command_binds_id() {
        let executor = ScriptedExecutor::new(vec![
            Ok(new_session_reply()),
            Ok(Value::Null),
        ]);

        let session = Session::start(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Capabilities::new(),
        )
        .await
        .expect("start");

        session
            .execute_command(
                Command::new(name::NAVIGATE_TO).param("url", json!("https://example.com")),
            )
            .await
            .expect("navigate");

        let (cmd, session_id, params) = executor.logged().remove(1);
        assert_eq!(cmd, "get");
        assert_eq!(session_id.as_deref(), Some("s-42"));
        assert_eq!(params["url"], "https://example.com");
    }

    #[tokio::test]
    async fn test_quit_sends_terminate_command() {
        let executor = ScriptedExecutor::new(vec![
            Ok(new_session_reply()),
            Ok(Value::Null),
        ]);

        let session = Session::start(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Capabilities::new(),
        )
        .await
        .expect("start");

        session.quit().await.expect("quit");

        let (cmd, session_id, _) = executor.logged().remove(1);
        assert_eq!(cmd, "quit");
        assert_eq!(session_id.as_deref(), Some("s-42"));
    }

    #[tokio::test]
    async fn test_attach_skips_new_session() {
        let executor = ScriptedExecutor::new(vec![Ok(json!("t"))]);

        let session = Session::attach(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            SessionId::new("existing"),
            Capabilities::new(),
        );

        session
            .execute(name::GET_TITLE, None)
            .await
            .expect("title");

        let log = executor.logged();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1.as_deref(), Some("existing"));
    }
}
