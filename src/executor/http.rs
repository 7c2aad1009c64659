//! HTTP command executor.
//!
//! Maps command names to `(method, URL template)` pairs, performs the HTTP
//! exchange and decodes the reply through the error translator.
//!
//! Each executor instance owns its registry: it is seeded with the base
//! vocabulary and extended per browser family via
//! [`HttpExecutor::define_command`], so two executors never interfere.
//!
//! # Example
//!
//! ```ignore
//! use webdriver_remote::executor::{CommandExecutor, HttpExecutor};
//! use webdriver_remote::protocol::{Command, name};
//!
//! let executor = HttpExecutor::new("http://127.0.0.1:9515".parse()?);
//! let status = executor.execute(Command::new(name::STATUS)).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use reqwest::{Client, Method};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};
use url::Url;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::protocol::response::{decode_new_session, decode_response};
use crate::protocol::{Command, name};

use super::CommandExecutor;

// ============================================================================
// CommandSpec
// ============================================================================

/// Registry entry mapping a command name to its HTTP shape.
///
/// The path template may contain `:sessionId` and other `:name`
/// placeholders, substituted at dispatch time.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// HTTP method for the exchange.
    pub method: Method,
    /// URL template with `:name` placeholders.
    pub path: String,
}

impl CommandSpec {
    /// Creates a spec from method and path template.
    #[inline]
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

// ============================================================================
// Base Registry
// ============================================================================

/// Builds the base vocabulary shared by every HTTP executor instance.
fn base_registry() -> FxHashMap<String, CommandSpec> {
    let table: &[(&str, Method, &str)] = &[
        (name::NEW_SESSION, Method::POST, "/session"),
        (name::QUIT, Method::DELETE, "/session/:sessionId"),
        (name::STATUS, Method::GET, "/status"),
        (name::NAVIGATE_TO, Method::POST, "/session/:sessionId/url"),
        (name::GET_CURRENT_URL, Method::GET, "/session/:sessionId/url"),
        (name::GO_BACK, Method::POST, "/session/:sessionId/back"),
        (name::GO_FORWARD, Method::POST, "/session/:sessionId/forward"),
        (name::REFRESH, Method::POST, "/session/:sessionId/refresh"),
        (name::GET_TITLE, Method::GET, "/session/:sessionId/title"),
        (
            name::GET_PAGE_SOURCE,
            Method::GET,
            "/session/:sessionId/source",
        ),
        (
            name::GET_TIMEOUTS,
            Method::GET,
            "/session/:sessionId/timeouts",
        ),
        (
            name::SET_TIMEOUTS,
            Method::POST,
            "/session/:sessionId/timeouts",
        ),
        (
            name::GET_WINDOW_HANDLE,
            Method::GET,
            "/session/:sessionId/window",
        ),
        (
            name::GET_WINDOW_HANDLES,
            Method::GET,
            "/session/:sessionId/window/handles",
        ),
        (name::CLOSE_WINDOW, Method::DELETE, "/session/:sessionId/window"),
        (
            name::SWITCH_TO_WINDOW,
            Method::POST,
            "/session/:sessionId/window",
        ),
        (name::FIND_ELEMENT, Method::POST, "/session/:sessionId/element"),
        (
            name::FIND_ELEMENTS,
            Method::POST,
            "/session/:sessionId/elements",
        ),
        (
            name::CLICK_ELEMENT,
            Method::POST,
            "/session/:sessionId/element/:id/click",
        ),
        (
            name::CLEAR_ELEMENT,
            Method::POST,
            "/session/:sessionId/element/:id/clear",
        ),
        (
            name::SEND_KEYS_TO_ELEMENT,
            Method::POST,
            "/session/:sessionId/element/:id/value",
        ),
        (
            name::GET_ELEMENT_TEXT,
            Method::GET,
            "/session/:sessionId/element/:id/text",
        ),
        (
            name::GET_ELEMENT_ATTRIBUTE,
            Method::GET,
            "/session/:sessionId/element/:id/attribute/:name",
        ),
        (
            name::EXECUTE_SCRIPT,
            Method::POST,
            "/session/:sessionId/execute/sync",
        ),
        (
            name::EXECUTE_ASYNC_SCRIPT,
            Method::POST,
            "/session/:sessionId/execute/async",
        ),
        (
            name::SCREENSHOT,
            Method::GET,
            "/session/:sessionId/screenshot",
        ),
        (
            name::GET_ALL_COOKIES,
            Method::GET,
            "/session/:sessionId/cookie",
        ),
        (name::ADD_COOKIE, Method::POST, "/session/:sessionId/cookie"),
        (
            name::DELETE_COOKIE,
            Method::DELETE,
            "/session/:sessionId/cookie/:name",
        ),
        (
            name::ACCEPT_ALERT,
            Method::POST,
            "/session/:sessionId/alert/accept",
        ),
        (
            name::DISMISS_ALERT,
            Method::POST,
            "/session/:sessionId/alert/dismiss",
        ),
        (
            name::GET_ALERT_TEXT,
            Method::GET,
            "/session/:sessionId/alert/text",
        ),
        (
            name::SET_ALERT_TEXT,
            Method::POST,
            "/session/:sessionId/alert/text",
        ),
    ];

    table
        .iter()
        .map(|(cmd, method, path)| {
            (
                (*cmd).to_string(),
                CommandSpec::new(method.clone(), *path),
            )
        })
        .collect()
}

// ============================================================================
// HttpExecutor
// ============================================================================

/// JSON-over-HTTP command executor.
///
/// Owns a per-instance command registry and a connection-pooled HTTP
/// client. Cheap to share behind an `Arc`.
pub struct HttpExecutor {
    /// HTTP client (connection pooling inside).
    client: Client,
    /// Endpoint base URL, no trailing slash.
    base: String,
    /// Command name to HTTP shape.
    registry: FxHashMap<String, CommandSpec>,
}

impl HttpExecutor {
    /// Creates an executor against the given endpoint, seeded with the base
    /// vocabulary.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates an executor reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base: base_url.as_str().trim_end_matches('/').to_string(),
            registry: base_registry(),
        }
    }

    /// Registers (or replaces) a command mapping on this instance.
    ///
    /// This is how a browser family extends the vocabulary; the change is
    /// invisible to every other executor instance.
    pub fn define_command(&mut self, command: impl Into<String>, method: Method, path: impl Into<String>) {
        self.registry
            .insert(command.into(), CommandSpec::new(method, path));
    }

    /// Returns `true` if the command name is mapped on this instance.
    #[inline]
    #[must_use]
    pub fn is_defined(&self, command: &str) -> bool {
        self.registry.contains_key(command)
    }

    /// Returns the endpoint base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Substitutes path placeholders and splits off the request body.
    ///
    /// `:sessionId` comes from the command's session binding; any other
    /// `:name` placeholder is taken from the parameter map and removed from
    /// the body.
    fn resolve(&self, spec: &CommandSpec, command: &Command) -> Result<(String, Map<String, Value>)> {
        let mut body = command.parameters().clone();
        let mut resolved = String::with_capacity(spec.path.len());

        for segment in spec.path.split('/') {
            if segment.is_empty() {
                continue;
            }
            resolved.push('/');

            let Some(placeholder) = segment.strip_prefix(':') else {
                resolved.push_str(segment);
                continue;
            };

            if placeholder == "sessionId" {
                let session_id = command.session_id().ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "command '{}' requires a bound session id",
                        command.name()
                    ))
                })?;
                resolved.push_str(session_id.as_str());
                continue;
            }

            let value = body.remove(placeholder).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "command '{}' is missing the '{placeholder}' parameter",
                    command.name()
                ))
            })?;

            match value {
                Value::String(s) => resolved.push_str(&s),
                Value::Number(n) => resolved.push_str(&n.to_string()),
                other => {
                    return Err(Error::invalid_argument(format!(
                        "parameter '{placeholder}' must be a string or number, got {other}"
                    )));
                }
            }
        }

        Ok((format!("{}{}", self.base, resolved), body))
    }
}

// ============================================================================
// CommandExecutor Implementation
// ============================================================================

#[async_trait]
impl CommandExecutor for HttpExecutor {
    async fn execute(&self, command: Command) -> Result<Value> {
        let spec = self
            .registry
            .get(command.name())
            .ok_or_else(|| Error::unknown_command(command.name()))?;

        let (url, body) = self.resolve(spec, &command)?;

        debug!(command = command.name(), method = %spec.method, %url, "dispatching command");

        let mut request = self.client.request(spec.method.clone(), &url);

        // Body-carrying methods always send a JSON object, even when empty.
        if matches!(spec.method, Method::POST | Method::PUT) {
            request = request.json(&Value::Object(body));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        trace!(command = command.name(), http_status = %status, "response received");

        // Legacy endpoints put the new session's id at the envelope's top
        // level, where generic decoding would drop it. Normalize both
        // generations into one payload shape.
        if command.name() == name::NEW_SESSION {
            let reply = decode_new_session(&text)?;
            return Ok(json!({
                "sessionId": reply.session_id,
                "capabilities": reply.capabilities,
            }));
        }

        decode_response(&text)
    }
}

// ============================================================================
// Tests
// ============================================================================
