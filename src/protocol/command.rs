//! Command value object and the base command vocabulary.
//!
//! A [`Command`] is one named, parameterized operation destined for a
//! session endpoint. The vocabulary is open: the constants in [`name`]
//! cover the base set every endpoint understands, and browser-specific
//! executors register additional names at construction time.
//!
//! # Example
//!
//! ```
//! use webdriver_remote::protocol::{Command, name};
//! use serde_json::json;
//!
//! let cmd = Command::new(name::NAVIGATE_TO)
//!     .session("session-1")
//!     .param("url", json!("https://example.com"));
//!
//! assert_eq!(cmd.name(), "get");
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::identifiers::SessionId;

// ============================================================================
// Command Names
// ============================================================================

/// Well-known command names.
///
/// These are the names pre-registered in every HTTP executor's base table.
/// The set is open; executors accept any name registered via
/// `define_command`.
pub mod name {
    /// Create a new session.
    pub const NEW_SESSION: &str = "newSession";
    /// Terminate the session.
    pub const QUIT: &str = "quit";
    /// Query endpoint readiness.
    pub const STATUS: &str = "status";

    /// Navigate to a URL.
    pub const NAVIGATE_TO: &str = "get";
    /// Read the current URL.
    pub const GET_CURRENT_URL: &str = "getCurrentUrl";
    /// Navigate back in history.
    pub const GO_BACK: &str = "goBack";
    /// Navigate forward in history.
    pub const GO_FORWARD: &str = "goForward";
    /// Reload the current page.
    pub const REFRESH: &str = "refresh";
    /// Read the page title.
    pub const GET_TITLE: &str = "getTitle";
    /// Read the page source.
    pub const GET_PAGE_SOURCE: &str = "getPageSource";

    /// Read session timeouts.
    pub const GET_TIMEOUTS: &str = "getTimeouts";
    /// Configure session timeouts.
    pub const SET_TIMEOUTS: &str = "setTimeouts";

    /// Read the current window handle.
    pub const GET_WINDOW_HANDLE: &str = "getWindowHandle";
    /// Enumerate all window handles.
    pub const GET_WINDOW_HANDLES: &str = "getWindowHandles";
    /// Close the current window.
    pub const CLOSE_WINDOW: &str = "close";
    /// Switch focus to another window.
    pub const SWITCH_TO_WINDOW: &str = "switchToWindow";

    /// Find a single element.
    pub const FIND_ELEMENT: &str = "findElement";
    /// Find all matching elements.
    pub const FIND_ELEMENTS: &str = "findElements";
    /// Click an element.
    pub const CLICK_ELEMENT: &str = "clickElement";
    /// Clear an editable element.
    pub const CLEAR_ELEMENT: &str = "clearElement";
    /// Type into an element.
    pub const SEND_KEYS_TO_ELEMENT: &str = "sendKeysToElement";
    /// Read an element's text.
    pub const GET_ELEMENT_TEXT: &str = "getElementText";
    /// Read an element attribute.
    pub const GET_ELEMENT_ATTRIBUTE: &str = "getElementAttribute";

    /// Execute synchronous script.
    pub const EXECUTE_SCRIPT: &str = "executeScript";
    /// Execute asynchronous script.
    pub const EXECUTE_ASYNC_SCRIPT: &str = "executeAsyncScript";

    /// Capture a viewport screenshot.
    pub const SCREENSHOT: &str = "screenshot";

    /// Enumerate cookies.
    pub const GET_ALL_COOKIES: &str = "getCookies";
    /// Add a cookie.
    pub const ADD_COOKIE: &str = "addCookie";
    /// Delete a named cookie.
    pub const DELETE_COOKIE: &str = "deleteCookie";

    /// Accept the open user prompt.
    pub const ACCEPT_ALERT: &str = "acceptAlert";
    /// Dismiss the open user prompt.
    pub const DISMISS_ALERT: &str = "dismissAlert";
    /// Read the open user prompt's text.
    pub const GET_ALERT_TEXT: &str = "getAlertText";
    /// Type into the open user prompt.
    pub const SET_ALERT_TEXT: &str = "setAlertValue";
}

// ============================================================================
// Command
// ============================================================================

/// One named, parameterized operation sent to a session.
///
/// Immutable after construction apart from the fluent [`Command::param`]
/// setter used while assembling the call. The session ID stays unbound
/// until session bootstrap fills it in.
#[derive(Debug, Clone)]
pub struct Command {
    /// Command name, open vocabulary.
    name: String,
    /// Session the command is scoped to, once bound.
    session_id: Option<SessionId>,
    /// Parameter map serialized as the request body.
    parameters: Map<String, Value>,
}

impl Command {
    /// Creates a command with no session binding and no parameters.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session_id: None,
            parameters: Map::new(),
        }
    }

    /// Binds the command to a session.
    #[inline]
    #[must_use]
    pub fn session(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Sets one parameter. Later writes to the same key win.
    #[inline]
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Merges a whole parameter map in.
    #[must_use]
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }

    /// Returns the command name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bound session ID, if any.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Returns the parameter map.
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Consumes the command into its parameter map.
    #[inline]
    #[must_use]
    pub fn into_parameters(self) -> Map<String, Value> {
        self.parameters
    }
}

// ============================================================================
// Tests
// ============================================================================
