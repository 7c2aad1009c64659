//! Error types for the WebDriver client core.
//!
//! This module defines all error types used throughout the crate, including
//! the taxonomy of wire-protocol error codes across both encoding
//! generations.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webdriver_remote::{Result, Error};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     let title = session.execute(name::GET_TITLE, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Protocol | [`Error::Wire`] (one [`WireErrorKind`] per wire code) |
//! | Transport | [`Error::Transport`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Http`] |
//! | Lifecycle | [`Error::ExecutableNotFound`], [`Error::StartupTimeout`], [`Error::ProcessLaunch`], [`Error::SessionNotCreated`], [`Error::AlreadyRunning`] |
//! | Usage | [`Error::UnknownCommand`], [`Error::InvalidArgument`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// WireErrorKind
// ============================================================================

/// Taxonomy of wire-protocol error codes.
///
/// One variant per recognized current-format string code. Legacy numeric
/// statuses map onto the same set via [`WireErrorKind::from_legacy_status`];
/// several legacy codes collapse onto one kind and a few kinds have no legacy
/// counterpart. Unrecognized codes of either generation resolve to
/// [`WireErrorKind::Unknown`] so translation is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WireErrorKind {
    /// Another element obscured the click target.
    ElementClickIntercepted,
    /// Element cannot be interacted with in its current state.
    ElementNotInteractable,
    /// TLS certificate rejected while navigating.
    InsecureCertificate,
    /// Command arguments failed endpoint validation.
    InvalidArgument,
    /// Cookie domain does not match the current document.
    InvalidCookieDomain,
    /// Element is in a state that forbids the operation.
    InvalidElementState,
    /// Selector expression is syntactically invalid.
    InvalidSelector,
    /// Session ID is unknown or no longer active.
    InvalidSessionId,
    /// Script threw while executing in the browser.
    JavascriptError,
    /// Pointer target lies outside the viewport.
    MoveTargetOutOfBounds,
    /// No user prompt is currently open.
    NoSuchAlert,
    /// Named cookie was not found.
    NoSuchCookie,
    /// No element matched the locator.
    NoSuchElement,
    /// Frame reference no longer resolves.
    NoSuchFrame,
    /// Window handle no longer resolves.
    NoSuchWindow,
    /// Injected script did not finish in time.
    ScriptTimeout,
    /// Endpoint refused to create a new session.
    SessionNotCreated,
    /// Element reference is no longer attached to the DOM.
    StaleElementReference,
    /// Operation did not complete in time.
    Timeout,
    /// Cookie could not be set.
    UnableToSetCookie,
    /// Screenshot capture failed.
    UnableToCaptureScreen,
    /// A user prompt blocked the command; carries the dialog text.
    UnexpectedAlertOpen,
    /// Endpoint did not recognize the command.
    UnknownCommand,
    /// Unclassified endpoint-side failure.
    UnknownError,
    /// HTTP method not mapped for the requested resource.
    UnknownMethod,
    /// Endpoint understood but does not support the command.
    UnsupportedOperation,
    /// Fallback for codes absent from both tables.
    Unknown,
}

impl WireErrorKind {
    /// Resolves a current-format string code.
    ///
    /// Total: unrecognized codes yield [`WireErrorKind::Unknown`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "element click intercepted" => Self::ElementClickIntercepted,
            "element not interactable" => Self::ElementNotInteractable,
            "insecure certificate" => Self::InsecureCertificate,
            "invalid argument" => Self::InvalidArgument,
            "invalid cookie domain" => Self::InvalidCookieDomain,
            "invalid element state" => Self::InvalidElementState,
            "invalid selector" => Self::InvalidSelector,
            "invalid session id" => Self::InvalidSessionId,
            "javascript error" => Self::JavascriptError,
            "move target out of bounds" => Self::MoveTargetOutOfBounds,
            "no such alert" => Self::NoSuchAlert,
            "no such cookie" => Self::NoSuchCookie,
            "no such element" => Self::NoSuchElement,
            "no such frame" => Self::NoSuchFrame,
            "no such window" => Self::NoSuchWindow,
            "script timeout" => Self::ScriptTimeout,
            "session not created" => Self::SessionNotCreated,
            "stale element reference" => Self::StaleElementReference,
            "timeout" => Self::Timeout,
            "unable to set cookie" => Self::UnableToSetCookie,
            "unable to capture screen" => Self::UnableToCaptureScreen,
            "unexpected alert open" => Self::UnexpectedAlertOpen,
            "unknown command" => Self::UnknownCommand,
            "unknown error" => Self::UnknownError,
            "unknown method" => Self::UnknownMethod,
            "unsupported operation" => Self::UnsupportedOperation,
            _ => Self::Unknown,
        }
    }

    /// Resolves a legacy numeric status (0 is success, not an error).
    ///
    /// Total: unrecognized statuses yield [`WireErrorKind::Unknown`].
    /// Statuses 11, 15, 19 and 29 have no exact modern counterpart and
    /// collapse onto the nearest current kind.
    #[must_use]
    pub fn from_legacy_status(status: u64) -> Self {
        match status {
            6 => Self::InvalidSessionId,
            7 => Self::NoSuchElement,
            8 => Self::NoSuchFrame,
            9 => Self::UnknownCommand,
            10 => Self::StaleElementReference,
            11 => Self::ElementNotInteractable,
            12 | 15 => Self::InvalidElementState,
            13 => Self::UnknownError,
            17 => Self::JavascriptError,
            19 | 32 => Self::InvalidSelector,
            21 => Self::Timeout,
            23 => Self::NoSuchWindow,
            24 => Self::InvalidCookieDomain,
            25 => Self::UnableToSetCookie,
            26 => Self::UnexpectedAlertOpen,
            27 => Self::NoSuchAlert,
            28 => Self::ScriptTimeout,
            29 => Self::InvalidArgument,
            33 => Self::SessionNotCreated,
            34 => Self::MoveTargetOutOfBounds,
            _ => Self::Unknown,
        }
    }

    /// Returns the current-format string code for this kind.
    ///
    /// Legacy-only statuses render with the current code of the kind they
    /// collapsed onto.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ElementClickIntercepted => "element click intercepted",
            Self::ElementNotInteractable => "element not interactable",
            Self::InsecureCertificate => "insecure certificate",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidCookieDomain => "invalid cookie domain",
            Self::InvalidElementState => "invalid element state",
            Self::InvalidSelector => "invalid selector",
            Self::InvalidSessionId => "invalid session id",
            Self::JavascriptError => "javascript error",
            Self::MoveTargetOutOfBounds => "move target out of bounds",
            Self::NoSuchAlert => "no such alert",
            Self::NoSuchCookie => "no such cookie",
            Self::NoSuchElement => "no such element",
            Self::NoSuchFrame => "no such frame",
            Self::NoSuchWindow => "no such window",
            Self::ScriptTimeout => "script timeout",
            Self::SessionNotCreated => "session not created",
            Self::StaleElementReference => "stale element reference",
            Self::Timeout => "timeout",
            Self::UnableToSetCookie => "unable to set cookie",
            Self::UnableToCaptureScreen => "unable to capture screen",
            Self::UnexpectedAlertOpen => "unexpected alert open",
            Self::UnknownCommand => "unknown command",
            Self::UnknownError => "unknown error",
            Self::UnknownMethod => "unknown method",
            Self::UnsupportedOperation => "unsupported operation",
            Self::Unknown => "unknown error",
        }
    }

    /// Returns every kind with a dedicated current-format code.
    #[must_use]
    pub const fn all() -> &'static [WireErrorKind] {
        &[
            Self::ElementClickIntercepted,
            Self::ElementNotInteractable,
            Self::InsecureCertificate,
            Self::InvalidArgument,
            Self::InvalidCookieDomain,
            Self::InvalidElementState,
            Self::InvalidSelector,
            Self::InvalidSessionId,
            Self::JavascriptError,
            Self::MoveTargetOutOfBounds,
            Self::NoSuchAlert,
            Self::NoSuchCookie,
            Self::NoSuchElement,
            Self::NoSuchFrame,
            Self::NoSuchWindow,
            Self::ScriptTimeout,
            Self::SessionNotCreated,
            Self::StaleElementReference,
            Self::Timeout,
            Self::UnableToSetCookie,
            Self::UnableToCaptureScreen,
            Self::UnexpectedAlertOpen,
            Self::UnknownCommand,
            Self::UnknownError,
            Self::UnknownMethod,
            Self::UnsupportedOperation,
        ]
    }
}

impl std::fmt::Display for WireErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for diagnosing the failure
/// without reading source.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The endpoint rejected a command with a wire-protocol error.
    ///
    /// Carries the endpoint's message verbatim. `alert_text` is populated
    /// for [`WireErrorKind::UnexpectedAlertOpen`] when the endpoint
    /// reported the dialog's visible text.
    #[error("{kind}: {message}")]
    Wire {
        /// Translated error kind.
        kind: WireErrorKind,
        /// Endpoint-supplied message.
        message: String,
        /// Visible text of the blocking dialog, when reported.
        alert_text: Option<String>,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Network-level failure distinct from a protocol error.
    ///
    /// Returned when the endpoint is unreachable or the exchange breaks
    /// below the protocol layer.
    #[error("Transport failure: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Timed out waiting for the application to connect.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Socket connection closed while a command was outstanding,
    /// or a command was issued with no connection open.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Driver executable was not found on the search path.
    #[error("{name} executable not found on PATH. Download it from {download_url}")]
    ExecutableNotFound {
        /// Platform-specific executable name searched for.
        name: String,
        /// Where the executable can be obtained.
        download_url: String,
    },

    /// Driver subprocess did not answer its status check in time.
    #[error("Driver did not become ready within {timeout_ms}ms")]
    StartupTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// Driver subprocess failed to spawn.
    #[error("Failed to launch driver process: {message}")]
    ProcessLaunch {
        /// Description of the launch failure.
        message: String,
    },

    /// Session could not be established with the application.
    #[error("Session not created: {message}")]
    SessionNotCreated {
        /// Likely cause of the failure.
        message: String,
    },

    /// Conflicting reconfiguration of a service that is already running.
    #[error("Service is already running")]
    AlreadyRunning,

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Command name absent from the executor's registry.
    ///
    /// Detected before any I/O.
    #[error("Unknown command: {command}")]
    UnknownCommand {
        /// The unregistered command name.
        command: String,
    },

    /// Malformed command parameters, detected before any I/O.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a wire error without alert text.
    #[inline]
    pub fn wire(kind: WireErrorKind, message: impl Into<String>) -> Self {
        Self::Wire {
            kind,
            message: message.into(),
            alert_text: None,
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an executable-not-found error.
    #[inline]
    pub fn executable_not_found(
        name: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self::ExecutableNotFound {
            name: name.into(),
            download_url: download_url.into(),
        }
    }

    /// Creates a startup timeout error.
    #[inline]
    pub fn startup_timeout(timeout_ms: u64) -> Self {
        Self::StartupTimeout { timeout_ms }
    }

    /// Creates a process launch error.
    #[inline]
    pub fn process_launch(err: IoError) -> Self {
        Self::ProcessLaunch {
            message: err.to_string(),
        }
    }

    /// Creates a session-not-created error.
    #[inline]
    pub fn session_not_created(message: impl Into<String>) -> Self {
        Self::SessionNotCreated {
            message: message.into(),
        }
    }

    /// Creates an unknown-command error.
    #[inline]
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Creates an invalid-argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the wire error kind, if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn wire_kind(&self) -> Option<WireErrorKind> {
        match self {
            Self::Wire { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` if the endpoint is gone rather than rejecting.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Http(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a timeout of any flavor.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::StartupTimeout { .. }
        ) || matches!(
            self.wire_kind(),
            Some(WireErrorKind::Timeout | WireErrorKind::ScriptTimeout)
        )
    }

    /// Returns `true` for errors detected locally before any I/O.
    #[inline]
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::UnknownCommand { .. } | Self::InvalidArgument { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
