//! JSON envelopes for the socket-connected legacy browser family.
//!
//! The legacy family exchanges framed JSON instead of HTTP requests:
//!
//! ```json
//! { "origin": "webdriver", "type": "command",
//!   "command": { "id": "uuid", "name": "get", "parameters": { "url": ".." } } }
//! ```
//!
//! Replies arrive keyed by the matching correlation id:
//!
//! ```json
//! { "origin": "webdriver", "type": "response",
//!   "response": { "id": "uuid", "status": 0, "value": { } } }
//! ```
//!
//! Reply bodies use the legacy numeric-status scheme and run through the
//! same translator as HTTP responses.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::identifiers::CorrelationId;

use super::Command;
use super::response::legacy_error;

// ============================================================================
// Constants
// ============================================================================

/// Origin marker carried by every envelope.
pub const ORIGIN: &str = "webdriver";

// ============================================================================
// MessageType
// ============================================================================

/// Envelope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Local end to application.
    Command,
    /// Application to local end.
    Response,
}

// ============================================================================
// CommandEnvelope
// ============================================================================

/// Outbound command envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope {
    /// Origin marker.
    pub origin: String,

    /// Always [`MessageType::Command`].
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// The command payload.
    pub command: CommandPayload,
}

/// Inner payload of an outbound envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CommandPayload {
    /// Correlation id echoed back in the reply.
    pub id: CorrelationId,
    /// Command name.
    pub name: String,
    /// Command parameters.
    pub parameters: Map<String, Value>,
}

impl CommandEnvelope {
    /// Wraps a command with a fresh correlation id.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            origin: ORIGIN.to_string(),
            message_type: MessageType::Command,
            command: CommandPayload {
                id: CorrelationId::generate(),
                name: command.name().to_string(),
                parameters: command.into_parameters(),
            },
        }
    }

    /// Returns the envelope's correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.command.id
    }
}

// ============================================================================
// ResponseEnvelope
// ============================================================================

/// Inbound reply envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Origin marker.
    #[serde(default)]
    pub origin: String,

    /// Always [`MessageType::Response`].
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// The reply payload.
    pub response: ResponsePayload,
}

/// Inner payload of an inbound envelope, legacy-status encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePayload {
    /// Correlation id matching the originating command.
    pub id: CorrelationId,
    /// Legacy numeric status, 0 on success.
    pub status: u64,
    /// Result payload or failure detail.
    #[serde(default)]
    pub value: Value,
}

impl ResponsePayload {
    /// Extracts the payload, raising the translated error on failure.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Wire`] for any non-zero status.
    pub fn into_result(self) -> Result<Value> {
        if self.status == 0 {
            return Ok(self.value);
        }
        Err(legacy_error(self.status, Some(&self.value)))
    }
}

// ============================================================================
// Tests
// ============================================================================
