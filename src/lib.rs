//! WebDriver remote - wire-protocol client core.
//!
//! This library turns high-level automation calls into WebDriver wire
//! commands, transports them to a driver endpoint, and owns the lifecycle
//! of the subprocess hosting that endpoint.
//!
//! # Architecture
//!
//! The core follows a client-server model:
//!
//! - **Local End (Rust)**: builds commands, manages the driver subprocess
//! - **Remote End (driver)**: executes commands against the browser
//!
//! Key design principles:
//!
//! - One [`DriverService`] owns one subprocess and its loopback port
//! - Commands map to `(method, URL template)` pairs in a per-executor
//!   registry (extensible per browser family, never a shared global)
//! - Both wire error generations translate into one [`WireErrorKind`] set
//! - The legacy socket family exchanges correlated JSON envelopes instead
//!   of HTTP requests
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use webdriver_remote::executor::{CommandExecutor, HttpExecutor};
//! use webdriver_remote::protocol::name;
//! use webdriver_remote::service::DriverService;
//! use webdriver_remote::{Capabilities, Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Locate the driver binary and start it on a free loopback port
//!     let service = DriverService::builder("chromedriver")
//!         .download_url("https://chromedriver.chromium.org/downloads")
//!         .build()?;
//!     let address = service.start().await?;
//!
//!     // Bootstrap a session through an executor at that address
//!     let executor: Arc<dyn CommandExecutor> = Arc::new(HttpExecutor::new(address));
//!     let session = Session::start(executor, Capabilities::new()).await?;
//!
//!     let title = session.execute(name::GET_TITLE, None).await?;
//!     println!("Page title: {title}");
//!
//!     session.quit().await?;
//!     service.kill().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error taxonomy and [`Result`] alias |
//! | [`executor`] | Command executors: HTTP, socket, deferred |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Command, response and envelope types |
//! | [`service`] | Driver subprocess lifecycle |
//! | [`session`] | Session bootstrap |
//! | [`transport`] | Socket transport (legacy family, internal) |
//!
//! # Ordering
//!
//! Back-to-back `execute` calls are not guaranteed to reach the wire in
//! issuance order unless each one is awaited before the next is issued.
//! The core provides no implicit command queue.

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Command executors.
///
/// The [`executor::CommandExecutor`] trait with its HTTP, socket and
/// deferred implementations.
pub mod executor;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
///
/// Command value object, response decoding and socket envelopes.
pub mod protocol;

/// Driver subprocess lifecycle.
///
/// Use [`service::DriverService::builder`] to locate and configure a
/// driver, then `start`/`kill` it.
pub mod service;

/// Session bootstrap.
///
/// Use [`Session::start`] to create a session through any executor.
pub mod session;

/// Socket transport layer.
///
/// Internal module handling the legacy family's listening endpoint and
/// connection management.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result, WireErrorKind};

// Executor types
pub use executor::{CommandExecutor, DeferredExecutor, HttpExecutor, SocketExecutor};

// Identifier types
pub use identifiers::{CorrelationId, SessionId};

// Protocol types
pub use protocol::Command;

// Service types
pub use service::{DriverService, ServiceState};

// Session types
pub use session::{Capabilities, Session};
