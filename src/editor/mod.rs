//! Editor-side command/resource execution core.
//!
//! The other end of the router: the piece that lives inside the editor
//! process, receives command/resource envelopes, and runs handlers on the
//! editor's single UI thread with a bounded wait. Two entry points share
//! the same dispatch core:
//!
//! - [`EditorServer`] listens for a control connection (at most one; a new
//!   accept replaces the prior one).
//! - [`EditorClient`] dials a bridge, registers an identity, and serves
//!   envelopes arriving over that connection.
//!
//! Concrete editor behavior (menu invocation, log queries) is supplied by
//! the embedding editor as [`EditorCommandHandler`]/[`EditorResourceHandler`]
//! implementations; nothing here touches editor internals.

pub mod main_thread;
pub mod registry;
pub mod server;

use std::time::Duration;

pub use main_thread::MainThreadQueue;
pub use registry::{EditorCommandHandler, EditorRegistry, EditorResourceHandler};
pub use server::{EditorClient, EditorServer};

/// How long the I/O task waits for the UI thread to run a handler before
/// answering with a timeout error.
pub const DEFAULT_MAIN_THREAD_TIMEOUT: Duration = Duration::from_secs(5);

/// The exact message returned when the per-frame tick fails to drain the
/// queue in time.
pub const MAIN_THREAD_TIMEOUT_MESSAGE: &str =
    "Timed out waiting for command execution on main thread";
