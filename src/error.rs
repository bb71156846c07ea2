//! Bridge error kinds.
//!
//! Every failure that can cross the MCP surface or the TCP wire maps onto
//! one of these variants so callers can react without string matching.

/// Errors returned by the bridge core.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A request was issued while no Unity client is connected.
    /// The message names the condition explicitly so an LLM caller can
    /// react (e.g. prompt the user to open the Unity project).
    #[error("No Unity clients connected. Open a Unity project with the MCP bridge package installed and try again.")]
    NoClientsConnected,

    /// The target client disconnected before the response arrived, or the
    /// bridge is shutting down.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    /// No response within the request deadline.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Malformed JSON, missing/invalid `command`, or an unrecognized
    /// envelope.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The handler is registered but its enabled flag is off.
    #[error("handler '{0}' is disabled")]
    HandlerDisabled(String),

    /// The handler returned `success: false` or failed outright.
    #[error("handler execution failed: {0}")]
    HandlerExecution(String),

    /// Listener bind failure, bad config value, and other unrecoverable
    /// startup problems.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Socket-level failure while talking to a client.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Short machine-readable tag used in error envelopes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NoClientsConnected => "no_clients_connected",
            BridgeError::ConnectionClosed => "connection_closed",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::Protocol(_) => "protocol_error",
            BridgeError::HandlerDisabled(_) => "handler_disabled",
            BridgeError::HandlerExecution(_) => "handler_execution",
            BridgeError::Configuration(_) => "configuration_error",
            BridgeError::Io(_) => "io_error",
        }
    }
}
