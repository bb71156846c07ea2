//! Model Context Protocol endpoint.
//!
//! The bridge speaks MCP over newline-delimited JSON-RPC 2.0 on
//! stdin/stdout (protocol version 2024-11-05) and adapts the three MCP
//! surfaces onto the handler registry:
//!
//! | Module | Role |
//! |--------|------|
//! | `transport` | stdio loop, lifecycle handshake, JSON-RPC error codes |
//! | `tools` | `tools/list` aggregation + the four client-management tools |
//! | `dispatch` | `tools/call` routing and tool-error shaping |
//! | `resources` | `resources/*` with `{param}` URI template matching |
//! | `prompts` | `prompts/*` with placeholder substitution |

pub mod dispatch;
pub mod prompts;
pub mod resources;
pub mod tools;
pub mod transport;

pub use dispatch::McpDispatcher;
pub use tools::McpToolDef;
pub use transport::{
    McpServer, MCP_INTERNAL_ERROR, MCP_INVALID_PARAMS, MCP_INVALID_REQUEST, MCP_METHOD_NOT_FOUND,
    MCP_PARSE_ERROR, MCP_PROTOCOL_VERSION,
};
