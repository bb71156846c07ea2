//! `tools/call` dispatcher.
//!
//! Routes tool invocations either to one of the built-in client-management
//! tools (backed directly by hub state) or to the command handler owning
//! the tool name, and shapes every outcome into the MCP tool-result
//! envelope. Handler and routing failures become tool-level errors with a
//! human-readable message; no stack traces cross the MCP surface.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::hub::ClientSnapshot;
use crate::BridgeContext;

/// Product names that mark a client as not yet identified; such clients
/// stay connected but are hidden from user-visible listings.
const HIDDEN_PRODUCT_NAMES: &[&str] = &["Unknown", "UnknownProject"];

pub struct McpDispatcher {
    ctx: Arc<BridgeContext>,
}

impl McpDispatcher {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    /// Dispatch a `tools/call` invocation and shape the MCP result object.
    ///
    /// Success: the handler's return value stringified as text content.
    /// Failure: `isError: true` content with a short human message;
    /// thrown/caught failures (timeouts, lost connections) additionally
    /// carry structured `{type: "execution_error", timestamp, command}`
    /// fields.
    pub async fn dispatch(&self, tool_name: &str, arguments: Value) -> Value {
        match self.run_tool(tool_name, arguments).await {
            Ok(result) => {
                info!(tool = tool_name, "tool executed");
                text_result(&result)
            }
            Err(e) => {
                warn!(tool = tool_name, err = %e, "tool failed");
                tool_error(&e, tool_name)
            }
        }
    }

    async fn run_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, BridgeError> {
        match tool_name {
            "unity_listClients" => self.list_clients().await,
            "unity_setActiveClient" => self.set_active_client(&arguments),
            "unity_connectToProject" => self.connect_to_project(&arguments),
            "unity_getActiveClient" => self.get_active_client(),
            _ => self.run_handler_tool(tool_name, arguments).await,
        }
    }

    async fn run_handler_tool(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, BridgeError> {
        let (prefix, enabled, handler) = self
            .ctx
            .registry
            .command_for_tool(tool_name)
            .ok_or_else(|| BridgeError::Protocol(format!("unknown tool: {tool_name}")))?;
        if !enabled {
            return Err(BridgeError::HandlerDisabled(prefix));
        }

        // The action is the tool-name segment after the first underscore;
        // a bare name means the handler's default action.
        let action = tool_name
            .split_once('_')
            .map(|(_, action)| action)
            .unwrap_or("execute");

        let result = handler.execute(action, arguments).await?;

        if result.get("success") == Some(&Value::Bool(false)) {
            return Err(BridgeError::HandlerExecution(failure_message(&result)));
        }
        Ok(result)
    }

    // ─── Client-management tools ────────────────────────────────────────────

    /// Rebuild the client enumeration from scratch: announce, give editors
    /// a moment to (re)connect, then snapshot and filter.
    async fn list_clients(&self) -> Result<Value, BridgeError> {
        self.ctx.hub.announce_list_clients().await;
        tokio::time::sleep(self.ctx.config.list_clients_wait).await;

        let clients: Vec<ClientSnapshot> = self
            .ctx
            .hub
            .get_connected_clients()
            .into_iter()
            .filter(is_visible)
            .collect();

        let count = clients.len();
        Ok(json!({
            "clients": clients,
            "count": count,
            "activeClient": self.ctx.hub.active_client_id(),
        }))
    }

    fn set_active_client(&self, arguments: &Value) -> Result<Value, BridgeError> {
        let client_id = required_str(arguments, "clientId")?;
        if !self.ctx.hub.set_active_client(client_id) {
            return Err(BridgeError::HandlerExecution(format!(
                "no connected client with id '{client_id}'"
            )));
        }
        Ok(json!({"success": true, "activeClient": client_id}))
    }

    fn connect_to_project(&self, arguments: &Value) -> Result<Value, BridgeError> {
        let project = required_str(arguments, "projectName")?;
        let needle = project.to_lowercase();

        let matched = self
            .ctx
            .hub
            .get_connected_clients()
            .into_iter()
            .find(|c| {
                c.info
                    .as_ref()
                    .and_then(|i| i.product_name.as_deref())
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                BridgeError::HandlerExecution(format!(
                    "no connected Unity project matching '{project}'"
                ))
            })?;

        self.ctx.hub.set_active_client(&matched.id);
        Ok(json!({
            "success": true,
            "activeClient": matched.id,
            "productName": matched.info.and_then(|i| i.product_name),
        }))
    }

    fn get_active_client(&self) -> Result<Value, BridgeError> {
        let active = self.ctx.hub.active_client_id();
        let info = active.as_ref().and_then(|id| {
            self.ctx
                .hub
                .get_connected_clients()
                .into_iter()
                .find(|c| &c.id == id)
                .and_then(|c| c.info)
        });
        Ok(json!({"activeClient": active, "info": info}))
    }
}

/// Listing filter: a client is user-visible once it registered a usable
/// product name.
fn is_visible(client: &ClientSnapshot) -> bool {
    client
        .info
        .as_ref()
        .and_then(|i| i.product_name.as_deref())
        .map(|name| !name.is_empty() && !HIDDEN_PRODUCT_NAMES.contains(&name))
        .unwrap_or(false)
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, BridgeError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BridgeError::Protocol(format!("missing required parameter '{key}'")))
}

fn failure_message(result: &Value) -> String {
    result
        .get("message")
        .or_else(|| result.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| result.to_string())
}

fn text_result(value: &Value) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": value.to_string(),
        }]
    })
}

fn tool_error(err: &BridgeError, tool_name: &str) -> Value {
    let text = match err {
        // Plain message: conditions the caller can react to directly, and
        // handler results that reported `success: false` themselves.
        BridgeError::NoClientsConnected
        | BridgeError::HandlerDisabled(_)
        | BridgeError::HandlerExecution(_)
        | BridgeError::Protocol(_) => err.to_string(),
        // Thrown/caught failures carry the structured envelope.
        _ => json!({
            "type": "execution_error",
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "command": tool_name,
            "message": err.to_string(),
        })
        .to_string(),
    };
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": true,
    })
}
