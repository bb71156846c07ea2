//! MCP stdio transport: newline-delimited JSON-RPC 2.0.
//!
//! stdout carries protocol frames only; all logging goes to stderr or a
//! file. Per-message failures answer with a JSON-RPC error and keep the
//! loop alive; only stdin EOF or a read error ends it.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::error::BridgeError;
use crate::BridgeContext;

use super::dispatch::McpDispatcher;
use super::{prompts, resources, tools};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const MCP_PARSE_ERROR: i64 = -32700;
pub const MCP_INVALID_REQUEST: i64 = -32600;
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;
pub const MCP_INVALID_PARAMS: i64 = -32602;
pub const MCP_INTERNAL_ERROR: i64 = -32603;

pub struct McpServer {
    ctx: Arc<BridgeContext>,
    dispatcher: McpDispatcher,
}

impl McpServer {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        let dispatcher = McpDispatcher::new(Arc::clone(&ctx));
        Self { ctx, dispatcher }
    }

    /// Serve MCP on stdin/stdout until EOF.
    pub async fn run(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        let mut stdout = tokio::io::stdout();

        info!("MCP endpoint serving on stdio");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut out = response.to_string();
                out.push('\n');
                if let Err(e) = stdout.write_all(out.as_bytes()).await {
                    error!(err = %e, "stdout write failed — MCP host gone");
                    break;
                }
                stdout.flush().await.ok();
            }
        }

        info!("MCP stdin closed");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<Value> {
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(err = %e, "unparseable MCP frame");
                return Some(error_response(Value::Null, MCP_PARSE_ERROR, "Parse error"));
            }
        };
        self.handle_message(request).await
    }

    /// Process one JSON-RPC message. Notifications (no `id`) never get a
    /// response.
    pub async fn handle_message(&self, request: Value) -> Option<Value> {
        let id = request.get("id").cloned();
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return id.map(|id| error_response(id, MCP_INVALID_REQUEST, "Invalid Request"));
        };
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        debug!(method, "mcp request");

        let result: Result<Value, (i64, String)> = match method {
            "initialize" => Ok(self.initialize()),
            "notifications/initialized" | "initialized" => return None,
            "notifications/cancelled" => return None,
            "ping" => Ok(json!({})),

            "tools/list" => Ok(json!({"tools": tools::all_tools(&self.ctx)})),
            "tools/call" => self.tools_call(&params).await,

            "resources/list" => Ok(json!({"resources": resources::list_resources(&self.ctx)})),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": resources::list_resource_templates(&self.ctx)
            })),
            "resources/read" => self.resources_read(&params).await,

            "prompts/list" => Ok(json!({"prompts": prompts::list_prompts(&self.ctx)})),
            "prompts/get" => self.prompts_get(&params),

            other => {
                debug!(method = other, "unknown MCP method");
                Err((MCP_METHOD_NOT_FOUND, format!("Method not found: {other}")))
            }
        };

        // Notifications swallow their outcome entirely.
        let id = id?;
        Some(match result {
            Ok(value) => json!({"jsonrpc": "2.0", "id": id, "result": value}),
            Err((code, message)) => error_response(id, code, &message),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {},
            },
            "serverInfo": {
                "name": "unityd",
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    async fn tools_call(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or((MCP_INVALID_PARAMS, "missing tool name".to_string()))?;
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        // Tool failures are tool-level results (`isError: true`), not
        // JSON-RPC errors; the dispatcher never fails the call itself.
        Ok(self.dispatcher.dispatch(name, arguments).await)
    }

    async fn resources_read(&self, params: &Value) -> Result<Value, (i64, String)> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or((MCP_INVALID_PARAMS, "missing resource uri".to_string()))?;

        resources::read_resource(&self.ctx, uri)
            .await
            .map_err(|e| match e {
                BridgeError::Protocol(_) => (MCP_INVALID_PARAMS, e.to_string()),
                other => (MCP_INTERNAL_ERROR, other.to_string()),
            })
    }

    fn prompts_get(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or((MCP_INVALID_PARAMS, "missing prompt name".to_string()))?;
        let arguments: Map<String, Value> = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        prompts::get_prompt(&self.ctx, name, &arguments)
            .map_err(|e| (MCP_INVALID_PARAMS, e.to_string()))
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}
