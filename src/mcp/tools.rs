//! Tool catalogue: handler tools plus the built-in client-management set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handlers::object_schema;
use crate::BridgeContext;

/// One entry in the `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

/// The four synthetic tools backed directly by hub state. They never touch
/// an editor socket.
pub fn client_management_tools() -> Vec<McpToolDef> {
    vec![
        McpToolDef {
            name: "unity_listClients".to_string(),
            description: "Discovers and lists connected Unity clients. Sends a fresh \
                          discovery announce, waits briefly for editors to respond, then \
                          returns the enumeration."
                .to_string(),
            input_schema: object_schema(&[], &[]),
            annotations: None,
        },
        McpToolDef {
            name: "unity_setActiveClient".to_string(),
            description: "Selects which connected Unity client receives subsequent commands."
                .to_string(),
            input_schema: object_schema(
                &[("clientId", "string", "Id of a connected client")],
                &["clientId"],
            ),
            annotations: None,
        },
        McpToolDef {
            name: "unity_connectToProject".to_string(),
            description: "Selects the active client by Unity project name \
                          (case-insensitive substring match)."
                .to_string(),
            input_schema: object_schema(
                &[("projectName", "string", "Project (product) name to match")],
                &["projectName"],
            ),
            annotations: None,
        },
        McpToolDef {
            name: "unity_getActiveClient".to_string(),
            description: "Returns the currently active Unity client, if any.".to_string(),
            input_schema: object_schema(&[], &[]),
            annotations: None,
        },
    ]
}

/// Full `tools/list` payload: built-ins first, then every tool from every
/// command handler. Disabled prefixes stay listed; calling one reports the
/// disable instead of reaching a handler.
pub fn all_tools(ctx: &BridgeContext) -> Vec<McpToolDef> {
    let mut tools = client_management_tools();
    for (name, def) in ctx.registry.all_tool_definitions() {
        tools.push(McpToolDef {
            name,
            description: def.description,
            input_schema: def.parameter_schema,
            annotations: def.annotations,
        });
    }
    tools
}
