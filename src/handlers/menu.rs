//! Menu-item invocation forwarder.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{object_schema, BridgeConnection, CommandHandler, ToolDefinition};
use crate::error::BridgeError;

/// Executes Unity editor menu items by path (`"File/Save Project"`).
pub struct MenuHandler {
    bridge: BridgeConnection,
}

impl MenuHandler {
    pub fn new(bridge: BridgeConnection) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl CommandHandler for MenuHandler {
    fn command_prefix(&self) -> &str {
        "menu"
    }

    fn description(&self) -> &str {
        "Executes Unity editor menu items by path"
    }

    fn tool_definitions(&self) -> BTreeMap<String, ToolDefinition> {
        let mut tools = BTreeMap::new();
        tools.insert(
            "menu_execute".to_string(),
            ToolDefinition {
                description: "Executes a Unity editor menu item by its full path, \
                              e.g. \"File/Save Project\" or \"Assets/Refresh\"."
                    .to_string(),
                parameter_schema: object_schema(
                    &[(
                        "menuItem",
                        "string",
                        "Full menu item path, segments separated by '/'",
                    )],
                    &["menuItem"],
                ),
                annotations: Some(json!({"destructiveHint": true})),
            },
        );
        tools
    }

    async fn execute(&self, action: &str, params: Value) -> Result<Value, BridgeError> {
        self.bridge
            .send_command(&format!("menu.{action}"), params)
            .await
    }
}
