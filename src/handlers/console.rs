//! Console log access: commands for the model, a resource for the
//! application.
//!
//! One type in two registries: `console_getLogs`/`console_clear` tools via
//! [`CommandHandler`], and the `unity://logs/{logType}` resource via
//! [`ResourceHandler`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{object_schema, BridgeConnection, CommandHandler, ResourceHandler, ToolDefinition};
use crate::error::BridgeError;

pub struct ConsoleHandler {
    bridge: BridgeConnection,
}

impl ConsoleHandler {
    pub fn new(bridge: BridgeConnection) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl CommandHandler for ConsoleHandler {
    fn command_prefix(&self) -> &str {
        "console"
    }

    fn description(&self) -> &str {
        "Reads and clears the Unity editor console"
    }

    fn tool_definitions(&self) -> BTreeMap<String, ToolDefinition> {
        let mut tools = BTreeMap::new();
        tools.insert(
            "console_getLogs".to_string(),
            ToolDefinition {
                description: "Returns recent Unity console entries, optionally filtered \
                              by type (error, warning, log)."
                    .to_string(),
                parameter_schema: object_schema(
                    &[
                        ("logType", "string", "Filter: error, warning, or log"),
                        ("count", "integer", "Maximum number of entries to return"),
                    ],
                    &[],
                ),
                annotations: Some(json!({"readOnlyHint": true})),
            },
        );
        tools.insert(
            "console_clear".to_string(),
            ToolDefinition {
                description: "Clears the Unity editor console.".to_string(),
                parameter_schema: object_schema(&[], &[]),
                annotations: None,
            },
        );
        tools
    }

    async fn execute(&self, action: &str, params: Value) -> Result<Value, BridgeError> {
        self.bridge
            .send_command(&format!("console.{action}"), params)
            .await
    }
}

#[async_trait]
impl ResourceHandler for ConsoleHandler {
    fn resource_name(&self) -> &str {
        "console-logs"
    }

    fn description(&self) -> &str {
        "Unity console entries filtered by log type"
    }

    fn uri_template(&self) -> &str {
        "unity://logs/{logType}"
    }

    async fn fetch(&self, uri: &str, params: Value) -> Result<Value, BridgeError> {
        let mut payload = match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        payload.insert("uri".to_string(), Value::String(uri.to_string()));
        self.bridge
            .send_resource(self.resource_name(), Value::Object(payload))
            .await
    }
}
