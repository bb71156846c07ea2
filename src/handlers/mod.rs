//! Handler interfaces and the three sub-registries.
//!
//! A handler is the bridge-side half of an editor capability: it declares
//! what the MCP endpoint should expose (tools, a resource URI, prompt
//! templates) and forwards invocations over the request router. The three
//! interfaces are independent; a type that implements more than one is
//! registered once per interface.

pub mod assets;
pub mod console;
pub mod menu;
pub mod workflow;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::error::BridgeError;
use crate::hub::ClientHub;
use crate::router::RequestRouter;

// ─── Bridge connection ────────────────────────────────────────────────────────

/// What a handler gets at construction: the route to the active editor.
#[derive(Clone)]
pub struct BridgeConnection {
    hub: Arc<ClientHub>,
    router: Arc<RequestRouter>,
}

impl BridgeConnection {
    pub fn new(hub: Arc<ClientHub>, router: Arc<RequestRouter>) -> Self {
        Self { hub, router }
    }

    /// Route a command envelope (`type: ""`) to the active editor.
    pub async fn send_command(&self, command: &str, params: Value) -> Result<Value, BridgeError> {
        self.router.send(&self.hub, command, "", params).await
    }

    /// Route a resource envelope (`type: "resource"`) to the active editor.
    pub async fn send_resource(&self, resource: &str, params: Value) -> Result<Value, BridgeError> {
        self.router.send(&self.hub, resource, "resource", params).await
    }

    pub fn hub(&self) -> &Arc<ClientHub> {
        &self.hub
    }
}

// ─── Handler interfaces ───────────────────────────────────────────────────────

/// One tool a command handler exposes through MCP.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameter_schema: Value,
    pub annotations: Option<Value>,
}

/// One prompt template a prompt handler exposes through MCP.
#[derive(Debug, Clone)]
pub struct PromptDefinition {
    pub description: String,
    /// Template text with `{param}` placeholders.
    pub template: String,
    /// Parameter name to `{description, required}` declaration. Empty map
    /// means the prompt takes no arguments.
    pub additional_properties: BTreeMap<String, Value>,
}

/// Model-invoked actions, keyed by a command prefix (`menu`, `console`).
/// `execute` receives the action segment of the tool name and forwards it
/// as `<prefix>.<action>` to the editor.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn command_prefix(&self) -> &str;
    fn description(&self) -> &str;
    /// Tool name to definition. Tool names follow `<prefix>_<action>`.
    fn tool_definitions(&self) -> BTreeMap<String, ToolDefinition>;
    async fn execute(&self, action: &str, params: Value) -> Result<Value, BridgeError>;
}

/// Application-fetched data, keyed by resource name. The URI template may
/// contain `{param}` placeholders extracted by the MCP endpoint.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn resource_name(&self) -> &str;
    fn description(&self) -> &str;
    fn uri_template(&self) -> &str;
    fn mime_type(&self) -> &str {
        "application/json"
    }
    /// Returns `{contents: [{uri, text, mimeType?}]}`, forwarded verbatim
    /// to the MCP endpoint.
    async fn fetch(&self, uri: &str, params: Value) -> Result<Value, BridgeError>;
}

/// User-selected templates, keyed by prompt handler name.
pub trait PromptHandler: Send + Sync {
    fn prompt_name(&self) -> &str;
    fn description(&self) -> &str;
    /// Prompt name to definition.
    fn prompt_definitions(&self) -> BTreeMap<String, PromptDefinition>;
}

// ─── Registry ─────────────────────────────────────────────────────────────────

struct Registered<T: ?Sized> {
    handler: Arc<T>,
    enabled: bool,
}

/// Three independent registries with per-entry enable flags (default on).
/// Flag persistence is the embedding editor's concern; only runtime
/// setters exist here.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: Mutex<BTreeMap<String, Registered<dyn CommandHandler>>>,
    resources: Mutex<BTreeMap<String, Registered<dyn ResourceHandler>>>,
    prompts: Mutex<BTreeMap<String, Registered<dyn PromptHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in handler set against `bridge`.
    ///
    /// `ConsoleHandler` lands in both the command and resource registries:
    /// one type, two interfaces, one registration call per interface.
    pub fn register_builtin(&self, bridge: &BridgeConnection) {
        let console = Arc::new(console::ConsoleHandler::new(bridge.clone()));
        self.register_command(Arc::new(menu::MenuHandler::new(bridge.clone())));
        self.register_command(Arc::clone(&console) as Arc<dyn CommandHandler>);
        self.register_resource(console as Arc<dyn ResourceHandler>);
        self.register_resource(Arc::new(assets::AssetsHandler::new(bridge.clone())));
        self.register_resource(Arc::new(assets::PackagesHandler::new(bridge.clone())));
        self.register_prompt(Arc::new(workflow::WorkflowPrompts::new()));
    }

    pub fn register_command(&self, handler: Arc<dyn CommandHandler>) {
        let prefix = handler.command_prefix().to_string();
        info!(prefix = %prefix, "command handler registered");
        self.commands.lock().unwrap().insert(
            prefix,
            Registered {
                handler,
                enabled: true,
            },
        );
    }

    pub fn register_resource(&self, handler: Arc<dyn ResourceHandler>) {
        let name = handler.resource_name().to_string();
        info!(resource = %name, template = %handler.uri_template(), "resource handler registered");
        self.resources.lock().unwrap().insert(
            name,
            Registered {
                handler,
                enabled: true,
            },
        );
    }

    pub fn register_prompt(&self, handler: Arc<dyn PromptHandler>) {
        let name = handler.prompt_name().to_string();
        info!(prompt = %name, "prompt handler registered");
        self.prompts.lock().unwrap().insert(
            name,
            Registered {
                handler,
                enabled: true,
            },
        );
    }

    // ─── Enable flags ───────────────────────────────────────────────────────

    pub fn set_command_enabled(&self, prefix: &str, enabled: bool) -> bool {
        match self.commands.lock().unwrap().get_mut(prefix) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_resource_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.resources.lock().unwrap().get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_prompt_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.prompts.lock().unwrap().get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    // ─── Lookups ────────────────────────────────────────────────────────────

    /// Resolve a tool name to `(prefix, enabled, handler)`. The prefix's
    /// tool table decides ownership, not the name's `_` split, so a
    /// handler may expose tool names that do not start with its prefix.
    pub fn command_for_tool(
        &self,
        tool_name: &str,
    ) -> Option<(String, bool, Arc<dyn CommandHandler>)> {
        let commands = self.commands.lock().unwrap();
        for (prefix, entry) in commands.iter() {
            if entry.handler.tool_definitions().contains_key(tool_name) {
                return Some((prefix.clone(), entry.enabled, Arc::clone(&entry.handler)));
            }
        }
        None
    }

    /// Every `(tool_name, definition)` pair across all command handlers.
    /// Disabled prefixes stay listed; invocation reports the disable.
    pub fn all_tool_definitions(&self) -> Vec<(String, ToolDefinition)> {
        let commands = self.commands.lock().unwrap();
        let mut out = Vec::new();
        for entry in commands.values() {
            for (name, def) in entry.handler.tool_definitions() {
                out.push((name, def));
            }
        }
        out
    }

    /// `(enabled, handler)` rows for every registered resource.
    pub fn resource_handlers(&self) -> Vec<(bool, Arc<dyn ResourceHandler>)> {
        self.resources
            .lock()
            .unwrap()
            .values()
            .map(|e| (e.enabled, Arc::clone(&e.handler)))
            .collect()
    }

    /// Enabled prompt handlers only; a disabled prompt is not exposed.
    pub fn enabled_prompt_handlers(&self) -> Vec<Arc<dyn PromptHandler>> {
        self.prompts
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    pub fn command_prefixes(&self) -> Vec<String> {
        self.commands.lock().unwrap().keys().cloned().collect()
    }
}

// ─── Shared schema helpers ────────────────────────────────────────────────────

/// JSON Schema for an object with the given `(name, type, description)`
/// properties and required list.
pub(crate) fn object_schema(props: &[(&str, &str, &str)], required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, ty, desc) in props {
        properties.insert(
            name.to_string(),
            json!({"type": ty, "description": desc}),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}
