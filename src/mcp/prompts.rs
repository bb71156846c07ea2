//! MCP `prompts/list` and `prompts/get`.

use serde_json::{json, Map, Value};

use crate::error::BridgeError;
use crate::handlers::PromptDefinition;
use crate::BridgeContext;

/// `prompts/list` rows for every prompt of every enabled prompt handler.
/// Disabled handlers are absent entirely.
pub fn list_prompts(ctx: &BridgeContext) -> Vec<Value> {
    let mut out = Vec::new();
    for handler in ctx.registry.enabled_prompt_handlers() {
        for (name, def) in handler.prompt_definitions() {
            let arguments: Vec<Value> = def
                .additional_properties
                .iter()
                .map(|(arg, decl)| {
                    json!({
                        "name": arg,
                        "description": decl.get("description").cloned().unwrap_or(Value::Null),
                        "required": decl.get("required").and_then(Value::as_bool).unwrap_or(false),
                    })
                })
                .collect();

            let mut row = json!({
                "name": name,
                "description": def.description,
            });
            if !arguments.is_empty() {
                row["arguments"] = Value::Array(arguments);
            }
            out.push(row);
        }
    }
    out
}

/// `prompts/get`: render the named template into a single user message.
pub fn get_prompt(
    ctx: &BridgeContext,
    name: &str,
    arguments: &Map<String, Value>,
) -> Result<Value, BridgeError> {
    let def = find_prompt(ctx, name)
        .ok_or_else(|| BridgeError::Protocol(format!("unknown prompt: {name}")))?;

    let text = render_template(&def.template, arguments);
    Ok(json!({
        "description": def.description,
        "messages": [{
            "role": "user",
            "content": {"type": "text", "text": text},
        }]
    }))
}

fn find_prompt(ctx: &BridgeContext, name: &str) -> Option<PromptDefinition> {
    ctx.registry
        .enabled_prompt_handlers()
        .into_iter()
        .find_map(|h| h.prompt_definitions().remove(name))
}

/// Replace every `{key}` with the stringified parameter value, once per
/// supplied key, globally. Placeholders with no matching parameter are
/// left untouched.
pub fn render_template(template: &str, arguments: &Map<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in arguments {
        let placeholder = format!("{{{key}}}");
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}
