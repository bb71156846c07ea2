//! MCP `resources/list`, `resources/templates/list`, and `resources/read`.
//!
//! A handler whose URI template contains `{param}` placeholders is listed
//! as a template and matched on read with placeholder extraction; a plain
//! URI is listed statically and matched exactly. Fetch results are
//! forwarded verbatim.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::BridgeError;
use crate::BridgeContext;

// ─── Descriptors ──────────────────────────────────────────────────────────────

/// One row of the `resources/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// One row of the `resources/templates/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTemplateDescriptor {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Static resources: handlers whose template carries no placeholder.
pub fn list_resources(ctx: &BridgeContext) -> Vec<ResourceDescriptor> {
    ctx.registry
        .resource_handlers()
        .into_iter()
        .filter(|(_, h)| !h.uri_template().contains('{'))
        .map(|(_, h)| ResourceDescriptor {
            uri: h.uri_template().to_string(),
            name: h.resource_name().to_string(),
            description: h.description().to_string(),
            mime_type: h.mime_type().to_string(),
        })
        .collect()
}

/// Templated resources: handlers whose template carries `{param}`
/// placeholders.
pub fn list_resource_templates(ctx: &BridgeContext) -> Vec<ResourceTemplateDescriptor> {
    ctx.registry
        .resource_handlers()
        .into_iter()
        .filter(|(_, h)| h.uri_template().contains('{'))
        .map(|(_, h)| ResourceTemplateDescriptor {
            uri_template: h.uri_template().to_string(),
            name: h.resource_name().to_string(),
            description: h.description().to_string(),
            mime_type: h.mime_type().to_string(),
        })
        .collect()
}

/// Resolve `uri` against the resource registry and fetch.
///
/// Template placeholders become the handler's `params`. A disabled
/// resource fails the fetch; an unmatched URI is a protocol error.
pub async fn read_resource(ctx: &BridgeContext, uri: &str) -> Result<Value, BridgeError> {
    for (enabled, handler) in ctx.registry.resource_handlers() {
        let template = handler.uri_template();
        let params = if template.contains('{') {
            match match_template(template, uri) {
                Some(params) => params,
                None => continue,
            }
        } else if template == uri {
            BTreeMap::new()
        } else {
            continue;
        };

        if !enabled {
            return Err(BridgeError::HandlerDisabled(
                handler.resource_name().to_string(),
            ));
        }

        debug!(uri, resource = handler.resource_name(), "resource read");
        let params_value = serde_json::to_value(params)
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;
        return handler.fetch(uri, params_value).await;
    }

    Err(BridgeError::Protocol(format!("unknown resource URI: {uri}")))
}

/// Match `uri` against `template`, extracting `{param}` placeholder
/// values. A placeholder is non-greedy up to the next literal character;
/// a trailing placeholder captures the rest of the URI.
pub fn match_template(template: &str, uri: &str) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    let mut t = template;
    let mut u = uri;

    loop {
        let Some(open) = t.find('{') else {
            return (t == u).then_some(params);
        };

        let (literal, rest) = t.split_at(open);
        u = u.strip_prefix(literal)?;
        let close = rest.find('}')?;
        let name = &rest[1..close];
        t = &rest[close + 1..];

        let value = match t.chars().next() {
            None => std::mem::take(&mut u),
            Some(delim) => {
                let end = u.find(delim)?;
                let (value, remainder) = u.split_at(end);
                u = remainder;
                value
            }
        };
        if value.is_empty() {
            return None;
        }
        params.insert(name.to_string(), value.to_string());
    }
}
