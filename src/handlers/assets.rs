//! Project content resources: asset inspection and package enumeration.

use async_trait::async_trait;
use serde_json::Value;

use super::{BridgeConnection, ResourceHandler};
use crate::error::BridgeError;

/// Templated resource: metadata for a single asset under `Assets/`.
pub struct AssetsHandler {
    bridge: BridgeConnection,
}

impl AssetsHandler {
    pub fn new(bridge: BridgeConnection) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl ResourceHandler for AssetsHandler {
    fn resource_name(&self) -> &str {
        "assets"
    }

    fn description(&self) -> &str {
        "Metadata for a project asset by its path"
    }

    fn uri_template(&self) -> &str {
        "unity://assets/{assetPath}"
    }

    async fn fetch(&self, uri: &str, params: Value) -> Result<Value, BridgeError> {
        self.bridge
            .send_resource(self.resource_name(), with_uri(params, uri))
            .await
    }
}

/// Static resource: every package installed in the project manifest.
pub struct PackagesHandler {
    bridge: BridgeConnection,
}

impl PackagesHandler {
    pub fn new(bridge: BridgeConnection) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl ResourceHandler for PackagesHandler {
    fn resource_name(&self) -> &str {
        "packages"
    }

    fn description(&self) -> &str {
        "Installed packages from the project manifest"
    }

    fn uri_template(&self) -> &str {
        "unity://packages"
    }

    async fn fetch(&self, uri: &str, params: Value) -> Result<Value, BridgeError> {
        self.bridge
            .send_resource(self.resource_name(), with_uri(params, uri))
            .await
    }
}

fn with_uri(params: Value, uri: &str) -> Value {
    let mut payload = match params {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    payload.insert("uri".to_string(), Value::String(uri.to_string()));
    Value::Object(payload)
}
