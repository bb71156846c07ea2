pub mod config;
pub mod editor;
pub mod error;
pub mod framing;
pub mod handlers;
pub mod hub;
pub mod mcp;
pub mod router;

use std::sync::Arc;

use config::BridgeConfig;
use handlers::{BridgeConnection, HandlerRegistry};
use hub::ClientHub;
use router::RequestRouter;

/// Shared bridge state passed to the MCP endpoint and background tasks.
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub hub: Arc<ClientHub>,
    pub router: Arc<RequestRouter>,
    pub registry: Arc<HandlerRegistry>,
    pub started_at: std::time::Instant,
}

impl BridgeContext {
    /// Wire hub, router, and the built-in handler set together. The hub is
    /// not started; call `ctx.hub.start()` to bind the listener.
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let router = Arc::new(RequestRouter::new(config.request_timeout));
        let hub = Arc::new(ClientHub::new(config.clone(), Arc::clone(&router)));

        let registry = Arc::new(HandlerRegistry::new());
        registry.register_builtin(&BridgeConnection::new(
            Arc::clone(&hub),
            Arc::clone(&router),
        ));

        Arc::new(Self {
            config,
            hub,
            router,
            registry,
            started_at: std::time::Instant::now(),
        })
    }

    /// The route handlers use to reach the active editor.
    pub fn connection(&self) -> BridgeConnection {
        BridgeConnection::new(Arc::clone(&self.hub), Arc::clone(&self.router))
    }

    /// Teardown: stop accepting, drop clients, reject pending requests.
    pub fn shutdown(&self) {
        self.hub.stop();
    }
}
