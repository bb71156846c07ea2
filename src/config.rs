use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 27182;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LIST_CLIENTS_WAIT_MS: u64 = 3000;

// ─── TOML config file ─────────────────────────────────────────────────────────

/// Optional `config.toml` next to the bridge. All fields are overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// TCP host the editor listener binds (default: 127.0.0.1).
    host: Option<String>,
    /// TCP port the editor listener binds (default: 27182).
    port: Option<u16>,
    /// Bind 0.0.0.0 regardless of `host` (default: false).
    bind_all: Option<bool>,
    /// UDP discovery port (default: listener port + 1).
    discovery_port: Option<u16>,
    /// Per-request timeout in seconds (default: 30).
    request_timeout_secs: Option<u64>,
    /// Log level filter string, e.g. "debug", "info,unityd=trace" (default: "info").
    log: Option<String>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config file — using defaults");
            None
        }
    }
}

// ─── BridgeConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Host the TCP listener binds. `bind_all` overrides this with 0.0.0.0.
    pub host: String,
    /// Port the TCP listener binds.
    pub port: u16,
    /// Bind all interfaces instead of `host`.
    pub bind_all: bool,
    /// UDP port for the single-shot discovery broadcast.
    pub discovery_port: u16,
    /// How long a routed request may wait for the editor's reply.
    pub request_timeout: Duration,
    /// How long `unity_listClients` waits after the announce before
    /// returning the enumeration.
    pub list_clients_wait: Duration,
    /// Log level filter string.
    pub log: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(None, None, false, None, None)
    }
}

impl BridgeConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env, passed as `Some(value)` from clap
    ///   2. TOML file at `config_path`
    ///   3. Built-in defaults
    pub fn new(
        host: Option<String>,
        port: Option<u16>,
        bind_all: bool,
        config_path: Option<&Path>,
        log: Option<String>,
    ) -> Self {
        let toml = config_path
            .and_then(load_toml)
            .unwrap_or_default();

        let host = host
            .or(toml.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let bind_all = bind_all || toml.bind_all.unwrap_or(false);
        let discovery_port = toml.discovery_port.unwrap_or(port.wrapping_add(1));
        let request_timeout = Duration::from_secs(
            toml.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        Self {
            host,
            port,
            bind_all,
            discovery_port,
            request_timeout,
            list_clients_wait: Duration::from_millis(DEFAULT_LIST_CLIENTS_WAIT_MS),
            log,
        }
    }

    /// The address the TCP listener binds: `0.0.0.0` with `bind_all`,
    /// otherwise the configured host.
    pub fn bind_addr(&self) -> String {
        if self.bind_all {
            format!("0.0.0.0:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The host advertised in the discovery payload. Always the configured
    /// host, never 0.0.0.0 (clients cannot connect to a wildcard address).
    pub fn advertised_host(&self) -> &str {
        &self.host
    }
}
