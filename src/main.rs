use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use unityd::config::BridgeConfig;
use unityd::mcp::McpServer;
use unityd::BridgeContext;

#[derive(Parser)]
#[command(
    name = "unityd",
    about = "Unity MCP bridge — routes MCP tool/resource/prompt calls to connected Unity editors",
    version
)]
struct Args {
    /// TCP host the Unity listener binds
    #[arg(long, env = "UNITY_MCP_HOST")]
    host: Option<String>,

    /// TCP port the Unity listener binds
    #[arg(long, env = "UNITY_MCP_PORT")]
    port: Option<u16>,

    /// Bind 0.0.0.0 instead of the configured host
    #[arg(long, env = "UNITY_MCP_BIND_ALL")]
    bind_all: bool,

    /// Optional TOML config file with override values
    #[arg(long, env = "UNITY_MCP_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "UNITY_MCP_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "UNITY_MCP_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = BridgeConfig::new(
        args.host,
        args.port,
        args.bind_all,
        args.config.as_deref(),
        args.log,
    );

    // Guard must stay alive for the process lifetime.
    let _log_guard = setup_logging(&config.log, args.log_file.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "unityd starting");
    info!(
        bind = %config.bind_addr(),
        discovery_port = config.discovery_port,
        "config loaded"
    );

    let ctx = BridgeContext::new(config);

    // Listener bind failure is the one fatal startup error.
    let bound = ctx.hub.start().await?;
    info!(addr = %bound, "accepting Unity clients");

    let mcp = McpServer::new(ctx.clone());

    tokio::select! {
        // The MCP host owns our lifetime: stdin EOF means it exited.
        result = mcp.run() => {
            if let Err(e) = result {
                warn!(err = %e, "MCP endpoint stopped with error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    ctx.shutdown();
    info!("unityd stopped");
    Ok(())
}

/// Resolves on SIGTERM (Unix) or Ctrl-C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(err = %e, "failed to register SIGTERM handler");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

/// Initialize the tracing subscriber.
///
/// stdout belongs to the MCP transport, so the console layer writes to
/// stderr. If `log_file` is set, logs additionally go to a daily-rolling
/// file; if the log directory cannot be created, falls back to
/// stderr-only with a warning. Never panics on a bad log path.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("unityd.log"));

        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stderr",
                dir.display()
            );
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .with_writer(std::io::stderr)
                .compact()
                .init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(log_level))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .with_writer(std::io::stderr)
            .compact()
            .init();
        None
    }
}
