//! Editor-side connection plumbing.
//!
//! [`EditorServer`] is the control listener: it accepts at most one
//! connection at a time and replaces the prior one on a new accept.
//! [`EditorClient`] is the outbound form used against a running bridge:
//! dial, register an identity, then serve envelopes on the same socket.
//! Both feed the shared dispatch core in [`registry`](super::registry).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::framing::{Frame, FrameBuffer};
use crate::hub::ClientInfo;

use super::main_thread::MainThreadQueue;
use super::registry::{dispatch_envelope, EditorRegistry};

/// Shared per-connection loop: frame, dispatch, reply.
async fn serve_connection(
    mut stream: TcpStream,
    registry: Arc<EditorRegistry>,
    queue: Arc<MainThreadQueue>,
    barrier: Duration,
) {
    let mut framer = FrameBuffer::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(err = %e, "control connection read error");
                break;
            }
        };

        let frames = match framer.feed(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(err = %e, "control connection dropped");
                break;
            }
        };

        for frame in frames {
            let reply = match frame {
                Frame::Message(envelope) => {
                    dispatch_envelope(&registry, &queue, barrier, &envelope).await
                }
                Frame::Invalid { error, .. } => {
                    json!({"status": "error", "message": format!("Invalid JSON: {error}"), "id": null})
                }
            };
            let mut line = reply.to_string();
            line.push('\n');
            if let Err(e) = stream.write_all(line.as_bytes()).await {
                debug!(err = %e, "control connection write error");
                return;
            }
        }
    }
}

// ─── Control listener ─────────────────────────────────────────────────────────

/// Accepts the bridge's control connection. A second accept displaces the
/// first; only the newest connection is served.
pub struct EditorServer {
    registry: Arc<EditorRegistry>,
    queue: Arc<MainThreadQueue>,
    barrier: Duration,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    current: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EditorServer {
    pub fn new(
        registry: Arc<EditorRegistry>,
        queue: Arc<MainThreadQueue>,
        barrier: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            barrier,
            accept_task: Mutex::new(None),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind `addr` and start accepting. Returns the bound address.
    pub async fn start(&self, addr: &str) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "editor control listener ready");

        let registry = Arc::clone(&self.registry);
        let queue = Arc::clone(&self.queue);
        let barrier = self.barrier;
        let current = Arc::clone(&self.current);

        let handle = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(err = %e, "editor accept error");
                        continue;
                    }
                };
                info!(peer = %peer, "control connection accepted");

                let task = tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&registry),
                    Arc::clone(&queue),
                    barrier,
                ));

                // One control connection at a time: displace the prior.
                let prior = current.lock().unwrap().replace(task);
                if let Some(prior) = prior {
                    info!("prior control connection displaced");
                    prior.abort();
                }
            }
        });
        *self.accept_task.lock().unwrap() = Some(handle);

        Ok(local_addr)
    }

    pub fn stop(&self) {
        if let Some(handle) = self.accept_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.current.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for EditorServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Outbound client ──────────────────────────────────────────────────────────

/// Dials a bridge, sends the registration envelope, then serves command
/// and resource envelopes arriving on the connection.
pub struct EditorClient {
    task: JoinHandle<()>,
}

impl EditorClient {
    pub async fn connect(
        addr: &str,
        client_id: &str,
        info: ClientInfo,
        registry: Arc<EditorRegistry>,
        queue: Arc<MainThreadQueue>,
        barrier: Duration,
    ) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;

        let registration = json!({
            "type": "registration",
            "clientId": client_id,
            "clientInfo": info,
        });
        let mut line = registration.to_string();
        line.push('\n');
        stream.write_all(line.as_bytes()).await?;
        info!(client_id, addr, "registered with bridge");

        let task = tokio::spawn(serve_connection(stream, registry, queue, barrier));
        Ok(Self { task })
    }

    /// Drop the connection. In-flight bridge requests targeting this
    /// client will be rejected by the bridge's disconnect fan-out.
    pub fn shutdown(self) {
        self.task.abort();
    }
}
