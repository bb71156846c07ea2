//! Multi-client TCP front-end.
//!
//! The hub owns the listener, one read task per client socket, the client
//! map with active-client election, and the registration rewrite that
//! replaces an address-derived id with the editor's persistent one. All
//! shared state sits behind one coarse mutex; the lock is never held
//! across socket I/O (write halves are `Arc`-cloned out first).

pub mod discovery;
pub mod event;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::framing::{Frame, FrameBuffer};
use crate::router::RequestRouter;
use discovery::AnnounceKind;
use event::{HubEvent, HubEvents};

/// Identity metadata supplied by a client's registration message. None of
/// it is validated; every field is an opaque display string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientInfo {
    pub product_name: Option<String>,
    pub company_name: Option<String>,
    pub unity_version: Option<String>,
    pub platform: Option<String>,
    pub is_batch_mode: Option<bool>,
    pub device_name: Option<String>,
    pub project_path: Option<String>,
    pub project_path_hash: Option<String>,
}

/// Owned snapshot row returned by [`ClientHub::get_connected_clients`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub id: String,
    pub is_active: bool,
    pub info: Option<ClientInfo>,
}

type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

struct ClientRecord {
    /// Connection sequence number. Guards teardown: a stale socket's
    /// disconnect must not remove a record a newer connection re-registered
    /// under the same id.
    conn: u64,
    writer: SharedWriter,
    info: Option<ClientInfo>,
    active: bool,
    reader: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<String, ClientRecord>,
    active_client: Option<String>,
    next_conn: u64,
}

pub struct ClientHub {
    config: BridgeConfig,
    state: Mutex<HubState>,
    events: HubEvents,
    router: Arc<RequestRouter>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    bound: Mutex<Option<SocketAddr>>,
}

impl ClientHub {
    pub fn new(config: BridgeConfig, router: Arc<RequestRouter>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            state: Mutex::new(HubState::default()),
            events: HubEvents::new(),
            router,
            shutdown_tx,
            shutdown_rx,
            accept_task: Mutex::new(None),
            bound: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &HubEvents {
        &self.events
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind the TCP listener, send the startup discovery announce, and
    /// spawn the accept loop. Returns the bound address.
    ///
    /// Bind failure is fatal to the caller; everything after the bind is
    /// isolated per socket.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, BridgeError> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            BridgeError::Configuration(format!("failed to bind TCP listener on {bind_addr}: {e}"))
        })?;
        let local_addr = listener.local_addr()?;
        *self.bound.lock().unwrap() = Some(local_addr);
        info!(addr = %local_addr, "client hub listening");

        discovery::announce(
            AnnounceKind::Startup,
            self.config.advertised_host(),
            local_addr.port(),
            self.config.discovery_port,
        )
        .await;

        let hub = Arc::clone(self);
        let mut shutdown = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.changed() => {
                        info!("client hub accept loop stopping");
                        break;
                    }

                    conn = listener.accept() => {
                        match conn {
                            Ok((stream, peer)) => hub.accept_client(stream, peer),
                            Err(e) => {
                                warn!(err = %e, "accept error");
                                continue;
                            }
                        }
                    }
                }
            }
        });
        *self.accept_task.lock().unwrap() = Some(handle);

        Ok(local_addr)
    }

    /// Tear everything down: stop accepting, drop every client, reject
    /// every pending request. Doubles as the reset hook for tests.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.accept_task.lock().unwrap().take() {
            handle.abort();
        }

        let dropped: Vec<(String, ClientRecord)> = {
            let mut state = self.state.lock().unwrap();
            state.active_client = None;
            state.clients.drain().collect()
        };
        for (id, record) in dropped {
            if let Some(reader) = record.reader {
                reader.abort();
            }
            debug!(client = %id, "client dropped on hub stop");
        }
        self.router.fail_all();
    }

    // ─── Connection lifecycle ───────────────────────────────────────────────

    fn accept_client(self: &Arc<Self>, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let client_id = format!("unity-{}:{}", peer.ip(), peer.port());
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(write_half));

        let (conn, became_active) = {
            let mut state = self.state.lock().unwrap();
            state.next_conn += 1;
            let conn = state.next_conn;
            let became_active = state.active_client.is_none();
            state.clients.insert(
                client_id.clone(),
                ClientRecord {
                    conn,
                    writer,
                    info: None,
                    active: became_active,
                    reader: None,
                },
            );
            if became_active {
                state.active_client = Some(client_id.clone());
            }
            (conn, became_active)
        };

        info!(client = %client_id, "client connected");
        self.events.broadcast(HubEvent::ClientConnected {
            id: client_id.clone(),
        });
        if became_active {
            self.events.broadcast(HubEvent::ActiveClientChanged {
                id: Some(client_id.clone()),
            });
        }

        let hub = Arc::clone(self);
        let handle = tokio::spawn(async move {
            hub.read_loop(client_id, conn, read_half).await;
        });
        self.store_reader_handle(conn, handle);
    }

    fn store_reader_handle(&self, conn: u64, handle: JoinHandle<()>) {
        let mut state = self.state.lock().unwrap();
        match state.clients.values_mut().find(|r| r.conn == conn) {
            Some(record) => record.reader = Some(handle),
            // Record already gone (instant disconnect); nothing to keep.
            None => handle.abort(),
        }
    }

    async fn read_loop(&self, initial_id: String, conn: u64, mut read_half: OwnedReadHalf) {
        let mut client_id = initial_id;
        let mut framer = FrameBuffer::new();
        let mut buf = [0u8; 8192];
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                n = read_half.read(&mut buf) => match n {
                    Ok(0) => break,
                    Ok(n) => {
                        let frames = match framer.feed(&buf[..n]) {
                            Ok(frames) => frames,
                            Err(e) => {
                                self.events.broadcast(HubEvent::ClientError {
                                    id: client_id.clone(),
                                    message: e.to_string(),
                                });
                                warn!(client = %client_id, err = %e, "dropping client");
                                break;
                            }
                        };
                        for frame in frames {
                            match frame {
                                Frame::Message(value) => {
                                    if let Some(new_id) = self.dispatch_inbound(&client_id, conn, value) {
                                        client_id = new_id;
                                    }
                                }
                                Frame::Invalid { raw, error } => {
                                    warn!(client = %client_id, err = %error, "unparseable frame skipped");
                                    self.events.broadcast(HubEvent::ClientError {
                                        id: client_id.clone(),
                                        message: format!("invalid frame ({error}): {raw}"),
                                    });
                                }
                            }
                        }
                    }
                    Err(e) => {
                        self.events.broadcast(HubEvent::ClientError {
                            id: client_id.clone(),
                            message: e.to_string(),
                        });
                        break;
                    }
                },
            }
        }

        self.remove_client(&client_id, conn);
    }

    /// Route one framed inbound object. Returns the rewritten id when the
    /// frame was a registration.
    fn dispatch_inbound(&self, client_id: &str, conn: u64, value: Value) -> Option<String> {
        if value.get("type").and_then(Value::as_str) == Some("registration") {
            return self.register_client(client_id, conn, &value);
        }

        if let Some(id) = envelope_id(&value) {
            // Correlated response. Unknown ids are late replies after a
            // timeout; dropped inside `complete`.
            self.router.complete(&id, value);
            return None;
        }

        self.events.broadcast(HubEvent::Message {
            id: client_id.to_string(),
            payload: value,
        });
        None
    }

    // ─── Registration rewrite ───────────────────────────────────────────────

    fn register_client(&self, old_id: &str, conn: u64, message: &Value) -> Option<String> {
        let Some(new_id) = message
            .get("clientId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            warn!(client = %old_id, "registration without clientId ignored");
            return None;
        };
        let new_id = new_id.to_string();
        let info: Option<ClientInfo> = message
            .get("clientInfo")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let displaced = {
            let mut state = self.state.lock().unwrap();

            // The record must still be this connection's.
            let mut record = match state.clients.remove(old_id) {
                Some(r) if r.conn == conn => r,
                Some(r) => {
                    state.clients.insert(old_id.to_string(), r);
                    return None;
                }
                None => return None,
            };

            // Another socket already holds the target id: the newest
            // registration wins, the older record is dropped.
            let displaced = state.clients.remove(&new_id);
            if let Some(ref old) = displaced {
                record.active = record.active || old.active;
            }

            record.info = info.clone();
            let was_active = record.active;
            state.clients.insert(new_id.clone(), record);
            if was_active {
                state.active_client = Some(new_id.clone());
            }
            displaced
        };

        if let Some(old) = displaced {
            if let Some(reader) = old.reader {
                reader.abort();
            }
            warn!(client = %new_id, "duplicate registration — previous socket displaced");
        }

        info!(old = %old_id, new = %new_id, "client registered");
        self.events.broadcast(HubEvent::ClientRegistered {
            id: new_id.clone(),
            info,
        });
        Some(new_id)
    }

    // ─── Teardown + election ────────────────────────────────────────────────

    fn remove_client(&self, client_id: &str, conn: u64) {
        let promoted = {
            let mut state = self.state.lock().unwrap();
            let record = match state.clients.remove(client_id) {
                Some(r) if r.conn == conn => r,
                // A newer connection owns this id now; stale teardown.
                Some(r) => {
                    state.clients.insert(client_id.to_string(), r);
                    return;
                }
                None => return,
            };

            if record.active {
                // Promote an arbitrary remaining client; deterministic
                // within a run (first key of the map iteration).
                let next = state.clients.keys().next().cloned();
                if let Some(ref id) = next {
                    if let Some(r) = state.clients.get_mut(id) {
                        r.active = true;
                    }
                }
                state.active_client = next.clone();
                Some(next)
            } else {
                None
            }
        };

        info!(client = %client_id, "client disconnected");
        self.router.fail_client(client_id);
        self.events.broadcast(HubEvent::ClientDisconnected {
            id: client_id.to_string(),
        });
        if let Some(next) = promoted {
            self.events
                .broadcast(HubEvent::ActiveClientChanged { id: next });
        }
    }

    // ─── Queries and commands ───────────────────────────────────────────────

    /// Make `id` the active client. Returns false if the id is unknown.
    pub fn set_active_client(&self, id: &str) -> bool {
        let changed = {
            let mut state = self.state.lock().unwrap();
            if !state.clients.contains_key(id) {
                return false;
            }
            if state.active_client.as_deref() == Some(id) {
                false
            } else {
                if let Some(prev) = state.active_client.take() {
                    if let Some(r) = state.clients.get_mut(&prev) {
                        r.active = false;
                    }
                }
                if let Some(r) = state.clients.get_mut(id) {
                    r.active = true;
                }
                state.active_client = Some(id.to_string());
                true
            }
        };
        if changed {
            self.events.broadcast(HubEvent::ActiveClientChanged {
                id: Some(id.to_string()),
            });
        }
        true
    }

    pub fn active_client_id(&self) -> Option<String> {
        self.state.lock().unwrap().active_client.clone()
    }

    /// Snapshot of `{id, isActive, info}` rows. Callers may retain it.
    pub fn get_connected_clients(&self) -> Vec<ClientSnapshot> {
        let state = self.state.lock().unwrap();
        state
            .clients
            .iter()
            .map(|(id, record)| ClientSnapshot {
                id: id.clone(),
                is_active: record.active,
                info: record.info.clone(),
            })
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().unwrap().clients.len()
    }

    /// The active client's id and write handle, copied out of the lock so
    /// callers never write while holding hub state.
    pub fn active_target(&self) -> Option<(String, SharedWriter)> {
        let state = self.state.lock().unwrap();
        let id = state.active_client.clone()?;
        let writer = Arc::clone(&state.clients.get(&id)?.writer);
        Some((id, writer))
    }

    /// Send a fresh discovery announce for `unity_listClients`.
    pub async fn announce_list_clients(&self) {
        let port = self
            .bound
            .lock()
            .unwrap()
            .map(|a| a.port())
            .unwrap_or(self.config.port);
        discovery::announce(
            AnnounceKind::ListClients,
            self.config.advertised_host(),
            port,
            self.config.discovery_port,
        )
        .await;
    }
}

/// Extract a correlation id: the `id` field as a string (numbers are
/// stringified so either JSON form correlates).
fn envelope_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
