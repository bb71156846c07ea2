//! Correlated request/response routing between the MCP side and the
//! editor sockets.
//!
//! Every outbound request gets a process-unique stringified counter id and
//! a single-shot completion slot. The hub's read loops feed inbound
//! id-bearing messages back through [`RequestRouter::complete`]; timeouts,
//! disconnects, and shutdown each resolve the slot exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::hub::ClientHub;

struct Pending {
    /// The target client at the time of send. Disconnect fan-out rejects
    /// only entries whose target matches the disconnecting client.
    client_id: String,
    tx: oneshot::Sender<Result<Value, BridgeError>>,
}

pub struct RequestRouter {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
    timeout: Duration,
}

impl RequestRouter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Send `{command, type, params, id}` to the hub's active client and
    /// wait for the correlated response.
    ///
    /// Fails immediately with [`BridgeError::NoClientsConnected`] when the
    /// hub has no active client. A write error removes the pending entry
    /// and surfaces the error; no response within the configured timeout
    /// yields [`BridgeError::Timeout`].
    pub async fn send(
        &self,
        hub: &ClientHub,
        command: &str,
        kind: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        let (client_id, writer) = hub.active_target().ok_or(BridgeError::NoClientsConnected)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            id.clone(),
            Pending {
                client_id: client_id.clone(),
                tx,
            },
        );

        let envelope = json!({
            "command": command,
            "type": kind,
            "params": params,
            "id": id,
        });
        let mut line = envelope.to_string();
        line.push('\n');

        debug!(id = %id, command, client = %client_id, "routing request");

        // The hub lock is already released; only the per-socket write lock
        // is held across the write.
        let write_result = {
            let mut w = writer.lock().await;
            w.write_all(line.as_bytes()).await
        };
        if let Err(e) = write_result {
            self.pending.lock().unwrap().remove(&id);
            warn!(id = %id, client = %client_id, err = %e, "request write failed");
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Completion slot dropped without a value: the entry was torn
            // down during shutdown races. Treat as a closed connection.
            Ok(Err(_)) => Err(BridgeError::ConnectionClosed),
            Err(_elapsed) => {
                self.pending.lock().unwrap().remove(&id);
                Err(BridgeError::Timeout(self.timeout))
            }
        }
    }

    /// Resolve a pending request from an inbound id-bearing message.
    ///
    /// Returns `true` if a pending entry consumed the message. Unknown ids
    /// return `false` and are dropped by the caller (late replies after a
    /// timeout land here; they are not errors).
    pub fn complete(&self, id: &str, response: Value) -> bool {
        let entry = self.pending.lock().unwrap().remove(id);
        let Some(pending) = entry else {
            debug!(id, "response for unknown request id dropped");
            return false;
        };

        let succeeded = response.get("status").and_then(Value::as_str) == Some("success");
        let delivered = match response.get("result").cloned() {
            Some(result) if succeeded => result,
            _ => response,
        };

        // Receiver may have been dropped between the timeout firing and the
        // entry removal; a failed send is the resolved-then-discarded case.
        let _ = pending.tx.send(Ok(delivered));
        true
    }

    /// Reject every pending request targeted at `client_id`. Requests
    /// targeted at other clients are unaffected.
    pub fn fail_client(&self, client_id: &str) {
        let rejected: Vec<Pending> = {
            let mut pending = self.pending.lock().unwrap();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.client_id == client_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };

        if !rejected.is_empty() {
            warn!(
                client = client_id,
                count = rejected.len(),
                "rejecting in-flight requests for disconnected client"
            );
        }
        for p in rejected {
            let _ = p.tx.send(Err(BridgeError::ConnectionClosed));
        }
    }

    /// Reject every outstanding request. Used on shutdown.
    pub fn fail_all(&self) {
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, p)| p).collect()
        };
        for p in drained {
            let _ = p.tx.send(Err(BridgeError::ConnectionClosed));
        }
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    #[cfg(test)]
    pub(crate) fn register_for_test(
        &self,
        client_id: &str,
    ) -> (String, oneshot::Receiver<Result<Value, BridgeError>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            id.clone(),
            Pending {
                client_id: client_id.to_string(),
                tx,
            },
        );
        (id, rx)
    }
}
