//! Editor-side handler registries and envelope dispatch.
//!
//! Envelopes select a sub-registry by `type` (`"resource"` or command),
//! then a handler by command prefix or resource name. Handlers are plain
//! synchronous functions: they run on the UI thread via the main-thread
//! queue, never on the I/O task.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use super::main_thread::MainThreadQueue;
use super::MAIN_THREAD_TIMEOUT_MESSAGE;

/// A command family executed inside the editor, keyed by prefix.
pub trait EditorCommandHandler: Send + Sync {
    fn prefix(&self) -> &str;
    /// Runs on the UI thread. Errors become `{status: "error"}` envelopes.
    fn execute(&self, action: &str, params: &Value) -> Result<Value, String>;
}

/// A resource served by the editor, keyed by resource name.
pub trait EditorResourceHandler: Send + Sync {
    fn name(&self) -> &str;
    /// Runs on the UI thread. Returns `{contents: [...]}` payloads.
    fn fetch(&self, params: &Value) -> Result<Value, String>;
}

struct Entry<T: ?Sized> {
    handler: Arc<T>,
    enabled: bool,
}

/// Command and resource sub-registries with per-handler enable flags.
/// Persisting the flags is the embedding editor's concern.
#[derive(Default)]
pub struct EditorRegistry {
    commands: Mutex<BTreeMap<String, Entry<dyn EditorCommandHandler>>>,
    resources: Mutex<BTreeMap<String, Entry<dyn EditorResourceHandler>>>,
}

impl EditorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command(&self, handler: Arc<dyn EditorCommandHandler>) {
        self.commands.lock().unwrap().insert(
            handler.prefix().to_string(),
            Entry {
                handler,
                enabled: true,
            },
        );
    }

    pub fn register_resource(&self, handler: Arc<dyn EditorResourceHandler>) {
        self.resources.lock().unwrap().insert(
            handler.name().to_string(),
            Entry {
                handler,
                enabled: true,
            },
        );
    }

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

    fn command(&self, prefix: &str) -> Option<(bool, Arc<dyn EditorCommandHandler>)> {
        self.commands
            .lock()
            .unwrap()
            .get(prefix)
            .map(|e| (e.enabled, Arc::clone(&e.handler)))
    }

    fn resource(&self, name: &str) -> Option<(bool, Arc<dyn EditorResourceHandler>)> {
        self.resources
            .lock()
            .unwrap()
            .get(name)
            .map(|e| (e.enabled, Arc::clone(&e.handler)))
    }
}

// ─── Envelope dispatch ────────────────────────────────────────────────────────

/// Process one parsed envelope and produce the reply envelope.
///
/// The handler call is marshalled onto `queue` and awaited for at most
/// `barrier`; expiry answers with the fixed timeout message and discards
/// the late result.
pub async fn dispatch_envelope(
    registry: &EditorRegistry,
    queue: &MainThreadQueue,
    barrier: Duration,
    envelope: &Value,
) -> Value {
    let id = envelope.get("id").cloned().unwrap_or(Value::Null);
    let params = envelope.get("params").cloned().unwrap_or_else(|| json!({}));

    let outcome = match envelope.get("type").and_then(Value::as_str).unwrap_or("") {
        "" => dispatch_command(registry, queue, barrier, envelope, params).await,
        "resource" => dispatch_resource(registry, queue, barrier, envelope, params).await,
        other => Err(format!("Unknown envelope type '{other}'")),
    };

    match outcome {
        Ok(result) => json!({"status": "success", "result": result, "id": id}),
        Err(message) => {
            warn!(err = %message, "envelope dispatch failed");
            json!({"status": "error", "message": message, "id": id})
        }
    }
}

async fn dispatch_command(
    registry: &EditorRegistry,
    queue: &MainThreadQueue,
    barrier: Duration,
    envelope: &Value,
    params: Value,
) -> Result<Value, String> {
    let command = envelope
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| "No command specified".to_string())?;
    let (prefix, action) = command
        .split_once('.')
        .ok_or_else(|| format!("Malformed command '{command}' (expected prefix.action)"))?;

    let (enabled, handler) = registry
        .command(prefix)
        .ok_or_else(|| format!("Unknown command prefix '{prefix}'"))?;
    if !enabled {
        return Err(format!("Command prefix '{prefix}' is disabled"));
    }

    let action = action.to_string();
    let completion = queue.submit(move || handler.execute(&action, &params));
    await_barrier(barrier, completion).await
}

async fn dispatch_resource(
    registry: &EditorRegistry,
    queue: &MainThreadQueue,
    barrier: Duration,
    envelope: &Value,
    params: Value,
) -> Result<Value, String> {
    let name = envelope
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| "No resource specified".to_string())?;

    let (enabled, handler) = registry
        .resource(name)
        .ok_or_else(|| format!("Unknown resource '{name}'"))?;
    if !enabled {
        return Err(format!("Resource '{name}' is disabled"));
    }

    let completion = queue.submit(move || handler.fetch(&params));
    await_barrier(barrier, completion).await
}

async fn await_barrier(
    barrier: Duration,
    completion: tokio::sync::oneshot::Receiver<Result<Value, String>>,
) -> Result<Value, String> {
    match tokio::time::timeout(barrier, completion).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err("Main thread queue closed".to_string()),
        Err(_elapsed) => Err(MAIN_THREAD_TIMEOUT_MESSAGE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoCommands;

    impl EditorCommandHandler for EchoCommands {
        fn prefix(&self) -> &str {
            "echo"
        }
        fn execute(&self, action: &str, params: &Value) -> Result<Value, String> {
            match action {
                "fail" => Err("echo failed".to_string()),
                _ => Ok(json!({"action": action, "params": params})),
            }
        }
    }

    struct StaticResource;

    impl EditorResourceHandler for StaticResource {
        fn name(&self) -> &str {
            "fixture"
        }
        fn fetch(&self, _params: &Value) -> Result<Value, String> {
            Ok(json!({"contents": [{"uri": "unity://fixture", "text": "[]"}]}))
        }
    }

    fn setup() -> (EditorRegistry, Arc<MainThreadQueue>) {
        let registry = EditorRegistry::new();
        registry.register_command(Arc::new(EchoCommands));
        registry.register_resource(Arc::new(StaticResource));
        (registry, Arc::new(MainThreadQueue::new()))
    }

    /// Drive the queue the way a frame tick would while a dispatch waits.
    fn spawn_pump(queue: &Arc<MainThreadQueue>) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(queue);
        tokio::spawn(async move {
            loop {
                queue.pump();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    }

    #[tokio::test]
    async fn command_success_wraps_result_and_echoes_id() {
        let (registry, queue) = setup();
        let pump = spawn_pump(&queue);

        let reply = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_secs(1),
            &json!({"command": "echo.run", "type": "", "params": {"x": 1}, "id": "9"}),
        )
        .await;

        pump.abort();
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["id"], "9");
        assert_eq!(reply["result"]["action"], "run");
        assert_eq!(reply["result"]["params"]["x"], 1);
    }

    #[tokio::test]
    async fn handler_error_becomes_error_envelope() {
        let (registry, queue) = setup();
        let pump = spawn_pump(&queue);

        let reply = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_secs(1),
            &json!({"command": "echo.fail", "id": "3"}),
        )
        .await;

        pump.abort();
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["message"], "echo failed");
        assert_eq!(reply["id"], "3");
    }

    #[tokio::test]
    async fn each_malformed_shape_gets_a_distinct_message() {
        let (registry, queue) = setup();

        let missing = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_millis(100),
            &json!({"id": "1"}),
        )
        .await;
        assert_eq!(missing["message"], "No command specified");

        let malformed = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_millis(100),
            &json!({"command": "nodot", "id": "2"}),
        )
        .await;
        assert!(malformed["message"].as_str().unwrap().contains("Malformed command"));

        let unknown = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_millis(100),
            &json!({"command": "ghost.run", "id": "3"}),
        )
        .await;
        assert!(unknown["message"].as_str().unwrap().contains("Unknown command prefix"));

        registry.set_command_enabled("echo", false);
        let disabled = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_millis(100),
            &json!({"command": "echo.run", "id": "4"}),
        )
        .await;
        assert!(disabled["message"].as_str().unwrap().contains("disabled"));
    }

    #[tokio::test]
    async fn unknown_type_is_a_protocol_error() {
        let (registry, queue) = setup();
        let reply = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_millis(100),
            &json!({"command": "echo.run", "type": "mystery", "id": "5"}),
        )
        .await;
        assert_eq!(reply["status"], "error");
        assert!(reply["message"].as_str().unwrap().contains("Unknown envelope type"));
    }

    #[tokio::test]
    async fn resource_type_routes_to_resource_registry() {
        let (registry, queue) = setup();
        let pump = spawn_pump(&queue);

        let reply = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_secs(1),
            &json!({"command": "fixture", "type": "resource", "id": "7"}),
        )
        .await;

        pump.abort();
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["result"]["contents"][0]["uri"], "unity://fixture");
    }

    #[tokio::test]
    async fn stalled_frame_tick_times_out_with_the_fixed_message() {
        let (registry, queue) = setup();
        // No pump: the UI thread never drains.

        let reply = dispatch_envelope(
            &registry,
            &queue,
            Duration::from_millis(50),
            &json!({"command": "echo.run", "id": "8"}),
        )
        .await;

        assert_eq!(reply["status"], "error");
        assert_eq!(reply["message"], MAIN_THREAD_TIMEOUT_MESSAGE);
        assert_eq!(reply["id"], "8");

        // The late drain runs the handler, but nobody is listening.
        assert_eq!(queue.pump(), 1);
    }

    #[tokio::test]
    async fn handler_calls_are_counted_not_duplicated() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        struct Counting;
        impl EditorCommandHandler for Counting {
            fn prefix(&self) -> &str {
                "count"
            }
            fn execute(&self, _action: &str, _params: &Value) -> Result<Value, String> {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(json!({}))
            }
        }

        let registry = EditorRegistry::new();
        registry.register_command(Arc::new(Counting));
        let queue = Arc::new(MainThreadQueue::new());
        let pump = spawn_pump(&queue);

        dispatch_envelope(
            &registry,
            &queue,
            Duration::from_secs(1),
            &json!({"command": "count.tick", "id": "1"}),
        )
        .await;

        pump.abort();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
