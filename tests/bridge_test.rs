//! End-to-end tests for the bridge: real hub on a free port, real TCP
//! clients on the other side.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use unityd::config::BridgeConfig;
use unityd::error::BridgeError;
use unityd::mcp::McpServer;
use unityd::BridgeContext;

/// Start a bridge on an ephemeral port with short test timeouts.
async fn start_test_bridge() -> (Arc<BridgeContext>, SocketAddr) {
    let mut config = BridgeConfig::new(Some("127.0.0.1".into()), Some(0), false, None, None);
    config.request_timeout = Duration::from_millis(300);
    config.list_clients_wait = Duration::from_millis(50);

    let ctx = BridgeContext::new(config);
    let addr = ctx.hub.start().await.expect("hub start");
    (ctx, addr)
}

/// A hand-driven fake editor socket: lets tests inspect the raw wire.
struct RawClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn send(&mut self, value: &Value) {
        let mut line = value.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.expect("write");
    }

    async fn register(&mut self, client_id: &str, product_name: &str) {
        self.send(&json!({
            "type": "registration",
            "clientId": client_id,
            "clientInfo": {"productName": product_name},
        }))
        .await;
    }

    /// Read the next request envelope the bridge wrote to this socket.
    async fn read_request(&mut self) -> Value {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("request arrives")
            .expect("read");
        assert!(n > 0, "socket closed while waiting for a request");
        serde_json::from_str(line.trim()).expect("request parses")
    }

    async fn reply_success(&mut self, id: &str, result: Value) {
        self.send(&json!({"status": "success", "result": result, "id": id}))
            .await;
    }
}

/// Poll until `predicate` holds; panics after two seconds.
async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

fn client_ids(ctx: &BridgeContext) -> Vec<String> {
    ctx.hub
        .get_connected_clients()
        .into_iter()
        .map(|c| c.id)
        .collect()
}

// ─── S1: happy-path tool call ────────────────────────────────────────────────

#[tokio::test]
async fn tool_call_round_trips_through_a_registered_client() {
    let (ctx, addr) = start_test_bridge().await;
    let mut editor = RawClient::connect(addr).await;
    editor.register("ed-1", "Demo").await;
    wait_until(|| client_ids(&ctx) == vec!["ed-1".to_string()]).await;

    // The editor answers the one request the tool call produces.
    let editor_task = tokio::spawn(async move {
        let request = editor.read_request().await;
        assert_eq!(request["command"], "menu.execute");
        assert_eq!(request["type"], "");
        assert_eq!(request["params"]["menuItem"], "File/Save Project");
        let id = request["id"].as_str().expect("string id").to_string();
        editor.reply_success(&id, json!({"success": true})).await;
        editor
    });

    let mcp = McpServer::new(ctx.clone());
    let response = mcp
        .handle_message(json!({
            "jsonrpc": "2.0", "id": 1,
            "method": "tools/call",
            "params": {"name": "menu_execute", "arguments": {"menuItem": "File/Save Project"}},
        }))
        .await
        .expect("response");

    assert!(response["result"].get("isError").is_none());
    assert_eq!(
        response["result"]["content"][0]["text"],
        "{\"success\":true}"
    );

    editor_task.await.unwrap();
    ctx.shutdown();
}

// ─── S2: no client ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tool_call_without_clients_errors_without_socket_io() {
    let (ctx, _addr) = start_test_bridge().await;

    let mcp = McpServer::new(ctx.clone());
    let response = mcp
        .handle_message(json!({
            "jsonrpc": "2.0", "id": 1,
            "method": "tools/call",
            "params": {"name": "console_clear", "arguments": {}},
        }))
        .await
        .expect("response");

    assert_eq!(response["result"]["isError"], true);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("No Unity clients connected"));
    assert_eq!(ctx.router.pending_count(), 0);
    ctx.shutdown();
}

// ─── S3: disconnect mid-request ──────────────────────────────────────────────

#[tokio::test]
async fn disconnect_rejects_only_the_disconnected_clients_requests() {
    let (ctx, addr) = start_test_bridge().await;

    let mut client_a = RawClient::connect(addr).await;
    client_a.register("client-a", "Alpha").await;
    wait_until(|| client_ids(&ctx).contains(&"client-a".to_string())).await;

    let mut client_b = RawClient::connect(addr).await;
    client_b.register("client-b", "Beta").await;
    wait_until(|| client_ids(&ctx).len() == 2).await;

    // First request goes to client-a (the active client).
    assert_eq!(ctx.hub.active_client_id().as_deref(), Some("client-a"));
    let ctx_a = ctx.clone();
    let request_a = tokio::spawn(async move {
        ctx_a
            .router
            .send(&ctx_a.hub, "menu.execute", "", json!({"menuItem": "A"}))
            .await
    });
    let _ = client_a.read_request().await;

    // Second request goes to client-b after an explicit switch.
    assert!(ctx.hub.set_active_client("client-b"));
    let ctx_b = ctx.clone();
    let request_b = tokio::spawn(async move {
        ctx_b
            .router
            .send(&ctx_b.hub, "menu.execute", "", json!({"menuItem": "B"}))
            .await
    });
    let envelope_b = client_b.read_request().await;
    wait_until(|| ctx.router.pending_count() == 2).await;

    // Drop client-a before it replies.
    drop(client_a);

    let err = request_a.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionClosed));

    // client-b's request survived the disconnect and still resolves.
    let id_b = envelope_b["id"].as_str().unwrap().to_string();
    client_b.reply_success(&id_b, json!({"done": true})).await;
    let value = request_b.await.unwrap().unwrap();
    assert_eq!(value, json!({"done": true}));
    ctx.shutdown();
}

// ─── S4: timeout, late reply dropped ─────────────────────────────────────────

#[tokio::test]
async fn silent_editor_times_out_and_late_reply_is_dropped() {
    let (ctx, addr) = start_test_bridge().await;
    let mut editor = RawClient::connect(addr).await;
    editor.register("ed-1", "Demo").await;
    wait_until(|| !client_ids(&ctx).is_empty()).await;

    let err = ctx
        .router
        .send(&ctx.hub, "menu.execute", "", json!({"menuItem": "X"}))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert_eq!(ctx.router.pending_count(), 0);

    // The reply arrives after the deadline: dropped, no error, and the
    // connection keeps working for the next request.
    let stale = editor.read_request().await;
    let stale_id = stale["id"].as_str().unwrap().to_string();
    editor.reply_success(&stale_id, json!({"too": "late"})).await;

    let ctx_next = ctx.clone();
    let next = tokio::spawn(async move {
        ctx_next
            .router
            .send(&ctx_next.hub, "console.clear", "", json!({}))
            .await
    });
    let envelope = editor.read_request().await;
    let id = envelope["id"].as_str().unwrap().to_string();
    assert_ne!(id, stale_id);
    editor.reply_success(&id, json!({"cleared": true})).await;
    assert_eq!(next.await.unwrap().unwrap(), json!({"cleared": true}));
    ctx.shutdown();
}

// ─── S5: registration rewrite ────────────────────────────────────────────────

#[tokio::test]
async fn registration_replaces_the_address_derived_id() {
    let (ctx, addr) = start_test_bridge().await;
    let mut editor = RawClient::connect(addr).await;

    wait_until(|| ctx.hub.client_count() == 1).await;
    let initial = client_ids(&ctx).remove(0);
    assert!(initial.starts_with("unity-127.0.0.1:"), "got {initial}");

    editor.register("proj-x", "Demo").await;
    wait_until(|| client_ids(&ctx) == vec!["proj-x".to_string()]).await;

    // The renamed client kept its active flag.
    assert_eq!(ctx.hub.active_client_id().as_deref(), Some("proj-x"));
    let snapshot = ctx.hub.get_connected_clients();
    assert!(snapshot[0].is_active);
    assert_eq!(
        snapshot[0]
            .info
            .as_ref()
            .and_then(|i| i.product_name.as_deref()),
        Some("Demo")
    );
    ctx.shutdown();
}

// ─── S6: listClients synthetic tool ──────────────────────────────────────────

#[tokio::test]
async fn list_clients_filters_unidentified_clients() {
    let (ctx, addr) = start_test_bridge().await;

    let mut registered = RawClient::connect(addr).await;
    registered.register("ed-1", "Demo").await;
    let _anonymous = RawClient::connect(addr).await;
    let mut unknown = RawClient::connect(addr).await;
    unknown.register("ed-2", "UnknownProject").await;
    wait_until(|| ctx.hub.client_count() == 3).await;

    let mcp = McpServer::new(ctx.clone());
    let response = mcp
        .handle_message(json!({
            "jsonrpc": "2.0", "id": 1,
            "method": "tools/call",
            "params": {"name": "unity_listClients", "arguments": {}},
        }))
        .await
        .expect("response");

    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["clients"][0]["id"], "ed-1");
    assert_eq!(payload["clients"][0]["info"]["productName"], "Demo");

    // Filtered clients are hidden, not disconnected.
    assert_eq!(ctx.hub.client_count(), 3);
    ctx.shutdown();
}

// ─── Active-client election ──────────────────────────────────────────────────

#[tokio::test]
async fn at_most_one_client_is_active_across_disconnects() {
    let (ctx, addr) = start_test_bridge().await;

    let first = RawClient::connect(addr).await;
    wait_until(|| ctx.hub.client_count() == 1).await;
    let _second = RawClient::connect(addr).await;
    let _third = RawClient::connect(addr).await;
    wait_until(|| ctx.hub.client_count() == 3).await;

    let active: Vec<_> = ctx
        .hub
        .get_connected_clients()
        .into_iter()
        .filter(|c| c.is_active)
        .collect();
    assert_eq!(active.len(), 1);

    // Dropping the active client promotes one of the remaining two.
    let active_id = ctx.hub.active_client_id().unwrap();
    assert_eq!(active[0].id, active_id);
    drop(first);
    wait_until(|| ctx.hub.client_count() == 2).await;
    wait_until(|| ctx.hub.active_client_id().is_some()).await;

    let survivors = ctx.hub.get_connected_clients();
    assert_eq!(survivors.iter().filter(|c| c.is_active).count(), 1);
    assert_ne!(ctx.hub.active_client_id().unwrap(), active_id);

    assert!(!ctx.hub.set_active_client("ghost"));
    ctx.shutdown();

    // After teardown nothing remains active or connected.
    assert_eq!(ctx.hub.client_count(), 0);
    assert!(ctx.hub.active_client_id().is_none());
}

// ─── connectToProject ────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_to_project_matches_case_insensitive_substring() {
    let (ctx, addr) = start_test_bridge().await;

    let mut alpha = RawClient::connect(addr).await;
    alpha.register("alpha-client", "Alpha Project").await;
    let mut beta = RawClient::connect(addr).await;
    beta.register("beta-client", "Beta Project").await;
    wait_until(|| {
        let ids = client_ids(&ctx);
        ids.contains(&"alpha-client".to_string()) && ids.contains(&"beta-client".to_string())
    })
    .await;

    let mcp = McpServer::new(ctx.clone());
    let response = mcp
        .handle_message(json!({
            "jsonrpc": "2.0", "id": 1,
            "method": "tools/call",
            "params": {"name": "unity_connectToProject", "arguments": {"projectName": "BETA"}},
        }))
        .await
        .expect("response");

    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["activeClient"], "beta-client");
    assert_eq!(ctx.hub.active_client_id().as_deref(), Some("beta-client"));

    // No match is a tool-level error.
    let miss = mcp
        .handle_message(json!({
            "jsonrpc": "2.0", "id": 2,
            "method": "tools/call",
            "params": {"name": "unity_connectToProject", "arguments": {"projectName": "gamma"}},
        }))
        .await
        .expect("response");
    assert_eq!(miss["result"]["isError"], true);
    ctx.shutdown();
}

// ─── Newline-free editor frames ──────────────────────────────────────────────

#[tokio::test]
async fn bridge_accepts_replies_without_trailing_newline() {
    let (ctx, addr) = start_test_bridge().await;
    let mut editor = RawClient::connect(addr).await;
    editor.register("ed-1", "Demo").await;
    wait_until(|| !client_ids(&ctx).is_empty()).await;

    let ctx_send = ctx.clone();
    let request = tokio::spawn(async move {
        ctx_send
            .router
            .send(&ctx_send.hub, "menu.execute", "", json!({}))
            .await
    });

    let envelope = editor.read_request().await;
    let id = envelope["id"].as_str().unwrap();
    // Newline-free reply, the way some editor builds flush.
    let raw = json!({"status": "success", "result": {"ok": 1}, "id": id}).to_string();
    editor.writer.write_all(raw.as_bytes()).await.unwrap();

    assert_eq!(request.await.unwrap().unwrap(), json!({"ok": 1}));
    ctx.shutdown();
}

// ─── Async events ────────────────────────────────────────────────────────────

#[tokio::test]
async fn id_less_messages_are_broadcast_as_events() {
    let (ctx, addr) = start_test_bridge().await;
    let mut events = ctx.hub.events().subscribe();

    let mut editor = RawClient::connect(addr).await;
    editor.register("ed-1", "Demo").await;
    editor
        .send(&json!({"event": "playModeChanged", "state": "playing"}))
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("event arrives")
            .expect("channel open");
        if let unityd::hub::event::HubEvent::Message { id, payload } = event {
            assert_eq!(id, "ed-1");
            assert_eq!(payload["event"], "playModeChanged");
            break;
        }
    }
    ctx.shutdown();
}
