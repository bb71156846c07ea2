//! UDP discovery announcement.
//!
//! The bridge is found by editors through a single-shot IPv4 broadcast to
//! `255.255.255.255:<discovery_port>` carrying the bridge's TCP endpoint.
//! It is not a heartbeat; one datagram is sent when the listener starts and
//! one more each time `unity_listClients` asks for a fresh enumeration.

use serde_json::json;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Why an announce is being sent. Serialized into the payload's `type`
/// field so listeners can tell a startup beacon from an on-demand refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceKind {
    Startup,
    ListClients,
}

impl AnnounceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnounceKind::Startup => "startup",
            AnnounceKind::ListClients => "listClients",
        }
    }
}

/// Build the announce payload: `{type, host, port, version, protocol,
/// timestamp}`. `protocol` is the fixed `"mcp-bridge"` tag editors filter on.
pub fn announce_payload(kind: AnnounceKind, host: &str, port: u16) -> serde_json::Value {
    json!({
        "type": kind.as_str(),
        "host": host,
        "port": port,
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "mcp-bridge",
        "timestamp": chrono::Utc::now().timestamp_millis(),
    })
}

/// Send exactly one broadcast datagram, then drop the socket.
///
/// Discovery is best-effort: failure is logged at WARN and swallowed.
/// Broadcast may be unavailable in containers or on locked-down networks,
/// and the bridge is fully usable by clients that know the address.
pub async fn announce(kind: AnnounceKind, host: &str, port: u16, discovery_port: u16) {
    if let Err(e) = try_announce(kind, host, port, discovery_port).await {
        warn!(
            err = %e,
            discovery_port,
            "UDP discovery announce failed — editors must connect via explicit address"
        );
    }
}

async fn try_announce(
    kind: AnnounceKind,
    host: &str,
    port: u16,
    discovery_port: u16,
) -> std::io::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    let payload = announce_payload(kind, host, port).to_string();
    let target = format!("255.255.255.255:{discovery_port}");
    socket.send_to(payload.as_bytes(), &target).await?;

    debug!(kind = kind.as_str(), target = %target, "discovery announce sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_the_protocol_tag() {
        let p = announce_payload(AnnounceKind::Startup, "127.0.0.1", 27182);
        assert_eq!(p["protocol"], "mcp-bridge");
        assert_eq!(p["type"], "startup");
        assert_eq!(p["host"], "127.0.0.1");
        assert_eq!(p["port"], 27182);
        assert!(p["timestamp"].is_i64());
        assert!(p["version"].is_string());
    }

    #[test]
    fn list_clients_kind_matches_the_wire_value() {
        let p = announce_payload(AnnounceKind::ListClients, "127.0.0.1", 27182);
        assert_eq!(p["type"], "listClients");
    }

    #[tokio::test]
    async fn announce_reaches_a_local_listener() {
        // Bind a receiver on an ephemeral port and announce to it. Uses the
        // loopback-visible broadcast address; skip silently if the sandbox
        // forbids broadcast.
        let receiver = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let discovery_port = receiver.local_addr().unwrap().port();

        if try_announce(AnnounceKind::ListClients, "127.0.0.1", 27182, discovery_port)
            .await
            .is_err()
        {
            return;
        }

        let mut buf = [0u8; 2048];
        let recv = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            receiver.recv_from(&mut buf),
        )
        .await;
        if let Ok(Ok((n, _))) = recv {
            let v: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(v["protocol"], "mcp-bridge");
            assert_eq!(v["type"], "listClients");
        }
    }
}
