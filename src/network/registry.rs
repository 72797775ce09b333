//! Connection registry
//!
//! Maps caller-chosen channel ids to live connections. Bookkeeping
//! only; no protocol logic lives here. At most one connection is active
//! per channel id: replacing an entry disconnects the previous
//! occupant first.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{NetConnection, NetworkConfig};
use crate::protocol::Packet;

/// An explicit registry object. Callers own its lifecycle; there is no
/// process-wide instance.
pub struct ConnectionRegistry {
    config: NetworkConfig,
    connections: Mutex<HashMap<i32, Arc<NetConnection>>>,
}

impl ConnectionRegistry {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Create a connection for `channel` and start connecting. If the
    /// channel already has a live connection it is disconnected and
    /// replaced; a fresh connect always starts.
    pub async fn connect_to(
        &self,
        channel: i32,
        host: impl Into<String>,
        port: u16,
    ) -> Arc<NetConnection> {
        let previous = self.connections.lock().await.remove(&channel);
        if let Some(previous) = previous {
            tracing::debug!("channel {} replaced, disconnecting occupant", channel);
            previous.disconnect().await;
        }

        let conn = Arc::new(NetConnection::new(host, port, self.config.clone()));
        conn.connect().await;
        self.connections.lock().await.insert(channel, conn.clone());
        conn
    }

    /// Disconnect and remove the channel's connection, if present
    pub async fn disconnect_from(&self, channel: i32) {
        let removed = self.connections.lock().await.remove(&channel);
        if let Some(conn) = removed {
            conn.disconnect().await;
        }
    }

    /// Look up the connection for a channel
    pub async fn get(&self, channel: i32) -> Option<Arc<NetConnection>> {
        self.connections.lock().await.get(&channel).cloned()
    }

    /// Route a packet to the channel's connection, if present
    pub async fn send_to(&self, channel: i32, packet: Packet) {
        let conn = self.get(channel).await;
        if let Some(conn) = conn {
            conn.send(packet).await;
        }
    }

    /// Disconnect every connection and clear the registry
    pub async fn disconnect_all(&self) {
        let drained: Vec<Arc<NetConnection>> = {
            let mut connections = self.connections.lock().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };
        for conn in drained {
            conn.disconnect().await;
        }
    }

    /// Number of registered channels
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetEvent;

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = ConnectionRegistry::new(NetworkConfig::default());
        assert!(registry.get(0).await.is_none());

        let conn = registry.connect_to(0, "127.0.0.1", 1).await;
        let found = registry.get(0).await.unwrap();
        assert!(Arc::ptr_eq(&conn, &found));
        assert_eq!(registry.len().await, 1);

        registry.disconnect_from(0).await;
        assert!(registry.get(0).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_replacing_channel_disconnects_occupant() {
        let registry = ConnectionRegistry::new(NetworkConfig::default());

        let first = registry.connect_to(3, "127.0.0.1", 1).await;
        let mut first_rx = first.take_event_receiver().await.unwrap();

        let second = registry.connect_to(3, "127.0.0.1", 2).await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);

        // The replaced occupant was disconnected
        let mut saw_disconnect = false;
        while let Some(event) = first_rx.recv().await {
            if matches!(event, NetEvent::Disconnected) {
                saw_disconnect = true;
                break;
            }
        }
        assert!(saw_disconnect);
    }

    #[tokio::test]
    async fn test_disconnect_all_clears() {
        let registry = ConnectionRegistry::new(NetworkConfig::default());
        registry.connect_to(1, "127.0.0.1", 1).await;
        registry.connect_to(2, "127.0.0.1", 2).await;
        assert_eq!(registry.len().await, 2);

        registry.disconnect_all().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_send_to_missing_channel_is_noop() {
        let registry = ConnectionRegistry::new(NetworkConfig::default());
        registry.send_to(9, Packet::new(1, vec![0u8])).await;
    }
}
