//! Network module - Resilient framed TCP connections
//!
//! Provides:
//! - A connection state machine with automatic reconnect support
//! - A registry mapping channel ids to live connections
//! - Hostname resolution with random address selection

mod connection;
mod registry;

pub use connection::*;
pub use registry::*;

use std::net::SocketAddr;
use std::time::Duration;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::protocol::MAX_FRAME_SIZE;

/// Timing and sizing knobs for connections.
///
/// The reconnect loop paces attempts at `reconnect_interval_ms` between
/// attempt starts, polling each attempt every `poll_interval_ms` for up
/// to `attempt_timeout_ms` before giving up on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout for a caller-initiated connect, in milliseconds
    pub connect_timeout_ms: u64,
    /// Target time between the start of successive reconnect attempts
    pub reconnect_interval_ms: u64,
    /// How long a single reconnect attempt may run before it is abandoned
    pub attempt_timeout_ms: u64,
    /// How often the reconnect loop checks an in-flight attempt
    pub poll_interval_ms: u64,
    /// Capacity of the per-connection event channel
    pub event_queue_size: usize,
    /// Capacity of the per-connection outbound frame queue
    pub send_queue_size: usize,
    /// Socket read chunk size in bytes
    pub read_buffer_size: usize,
    /// Largest accepted inbound frame body
    pub max_frame_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            reconnect_interval_ms: 2000,
            attempt_timeout_ms: 3000,
            poll_interval_ms: 100,
            event_queue_size: 256,
            send_queue_size: 256,
            read_buffer_size: 4096,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Resolve a hostname to all of its addresses
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
    use tokio::net::lookup_host;

    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("could not resolve host: {}", host),
        ));
    }
    Ok(addrs)
}

/// Pick one address uniformly at random. Spreads load across
/// DNS-returned replicas; this is not a health check.
pub fn pick_addr(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    let mut rng = rand::rng();
    addrs.choose(&mut rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addrs = resolve_host("127.0.0.1", 9000).await.unwrap();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].port(), 9000);
    }

    #[test]
    fn test_pick_addr() {
        assert!(pick_addr(&[]).is_none());

        let addrs: Vec<SocketAddr> = vec!["127.0.0.1:1".parse().unwrap()];
        assert_eq!(pick_addr(&addrs), Some(addrs[0]));
    }

    #[test]
    fn test_default_timings() {
        let config = NetworkConfig::default();
        assert_eq!(config.attempt_timeout(), Duration::from_millis(3000));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.reconnect_interval(), Duration::from_millis(2000));
    }
}
