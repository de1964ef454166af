use shared::{DEFAULT_PEER_TIMEOUT, DEFAULT_PORT, NETWORK_WORLD_UPDATE_RATE};
use std::time::Duration;

/// Runtime settings for a session server host.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Frames per second the host calls `tick` at.
    pub tick_rate: u32,
    /// Snapshots per second; fixed for the lifetime of a server.
    pub broadcast_rate: f64,
    /// Silence after which the transport evicts a peer.
    pub peer_timeout: Duration,
}

impl ServerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_rate: 60,
            broadcast_rate: NETWORK_WORLD_UPDATE_RATE,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.broadcast_rate, NETWORK_WORLD_UPDATE_RATE);
        assert_eq!(config.peer_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_tick_interval() {
        let config = ServerConfig {
            tick_rate: 60,
            ..ServerConfig::default()
        };
        assert_approx_eq!(config.tick_interval().as_secs_f64(), 1.0 / 60.0, 1e-6);
    }

    #[test]
    fn test_zero_tick_rate_is_clamped() {
        let config = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
