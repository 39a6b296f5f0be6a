//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// TTL in seconds for entries set without an explicit TTL, 0 = none
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Interval in seconds between expiration scans
    pub scan_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL` - Default TTL in seconds, 0 disables it (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SCAN_INTERVAL` - Expiration scan frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            scan_interval: parse_var("SCAN_INTERVAL").unwrap_or(defaults.scan_interval),
        }
    }

    /// Default TTL as a duration, `None` when disabled.
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl > 0).then(|| Duration::from_secs(self.default_ttl))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            server_port: 3000,
            scan_interval: 1,
        }
    }
}
