//! Pool configuration.
//!
//! Zero values for the reconnection interval and attempt budget are
//! placeholders for the defaults, matching how callers historically left
//! those fields unset.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of slots in the table. Must be positive.
    pub capacity: usize,
    /// Remote address. Must be an IPv4 or IPv6 literal.
    pub host: String,
    pub port: u16,
    /// Delay before a failed connect is retried. 0 means 1000ms.
    pub reconnect_interval_ms: u64,
    /// Pool-lifetime retry budget. 0 means 10.
    pub max_reconnect_attempts: u32,
    /// Upper bound on a single connect attempt. An expired attempt is a failed one.
    pub connect_timeout_ms: Option<u64>,
    pub nodelay: bool,
    /// Hand a slot returned by `put_socket` straight to the earliest-deadline
    /// waiter instead of marking it idle. Off by default.
    pub handoff_on_put: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            host: "127.0.0.1".to_string(),
            port: 8000,
            reconnect_interval_ms: 0,
            max_reconnect_attempts: 0,
            connect_timeout_ms: None,
            nodelay: true,
            handoff_on_put: false,
        }
    }
}

impl PoolConfig {
    pub fn new(capacity: usize, host: impl Into<String>, port: u16) -> Self {
        Self {
            capacity,
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = millis(interval);
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn with_handoff_on_put(mut self, enabled: bool) -> Self {
        self.handoff_on_put = enabled;
        self
    }

    /// Defaults overlaid with `CONNPOOL_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(capacity) = env_parse("CONNPOOL_CAPACITY") {
            config.capacity = capacity;
        }
        if let Ok(host) = std::env::var("CONNPOOL_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("CONNPOOL_PORT") {
            config.port = port;
        }
        if let Some(interval) = env_parse("CONNPOOL_RECONNECT_INTERVAL_MS") {
            config.reconnect_interval_ms = interval;
        }
        if let Some(attempts) = env_parse("CONNPOOL_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = attempts;
        }
        if let Some(timeout) = env_parse("CONNPOOL_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = Some(timeout);
        }
        if let Some(handoff) = env_parse("CONNPOOL_HANDOFF_ON_PUT") {
            config.handoff_on_put = handoff;
        }

        config
    }

    pub fn reconnect_interval(&self) -> Duration {
        match self.reconnect_interval_ms {
            0 => DEFAULT_RECONNECT_INTERVAL,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn reconnect_budget(&self) -> u32 {
        match self.max_reconnect_attempts {
            0 => DEFAULT_MAX_RECONNECT_ATTEMPTS,
            n => n,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Copy of this config with the zero-valued defaults filled in.
    pub fn normalized(&self) -> Self {
        Self {
            reconnect_interval_ms: millis(self.reconnect_interval()),
            max_reconnect_attempts: self.reconnect_budget(),
            ..self.clone()
        }
    }

    /// Check the settings a pool cannot be created without.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "capacity must be positive".to_string(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    /// Resolve the remote endpoint from the IP literal and port.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            PoolError::InvalidConfig(format!(
                "host '{}' is not an IP address literal",
                self.host
            ))
        })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
