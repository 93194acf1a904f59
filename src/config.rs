use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Address, DEFAULT_PORT};

const MAX_IDLE_CLOSE_MS: i64 = 300_000;
const MAX_SETTLE_MS: u64 = 10_000;

/// Connection and retry settings.
///
/// Durations are plain milliseconds so the struct can be read straight out
/// of a host application's JSON settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Fixed unit address; discovery is skipped when set.
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    /// Connect and read-idle timeout.
    pub connect_timeout_ms: u64,
    /// Delay after the last request before the session is closed.
    /// `0` closes after every request; negative keeps the session open.
    pub idle_close_ms: i64,
    /// Time the unit needs after a disconnect before it accepts a new one.
    pub settle_delay_ms: u64,
    pub command_timeout_ms: u64,
    pub command_attempts: u32,
    pub discovery_timeout_ms: u64,
    /// Discovery UDP port; only changed for testing.
    pub discovery_port: u16,
    /// Unit has one controller per zone.
    pub multi_set_point: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: None,
            connect_timeout_ms: 5000,
            idle_close_ms: 5000,
            settle_delay_ms: 1100,
            command_timeout_ms: 10_000,
            command_attempts: 3,
            discovery_timeout_ms: 5000,
            discovery_port: crate::discovery::DISCOVERY_PORT,
            multi_set_point: false,
        }
    }
}

/// What to do once the request queue drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleClose {
    Immediately,
    After(Duration),
    Never,
}

impl ClientConfig {
    pub fn from_json(s: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn static_address(&self) -> Option<Address> {
        self.address
            .map(|host| Address::new(host, self.port.unwrap_or(DEFAULT_PORT)))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_close(&self) -> IdleClose {
        match self.idle_close_ms.min(MAX_IDLE_CLOSE_MS) {
            0 => IdleClose::Immediately,
            ms if ms < 0 => IdleClose::Never,
            ms => IdleClose::After(Duration::from_millis(ms as u64)),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.min(MAX_SETTLE_MS))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn command_attempts(&self) -> u32 {
        self.command_attempts.max(1)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}
