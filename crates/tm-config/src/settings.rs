use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Effective trade manager configuration. Every section and key is optional
/// in YAML; missing values take the defaults below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeManagerConfig {
    pub manager: ManagerSettings,
    pub runtime: RuntimeSettings,
    pub paper: PaperSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Periodic evaluation pass interval.
    pub tick_interval_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

impl ManagerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Capacity of the command channel into the manager task.
    pub command_buffer: usize,
    /// Capacity of the broadcast event bus.
    pub event_buffer: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    /// Simulated response latency; 0 resolves calls immediately.
    pub latency_ms: u64,
    pub fill_pending_on_fetch: bool,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            fill_pending_on_fetch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl TradeManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.manager.tick_interval_ms == 0 {
            bail!("CONFIG_INVALID manager.tick_interval_ms must be > 0");
        }
        if self.runtime.command_buffer == 0 {
            bail!("CONFIG_INVALID runtime.command_buffer must be > 0");
        }
        if self.runtime.event_buffer == 0 {
            bail!("CONFIG_INVALID runtime.event_buffer must be > 0");
        }
        Ok(())
    }
}
