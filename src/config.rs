use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::pool::PoolConfig;
use crate::scripts::ScriptHostSettings;
use crate::world::ClassConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub host: ScriptHostSettings,
    /// Actor classes registered on the runner's world before the script starts.
    #[serde(default)]
    pub classes: Vec<ClassConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub pool_size: Option<usize>,
    pub call_tick: Option<bool>,
    pub gc_interval: Option<u32>,
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(pool_size) = overrides.pool_size {
            self.pool.max_pool_size = pool_size;
        }
        if let Some(call_tick) = overrides.call_tick {
            self.host.call_tick = call_tick;
        }
        if let Some(gc_interval) = overrides.gc_interval {
            self.host.gc_interval = gc_interval;
        }
    }
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.pool_size.is_none() && self.call_tick.is_none() && self.gc_interval.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.pool_size.is_some() {
            fields.push("pool_size");
        }
        if self.call_tick.is_some() {
            fields.push("call_tick");
        }
        if self.gc_interval.is_some() {
            fields.push("gc_interval");
        }
        fields
    }
}
