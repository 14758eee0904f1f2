//! Process-wide engine configuration.

use std::sync::LazyLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, PrismResult};

/// Default tile edge in pixels.
const DEFAULT_TILE_SIZE: i32 = 128;
/// Default worker count; `1` evaluates on the calling thread only.
const DEFAULT_THREADS: usize = 1;

/// Runtime configuration for buffers and the processing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of storage tiles for newly created buffers.
    pub tile_width: i32,
    /// Height of storage tiles for newly created buffers.
    pub tile_height: i32,
    /// Rayon workers used for sibling subtrees. `1` disables the pool.
    pub threads: usize,
    /// Keep node outputs between renders.
    pub cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_width: env_or("PRISM_TILE_WIDTH", DEFAULT_TILE_SIZE),
            tile_height: env_or("PRISM_TILE_HEIGHT", DEFAULT_TILE_SIZE),
            threads: env_or("PRISM_THREADS", DEFAULT_THREADS),
            cache: std::env::var("PRISM_CACHE")
                .ok()
                .map(|v| !matches!(v.as_str(), "0" | "false" | "off"))
                .unwrap_or(true),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> PrismResult<()> {
        if self.tile_width <= 0 {
            return Err(invalid("tile_width", self.tile_width));
        }
        if self.tile_height <= 0 {
            return Err(invalid("tile_height", self.tile_height));
        }
        if self.threads == 0 {
            return Err(invalid("threads", self.threads));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn invalid(name: &'static str, value: impl ToString) -> crate::error::PrismError {
    ConfigurationError::InvalidSetting {
        name,
        value: value.to_string(),
    }
    .into()
}

static CONFIG: LazyLock<RwLock<EngineConfig>> = LazyLock::new(|| RwLock::new(EngineConfig::default()));

/// Install `config` process-wide and register built-in color conversions.
pub fn init(config: EngineConfig) -> PrismResult<()> {
    config.validate()?;
    prism_color::init();
    tracing::info!(
        "prism engine configured: tiles {}x{}, {} thread(s), cache {}",
        config.tile_width,
        config.tile_height,
        config.threads,
        if config.cache { "on" } else { "off" }
    );
    *CONFIG.write() = config;
    Ok(())
}

/// Snapshot of the current configuration.
pub fn config() -> EngineConfig {
    CONFIG.read().clone()
}

/// Release process-wide caches.
pub fn exit() {
    prism_color::exit();
    tracing::info!("prism engine shut down");
}
