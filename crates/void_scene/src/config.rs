//! Loader and batch configuration
//!
//! Configuration is plain serde data and can be read from TOML:
//!
//! ```toml
//! [batch]
//! poll_interval_ms = 100
//! extra_delay_ms = 500
//!
//! [[loaders]]
//! preload_on_start = true
//! unit = { identifier = "level1", mode = "Additive" }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{SceneError, SceneResult};
use crate::operation::ACTIVATION_THRESHOLD;
use crate::unit::LoadUnit;

/// Batch coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Interval between progress samples
    pub poll_interval_ms: u64,
    /// Wait after the threshold is reached, before activation
    pub settle_before_activation_ms: u64,
    /// Wait after activation
    pub settle_after_activation_ms: u64,
    /// Caller-configured extra wait before completion
    pub extra_delay_ms: u64,
    /// Normalized progress that releases activation
    pub activation_threshold: f32,
    /// Abort if the threshold is not reached within this time
    pub timeout_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            settle_before_activation_ms: 1000,
            settle_after_activation_ms: 1000,
            extra_delay_ms: 0,
            activation_threshold: ACTIVATION_THRESHOLD,
            timeout_ms: None,
        }
    }
}

impl BatchConfig {
    /// Set the extra delay
    pub fn with_extra_delay(mut self, delay: Duration) -> Self {
        self.extra_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set both settle intervals
    pub fn with_settle(mut self, before: Duration, after: Duration) -> Self {
        self.settle_before_activation_ms = before.as_millis() as u64;
        self.settle_after_activation_ms = after.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_before_activation(&self) -> Duration {
        Duration::from_millis(self.settle_before_activation_ms)
    }

    pub fn settle_after_activation(&self) -> Duration {
        Duration::from_millis(self.settle_after_activation_ms)
    }

    pub fn extra_delay(&self) -> Duration {
        Duration::from_millis(self.extra_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check value ranges
    pub fn validate(&self) -> SceneResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SceneError::Config("poll_interval_ms must be greater than zero".into()));
        }
        if !(self.activation_threshold > 0.0 && self.activation_threshold <= 1.0) {
            return Err(SceneError::Config(format!(
                "activation_threshold must be in (0, 1], got {}",
                self.activation_threshold
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(SceneError::Config("timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Per-unit loader configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitLoaderConfig {
    /// Unit to drive. A loader without a unit does nothing.
    pub unit: Option<LoadUnit>,
    /// Preload (activation held) when the loader starts
    pub preload_on_start: bool,
    /// Route async loads through the batch coordinator
    pub use_coordinator: bool,
}

impl UnitLoaderConfig {
    pub fn new(unit: LoadUnit) -> Self {
        Self {
            unit: Some(unit),
            ..Default::default()
        }
    }

    /// Enable preloading on start
    pub fn preload_on_start(mut self) -> Self {
        self.preload_on_start = true;
        self
    }

    /// Route async loads through the coordinator
    pub fn use_coordinator(mut self) -> Self {
        self.use_coordinator = true;
        self
    }
}

/// Top-level scene loading configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub batch: BatchConfig,
    pub loaders: Vec<UnitLoaderConfig>,
}

impl SceneConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(source: &str) -> SceneResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| SceneError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read from a TOML file
    pub fn load(path: impl AsRef<Path>) -> SceneResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SceneError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> SceneResult<String> {
        toml::to_string(self).map_err(|e| SceneError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SceneResult<()> {
        self.batch.validate()
    }
}
