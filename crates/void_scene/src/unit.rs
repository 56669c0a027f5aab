//! Load unit descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::host::SceneHost;

/// How a unit is added to the set of loaded units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadMode {
    /// Replace every loaded unit
    Single,
    /// Load alongside the units already loaded
    Additive,
}

impl Default for LoadMode {
    fn default() -> Self {
        Self::Single
    }
}

/// A named loadable content unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadUnit {
    /// Name resolved by the host's content index
    pub identifier: String,
    /// Load mode
    #[serde(default)]
    pub mode: LoadMode,
}

impl LoadUnit {
    /// Create a unit loaded in `Single` mode
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            mode: LoadMode::Single,
        }
    }

    /// Create a unit loaded in `Additive` mode
    pub fn additive(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            mode: LoadMode::Additive,
        }
    }

    /// Set load mode
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Get the identifier
    pub fn name(&self) -> &str {
        &self.identifier
    }

    /// A unit is valid when its identifier is non-empty and the host can
    /// resolve it. Invalid units are never submitted.
    pub fn is_valid<H: SceneHost + ?Sized>(&self, host: &H) -> bool {
        !self.identifier.trim().is_empty() && host.contains_unit(&self.identifier)
    }
}

impl fmt::Display for LoadUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.identifier, self.mode)
    }
}
