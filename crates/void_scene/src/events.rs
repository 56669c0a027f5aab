//! Lifecycle notifications raised by loaders and the batch coordinator

use crate::error::SceneError;

/// Notifications from a [`UnitLoader`](crate::loader::UnitLoader)
#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    /// The unit finished loading
    Loaded { unit: String },
    /// The unit became the active unit
    Activated { unit: String },
    /// The unit was unloaded
    Unloaded { unit: String },
    /// The host gave up on a load or unload
    Failed { unit: String },
}

impl UnitEvent {
    pub fn unit(&self) -> &str {
        match self {
            Self::Loaded { unit }
            | Self::Activated { unit }
            | Self::Unloaded { unit }
            | Self::Failed { unit } => unit,
        }
    }
}

/// Notifications from a [`BatchLoadCoordinator`](crate::coordinator::BatchLoadCoordinator)
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// Loading indicator visibility changed
    Indicator { visible: bool },
    /// A batch was submitted
    Started { units: Vec<String> },
    /// Aggregate progress sample, normalized to [0, 1]
    Progress { normalized: f32 },
    /// Every member was activated and the settle delays elapsed
    Completed,
    /// The batch was aborted
    Failed { error: SceneError },
}
