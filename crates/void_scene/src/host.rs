//! Host collaborator interface
//!
//! The engine's content-streaming subsystem is not part of this crate. Loaders
//! talk to it through [`SceneHost`], passed explicitly to every operation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::operation::{OperationHandle, OperationId};
use crate::unit::LoadMode;

/// Opaque reference to a live object owned by some unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// A unit that is currently loaded in the host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitInstance {
    /// Unit name
    pub name: String,
    /// Host-side load slot
    pub slot: u32,
}

/// Lifecycle broadcasts raised by the host
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A unit finished loading and is live
    UnitLoaded {
        unit: String,
        mode: LoadMode,
        operation: Option<OperationId>,
    },
    /// A unit was removed
    UnitUnloaded {
        unit: String,
        operation: Option<OperationId>,
    },
    /// The foreground unit changed
    ActiveUnitChanged {
        previous: Option<String>,
        current: String,
    },
}

impl HostEvent {
    /// Unit this event concerns
    pub fn unit(&self) -> &str {
        match self {
            Self::UnitLoaded { unit, .. } | Self::UnitUnloaded { unit, .. } => unit,
            Self::ActiveUnitChanged { current, .. } => current,
        }
    }
}

/// Content-streaming collaborator
pub trait SceneHost {
    /// Whether the content index knows this unit
    fn contains_unit(&self, name: &str) -> bool;

    /// Begin loading a unit
    fn submit_load(&mut self, name: &str, mode: LoadMode) -> OperationHandle;

    /// Begin unloading a unit. `None` if the unit is not loaded.
    fn submit_unload(&mut self, name: &str) -> Option<OperationHandle>;

    /// Look up a loaded unit. `None` means the unit is not valid right now.
    fn unit_by_name(&self, name: &str) -> Option<UnitInstance>;

    /// The foreground unit
    fn active_unit(&self) -> Option<UnitInstance>;

    /// Make a loaded unit the foreground unit
    fn set_active_unit(&mut self, unit: &UnitInstance);

    /// Name of the unit owning an instance, `None` for persistent or unknown instances
    fn instance_unit(&self, instance: InstanceId) -> Option<String>;

    /// Whether the instance is still alive
    fn instance_exists(&self, instance: InstanceId) -> bool;

    /// Re-parent an instance into a unit's ownership scope
    fn move_instance_to_unit(&mut self, instance: InstanceId, unit: &UnitInstance);

    /// Detach an instance from unit ownership so it survives unit transitions
    fn mark_persistent(&mut self, instance: InstanceId);
}
