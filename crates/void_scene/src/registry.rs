//! Instance registry
//!
//! Keeps at most one live instance per component type. A later
//! registration for a type that already has an instance is refused, and the
//! caller decides what to do with the duplicate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::host::{InstanceId, SceneHost};

/// Component type identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeKey(String);

impl TypeKey {
    /// Create a key from an explicit name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key for a Rust type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authoritative instance for a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub type_key: TypeKey,
    pub instance: InstanceId,
    /// Survives unit transitions
    pub persistent: bool,
}

/// Registry of single live instances, keyed by component type
#[derive(Debug)]
pub struct InstanceRegistry {
    entries: HashMap<TypeKey, RegistryEntry>,
    alive: bool,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            alive: true,
        }
    }

    /// Register the instance for a type
    ///
    /// Returns [`RegistryError::AlreadyExists`] with the existing instance if
    /// the type is taken; the original entry is left untouched and the
    /// duplicate is the caller's to dispose of.
    pub fn try_register<H: SceneHost + ?Sized>(
        &mut self,
        type_key: TypeKey,
        instance: InstanceId,
        persistent: bool,
        host: &mut H,
    ) -> RegistryResult<()> {
        if !self.alive {
            return Err(RegistryError::ShutDown);
        }

        if let Some(existing) = self.entries.get(&type_key) {
            log::debug!(
                "Duplicate {} for {}, keeping {}",
                instance,
                type_key,
                existing.instance
            );
            return Err(RegistryError::AlreadyExists {
                type_key,
                existing: existing.instance,
            });
        }

        if persistent {
            host.mark_persistent(instance);
        }

        log::debug!("Registered {} for {}", instance, type_key);
        self.entries.insert(
            type_key.clone(),
            RegistryEntry {
                type_key,
                instance,
                persistent,
            },
        );
        Ok(())
    }

    /// Remove the entry for a type, but only if `instance` is the one registered.
    /// Returns true if an entry was removed.
    pub fn unregister(&mut self, type_key: &TypeKey, instance: InstanceId) -> bool {
        match self.entries.get(type_key) {
            Some(entry) if entry.instance == instance => {
                self.entries.remove(type_key);
                true
            }
            _ => false,
        }
    }

    /// Toggle whether the instance survives unit transitions
    ///
    /// Disabling persistence moves the instance into the active unit if it
    /// is not already owned by it.
    pub fn set_persistent<H: SceneHost + ?Sized>(
        &mut self,
        type_key: &TypeKey,
        persistent: bool,
        host: &mut H,
    ) -> RegistryResult<()> {
        let entry = self
            .entries
            .get_mut(type_key)
            .ok_or_else(|| RegistryError::NotRegistered(type_key.clone()))?;

        if persistent {
            host.mark_persistent(entry.instance);
        } else if let Some(active) = host.active_unit() {
            if host.instance_unit(entry.instance).as_deref() != Some(active.name.as_str()) {
                host.move_instance_to_unit(entry.instance, &active);
            }
        }

        entry.persistent = persistent;
        Ok(())
    }

    /// Drop entries whose instance no longer exists in the host.
    /// Returns the number of entries removed.
    pub fn retain_live<H: SceneHost + ?Sized>(&mut self, host: &H) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let live = host.instance_exists(entry.instance);
            if !live {
                log::debug!("{} for {} was destroyed", entry.instance, key);
            }
            live
        });
        before - self.entries.len()
    }

    /// Registered instance for a type
    pub fn get(&self, type_key: &TypeKey) -> Option<InstanceId> {
        self.entries.get(type_key).map(|e| e.instance)
    }

    pub fn entry(&self, type_key: &TypeKey) -> Option<&RegistryEntry> {
        self.entries.get(type_key)
    }

    pub fn contains(&self, type_key: &TypeKey) -> bool {
        self.entries.contains_key(type_key)
    }

    pub fn is_persistent(&self, type_key: &TypeKey) -> bool {
        self.entries.get(type_key).map(|e| e.persistent).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the registry still accepts registrations
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Clear every entry and refuse further registrations
    pub fn shutdown(&mut self) {
        log::debug!("Instance registry shutting down ({} entries)", self.entries.len());
        self.entries.clear();
        self.alive = false;
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe instance registry wrapper
pub struct SharedInstanceRegistry {
    inner: Arc<RwLock<InstanceRegistry>>,
}

impl SharedInstanceRegistry {
    /// Create a new shared registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(InstanceRegistry::new())),
        }
    }

    /// Get a read lock
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, InstanceRegistry> {
        self.inner.read()
    }

    /// Get a write lock
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, InstanceRegistry> {
        self.inner.write()
    }
}

impl Default for SharedInstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SharedInstanceRegistry {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
