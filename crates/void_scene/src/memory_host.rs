//! In-process scene host
//!
//! `MemoryHost` simulates content streaming: operations advance by a fixed
//! step each time [`MemoryHost::advance`] is called, loads are held at the
//! activation threshold until activation is allowed, and lifecycle
//! broadcasts are queued until drained. Tools and tests use it in place of
//! the engine's streaming subsystem.

use std::collections::{HashMap, HashSet};

use void_event::EventChannel;

use crate::host::{HostEvent, InstanceId, SceneHost, UnitInstance};
use crate::operation::{OperationHandle, OperationId, OperationKind, ACTIVATION_THRESHOLD};
use crate::unit::LoadMode;

/// Default progress added per [`MemoryHost::advance`]
pub const DEFAULT_STEP: f32 = 0.25;

/// Simulated content-streaming host
#[derive(Debug)]
pub struct MemoryHost {
    /// Units the content index can resolve
    catalog: HashSet<String>,
    /// Loaded units in load order
    loaded: Vec<UnitInstance>,
    /// Foreground unit
    active: Option<String>,
    /// Operations still being worked on
    pending: Vec<OperationHandle>,
    /// Live instances and their owning unit (`None` = persistent)
    instances: HashMap<InstanceId, Option<String>>,
    /// Queued lifecycle broadcasts
    events: EventChannel<HostEvent>,
    /// Progress per advance
    step: f32,
    next_operation: u64,
    next_instance: u64,
    next_slot: u32,
    set_active_calls: u32,
}

impl MemoryHost {
    /// Create a host with an empty catalog
    pub fn new() -> Self {
        Self {
            catalog: HashSet::new(),
            loaded: Vec::new(),
            active: None,
            pending: Vec::new(),
            instances: HashMap::new(),
            events: EventChannel::new(),
            step: DEFAULT_STEP,
            next_operation: 1,
            next_instance: 1,
            next_slot: 0,
            set_active_calls: 0,
        }
    }

    /// Create a host that can resolve the given units
    pub fn with_units<I, S>(units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut host = Self::new();
        for unit in units {
            host.register_unit(unit);
        }
        host
    }

    /// Set progress added per advance
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step.clamp(f32::EPSILON, 1.0);
        self
    }

    /// Add a unit to the content index
    pub fn register_unit(&mut self, name: impl Into<String>) {
        self.catalog.insert(name.into());
    }

    /// Mark a unit loaded without going through an operation.
    /// The first loaded unit becomes active.
    pub fn preload_unit(&mut self, name: &str) {
        self.catalog.insert(name.to_string());
        self.push_loaded(name);
        if self.active.is_none() {
            self.active = Some(name.to_string());
        }
    }

    /// Advance every pending operation by one step
    pub fn advance(&mut self) {
        let step = self.step;
        let pending: Vec<OperationHandle> = self.pending.clone();

        for op in &pending {
            if op.is_finished() {
                continue;
            }

            match op.kind() {
                OperationKind::Load => {
                    let cap = if op.allow_activation() { 1.0 } else { ACTIVATION_THRESHOLD };
                    op.report_progress((op.progress() + step).min(cap));
                    if op.allow_activation() && op.progress() >= ACTIVATION_THRESHOLD {
                        op.finish();
                        self.apply_load(op);
                    }
                }
                OperationKind::Unload => {
                    op.report_progress(op.progress() + step);
                    if op.progress() >= 1.0 {
                        op.finish();
                        self.apply_unload(op.unit(), Some(op.id()));
                    }
                }
            }
        }

        self.pending.retain(|op| !op.is_finished());
    }

    /// Advance until nothing is pending or `max_steps` is reached
    pub fn run_until_idle(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while !self.pending.is_empty() && steps < max_steps {
            self.advance();
            steps += 1;
        }
        steps
    }

    /// Fail every pending operation for a unit
    pub fn fail_unit(&mut self, name: &str) {
        for op in self.pending.iter().filter(|op| op.unit() == name) {
            op.fail();
        }
        self.pending.retain(|op| !op.is_finished());
    }

    /// Take all queued broadcasts
    pub fn drain_events(&self) -> Vec<HostEvent> {
        self.events.drain()
    }

    /// Spawn an instance owned by a unit
    pub fn spawn_instance(&mut self, unit: &str) -> InstanceId {
        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.instances.insert(id, Some(unit.to_string()));
        id
    }

    /// Destroy an instance. Returns false if it did not exist.
    pub fn destroy_instance(&mut self, instance: InstanceId) -> bool {
        self.instances.remove(&instance).is_some()
    }

    /// Whether an instance survives unit transitions
    pub fn is_persistent(&self, instance: InstanceId) -> bool {
        matches!(self.instances.get(&instance), Some(None))
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|u| u.name == name)
    }

    /// Names of loaded units in load order
    pub fn loaded_units(&self) -> Vec<String> {
        self.loaded.iter().map(|u| u.name.clone()).collect()
    }

    pub fn pending_operations(&self) -> &[OperationHandle] {
        &self.pending
    }

    /// Number of times `set_active_unit` was called
    pub fn set_active_calls(&self) -> u32 {
        self.set_active_calls
    }

    fn next_operation_id(&mut self) -> OperationId {
        let id = OperationId(self.next_operation);
        self.next_operation += 1;
        id
    }

    fn push_loaded(&mut self, name: &str) {
        self.loaded.push(UnitInstance {
            name: name.to_string(),
            slot: self.next_slot,
        });
        self.next_slot += 1;
    }

    fn change_active(&mut self, current: Option<String>) {
        let previous = std::mem::replace(&mut self.active, current.clone());
        if let Some(current) = current {
            if previous.as_deref() != Some(current.as_str()) {
                self.events.send(HostEvent::ActiveUnitChanged { previous, current });
            }
        }
    }

    fn apply_load(&mut self, op: &OperationHandle) {
        let name = op.unit().to_string();

        if op.mode() == LoadMode::Single {
            let replaced: Vec<String> = self.loaded.drain(..).map(|u| u.name).collect();
            for unit in replaced {
                self.destroy_owned_by(&unit);
                self.events.send(HostEvent::UnitUnloaded { unit, operation: None });
            }
        }

        self.push_loaded(&name);
        self.events.send(HostEvent::UnitLoaded {
            unit: name.clone(),
            mode: op.mode(),
            operation: Some(op.id()),
        });

        if op.mode() == LoadMode::Single || self.active.is_none() {
            self.change_active(Some(name));
        }
    }

    fn apply_unload(&mut self, name: &str, operation: Option<OperationId>) {
        let Some(index) = self.loaded.iter().position(|u| u.name == name) else {
            return;
        };
        self.loaded.remove(index);

        if !self.is_loaded(name) {
            self.destroy_owned_by(name);
        }
        self.events.send(HostEvent::UnitUnloaded {
            unit: name.to_string(),
            operation,
        });

        if self.active.as_deref() == Some(name) && !self.is_loaded(name) {
            let next = self.loaded.first().map(|u| u.name.clone());
            if next.is_none() {
                self.active = None;
            } else {
                self.change_active(next);
            }
        }
    }

    fn destroy_owned_by(&mut self, unit: &str) {
        self.instances
            .retain(|_, owner| owner.as_deref() != Some(unit));
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHost for MemoryHost {
    fn contains_unit(&self, name: &str) -> bool {
        self.catalog.contains(name)
    }

    fn submit_load(&mut self, name: &str, mode: LoadMode) -> OperationHandle {
        let op = OperationHandle::new(self.next_operation_id(), OperationKind::Load, name, mode);
        if self.catalog.contains(name) {
            self.pending.push(op.clone());
        } else {
            op.fail();
        }
        op
    }

    fn submit_unload(&mut self, name: &str) -> Option<OperationHandle> {
        if !self.is_loaded(name) {
            return None;
        }
        let op = OperationHandle::new(self.next_operation_id(), OperationKind::Unload, name, LoadMode::Single);
        self.pending.push(op.clone());
        Some(op)
    }

    fn unit_by_name(&self, name: &str) -> Option<UnitInstance> {
        self.loaded.iter().find(|u| u.name == name).cloned()
    }

    fn active_unit(&self) -> Option<UnitInstance> {
        let active = self.active.as_deref()?;
        self.unit_by_name(active)
    }

    fn set_active_unit(&mut self, unit: &UnitInstance) {
        self.set_active_calls += 1;
        if self.is_loaded(&unit.name) {
            self.change_active(Some(unit.name.clone()));
        }
    }

    fn instance_unit(&self, instance: InstanceId) -> Option<String> {
        self.instances.get(&instance).cloned().flatten()
    }

    fn instance_exists(&self, instance: InstanceId) -> bool {
        self.instances.contains_key(&instance)
    }

    fn move_instance_to_unit(&mut self, instance: InstanceId, unit: &UnitInstance) {
        if let Some(owner) = self.instances.get_mut(&instance) {
            *owner = Some(unit.name.clone());
        }
    }

    fn mark_persistent(&mut self, instance: InstanceId) {
        if let Some(owner) = self.instances.get_mut(&instance) {
            *owner = None;
        }
    }
}
