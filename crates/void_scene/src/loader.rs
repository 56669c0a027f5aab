//! Per-unit load controller
//!
//! A [`UnitLoader`] drives the load/unload lifecycle of one [`LoadUnit`].
//! It owns at most one outstanding load and one outstanding unload, and
//! reports each transition to its subscribers exactly once.
//!
//! Completion reaches the loader by two routes:
//! - the completion listener armed on a tracked operation, polled by
//!   [`UnitLoader::update`]
//! - the host's lifecycle broadcasts, fed in through
//!   [`UnitLoader::handle_host_event`]
//!
//! Notifications are keyed by operation id, so whichever route sees a
//! completion first reports it and the other is ignored.

use std::collections::VecDeque;

use void_event::{Signal, SubscriberId};

use crate::config::UnitLoaderConfig;
use crate::coordinator::BatchLoadCoordinator;
use crate::error::{SceneError, SceneResult};
use crate::events::UnitEvent;
use crate::host::{HostEvent, SceneHost};
use crate::operation::{OperationHandle, OperationId, ACTIVATION_THRESHOLD};
use crate::unit::{LoadMode, LoadUnit};

/// Operations remembered for de-duplicating notifications
const RECENT_NOTIFICATIONS: usize = 8;

/// One tracked operation plus its completion listener
#[derive(Debug, Default)]
struct Tracked {
    operation: Option<OperationHandle>,
    listening: bool,
    /// Operations a notification was recently raised for, oldest first
    notified: VecDeque<OperationId>,
}

impl Tracked {
    fn arm(&mut self, operation: OperationHandle) {
        self.operation = Some(operation);
        self.listening = true;
    }

    /// Drop the listener and the reference it was attached to.
    /// Safe to call any number of times.
    fn disarm(&mut self) {
        if self.listening {
            self.operation = None;
            self.listening = false;
        }
    }

    /// Whether `id` will be reported through the armed listener
    fn is_listening_for(&self, id: Option<OperationId>) -> bool {
        self.listening
            && id.is_some()
            && self.operation.as_ref().map(|op| op.id()) == id
    }

    /// Record a notification. Returns false if `id` was already reported.
    fn mark_notified(&mut self, id: Option<OperationId>) -> bool {
        let Some(id) = id else {
            return true;
        };
        if self.notified.contains(&id) {
            return false;
        }
        if self.notified.len() == RECENT_NOTIFICATIONS {
            self.notified.pop_front();
        }
        self.notified.push_back(id);
        true
    }
}

/// Load controller for a single unit
pub struct UnitLoader {
    config: UnitLoaderConfig,
    load: Tracked,
    unload: Tracked,
    events: Signal<UnitEvent>,
}

impl UnitLoader {
    /// Create a loader from configuration
    pub fn new(config: UnitLoaderConfig) -> Self {
        Self {
            config,
            load: Tracked::default(),
            unload: Tracked::default(),
            events: Signal::new(),
        }
    }

    /// Create a loader for a unit with default options
    pub fn for_unit(unit: LoadUnit) -> Self {
        Self::new(UnitLoaderConfig::new(unit))
    }

    pub fn config(&self) -> &UnitLoaderConfig {
        &self.config
    }

    pub fn unit(&self) -> Option<&LoadUnit> {
        self.config.unit.as_ref()
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriberId
    where
        F: Fn(&UnitEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    /// The tracked load, if one is in flight
    pub fn load_operation(&self) -> Option<&OperationHandle> {
        self.load.operation.as_ref()
    }

    /// The tracked unload, if one is in flight
    pub fn unload_operation(&self) -> Option<&OperationHandle> {
        self.unload.operation.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.load.operation.is_some()
    }

    /// Whether the load completion listener is armed
    pub fn is_listening_for_load(&self) -> bool {
        self.load.listening
    }

    /// Run start-of-life work: preloads when `preload_on_start` is set
    pub fn start<H: SceneHost + ?Sized>(&mut self, host: &mut H) {
        if self.config.preload_on_start {
            self.preload_async(host);
        }
    }

    fn valid_unit<H: SceneHost + ?Sized>(&self, host: &H) -> Option<LoadUnit> {
        match &self.config.unit {
            Some(unit) if unit.is_valid(host) => Some(unit.clone()),
            other => {
                log::debug!("Skipping request for invalid unit: {:?}", other);
                None
            }
        }
    }

    /// Load the unit with activation allowed. Completion arrives through the
    /// host broadcast. No-op for an invalid unit.
    ///
    /// With a load already in flight nothing is submitted; the existing load
    /// is polled as in [`UnitLoader::load_async`].
    pub fn load<H: SceneHost + ?Sized>(&mut self, host: &mut H) {
        let Some(unit) = self.valid_unit(&*host) else {
            return;
        };
        if let Some(op) = self.in_flight_load() {
            self.release_if_ready(&op);
            return;
        }

        log::debug!("Loading {}", unit);
        let op = host.submit_load(&unit.identifier, unit.mode);
        self.load.operation = Some(op);
    }

    /// Start a tracked load, or poll the one already in flight.
    ///
    /// With nothing in flight this submits a load with the given activation
    /// flag and arms one completion listener. With a load in flight it never
    /// submits again: once that load has reached the activation threshold,
    /// activation is allowed and the listener is disarmed, handing the
    /// completion report to the host broadcast. Call it once per frame to
    /// implement "press any key to continue".
    ///
    /// Returns the in-flight operation, or `None` for an invalid unit. A
    /// loader configured with `use_coordinator` only loads through
    /// [`UnitLoader::load_routed`] and returns `None` here.
    pub fn load_async<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        allow_activation: bool,
    ) -> Option<OperationHandle> {
        if self.config.use_coordinator {
            log::warn!(
                "{} loads through the batch coordinator, use load_routed",
                self.unit_name()
            );
            return None;
        }
        self.load_direct(host, allow_activation)
    }

    /// Load through `coordinator` when `use_coordinator` is set, otherwise
    /// the same as [`UnitLoader::load_async`]
    ///
    /// Returns the operation the load is running under.
    pub fn load_routed<H: SceneHost + ?Sized>(
        &mut self,
        coordinator: &mut BatchLoadCoordinator,
        host: &mut H,
        allow_activation: bool,
    ) -> SceneResult<Option<OperationHandle>> {
        if !self.config.use_coordinator {
            return Ok(self.load_direct(host, allow_activation));
        }
        self.load_batched(coordinator, host)?;
        Ok(coordinator.state().operations.first().cloned())
    }

    fn load_direct<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        allow_activation: bool,
    ) -> Option<OperationHandle> {
        let unit = self.valid_unit(&*host)?;

        if let Some(op) = self.in_flight_load() {
            self.release_if_ready(&op);
            return Some(op);
        }

        self.load.disarm();
        let op = host.submit_load(&unit.identifier, unit.mode);
        op.set_allow_activation(allow_activation);
        log::debug!(
            "Submitted {} for {} (activation {})",
            op.id(),
            unit,
            if allow_activation { "allowed" } else { "held" }
        );
        self.load.arm(op.clone());
        Some(op)
    }

    /// Load with activation held, unless a load is already tracked
    pub fn preload_async<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Option<OperationHandle> {
        if self.in_flight_load().is_some() {
            return None;
        }
        self.load_direct(host, false)
    }

    /// Route the load through a batch coordinator as a one-unit batch
    pub fn load_batched<H: SceneHost + ?Sized>(
        &self,
        coordinator: &mut BatchLoadCoordinator,
        host: &mut H,
    ) -> SceneResult<()> {
        let unit = self
            .valid_unit(&*host)
            .ok_or_else(|| SceneError::InvalidUnit(self.unit_name().to_string()))?;
        coordinator.start(std::slice::from_ref(&unit), host).map(|_| ())
    }

    /// Unload the unit. Completion arrives through the host broadcast.
    pub fn unload<H: SceneHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(unit) = self.valid_unit(&*host) {
            if host.submit_unload(&unit.identifier).is_none() {
                log::debug!("{} is not loaded, nothing to unload", unit.identifier);
            }
        }
    }

    /// Start a tracked unload, or return the one already in flight
    pub fn unload_async<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Option<OperationHandle> {
        if let Some(op) = &self.unload.operation {
            return Some(op.clone());
        }
        let unit = self.valid_unit(&*host)?;

        self.unload.disarm();
        let op = host.submit_unload(&unit.identifier)?;
        log::debug!("Submitted {} to unload {}", op.id(), unit.identifier);
        self.unload.arm(op.clone());
        Some(op)
    }

    /// Make the unit the host's active unit
    ///
    /// Fails with [`SceneError::NoActiveInstance`] if the unit is not loaded;
    /// the host is not touched in that case.
    pub fn set_active<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> SceneResult<()> {
        let name = self.unit_name().to_string();
        let instance = host
            .unit_by_name(&name)
            .ok_or_else(|| SceneError::NoActiveInstance(name.clone()))?;

        host.set_active_unit(&instance);
        self.events.emit(&UnitEvent::Activated { unit: name });
        Ok(())
    }

    /// Reload whatever unit is active, in `Single` mode
    ///
    /// Shares the loader's single load slot: with a load in flight that load
    /// is polled and returned instead.
    pub fn restart_current_unit<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Option<OperationHandle> {
        if let Some(op) = self.in_flight_load() {
            self.release_if_ready(&op);
            return Some(op);
        }
        let Some(active) = host.active_unit() else {
            log::warn!("No active unit to restart");
            return None;
        };
        log::debug!("Restarting {}", active.name);
        let op = host.submit_load(&active.name, LoadMode::Single);
        self.load.operation = Some(op.clone());
        Some(op)
    }

    /// Unload whatever unit is active
    pub fn unload_current_unit<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Option<OperationHandle> {
        let active = host.active_unit()?;
        host.submit_unload(&active.name)
    }

    /// Poll tracked operations and report completions
    pub fn update(&mut self) {
        self.update_load();
        self.update_unload();
    }

    fn update_load(&mut self) {
        if let Some(op) = self.load.operation.clone() {
            if op.is_failed() {
                self.load.disarm();
                self.load.operation = None;
                log::warn!("Load of {} failed", op.unit());
                self.events.emit(&UnitEvent::Failed { unit: op.unit().to_string() });
            } else if op.is_done() {
                let listening = self.load.listening;
                self.load.disarm();
                self.load.operation = None;
                if listening {
                    self.notify_loaded(op.unit().to_string(), Some(op.id()));
                }
            }
        }
    }

    fn update_unload(&mut self) {
        if let Some(op) = self.unload.operation.clone() {
            if op.is_finished() {
                let listening = self.unload.listening;
                self.unload.disarm();
                self.unload.operation = None;
                if op.is_failed() {
                    log::warn!("Unload of {} failed", op.unit());
                    self.events.emit(&UnitEvent::Failed { unit: op.unit().to_string() });
                } else if listening {
                    self.notify_unloaded(op.unit().to_string(), Some(op.id()));
                }
            }
        }
    }

    /// Feed a host broadcast to the loader
    pub fn handle_host_event(&mut self, event: &HostEvent) {
        if event.unit() != self.unit_name() {
            return;
        }

        match event {
            HostEvent::UnitLoaded { unit, operation, .. } => {
                if !self.load.is_listening_for(*operation) {
                    self.notify_loaded(unit.clone(), *operation);
                }
            }
            HostEvent::UnitUnloaded { unit, operation } => {
                if !self.unload.is_listening_for(*operation) {
                    self.notify_unloaded(unit.clone(), *operation);
                }
            }
            HostEvent::ActiveUnitChanged { .. } => {}
        }
    }

    /// Drop both listeners. Call before discarding the loader.
    pub fn teardown(&mut self) {
        self.load.disarm();
        self.unload.disarm();
        self.load.operation = None;
        self.unload.operation = None;
    }

    /// Tracked load that has not finished yet. Finished loads are reaped
    /// first, so their notifications are not lost.
    fn in_flight_load(&mut self) -> Option<OperationHandle> {
        self.update_load();
        self.load.operation.clone()
    }

    /// Release activation on a load that reached the threshold and hand its
    /// completion report to the host broadcast
    fn release_if_ready(&mut self, op: &OperationHandle) {
        if op.progress() >= ACTIVATION_THRESHOLD && !op.allow_activation() {
            log::debug!("{} ready, allowing activation", op.unit());
            op.set_allow_activation(true);
            self.load.listening = false;
        }
    }

    fn unit_name(&self) -> &str {
        self.config
            .unit
            .as_ref()
            .map(|u| u.identifier.as_str())
            .unwrap_or("")
    }

    fn notify_loaded(&mut self, unit: String, operation: Option<OperationId>) {
        if self.load.mark_notified(operation) {
            log::debug!("Unit loaded: {}", unit);
            self.events.emit(&UnitEvent::Loaded { unit });
        }
    }

    fn notify_unloaded(&mut self, unit: String, operation: Option<OperationId>) {
        if self.unload.mark_notified(operation) {
            log::debug!("Unit unloaded: {}", unit);
            self.events.emit(&UnitEvent::Unloaded { unit });
        }
    }
}

impl std::fmt::Debug for UnitLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitLoader")
            .field("unit", &self.config.unit)
            .field("load", &self.load)
            .field("unload", &self.unload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_host::MemoryHost;

    #[test]
    fn test_tracked_disarm_idempotent() {
        let mut tracked = Tracked::default();
        tracked.disarm();
        assert!(!tracked.listening);

        let op = OperationHandle::new(OperationId(3), crate::operation::OperationKind::Load, "a", LoadMode::Single);
        tracked.arm(op);
        assert!(tracked.is_listening_for(Some(OperationId(3))));
        assert!(!tracked.is_listening_for(None));

        tracked.disarm();
        tracked.disarm();
        assert!(tracked.operation.is_none());
        assert!(!tracked.is_listening_for(Some(OperationId(3))));
    }

    #[test]
    fn test_mark_notified_once_per_operation() {
        let mut tracked = Tracked::default();
        assert!(tracked.mark_notified(Some(OperationId(1))));
        assert!(!tracked.mark_notified(Some(OperationId(1))));
        assert!(tracked.mark_notified(Some(OperationId(2))));
        assert!(!tracked.mark_notified(Some(OperationId(1))));
        // Broadcasts without an operation are never de-duplicated
        assert!(tracked.mark_notified(None));
        assert!(tracked.mark_notified(None));
    }

    #[test]
    fn test_mark_notified_window_is_bounded() {
        let mut tracked = Tracked::default();
        for id in 0..RECENT_NOTIFICATIONS as u64 + 1 {
            assert!(tracked.mark_notified(Some(OperationId(id))));
        }
        assert_eq!(tracked.notified.len(), RECENT_NOTIFICATIONS);
        // Oldest entry was evicted, newest is still remembered
        assert!(tracked.mark_notified(Some(OperationId(0))));
        assert!(!tracked.mark_notified(Some(OperationId(RECENT_NOTIFICATIONS as u64))));
    }

    #[test]
    fn test_loader_without_unit_is_inert() {
        let mut host = MemoryHost::with_units(["a"]);
        let mut loader = UnitLoader::new(UnitLoaderConfig::default());

        loader.load(&mut host);
        assert!(loader.load_async(&mut host, true).is_none());
        assert!(loader.preload_async(&mut host).is_none());
        assert!(loader.unload_async(&mut host).is_none());
        assert!(host.pending_operations().is_empty());
    }
}
