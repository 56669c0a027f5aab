//! Batch load coordinator
//!
//! Loads a list of units as one logical batch. Every member is submitted
//! with activation held; the coordinator samples their progress, averages
//! it, and once the average crosses the activation threshold it releases
//! every member at once, waits out the settle intervals, and hides the
//! loading indicator.
//!
//! The coordinator is a state machine advanced by [`BatchLoadCoordinator::tick`]:
//!
//! ```text
//! Idle -> Submitted -> AwaitingThreshold -> Settling -> Activating -> Complete
//!                              |
//!                              +-> Failed (member failed, timeout, cancelled)
//! ```
//!
//! [`crate::driver::drive`] runs the same machine on a tokio timer.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use void_event::{Signal, SubscriberId};

use crate::config::BatchConfig;
use crate::error::{SceneError, SceneResult};
use crate::events::BatchEvent;
use crate::host::SceneHost;
use crate::operation::OperationHandle;
use crate::unit::LoadUnit;

/// Slack when comparing averaged progress against the threshold
const PROGRESS_EPSILON: f32 = 1e-4;

/// Batch identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub u64);

/// Batch lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// No batch has been started
    Idle,
    /// Loads submitted, not yet sampled
    Submitted,
    /// Sampling progress until the threshold is reached
    AwaitingThreshold,
    /// Threshold reached, waiting before activation
    Settling,
    /// Activation released, waiting before completion
    Activating,
    /// Last batch completed
    Complete,
    /// Last batch was aborted
    Failed,
}

impl BatchPhase {
    /// Whether a batch is in flight
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::AwaitingThreshold | Self::Settling | Self::Activating
        )
    }

    /// Whether the last batch has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Aggregate state of the batch in flight
#[derive(Debug, Clone, Default)]
pub struct BatchLoadState {
    /// Member operations in submission order
    pub operations: Vec<OperationHandle>,
    /// Sum of member progress at the last sample
    pub total_progress: f32,
    /// Average member progress at the last sample, in [0, 1]
    pub normalized_progress: f32,
    /// `normalized_progress` as a percentage
    pub percentage: f32,
    pub is_active: bool,
}

/// Cooperative cancellation flag, checked at every tick
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Coordinates loading several units under one progress/activation gate
pub struct BatchLoadCoordinator {
    config: BatchConfig,
    phase: BatchPhase,
    state: BatchLoadState,
    /// Time accumulated through `tick`
    clock: Duration,
    started_at: Duration,
    next_poll: Duration,
    /// End of the current settle phase
    deadline: Duration,
    indicator_visible: bool,
    cancel: CancelToken,
    events: Signal<BatchEvent>,
    last_error: Option<SceneError>,
    current: Option<BatchId>,
    next_batch_id: u64,
}

impl BatchLoadCoordinator {
    /// Create a coordinator
    pub fn new(config: BatchConfig) -> SceneResult<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: BatchConfig) -> Self {
        Self {
            config,
            phase: BatchPhase::Idle,
            state: BatchLoadState::default(),
            clock: Duration::ZERO,
            started_at: Duration::ZERO,
            next_poll: Duration::ZERO,
            deadline: Duration::ZERO,
            indicator_visible: false,
            cancel: CancelToken::new(),
            events: Signal::new(),
            last_error: None,
            current: None,
            next_batch_id: 1,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn state(&self) -> &BatchLoadState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Batch in flight, if any
    pub fn current_batch(&self) -> Option<BatchId> {
        self.current.filter(|_| self.is_active())
    }

    pub fn normalized_progress(&self) -> f32 {
        self.state.normalized_progress
    }

    pub fn percentage(&self) -> f32 {
        self.state.percentage
    }

    pub fn indicator_visible(&self) -> bool {
        self.indicator_visible
    }

    /// Why the last batch was aborted
    pub fn last_error(&self) -> Option<&SceneError> {
        self.last_error.as_ref()
    }

    /// Token that aborts the current batch at the next tick
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether every tracked member has finished loading
    pub fn all_done(&self) -> bool {
        !self.state.operations.is_empty() && self.state.operations.iter().all(|op| op.is_done())
    }

    /// Subscribe to batch notifications
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriberId
    where
        F: Fn(&BatchEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Start loading a batch of units
    ///
    /// Invalid units are skipped. Fails with [`SceneError::BatchInProgress`]
    /// while another batch is active, and [`SceneError::EmptyBatch`] if no
    /// unit is loadable.
    pub fn start<H: SceneHost + ?Sized>(&mut self, units: &[LoadUnit], host: &mut H) -> SceneResult<BatchId> {
        if self.is_active() {
            log::warn!("Rejecting batch: {:?} still in progress", self.current);
            return Err(SceneError::BatchInProgress);
        }

        let valid: Vec<&LoadUnit> = units
            .iter()
            .filter(|unit| {
                let valid = unit.is_valid(&*host);
                if !valid {
                    log::debug!("Skipping invalid unit in batch: {}", unit);
                }
                valid
            })
            .collect();
        if valid.is_empty() {
            return Err(SceneError::EmptyBatch);
        }

        let id = BatchId(self.next_batch_id);
        self.next_batch_id += 1;
        self.current = Some(id);
        self.state = BatchLoadState::default();
        self.last_error = None;
        self.cancel = CancelToken::new();

        let names: Vec<String> = valid.iter().map(|u| u.identifier.clone()).collect();
        log::info!("Starting batch {:?}: {:?}", id, names);

        self.set_indicator(true);
        self.events.emit(&BatchEvent::Started { units: names });

        for unit in valid {
            let op = host.submit_load(&unit.identifier, unit.mode);
            op.set_allow_activation(false);
            self.state.operations.push(op);
        }

        self.state.is_active = true;
        self.phase = BatchPhase::Submitted;
        self.started_at = self.clock;
        self.next_poll = self.clock + self.config.poll_interval();
        Ok(id)
    }

    /// Start a batch of one unit
    pub fn load_single<H: SceneHost + ?Sized>(&mut self, name: &str, host: &mut H) -> SceneResult<BatchId> {
        self.start(&[LoadUnit::new(name)], host)
    }

    /// Advance the state machine by `dt`
    pub fn tick(&mut self, dt: Duration) -> BatchPhase {
        self.clock += dt;

        if !self.is_active() {
            return self.phase;
        }
        if self.cancel.is_cancelled() {
            self.abort(SceneError::Cancelled);
            return self.phase;
        }

        loop {
            // A member can fail in any phase, including after activation
            if self.phase.is_active() {
                if let Some(failed) = self.state.operations.iter().find(|op| op.is_failed()) {
                    let unit = failed.unit().to_string();
                    self.abort(SceneError::UnitFailed { unit });
                    break;
                }
            }

            match self.phase {
                BatchPhase::Submitted => {
                    self.phase = BatchPhase::AwaitingThreshold;
                }
                BatchPhase::AwaitingThreshold => {
                    if self.clock >= self.next_poll {
                        self.sample();
                        self.next_poll = self.clock + self.config.poll_interval();

                        if self.state.normalized_progress + PROGRESS_EPSILON >= self.config.activation_threshold {
                            log::debug!(
                                "Batch reached {:.1}%, settling",
                                self.state.percentage
                            );
                            self.phase = BatchPhase::Settling;
                            self.deadline = self.clock + self.config.settle_before_activation();
                            continue;
                        }
                    }

                    if let Some(timeout) = self.config.timeout() {
                        let elapsed = self.clock - self.started_at;
                        if elapsed >= timeout {
                            let pending = self.pending_units();
                            self.abort(SceneError::StalledBatch {
                                pending,
                                elapsed_ms: elapsed.as_millis() as u64,
                            });
                        }
                    }
                    break;
                }
                BatchPhase::Settling => {
                    if self.clock < self.deadline {
                        break;
                    }
                    self.activate_all();
                    self.phase = BatchPhase::Activating;
                    self.deadline +=
                        self.config.settle_after_activation() + self.config.extra_delay();
                }
                BatchPhase::Activating => {
                    if self.clock >= self.deadline {
                        self.finish();
                    }
                    break;
                }
                BatchPhase::Idle | BatchPhase::Complete | BatchPhase::Failed => break,
            }
        }

        self.phase
    }

    /// Abort the batch in flight. Returns false if nothing was active.
    pub fn cancel(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.abort(SceneError::Cancelled);
        true
    }

    /// Abort any batch in flight and drop all subscribers
    pub fn shutdown(&mut self) {
        self.cancel();
        self.events.clear();
    }

    fn sample(&mut self) {
        let count = self.state.operations.len();
        let total: f32 = self.state.operations.iter().map(|op| op.progress()).sum();
        let normalized = if count == 0 {
            0.0
        } else {
            (total / count as f32).clamp(0.0, 1.0)
        };

        self.state.total_progress = total;
        self.state.normalized_progress = normalized;
        self.state.percentage = normalized * 100.0;

        self.events.emit(&BatchEvent::Progress { normalized });
    }

    fn activate_all(&mut self) {
        log::debug!("Activating {} units", self.state.operations.len());
        for op in &self.state.operations {
            op.set_allow_activation(true);
        }
    }

    fn pending_units(&self) -> Vec<String> {
        self.state
            .operations
            .iter()
            .filter(|op| op.progress() < self.config.activation_threshold)
            .map(|op| op.unit().to_string())
            .collect()
    }

    fn set_indicator(&mut self, visible: bool) {
        if self.indicator_visible != visible {
            self.indicator_visible = visible;
            self.events.emit(&BatchEvent::Indicator { visible });
        }
    }

    fn finish(&mut self) {
        log::info!("Batch {:?} complete", self.current);
        self.set_indicator(false);
        self.state = BatchLoadState::default();
        self.phase = BatchPhase::Complete;
        self.events.emit(&BatchEvent::Completed);
    }

    fn abort(&mut self, error: SceneError) {
        log::warn!("Batch {:?} aborted: {}", self.current, error);
        self.set_indicator(false);
        self.state = BatchLoadState::default();
        self.phase = BatchPhase::Failed;
        self.last_error = Some(error.clone());
        self.events.emit(&BatchEvent::Failed { error });
    }
}

impl Default for BatchLoadCoordinator {
    fn default() -> Self {
        Self::with_config(BatchConfig::default())
    }
}

impl std::fmt::Debug for BatchLoadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoadCoordinator")
            .field("phase", &self.phase)
            .field("batch", &self.current)
            .field("members", &self.state.operations.len())
            .field("normalized_progress", &self.state.normalized_progress)
            .field("indicator_visible", &self.indicator_visible)
            .finish()
    }
}
