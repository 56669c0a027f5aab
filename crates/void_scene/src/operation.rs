//! Load/unload operation handles
//!
//! An [`OperationHandle`] is shared between the host that performs the work
//! and the controller that requested it. The host reports progress and
//! completion; the controller reads progress and gates activation.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::fmt;
use std::sync::Arc;

use crate::unit::LoadMode;

/// Progress at which a held load is ready to activate
pub const ACTIVATION_THRESHOLD: f32 = 0.9;

/// Unique identifier for an operation, allocated by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Direction of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Load,
    Unload,
}

/// Operation status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationStatus {
    /// Host is still working
    InProgress = 0,
    /// Finished successfully
    Done = 1,
    /// Host gave up on the unit
    Failed = 2,
}

impl From<u8> for OperationStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Done,
            2 => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

/// Shared operation state
struct OperationData {
    id: OperationId,
    kind: OperationKind,
    unit: String,
    mode: LoadMode,
    /// f32 bits
    progress: AtomicU32,
    allow_activation: AtomicBool,
    status: AtomicU8,
}

/// Handle to a pending load or unload
#[derive(Clone)]
pub struct OperationHandle {
    data: Arc<OperationData>,
}

impl OperationHandle {
    /// Create a new in-progress operation. Activation is allowed by default.
    pub fn new(id: OperationId, kind: OperationKind, unit: impl Into<String>, mode: LoadMode) -> Self {
        Self {
            data: Arc::new(OperationData {
                id,
                kind,
                unit: unit.into(),
                mode,
                progress: AtomicU32::new(0f32.to_bits()),
                allow_activation: AtomicBool::new(true),
                status: AtomicU8::new(OperationStatus::InProgress as u8),
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.data.id
    }

    pub fn kind(&self) -> OperationKind {
        self.data.kind
    }

    /// Name of the unit this operation targets
    pub fn unit(&self) -> &str {
        &self.data.unit
    }

    pub fn mode(&self) -> LoadMode {
        self.data.mode
    }

    /// Current progress in [0, 1]
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.data.progress.load(Ordering::Acquire))
    }

    /// Whether the host may finalize the unit once loaded
    pub fn allow_activation(&self) -> bool {
        self.data.allow_activation.load(Ordering::Acquire)
    }

    /// While false, a load is held at the activation threshold
    pub fn set_allow_activation(&self, allow: bool) {
        self.data.allow_activation.store(allow, Ordering::Release);
    }

    pub fn status(&self) -> OperationStatus {
        OperationStatus::from(self.data.status.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.status() == OperationStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.status() == OperationStatus::Failed
    }

    /// Done or failed
    pub fn is_finished(&self) -> bool {
        self.status() != OperationStatus::InProgress
    }

    /// Whether both handles refer to the same operation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    // Host side

    /// Report progress. Values are clamped to [0, 1] and never move backwards.
    pub fn report_progress(&self, progress: f32) {
        if self.is_finished() || progress.is_nan() {
            return;
        }
        let progress = progress.clamp(0.0, 1.0);
        let _ = self
            .data
            .progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (progress > f32::from_bits(bits)).then(|| progress.to_bits())
            });
    }

    /// Mark the operation complete
    pub fn finish(&self) {
        if self.is_finished() {
            return;
        }
        self.data.progress.store(1f32.to_bits(), Ordering::Release);
        let _ = self.data.status.compare_exchange(
            OperationStatus::InProgress as u8,
            OperationStatus::Done as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark the operation failed. Progress stays where it stopped.
    pub fn fail(&self) {
        let _ = self.data.status.compare_exchange(
            OperationStatus::InProgress as u8,
            OperationStatus::Failed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl PartialEq for OperationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.data.id == other.data.id
    }
}

impl Eq for OperationHandle {}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.data.id)
            .field("kind", &self.data.kind)
            .field("unit", &self.data.unit)
            .field("progress", &self.progress())
            .field("allow_activation", &self.allow_activation())
            .field("status", &self.status())
            .finish()
    }
}
