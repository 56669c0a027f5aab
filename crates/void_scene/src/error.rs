//! Error types for scene loading

use thiserror::Error;

use crate::host::InstanceId;
use crate::registry::TypeKey;

/// Scene loading errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("Invalid load unit: {0:?}")]
    InvalidUnit(String),

    #[error("Scene is invalid: '{0}' has no loaded instance")]
    NoActiveInstance(String),

    #[error("A batch load is already in progress")]
    BatchInProgress,

    #[error("Batch contains no loadable units")]
    EmptyBatch,

    #[error("Unit failed to load: {unit}")]
    UnitFailed { unit: String },

    #[error("Batch stalled after {elapsed_ms} ms, pending: {pending:?}")]
    StalledBatch { pending: Vec<String>, elapsed_ms: u64 },

    #[error("Batch load cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Instance registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Instance already registered for {type_key}: {existing:?}")]
    AlreadyExists { type_key: TypeKey, existing: InstanceId },

    #[error("No instance registered for {0}")]
    NotRegistered(TypeKey),

    #[error("Instance registry has been shut down")]
    ShutDown,
}

pub type RegistryResult<T> = Result<T, RegistryError>;
