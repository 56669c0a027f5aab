//! # Void Scene
//!
//! Scene load orchestration on top of the engine's content-streaming host.
//!
//! Provides:
//! - [`UnitLoader`] to load, preload, activate and unload a single unit
//! - [`BatchLoadCoordinator`] to load several units under one progress gate
//! - [`InstanceRegistry`] to keep one live instance per component type
//!
//! ## Host
//!
//! Nothing here touches engine globals. Every operation receives the
//! [`SceneHost`] it works against; [`MemoryHost`] is an in-process
//! implementation for tools and tests.
//!
//! ## Usage
//!
//! ```ignore
//! let mut host = MemoryHost::with_units(["world", "ui"]);
//! let mut coordinator = BatchLoadCoordinator::new(BatchConfig::default())?;
//!
//! coordinator.start(&[LoadUnit::new("world"), LoadUnit::additive("ui")], &mut host)?;
//!
//! // Once per frame
//! host.advance();
//! coordinator.tick(frame_time);
//!
//! // Or on a tokio runtime
//! driver::drive(&mut coordinator).await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod events;
pub mod host;
pub mod loader;
pub mod memory_host;
pub mod operation;
pub mod registry;
pub mod unit;

pub use config::{BatchConfig, SceneConfig, UnitLoaderConfig};
pub use coordinator::{BatchId, BatchLoadCoordinator, BatchLoadState, BatchPhase, CancelToken};
pub use error::{RegistryError, RegistryResult, SceneError, SceneResult};
pub use events::{BatchEvent, UnitEvent};
pub use host::{HostEvent, InstanceId, SceneHost, UnitInstance};
pub use loader::UnitLoader;
pub use memory_host::MemoryHost;
pub use operation::{OperationHandle, OperationId, OperationKind, OperationStatus, ACTIVATION_THRESHOLD};
pub use registry::{InstanceRegistry, RegistryEntry, SharedInstanceRegistry, TypeKey};
pub use unit::{LoadMode, LoadUnit};

pub mod prelude {
    pub use crate::config::{BatchConfig, SceneConfig, UnitLoaderConfig};
    pub use crate::coordinator::{BatchLoadCoordinator, BatchPhase};
    pub use crate::error::{SceneError, SceneResult};
    pub use crate::events::{BatchEvent, UnitEvent};
    pub use crate::host::SceneHost;
    pub use crate::loader::UnitLoader;
    pub use crate::registry::{InstanceRegistry, TypeKey};
    pub use crate::unit::{LoadMode, LoadUnit};
}
