//! Service layer
//!
//! The consumers service owns every plugin module and consumer instance and
//! reconciles them against configuration changes; producers only ever see the
//! snapshots it publishes.

pub mod consumers_service;
pub mod instance_pool;
pub mod snapshot;

pub use consumers_service::{ConsumersHandle, ConsumersService, ReconcileReport, ServiceSettings};
pub use instance_pool::InstancePool;
pub use snapshot::{ConsumerDescriptor, ConsumersSnapshot, ConsumersStats, PublishedConsumer};

/// Reconciler bookkeeping errors
///
/// These indicate a bug in the runtime itself, not a plugin failure, and are
/// propagated to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no instance pool for plugin '{0}'")]
    PoolMissing(String),

    #[error("consumer '{0}' is not registered in its pool")]
    InstanceMissing(String),

    #[error("consumers service is not running")]
    Stopped,

    #[error("consumers service task failed: {0}")]
    Task(String),
}
