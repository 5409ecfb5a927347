//! Pull/push capability gate
//!
//! Routes a request to the consumer's data handler according to what the
//! consumer declared it can do. Push hands over one context for asynchronous
//! delivery; pull hands over the recent contexts and returns the consumer's
//! answer directly, without any egress queue in between.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::data::{DataContext, DataMask, DataPayload};
use crate::plugins::{LiveInstance, PluginError};

/// Capability gate errors
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("consumer '{0}' does not allow pull")]
    NotPullCapable(String),

    #[error("consumer '{0}' does not allow push")]
    NotPushCapable(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Capability-checked entry point to one live consumer
#[derive(Debug, Clone)]
pub struct CapabilityGate {
    instance: Arc<LiveInstance>,
}

impl CapabilityGate {
    pub fn new(instance: Arc<LiveInstance>) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> &Arc<LiveInstance> {
        &self.instance
    }

    pub fn allows_pull(&self) -> bool {
        self.instance.allows_pull()
    }

    pub fn allows_push(&self) -> bool {
        self.instance.allows_push()
    }

    /// Push one context to the consumer
    pub async fn push(&self, context: Arc<DataContext>, mask: &DataMask) -> Result<(), GateError> {
        if !self.allows_push() {
            return Err(self.report(GateError::NotPushCapable(self.instance.id().to_string())));
        }

        self.instance
            .deliver(DataPayload::Single(context), mask)
            .await
            .map(|_| ())
            .map_err(|err| self.report(err.into()))
    }

    /// Ask the consumer for its current value over the given contexts
    pub async fn pull(
        &self,
        contexts: Vec<Arc<DataContext>>,
        mask: &DataMask,
    ) -> Result<Value, GateError> {
        if !self.allows_pull() {
            return Err(self.report(GateError::NotPullCapable(self.instance.id().to_string())));
        }

        self.instance
            .deliver(DataPayload::Batch(contexts), mask)
            .await
            .map(Option::unwrap_or_default)
            .map_err(|err| self.report(err.into()))
    }

    /// Log a failure once, at the consumer, and hand it back
    fn report(&self, err: GateError) -> GateError {
        let logger = &self.instance.context().logger;
        match &err {
            GateError::Plugin(PluginError::Unloading(_)) => logger.debug(&err),
            _ => logger.warning(&err),
        }
        err
    }
}
