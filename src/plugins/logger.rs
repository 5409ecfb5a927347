//! Logger handed to plugins
//!
//! Wraps `tracing` so that every line a consumer or module emits carries the
//! plugin type and the instance id.

use std::fmt::Display;
use std::sync::Arc;

/// Structured logger scoped to one plugin module or consumer instance
#[derive(Debug, Clone)]
pub struct ConsumerLogger {
    consumer_type: Arc<str>,
    consumer_id: Arc<str>,
}

impl ConsumerLogger {
    pub fn new(consumer_type: &str, consumer_id: impl Display) -> Self {
        Self {
            consumer_type: Arc::from(consumer_type),
            consumer_id: Arc::from(consumer_id.to_string()),
        }
    }

    /// Logger for module-level messages (no instance)
    pub fn for_module(consumer_type: &str) -> Self {
        Self::new(consumer_type, "-")
    }

    pub fn consumer_type(&self) -> &str {
        &self.consumer_type
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn verbose(&self, message: impl Display) {
        tracing::trace!(
            consumer_type = %self.consumer_type,
            consumer_id = %self.consumer_id,
            "{}",
            message
        );
    }

    pub fn debug(&self, message: impl Display) {
        tracing::debug!(
            consumer_type = %self.consumer_type,
            consumer_id = %self.consumer_id,
            "{}",
            message
        );
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(
            consumer_type = %self.consumer_type,
            consumer_id = %self.consumer_id,
            "{}",
            message
        );
    }

    pub fn warning(&self, message: impl Display) {
        tracing::warn!(
            consumer_type = %self.consumer_type,
            consumer_id = %self.consumer_id,
            "{}",
            message
        );
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(
            consumer_type = %self.consumer_type,
            consumer_id = %self.consumer_id,
            "{}",
            message
        );
    }
}
