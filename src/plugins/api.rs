//! Contracts implemented by sink plugins
//!
//! Two shapes are supported:
//!
//! - **v1**: a single [`ConsumerFn`]. Every call gets the full [`ConsumerCall`]
//!   (context, payload, mask) and there is no persistent state the runtime
//!   knows about.
//! - **v2**: a [`ModuleLoader`] whose `load` yields a [`ConsumerModule`], the
//!   factory and lifecycle owner of [`ConsumerInstance`]s.
//!
//! v2 objects report the methods they export. The adapter checks the export
//! lists before first use, so a plugin missing a required method is rejected
//! with a named error instead of silently running a default body.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use super::PluginError;
use super::logger::ConsumerLogger;
use super::tracer::{Tracer, redact_secrets};
use crate::config::declaration::InstanceId;
use crate::data::{DataMask, DataPayload};
use crate::pipeline::PipelineSettings;

/// Methods a v2 module must export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleMethod {
    CreateConsumer,
    DeleteConsumer,
    OnLoad,
    OnUnload,
}

impl ModuleMethod {
    pub const ALL: &'static [ModuleMethod] = &[
        ModuleMethod::CreateConsumer,
        ModuleMethod::DeleteConsumer,
        ModuleMethod::OnLoad,
        ModuleMethod::OnUnload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModuleMethod::CreateConsumer => "createConsumer",
            ModuleMethod::DeleteConsumer => "deleteConsumer",
            ModuleMethod::OnLoad => "onLoad",
            ModuleMethod::OnUnload => "onUnload",
        }
    }
}

/// Methods a v2 consumer instance must export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceMethod {
    OnData,
    OnLoad,
    OnUnload,
}

impl InstanceMethod {
    pub const ALL: &'static [InstanceMethod] = &[
        InstanceMethod::OnData,
        InstanceMethod::OnLoad,
        InstanceMethod::OnUnload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InstanceMethod::OnData => "onData",
            InstanceMethod::OnLoad => "onLoad",
            InstanceMethod::OnUnload => "onUnload",
        }
    }
}

/// Everything a consumer is given about itself
pub struct ConsumerContext {
    pub id: InstanceId,
    pub consumer_type: String,
    /// Deep copy of the declared config; the plugin may keep or mutate it freely
    pub origin_config: Value,
    pub logger: ConsumerLogger,
    pub tracer: Option<Arc<dyn Tracer>>,
    pub pipeline: PipelineSettings,
}

impl ConsumerContext {
    pub fn new(id: InstanceId, consumer_type: &str, origin_config: Value) -> Self {
        let logger = ConsumerLogger::new(consumer_type, &id);
        Self {
            id,
            consumer_type: consumer_type.to_string(),
            origin_config,
            logger,
            tracer: None,
            pipeline: PipelineSettings::default(),
        }
    }

    pub fn with_tracer(mut self, tracer: Option<Arc<dyn Tracer>>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineSettings) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Hand a redacted copy of `payload` to the tracer, if any
    pub fn trace(&self, payload: &Value) {
        if let Some(tracer) = &self.tracer {
            tracer.write(&redact_secrets(payload));
        }
    }
}

impl std::fmt::Debug for ConsumerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerContext")
            .field("id", &self.id)
            .field("consumer_type", &self.consumer_type)
            .field("tracing", &self.tracer.is_some())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// Module-level context passed to a v2 loader and module
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub name: String,
    pub path: PathBuf,
    pub logger: ConsumerLogger,
}

impl ModuleContext {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            logger: ConsumerLogger::for_module(name),
        }
    }
}

/// One invocation of a v1 plugin
#[derive(Debug)]
pub struct ConsumerCall {
    pub context: Arc<ConsumerContext>,
    pub payload: DataPayload,
    pub mask: DataMask,
}

/// v1 plugin: a single stateless callable
///
/// A push call usually resolves to `Ok(None)`; a pull call (batch payload)
/// resolves to the value to hand back to the requester.
#[async_trait]
pub trait ConsumerFn: Send + Sync {
    async fn call(&self, call: ConsumerCall) -> anyhow::Result<Option<Value>>;
}

/// v2 plugin entry point
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, context: &ModuleContext) -> anyhow::Result<Arc<dyn ConsumerModule>>;
}

/// v2 module: factory and lifecycle owner of consumer instances
#[async_trait]
pub trait ConsumerModule: Send + Sync {
    /// Methods this module actually implements
    fn exports(&self) -> &'static [ModuleMethod];

    async fn on_load(&self, _context: &ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn create_consumer(
        &self,
        _context: Arc<ConsumerContext>,
    ) -> anyhow::Result<Arc<dyn ConsumerInstance>> {
        anyhow::bail!("createConsumer is not implemented")
    }

    /// Release an instance; `error` is set when the instance is torn down
    /// because it failed
    async fn delete_consumer(
        &self,
        _instance: Arc<dyn ConsumerInstance>,
        _error: Option<&PluginError>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_unload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// v2 consumer instance
#[async_trait]
pub trait ConsumerInstance: Send + Sync {
    /// Methods this instance actually implements
    fn exports(&self) -> &'static [InstanceMethod];

    fn allows_pull(&self) -> bool {
        false
    }

    fn allows_push(&self) -> bool {
        true
    }

    async fn on_load(&self, _context: &ConsumerContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Push: accept data for asynchronous delivery and resolve once it is
    /// queued. Pull: compute and return the result for the given batch.
    async fn on_data(
        &self,
        _payload: DataPayload,
        _mask: &DataMask,
    ) -> anyhow::Result<Option<Value>> {
        anyhow::bail!("onData is not implemented")
    }

    async fn on_unload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// First method of `required` missing from `exported`
pub(crate) fn first_missing<M: PartialEq + Copy>(required: &[M], exported: &[M]) -> Option<M> {
    required.iter().copied().find(|m| !exported.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(ModuleMethod::CreateConsumer.name(), "createConsumer");
        assert_eq!(InstanceMethod::OnData.name(), "onData");
    }

    #[test]
    fn test_first_missing() {
        let exported = [ModuleMethod::CreateConsumer, ModuleMethod::OnLoad];
        assert_eq!(
            first_missing(ModuleMethod::ALL, &exported),
            Some(ModuleMethod::DeleteConsumer)
        );
        assert_eq!(first_missing(ModuleMethod::ALL, ModuleMethod::ALL), None);
    }

    #[test]
    fn test_context_trace_redacts() {
        use crate::plugins::tracer::MockTracer;

        let mut tracer = MockTracer::new();
        tracer
            .expect_write()
            .withf(|payload| payload["token"] == "*****" && payload["host"] == "h")
            .times(1)
            .return_const(());

        let context = ConsumerContext::new(InstanceId::default_ns("c1"), "Stdout", Value::Null)
            .with_tracer(Some(Arc::new(tracer)));
        context.trace(&serde_json::json!({"token": "t", "host": "h"}));
    }
}
