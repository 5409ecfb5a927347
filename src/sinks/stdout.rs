//! `Stdout` sink (v2, push)
//!
//! Every consumer owns a [`DeliveryPipeline`] whose transport writes
//! newline-delimited JSON to standard output. Tests swap standard output for
//! an in-memory buffer.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::data::{DataContext, DataMask, DataPayload};
use crate::pipeline::{DeliveryPipeline, Transport};
use crate::plugins::api::{
    ConsumerContext, ConsumerInstance, ConsumerModule, InstanceMethod, ModuleContext,
    ModuleLoader, ModuleMethod,
};
use crate::plugins::PluginError;

/// Where the sink writes
#[derive(Debug, Clone)]
pub enum StdoutTarget {
    Stdout,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Entry point of the `Stdout` sink
#[derive(Debug, Clone)]
pub struct StdoutLoader {
    target: StdoutTarget,
}

impl StdoutLoader {
    pub fn stdout() -> Self {
        Self {
            target: StdoutTarget::Stdout,
        }
    }

    /// Loader whose consumers append to `buffer` instead of standard output
    pub fn buffer(buffer: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            target: StdoutTarget::Buffer(buffer),
        }
    }
}

#[async_trait]
impl ModuleLoader for StdoutLoader {
    async fn load(&self, context: &ModuleContext) -> anyhow::Result<Arc<dyn ConsumerModule>> {
        context.logger.verbose("stdout module loaded");
        Ok(Arc::new(StdoutModule {
            target: self.target.clone(),
        }))
    }
}

struct StdoutModule {
    target: StdoutTarget,
}

#[async_trait]
impl ConsumerModule for StdoutModule {
    fn exports(&self) -> &'static [ModuleMethod] {
        ModuleMethod::ALL
    }

    fn create_consumer(
        &self,
        context: Arc<ConsumerContext>,
    ) -> anyhow::Result<Arc<dyn ConsumerInstance>> {
        let transport = Arc::new(StdoutTransport {
            target: self.target.clone(),
        });
        let pipeline =
            DeliveryPipeline::new(context.logger.clone(), context.pipeline.clone(), transport);
        Ok(Arc::new(StdoutConsumer { pipeline }))
    }

    async fn delete_consumer(
        &self,
        _instance: Arc<dyn ConsumerInstance>,
        error: Option<&PluginError>,
    ) -> anyhow::Result<()> {
        if let Some(err) = error {
            tracing::debug!("Deleting failed stdout consumer: {}", err);
        }
        Ok(())
    }
}

struct StdoutConsumer {
    pipeline: DeliveryPipeline,
}

#[async_trait]
impl ConsumerInstance for StdoutConsumer {
    fn exports(&self) -> &'static [InstanceMethod] {
        InstanceMethod::ALL
    }

    async fn on_load(&self, context: &ConsumerContext) -> anyhow::Result<()> {
        context.logger.debug(format!(
            "writing to stdout (concurrency {}, max payload {} bytes)",
            context.pipeline.concurrency, context.pipeline.max_payload_bytes
        ));
        Ok(())
    }

    async fn on_data(&self, payload: DataPayload, mask: &DataMask) -> anyhow::Result<Option<Value>> {
        for context in payload.contexts() {
            self.pipeline.push(Arc::new(mask.apply(context)))?;
        }
        Ok(None)
    }

    async fn on_unload(&self) -> anyhow::Result<()> {
        self.pipeline.close();
        self.pipeline.flush().await;
        Ok(())
    }
}

struct StdoutTransport {
    target: StdoutTarget,
}

#[async_trait]
impl Transport for StdoutTransport {
    fn encode(&self, context: &DataContext) -> anyhow::Result<Vec<Vec<u8>>> {
        Ok(vec![super::ndjson_line(context)?])
    }

    async fn send(&self, payload: Vec<u8>) -> anyhow::Result<()> {
        match &self.target {
            StdoutTarget::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(&payload).await?;
                out.flush().await?;
            }
            StdoutTarget::Buffer(buffer) => {
                let mut buffer = match buffer.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                buffer.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}
