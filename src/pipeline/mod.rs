//! Delivery pipeline of a push-capable consumer
//!
//! Incoming data contexts land in an unbounded [`IngressQueue`]. Drain requests
//! are debounced: the first request arms a short timer, later ones are no-ops
//! until the drain has run. A drain pass transforms contexts in arrival order,
//! packs the resulting chunks into size-bounded payloads with a [`Chunker`] and
//! submits each payload to the [`EgressQueue`], which sends at most
//! `concurrency` payloads at once.
//!
//! A pass submits at most `budget_factor * concurrency - egress depth`
//! payloads. When the ingress queue still holds data afterwards, the drain
//! waits for egress capacity and runs again straight away, skipping the
//! debounce delay.

pub mod chunker;
pub mod egress;
pub mod error;
pub mod ingress;
pub mod metrics;
pub mod settings;

pub use chunker::Chunker;
pub use egress::EgressQueue;
pub use error::PipelineError;
pub use ingress::IngressQueue;
pub use metrics::{EgressMetrics, EgressSnapshot};
pub use settings::{PipelineOverrides, PipelineSettings};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::data::DataContext;
use crate::plugins::ConsumerLogger;
use crate::plugins::fault::{guard, guard_sync};

/// Wire side of a push consumer
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Serialize one context into zero or more chunks
    fn encode(&self, context: &DataContext) -> anyhow::Result<Vec<Vec<u8>>>;

    /// Send one payload; the transport owns its own timeout
    async fn send(&self, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Ingress buffer, debounced drain and bounded egress for one consumer
#[derive(Clone)]
pub struct DeliveryPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    logger: ConsumerLogger,
    settings: PipelineSettings,
    transport: Arc<dyn Transport>,
    ingress: IngressQueue<Arc<DataContext>>,
    egress: EgressQueue,
    metrics: Arc<EgressMetrics>,
    drain_scheduled: AtomicBool,
    closed: AtomicBool,
}

impl DeliveryPipeline {
    pub fn new(
        logger: ConsumerLogger,
        settings: PipelineSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let egress = EgressQueue::new(settings.concurrency, settings.max_queue_size);
        Self {
            inner: Arc::new(Inner {
                logger,
                settings,
                transport,
                ingress: IngressQueue::new(),
                egress,
                metrics: Arc::new(EgressMetrics::new()),
                drain_scheduled: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queue one context for delivery and request a drain
    pub fn push(&self, context: Arc<DataContext>) -> error::Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PipelineError::Closed);
        }

        self.inner.ingress.push(context);
        self.inner.metrics.context_received();
        self.request_drain();
        Ok(())
    }

    /// Queue several contexts, preserving their order
    pub fn push_all<I>(&self, contexts: I) -> error::Result<()>
    where
        I: IntoIterator<Item = Arc<DataContext>>,
    {
        for context in contexts {
            self.push(context)?;
        }
        Ok(())
    }

    /// Arm the debounced drain; a no-op while one is already scheduled
    pub fn request_drain(&self) {
        if self.inner.drain_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.settings.debounce).await;
            inner.run_drain().await;
        });
    }

    /// Stop accepting data; queued data is still delivered
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Wait until everything pushed so far has been sent or failed
    pub async fn flush(&self) {
        let inner = &self.inner;
        loop {
            let notified = inner.egress.progress().notified();
            if inner.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Close, drop whatever has not been handed to the egress queue yet and
    /// wait for the sends in flight
    pub async fn shutdown(&self) {
        self.close();
        let dropped = self.inner.ingress.clear();
        if dropped > 0 {
            self.inner.logger.warning(format!(
                "dropping {} undelivered data context(s) on shutdown",
                dropped
            ));
        }
        self.inner.egress.close();
        self.inner.egress.wait_idle().await;
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    pub fn metrics(&self) -> EgressSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn ingress_len(&self) -> usize {
        self.inner.ingress.len()
    }

    pub fn egress_depth(&self) -> usize {
        self.inner.egress.depth()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.inner.egress.peak_in_flight()
    }
}

impl std::fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("consumer", &self.inner.logger.consumer_id())
            .field("settings", &self.inner.settings)
            .field("ingress", &self.inner.ingress.len())
            .field("egress_depth", &self.inner.egress.depth())
            .finish()
    }
}

impl Inner {
    fn is_idle(&self) -> bool {
        self.ingress.is_empty()
            && !self.drain_scheduled.load(Ordering::Acquire)
            && self.egress.depth() == 0
    }

    /// Drain until the ingress queue is empty, then release the schedule flag
    async fn run_drain(self: Arc<Self>) {
        loop {
            self.drain_pass();

            if self.ingress.is_empty() {
                self.drain_scheduled.store(false, Ordering::Release);
                self.egress.progress().notify_waiters();

                // data pushed while the flag was still set would be stranded
                if self.ingress.is_empty() || self.drain_scheduled.swap(true, Ordering::AcqRel) {
                    return;
                }
                continue;
            }

            if self.egress.is_closed() {
                self.drain_scheduled.store(false, Ordering::Release);
                self.egress.progress().notify_waiters();
                return;
            }

            // backlog: wait for a free slot, then drain again without debounce
            let settings = &self.settings;
            self.egress
                .wait_until(|egress| settings.drain_budget(egress.depth()) > 0)
                .await;
        }
    }

    /// One budgeted pass over the ingress queue
    fn drain_pass(&self) {
        let mut budget = self.settings.drain_budget(self.egress.depth());
        let mut chunker = Chunker::new(self.settings.max_payload_bytes);

        while budget > 0 {
            let Some(context) = self.ingress.pop() else {
                break;
            };

            let chunks = match guard_sync(|| self.transport.encode(&context)) {
                Ok(chunks) => chunks,
                Err(fault) => {
                    self.logger.warning(format!(
                        "failed to transform {} data: {}",
                        context.event_type, fault
                    ));
                    continue;
                }
            };

            for chunk in chunks {
                if chunk.is_empty() {
                    self.metrics.empty_chunk();
                    continue;
                }
                if let Some(payload) = chunker.push(&chunk) {
                    budget = budget.saturating_sub(1);
                    if !self.submit(payload) {
                        self.drop_buffered(&mut chunker);
                        return;
                    }
                }
            }
        }

        if let Some(payload) = chunker.finish() {
            self.submit(payload);
        }
    }

    /// Hand one payload to the egress queue; false means back off
    fn submit(&self, payload: Vec<u8>) -> bool {
        let bytes = payload.len();
        let transport = self.transport.clone();
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();

        let result = self.egress.submit(async move {
            match guard(transport.send(payload)).await {
                Ok(()) => metrics.payload_sent(bytes as u64),
                Err(fault) => {
                    metrics.payload_failed();
                    logger.warning(format!("failed to deliver {} byte(s): {}", bytes, fault));
                }
            }
        });

        match result {
            Ok(()) => {
                self.metrics.payload_submitted();
                true
            }
            Err(err) => {
                self.metrics.payload_rejected();
                self.logger
                    .warning(format!("dropping {} byte(s): {}", bytes, err));
                false
            }
        }
    }

    fn drop_buffered(&self, chunker: &mut Chunker) {
        if let Some(rest) = chunker.finish() {
            self.metrics.payload_rejected();
            self.logger.warning(format!(
                "dropping {} buffered byte(s) after egress back-off",
                rest.len()
            ));
        }
    }
}
