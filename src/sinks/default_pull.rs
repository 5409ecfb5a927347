//! `Default` sink (v1, pull + push)
//!
//! Pushed contexts are remembered per consumer instance, the most recent
//! [`RECENT_LIMIT`] of them. A pull answers with the masked batch it was given
//! together with what was pushed lately.
//!
//! A v1 sink is never told about teardown, so every ring records the
//! `ConsumerContext` it was filled for. A ring whose context is gone is
//! dropped, and a consumer recreated under the same id starts empty.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::data::{DataMask, DataPayload};
use crate::plugins::api::{ConsumerCall, ConsumerContext, ConsumerFn};

/// Contexts remembered per consumer
pub const RECENT_LIMIT: usize = 10;

#[derive(Debug)]
struct Ring {
    owner: Weak<ConsumerContext>,
    entries: VecDeque<Value>,
}

impl Ring {
    fn owned_by(&self, context: &Arc<ConsumerContext>) -> bool {
        std::ptr::eq(self.owner.as_ptr(), Arc::as_ptr(context))
    }
}

/// Stateless from the runtime's point of view; state is keyed by consumer id
#[derive(Debug, Default)]
pub struct DefaultSink {
    recent: Mutex<HashMap<String, Ring>>,
}

impl DefaultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rings of live consumers only
    fn rings(&self) -> MutexGuard<'_, HashMap<String, Ring>> {
        let mut rings = match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rings.retain(|_, ring| ring.owner.strong_count() > 0);
        rings
    }

    fn remember(&self, context: &Arc<ConsumerContext>, entries: Vec<Value>) {
        let mut rings = self.rings();
        let ring = rings.entry(context.id.to_string()).or_insert_with(|| Ring {
            owner: Arc::downgrade(context),
            entries: VecDeque::new(),
        });
        if !ring.owned_by(context) {
            ring.owner = Arc::downgrade(context);
            ring.entries.clear();
        }

        for entry in entries {
            if ring.entries.len() == RECENT_LIMIT {
                ring.entries.pop_front();
            }
            ring.entries.push_back(entry);
        }
    }

    fn recent(&self, context: &Arc<ConsumerContext>) -> Vec<Value> {
        self.rings()
            .get(&context.id.to_string())
            .filter(|ring| ring.owned_by(context))
            .map(|ring| ring.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.rings().len()
    }
}

fn masked(payload: &DataPayload, mask: &DataMask) -> anyhow::Result<Vec<Value>> {
    payload
        .contexts()
        .into_iter()
        .map(|ctx| Ok(serde_json::to_value(mask.apply(ctx))?))
        .collect()
}

#[async_trait]
impl ConsumerFn for DefaultSink {
    async fn call(&self, call: ConsumerCall) -> anyhow::Result<Option<Value>> {
        let entries = masked(&call.payload, &call.mask)?;

        if call.payload.is_batch() {
            call.context
                .logger
                .verbose(format!("answering pull with {} context(s)", entries.len()));
            return Ok(Some(json!({
                "pulled": entries,
                "recent": self.recent(&call.context),
            })));
        }

        self.remember(&call.context, entries);
        Ok(None)
    }
}
