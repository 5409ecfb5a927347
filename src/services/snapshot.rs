//! What the reconciler publishes to data producers

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::capability::{CapabilityGate, GateError};
use crate::config::declaration::InstanceId;
use crate::data::{DataContext, DataMask};
use crate::plugins::LiveInstance;

/// Consumer and module counts after a reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumersStats {
    pub consumers: usize,
    pub modules: usize,
}

/// Serializable capability descriptor of a live consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub consumer_type: String,
    pub allows_pull: bool,
    pub allows_push: bool,
    pub v2: bool,
}

/// A live consumer as seen by producers
#[derive(Debug, Clone)]
pub struct PublishedConsumer {
    gate: CapabilityGate,
}

impl PublishedConsumer {
    pub fn new(instance: Arc<LiveInstance>) -> Self {
        Self {
            gate: CapabilityGate::new(instance),
        }
    }

    pub fn id(&self) -> &InstanceId {
        self.gate.instance().id()
    }

    pub fn consumer_type(&self) -> &str {
        self.gate.instance().consumer_type()
    }

    pub fn allows_pull(&self) -> bool {
        self.gate.allows_pull()
    }

    pub fn allows_push(&self) -> bool {
        self.gate.allows_push()
    }

    pub fn is_v2(&self) -> bool {
        self.gate.instance().is_v2()
    }

    /// Entry point for pushing to or pulling from this consumer
    pub fn gate(&self) -> &CapabilityGate {
        &self.gate
    }

    pub fn instance(&self) -> &Arc<LiveInstance> {
        self.gate.instance()
    }

    pub fn descriptor(&self) -> ConsumerDescriptor {
        ConsumerDescriptor {
            id: self.id().to_string(),
            consumer_type: self.consumer_type().to_string(),
            allows_pull: self.allows_pull(),
            allows_push: self.allows_push(),
            v2: self.is_v2(),
        }
    }
}

/// Live consumer set published after each reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ConsumersSnapshot {
    pub generation: u64,
    pub consumers: Vec<PublishedConsumer>,
    pub stats: ConsumersStats,
}

impl ConsumersSnapshot {
    pub fn get(&self, id: &InstanceId) -> Option<&PublishedConsumer> {
        self.consumers.iter().find(|c| c.id() == id)
    }

    /// Consumers of one namespace (None = default namespace)
    pub fn in_namespace<'a>(
        &'a self,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = &'a PublishedConsumer> + 'a {
        self.consumers
            .iter()
            .filter(move |c| c.id().namespace() == namespace)
    }

    pub fn pull_targets(&self) -> impl Iterator<Item = &PublishedConsumer> {
        self.consumers.iter().filter(|c| c.allows_pull())
    }

    pub fn descriptors(&self) -> Vec<ConsumerDescriptor> {
        self.consumers.iter().map(PublishedConsumer::descriptor).collect()
    }

    /// Push a context to every push-capable consumer of its namespace
    ///
    /// Consumers are fed concurrently; one failing consumer does not affect
    /// the others.
    pub async fn broadcast(
        &self,
        context: Arc<DataContext>,
        mask: &DataMask,
    ) -> Vec<(InstanceId, Result<(), GateError>)> {
        let targets: Vec<&PublishedConsumer> = self
            .in_namespace(context.namespace.as_deref())
            .filter(|c| c.allows_push())
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|c| c.gate().push(context.clone(), mask)),
        )
        .await;

        targets
            .into_iter()
            .map(|c| c.id().clone())
            .zip(results)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_serialize() {
        let stats = ConsumersStats {
            consumers: 3,
            modules: 2,
        };
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            serde_json::json!({"consumers": 3, "modules": 2})
        );
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ConsumersSnapshot::default();
        assert!(snapshot.get(&InstanceId::default_ns("a")).is_none());
        assert_eq!(snapshot.in_namespace(None).count(), 0);
        assert!(snapshot.descriptors().is_empty());
    }
}
