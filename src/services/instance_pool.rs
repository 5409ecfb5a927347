//! Live instances of one plugin type
//!
//! The pool owns the adapter of its plugin; the module stays loaded for as
//! long as the pool holds at least one instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::declaration::{InstanceId, NormalizedConsumer};
use crate::plugins::{LiveInstance, SinkAdapter};

struct PoolEntry {
    declaration: NormalizedConsumer,
    instance: Arc<LiveInstance>,
}

/// Instances of one sink type keyed by id
pub struct InstancePool {
    adapter: Arc<dyn SinkAdapter>,
    entries: BTreeMap<InstanceId, PoolEntry>,
}

impl InstancePool {
    pub fn new(adapter: Arc<dyn SinkAdapter>) -> Self {
        Self {
            adapter,
            entries: BTreeMap::new(),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn SinkAdapter> {
        &self.adapter
    }

    pub fn consumer_type(&self) -> &str {
        self.adapter.name()
    }

    pub fn insert(&mut self, declaration: NormalizedConsumer, instance: Arc<LiveInstance>) {
        self.entries.insert(
            declaration.id.clone(),
            PoolEntry {
                declaration,
                instance,
            },
        );
    }

    pub fn remove(&mut self, id: &InstanceId) -> Option<(NormalizedConsumer, Arc<LiveInstance>)> {
        self.entries
            .remove(id)
            .map(|entry| (entry.declaration, entry.instance))
    }

    pub fn get(&self, id: &InstanceId) -> Option<&Arc<LiveInstance>> {
        self.entries.get(id).map(|entry| &entry.instance)
    }

    pub fn declaration(&self, id: &InstanceId) -> Option<&NormalizedConsumer> {
        self.entries.get(id).map(|entry| &entry.declaration)
    }

    pub fn ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.entries.keys()
    }

    pub fn instances(&self) -> impl Iterator<Item = &Arc<LiveInstance>> {
        self.entries.values().map(|entry| &entry.instance)
    }

    /// Number of instances holding the module
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePool")
            .field("type", &self.consumer_type())
            .field("api", &self.adapter.api_version())
            .field("instances", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
