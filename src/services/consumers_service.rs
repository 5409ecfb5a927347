//! Consumers service: the reconciler
//!
//! Keeps the live consumer set in lock-step with the declared one. Each
//! configuration change runs one reconciliation pass to completion:
//!
//! 1. live consumers in scope whose declaration vanished or changed are
//!    destroyed (unload, then delete; both best effort)
//! 2. new and changed declarations are created, loading their plugin module on
//!    first use
//! 3. modules left without instances are unloaded
//! 4. the resulting consumer set and counts are published
//!
//! Consumers whose declaration is unchanged are not touched, so their
//! identity survives the pass. Plugin failures are logged per consumer and
//! never abort the pass.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::ServiceError;
use super::instance_pool::InstancePool;
use super::snapshot::{ConsumersSnapshot, ConsumersStats, PublishedConsumer};
use crate::config::declaration::{ConfigChange, InstanceId, NormalizedConsumer};
use crate::pipeline::{PipelineOverrides, PipelineSettings};
use crate::plugins::adapter::detect;
use crate::plugins::api::ConsumerContext;
use crate::plugins::tracer::tracer_for;
use crate::plugins::{PluginCatalog, PluginError, PluginRegistry};

/// Runtime settings shared by every consumer
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base pipeline settings before plugin and consumer overrides
    pub pipeline: PipelineSettings,
    /// Directory of `trace: true` tracers
    pub trace_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            trace_dir: std::env::temp_dir().join("telemetry-relay"),
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub generation: u64,
    /// Created in this pass (new or changed)
    pub loaded: Vec<InstanceId>,
    /// Destroyed in this pass (removed or changed)
    pub unloaded: Vec<InstanceId>,
    /// Left untouched
    pub unchanged: Vec<InstanceId>,
    /// Declared but could not be created, with the reason
    pub failed: Vec<(InstanceId, String)>,
    pub stats: ConsumersStats,
}

/// Owner of every plugin module and consumer instance
///
/// # Example
///
/// ```rust,no_run
/// use telemetry_relay::config::declaration::{ConfigChange, Declaration};
/// use telemetry_relay::plugins::{PluginCatalog, PluginRegistry};
/// use telemetry_relay::services::{ConsumersService, ServiceSettings};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut service = ConsumersService::new(
///     PluginCatalog::with_builtins(),
///     telemetry_relay::sinks::builtin_registry(),
///     ServiceSettings::default(),
/// );
///
/// let declaration = Declaration::from_yaml("consumers: [{name: out, type: Stdout}]")?;
/// let report = service.reconcile(&ConfigChange::full(&declaration)).await?;
/// println!("{} consumer(s) live", report.stats.consumers);
/// # Ok(())
/// # }
/// ```
pub struct ConsumersService {
    catalog: PluginCatalog,
    registry: PluginRegistry,
    settings: ServiceSettings,
    pools: BTreeMap<String, InstancePool>,
    generation: u64,
    publisher: watch::Sender<Arc<ConsumersSnapshot>>,
}

impl ConsumersService {
    pub fn new(catalog: PluginCatalog, registry: PluginRegistry, settings: ServiceSettings) -> Self {
        let (publisher, _) = watch::channel(Arc::new(ConsumersSnapshot::default()));
        Self {
            catalog,
            registry,
            settings,
            pools: BTreeMap::new(),
            generation: 0,
            publisher,
        }
    }

    /// Receiver of the snapshot published after every pass
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConsumersSnapshot>> {
        self.publisher.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<ConsumersSnapshot> {
        self.publisher.borrow().clone()
    }

    pub fn stats(&self) -> ConsumersStats {
        ConsumersStats {
            consumers: self.pools.values().map(InstancePool::len).sum(),
            modules: self.pools.len(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Process configuration changes one at a time until the sender is
    /// dropped, then unload everything
    pub async fn run(mut self, mut changes: mpsc::Receiver<ConfigChange>) -> Result<(), ServiceError> {
        tracing::info!("Consumers service started");

        while let Some(change) = changes.recv().await {
            let report = self.reconcile(&change).await?;
            tracing::info!(
                "Reconciliation #{}: {} loaded, {} unloaded, {} unchanged, {} failed ({} consumer(s), {} module(s))",
                report.generation,
                report.loaded.len(),
                report.unloaded.len(),
                report.unchanged.len(),
                report.failed.len(),
                report.stats.consumers,
                report.stats.modules
            );
        }

        self.shutdown().await;
        tracing::info!("Consumers service stopped");
        Ok(())
    }

    /// Align the live consumers in the change's scope with its declarations
    pub async fn reconcile(&mut self, change: &ConfigChange) -> Result<ReconcileReport, ServiceError> {
        self.generation += 1;
        let mut report = ReconcileReport {
            generation: self.generation,
            ..Default::default()
        };

        let mut desired: BTreeMap<InstanceId, &NormalizedConsumer> = BTreeMap::new();
        for consumer in &change.consumers {
            if !change.scope.covers(&consumer.id) {
                tracing::warn!(
                    "Consumer '{}' is outside the scope of this change, ignoring",
                    consumer.id
                );
                continue;
            }
            desired.entry(consumer.id.clone()).or_insert(consumer);
        }

        // Diff live consumers in scope against the declaration
        let mut removals: Vec<(String, InstanceId)> = Vec::new();
        for (consumer_type, pool) in &self.pools {
            for id in pool.ids().filter(|id| change.scope.covers(id)) {
                let live = pool
                    .declaration(id)
                    .ok_or_else(|| ServiceError::InstanceMissing(id.to_string()))?;
                match desired.get(id) {
                    Some(wanted) if live.same_declaration(wanted) => {
                        report.unchanged.push(id.clone());
                    }
                    _ => removals.push((consumer_type.clone(), id.clone())),
                }
            }
        }
        for id in &report.unchanged {
            desired.remove(id);
        }

        for (consumer_type, id) in removals {
            self.destroy(&consumer_type, &id).await?;
            report.unloaded.push(id);
        }

        let mut failed_types: HashMap<String, PluginError> = HashMap::new();
        for (id, declaration) in desired {
            match self.create(declaration, &mut failed_types).await {
                Ok(()) => report.loaded.push(id),
                Err(err) => {
                    tracing::warn!(
                        consumer_type = %declaration.consumer_type,
                        consumer_id = %id,
                        "unable to initialize consumer '{}': plug-in '{}' not loaded/does not exist ({})",
                        id,
                        declaration.consumer_type,
                        err
                    );
                    report.failed.push((id, err.to_string()));
                }
            }
        }

        self.unload_idle_modules().await;

        report.stats = self.stats();
        self.publish();
        Ok(report)
    }

    /// Destroy every consumer and unload every module
    pub async fn shutdown(&mut self) {
        for pool in self.pools.values_mut() {
            let ids: Vec<InstanceId> = pool.ids().cloned().collect();
            for id in ids {
                if let Some((_, instance)) = pool.remove(&id) {
                    pool.adapter().destroy_instance(&instance).await;
                }
            }
        }
        self.unload_idle_modules().await;
        self.generation += 1;
        self.publish();
    }

    async fn destroy(&mut self, consumer_type: &str, id: &InstanceId) -> Result<(), ServiceError> {
        let pool = self
            .pools
            .get_mut(consumer_type)
            .ok_or_else(|| ServiceError::PoolMissing(consumer_type.to_string()))?;
        let (_, instance) = pool
            .remove(id)
            .ok_or_else(|| ServiceError::InstanceMissing(id.to_string()))?;

        instance.context().logger.debug("unloading consumer");
        pool.adapter().destroy_instance(&instance).await;
        Ok(())
    }

    async fn create(
        &mut self,
        declaration: &NormalizedConsumer,
        failed_types: &mut HashMap<String, PluginError>,
    ) -> Result<(), PluginError> {
        let consumer_type = declaration.consumer_type.as_str();

        if let Some(err) = failed_types.get(consumer_type) {
            return Err(err.clone());
        }
        if let Err(err) = self.ensure_pool(consumer_type).await {
            failed_types.insert(consumer_type.to_string(), err.clone());
            return Err(err);
        }

        let pool = self
            .pools
            .get_mut(consumer_type)
            .ok_or_else(|| PluginError::NotFound(consumer_type.to_string()))?;

        let manifest_overrides = pool
            .adapter()
            .descriptor()
            .manifest
            .pipeline
            .clone()
            .unwrap_or_default();
        let pipeline = self
            .settings
            .pipeline
            .with_overrides(&manifest_overrides)
            .with_overrides(&PipelineOverrides::from_consumer_config(&declaration.config));

        let trace_id = format!("{}.{}", consumer_type, declaration.id.file_safe());
        let tracer = tracer_for(&declaration.trace, &trace_id, &self.settings.trace_dir);

        let context = ConsumerContext::new(
            declaration.id.clone(),
            consumer_type,
            declaration.config.clone(),
        )
        .with_tracer(tracer)
        .with_pipeline(pipeline);

        let instance = pool.adapter().create_instance(context).await?;
        instance.context().logger.debug(format!(
            "consumer loaded (pull: {}, push: {}, api: {})",
            instance.allows_pull(),
            instance.allows_push(),
            instance.api_version()
        ));
        pool.insert(declaration.clone(), instance);
        Ok(())
    }

    /// Resolve, detect and load the plugin of `consumer_type` unless a pool
    /// for it already exists
    async fn ensure_pool(&mut self, consumer_type: &str) -> Result<(), PluginError> {
        if self.pools.contains_key(consumer_type) {
            return Ok(());
        }

        let descriptor = self.registry.descriptor(consumer_type)?.clone();
        let export = self
            .catalog
            .resolve(descriptor.name(), &descriptor.manifest.entry)?;
        let adapter = detect(descriptor, export)?;
        adapter.load_module().await?;

        tracing::debug!(
            "Loaded plugin module '{}' ({}) from {:?}",
            consumer_type,
            adapter.api_version(),
            adapter.descriptor().path
        );
        self.pools
            .insert(consumer_type.to_string(), InstancePool::new(adapter));
        Ok(())
    }

    async fn unload_idle_modules(&mut self) {
        let idle: Vec<String> = self
            .pools
            .iter()
            .filter(|(_, pool)| pool.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        for name in idle {
            if let Some(pool) = self.pools.remove(&name) {
                pool.adapter().unload_module().await;
            }
            if self.registry.forget(&name) {
                tracing::debug!("Plugin '{}' will be re-read on next use", name);
            }
        }
    }

    fn publish(&self) {
        let consumers = self
            .pools
            .values()
            .flat_map(InstancePool::instances)
            .map(|instance| PublishedConsumer::new(instance.clone()))
            .collect();

        let snapshot = ConsumersSnapshot {
            generation: self.generation,
            consumers,
            stats: self.stats(),
        };
        self.publisher.send_replace(Arc::new(snapshot));
    }
}

/// Handle to a consumers service running on its own task
pub struct ConsumersHandle {
    changes: mpsc::Sender<ConfigChange>,
    snapshots: watch::Receiver<Arc<ConsumersSnapshot>>,
    task: tokio::task::JoinHandle<Result<(), ServiceError>>,
}

impl ConsumersHandle {
    /// Start `service` on a background task
    pub fn spawn(service: ConsumersService) -> Self {
        let (changes, rx) = mpsc::channel(16);
        let snapshots = service.subscribe();
        let task = tokio::spawn(service.run(rx));
        Self {
            changes,
            snapshots,
            task,
        }
    }

    /// Queue a configuration change
    pub async fn apply(&self, change: ConfigChange) -> Result<(), ServiceError> {
        self.changes
            .send(change)
            .await
            .map_err(|_| ServiceError::Stopped)
    }

    pub fn snapshots(&self) -> watch::Receiver<Arc<ConsumersSnapshot>> {
        self.snapshots.clone()
    }

    /// Sender for producers of configuration changes; the service stops
    /// only once every clone is dropped
    pub fn sender(&self) -> mpsc::Sender<ConfigChange> {
        self.changes.clone()
    }

    /// Stop accepting changes, unload every consumer and wait for the service
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        drop(self.changes);
        self.task.await.map_err(|e| ServiceError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::declaration::Declaration;
    use crate::plugins::PluginManifest;

    fn service() -> ConsumersService {
        let mut registry = PluginRegistry::new();
        crate::sinks::register_builtins(&mut registry);
        ConsumersService::new(
            PluginCatalog::with_builtins(),
            registry,
            ServiceSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_type_fails_without_aborting() {
        let mut service = service();
        let declaration = Declaration::from_yaml(
            r#"
consumers:
  - name: a
    type: Default
  - name: b
    type: Nope
  - name: c
    type: Nope
"#,
        )
        .unwrap();

        let report = service.reconcile(&ConfigChange::full(&declaration)).await.unwrap();
        assert_eq!(report.loaded, vec![InstanceId::default_ns("a")]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].1.contains("Plugin not found: Nope"));
        assert_eq!(report.stats, ConsumersStats { consumers: 1, modules: 1 });
    }

    #[tokio::test]
    async fn test_snapshot_published() {
        let mut service = service();
        let mut rx = service.subscribe();
        let declaration =
            Declaration::from_yaml("consumers: [{name: a, type: Default}]").unwrap();

        service.reconcile(&ConfigChange::full(&declaration)).await.unwrap();
        assert!(rx.has_changed().unwrap());

        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.generation, 1);
        let consumer = snapshot.get(&InstanceId::default_ns("a")).unwrap();
        assert!(consumer.allows_pull());
        assert!(consumer.allows_push());
        assert!(!consumer.is_v2());
    }

    #[tokio::test]
    async fn test_broken_manifest_entry() {
        let mut registry = PluginRegistry::new();
        registry.register(crate::plugins::PluginDescriptor::builtin(
            PluginManifest::new("Ghost", "1.0.0").with_entry("ghost"),
        ));
        let mut service =
            ConsumersService::new(PluginCatalog::new(), registry, ServiceSettings::default());
        let declaration = Declaration::from_yaml("consumers: [{name: g, type: Ghost}]").unwrap();

        let report = service.reconcile(&ConfigChange::full(&declaration)).await.unwrap();
        assert!(report.failed[0].1.contains("entry point 'ghost' not found"));
        assert_eq!(service.stats(), ConsumersStats::default());
    }

    #[tokio::test]
    async fn test_handle_shutdown_unloads() {
        let handle = ConsumersHandle::spawn(service());
        let mut snapshots = handle.snapshots();
        let declaration =
            Declaration::from_yaml("consumers: [{name: a, type: Default}]").unwrap();

        handle.apply(ConfigChange::full(&declaration)).await.unwrap();
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().stats.consumers, 1);

        handle.shutdown().await.unwrap();
        assert_eq!(snapshots.borrow().stats, ConsumersStats::default());
    }
}
