//! Plugin adapter
//!
//! Detects which API shape a plugin's entry point exports and normalizes both
//! shapes behind [`SinkAdapter`]. The rest of the runtime only ever sees
//! adapters and [`LiveInstance`]s.
//!
//! A v1 callable is modeled as a module that is always loaded and whose
//! instances all share the one function. A v2 loader is loaded once per
//! declaration cycle; its module is the factory for instances.
//!
//! Every call into plugin code goes through the fault boundary in
//! [`super::fault`], so the adapter only ever returns [`PluginError`]s.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::api::{
    ConsumerCall, ConsumerContext, ConsumerFn, ConsumerInstance, ConsumerModule, InstanceMethod,
    ModuleContext, ModuleLoader, ModuleMethod, first_missing,
};
use super::catalog::PluginExport;
use super::fault::{guard, guard_sync};
use super::manifest::PluginManifest;
use super::{PluginError, PluginResult};
use crate::config::declaration::InstanceId;
use crate::data::{DataMask, DataPayload};

/// Plugin API shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
    V2,
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiVersion::V1 => write!(f, "v1"),
            ApiVersion::V2 => write!(f, "v2"),
        }
    }
}

const BUILTIN_PREFIX: &str = "builtin:";

/// A discovered plugin: its manifest and where it was found
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    pub manifest: PluginManifest,
    pub path: PathBuf,
}

impl PluginDescriptor {
    pub fn new(manifest: PluginManifest, path: PathBuf) -> Self {
        Self { manifest, path }
    }

    /// Descriptor of a sink shipped inside the binary
    pub fn builtin(manifest: PluginManifest) -> Self {
        let path = PathBuf::from(format!("{}{}", BUILTIN_PREFIX, manifest.name));
        Self { manifest, path }
    }

    pub fn is_builtin(&self) -> bool {
        self.path.to_string_lossy().starts_with(BUILTIN_PREFIX)
    }

    /// Sink type provided by this plugin
    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

/// Build the adapter matching what the entry point exports
pub fn detect(
    descriptor: PluginDescriptor,
    export: PluginExport,
) -> PluginResult<Arc<dyn SinkAdapter>> {
    match export {
        PluginExport::Function(function) => {
            tracing::debug!("Plugin '{}' exports a function (v1)", descriptor.name());
            Ok(Arc::new(V1Adapter::new(descriptor, function)))
        }
        PluginExport::Loader(loader) => {
            tracing::debug!("Plugin '{}' exports a loader (v2)", descriptor.name());
            Ok(Arc::new(V2Adapter::new(descriptor, loader)))
        }
        PluginExport::Opaque(kind) => {
            tracing::debug!("Plugin '{}' exports unusable {}", descriptor.name(), kind);
            Err(PluginError::InvalidExport(descriptor.name().to_string()))
        }
    }
}

/// Normalized operation set over both plugin shapes
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    fn api_version(&self) -> ApiVersion;

    fn name(&self) -> &str {
        self.descriptor().name()
    }

    /// Make the module ready to create instances
    async fn load_module(&self) -> PluginResult<()>;

    /// Create and initialize one consumer
    async fn create_instance(&self, context: ConsumerContext) -> PluginResult<Arc<LiveInstance>>;

    /// Hand data to a consumer
    async fn deliver(
        &self,
        instance: &LiveInstance,
        payload: DataPayload,
        mask: &DataMask,
    ) -> PluginResult<Option<Value>> {
        instance.deliver(payload, mask).await
    }

    /// Tear a consumer down. Best effort: every step is attempted and
    /// failures are logged, never returned.
    async fn destroy_instance(&self, instance: &LiveInstance);

    /// Release the module once no instance is left
    async fn unload_module(&self);
}

/// Plugin object behind a live consumer
#[derive(Clone)]
pub enum InstanceHandle {
    V1(Arc<dyn ConsumerFn>),
    V2(Arc<dyn ConsumerInstance>),
}

/// One active consumer
///
/// Identity is stable for as long as the consumer's declaration is unchanged;
/// callers may compare instances with `Arc::ptr_eq`.
pub struct LiveInstance {
    context: Arc<ConsumerContext>,
    api: ApiVersion,
    allows_pull: bool,
    allows_push: bool,
    handle: InstanceHandle,
    unloading: AtomicBool,
}

impl LiveInstance {
    fn new(
        context: Arc<ConsumerContext>,
        api: ApiVersion,
        capabilities: (bool, bool),
        handle: InstanceHandle,
    ) -> Self {
        Self {
            context,
            api,
            allows_pull: capabilities.0,
            allows_push: capabilities.1,
            handle,
            unloading: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.context.id
    }

    pub fn consumer_type(&self) -> &str {
        &self.context.consumer_type
    }

    pub fn context(&self) -> &Arc<ConsumerContext> {
        &self.context
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api
    }

    pub fn is_v2(&self) -> bool {
        self.api == ApiVersion::V2
    }

    pub fn allows_pull(&self) -> bool {
        self.allows_pull
    }

    pub fn allows_push(&self) -> bool {
        self.allows_push
    }

    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::Acquire)
    }

    /// Mark the consumer as unloading; returns false if it already was
    pub(crate) fn begin_unload(&self) -> bool {
        !self.unloading.swap(true, Ordering::AcqRel)
    }

    /// Run the consumer's data handler inside the fault boundary
    ///
    /// Refused once unloading has begun.
    pub async fn deliver(
        &self,
        payload: DataPayload,
        mask: &DataMask,
    ) -> PluginResult<Option<Value>> {
        if self.is_unloading() {
            return Err(PluginError::Unloading(self.id().to_string()));
        }

        if self.context.tracer.is_some() {
            self.context.trace(&payload.to_value());
        }

        let result = match &self.handle {
            InstanceHandle::V1(function) => {
                let call = ConsumerCall {
                    context: self.context.clone(),
                    payload,
                    mask: mask.clone(),
                };
                guard(function.call(call)).await
            }
            InstanceHandle::V2(instance) => guard(instance.on_data(payload, mask)).await,
        };

        result.map_err(|fault| PluginError::Delivery {
            plugin: self.consumer_type().to_string(),
            instance: self.id().to_string(),
            message: fault.to_string(),
        })
    }
}

impl std::fmt::Debug for LiveInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveInstance")
            .field("id", self.id())
            .field("type", &self.consumer_type())
            .field("api", &self.api)
            .field("allows_pull", &self.allows_pull)
            .field("allows_push", &self.allows_push)
            .field("unloading", &self.is_unloading())
            .finish()
    }
}

/// Adapter for v1 (single function) plugins
pub struct V1Adapter {
    descriptor: PluginDescriptor,
    function: Arc<dyn ConsumerFn>,
}

impl V1Adapter {
    pub fn new(descriptor: PluginDescriptor, function: Arc<dyn ConsumerFn>) -> Self {
        Self {
            descriptor,
            function,
        }
    }
}

#[async_trait]
impl SinkAdapter for V1Adapter {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion::V1
    }

    async fn load_module(&self) -> PluginResult<()> {
        tracing::debug!("Plugin '{}' (v1) ready", self.name());
        Ok(())
    }

    async fn create_instance(&self, context: ConsumerContext) -> PluginResult<Arc<LiveInstance>> {
        let capabilities = self.descriptor.manifest.v1_capabilities();
        if capabilities == (false, false) {
            return Err(PluginError::lifecycle(
                self.name(),
                "createConsumer",
                "consumer must allow pull, push or both",
            ));
        }

        context.logger.debug("consumer bound to v1 function");
        Ok(Arc::new(LiveInstance::new(
            Arc::new(context),
            ApiVersion::V1,
            capabilities,
            InstanceHandle::V1(self.function.clone()),
        )))
    }

    async fn destroy_instance(&self, instance: &LiveInstance) {
        instance.begin_unload();
        instance.context.logger.debug("consumer unbound from v1 function");
    }

    async fn unload_module(&self) {
        tracing::trace!("Unloading plugin module {:?}", self.descriptor.path);
    }
}

/// Adapter for v2 (loader object) plugins
pub struct V2Adapter {
    descriptor: PluginDescriptor,
    loader: Arc<dyn ModuleLoader>,
    module: Mutex<Option<Arc<dyn ConsumerModule>>>,
}

impl V2Adapter {
    pub fn new(descriptor: PluginDescriptor, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            descriptor,
            loader,
            module: Mutex::new(None),
        }
    }

    fn module(&self) -> Option<Arc<dyn ConsumerModule>> {
        match self.module.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_module(&self, module: Option<Arc<dyn ConsumerModule>>) -> Option<Arc<dyn ConsumerModule>> {
        let mut slot = match self.module.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, module)
    }

    fn module_context(&self) -> ModuleContext {
        ModuleContext::new(self.name(), self.descriptor.path.clone())
    }

    /// Best-effort `onUnload` + `deleteConsumer` of a v2 instance
    async fn teardown(
        &self,
        module: &Arc<dyn ConsumerModule>,
        instance: Arc<dyn ConsumerInstance>,
        context: &ConsumerContext,
        cause: Option<PluginError>,
    ) {
        let mut error = cause;

        // an export list that cannot be read still gets an unload attempt
        let exports_unload = guard_sync(|| Ok(instance.exports().contains(&InstanceMethod::OnUnload)))
            .unwrap_or(true);
        if exports_unload {
            if let Err(fault) = guard(instance.on_unload()).await {
                let err = PluginError::lifecycle(self.name(), "onUnload", fault);
                context.logger.error(format!("onUnload failed: {}", err));
                error.get_or_insert(err);
            }
        }

        if let Err(fault) = guard(module.delete_consumer(instance, error.as_ref())).await {
            let err = PluginError::lifecycle(self.name(), "deleteConsumer", fault);
            context.logger.error(format!("deleteConsumer failed: {}", err));
        }
    }
}

#[async_trait]
impl SinkAdapter for V2Adapter {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion::V2
    }

    async fn load_module(&self) -> PluginResult<()> {
        if self.module().is_some() {
            return Ok(());
        }

        let context = self.module_context();
        let module = guard(self.loader.load(&context))
            .await
            .map_err(|fault| PluginError::load(self.name(), fault))?;

        let exports = guard_sync(|| Ok(module.exports()))
            .map_err(|fault| PluginError::load(self.name(), fault))?;
        if let Some(method) = first_missing(ModuleMethod::ALL, exports) {
            return Err(PluginError::MethodMissing {
                plugin: self.name().to_string(),
                method: method.name(),
            });
        }

        guard(module.on_load(&context))
            .await
            .map_err(|fault| PluginError::lifecycle(self.name(), "onLoad", fault))?;

        context
            .logger
            .debug(format!("module loaded from {:?}", self.descriptor.path));
        self.set_module(Some(module));
        Ok(())
    }

    async fn create_instance(&self, context: ConsumerContext) -> PluginResult<Arc<LiveInstance>> {
        let module = self
            .module()
            .ok_or_else(|| PluginError::load(self.name(), "module is not loaded"))?;

        let context = Arc::new(context);
        let instance = guard_sync(|| module.create_consumer(context.clone()))
            .map_err(|fault| PluginError::lifecycle(self.name(), "createConsumer", fault))?;

        let exports = match guard_sync(|| Ok(instance.exports())) {
            Ok(exports) => exports,
            Err(fault) => {
                let err = PluginError::lifecycle(self.name(), "createConsumer", fault);
                self.teardown(&module, instance, &context, Some(err.clone()))
                    .await;
                return Err(err);
            }
        };
        if let Some(method) = first_missing(InstanceMethod::ALL, exports) {
            let err = PluginError::MethodMissing {
                plugin: self.name().to_string(),
                method: method.name(),
            };
            self.teardown(&module, instance, &context, Some(err.clone()))
                .await;
            return Err(err);
        }

        let capabilities =
            match guard_sync(|| Ok((instance.allows_pull(), instance.allows_push()))) {
                Ok(capabilities) => capabilities,
                Err(fault) => {
                    let err = PluginError::lifecycle(self.name(), "createConsumer", fault);
                    self.teardown(&module, instance, &context, Some(err.clone()))
                        .await;
                    return Err(err);
                }
            };
        if capabilities == (false, false) {
            let err = PluginError::lifecycle(
                self.name(),
                "createConsumer",
                "consumer must allow pull, push or both",
            );
            self.teardown(&module, instance, &context, Some(err.clone()))
                .await;
            return Err(err);
        }

        if let Err(fault) = guard(instance.on_load(&context)).await {
            let err = PluginError::lifecycle(self.name(), "onLoad", fault);
            self.teardown(&module, instance, &context, Some(err.clone()))
                .await;
            return Err(err);
        }

        Ok(Arc::new(LiveInstance::new(
            context,
            ApiVersion::V2,
            capabilities,
            InstanceHandle::V2(instance),
        )))
    }

    async fn destroy_instance(&self, instance: &LiveInstance) {
        instance.begin_unload();

        let InstanceHandle::V2(object) = &instance.handle else {
            return;
        };

        match self.module() {
            Some(module) => {
                self.teardown(&module, object.clone(), &instance.context, None)
                    .await
            }
            None => {
                // Module already gone; the instance can still be told to stop
                if let Err(fault) = guard(object.on_unload()).await {
                    instance.context.logger.error(format!(
                        "{}",
                        PluginError::lifecycle(self.name(), "onUnload", fault)
                    ));
                }
            }
        }
    }

    async fn unload_module(&self) {
        let Some(module) = self.set_module(None) else {
            return;
        };

        if let Err(fault) = guard(module.on_unload()).await {
            tracing::error!(
                consumer_type = %self.name(),
                "{}",
                PluginError::lifecycle(self.name(), "onUnload", fault)
            );
        }

        tracing::trace!("Unloading plugin module {:?}", self.descriptor.path);
    }
}
