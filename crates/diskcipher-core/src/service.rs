//! Process-wide framework service.
//!
//! [`Diskcipher`] owns the registry, the counters and the configuration.
//! Hosts normally create one at start-up with [`install`] and reach it
//! through [`global`]; tests can build private instances with
//! [`Diskcipher::new`].

use crate::bio::Bio;
use crate::bridge::HwBridge;
use crate::config::DiskcipherConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{BindingError, ConfigError, DiskcipherError, DiskcipherResult, KeyError};
use crate::file::{FileId, FileKeyManager, OwnerFile};
use crate::merge;
use crate::registry::{AlgHandle, Registry};
use crate::transform::Transform;
use diskcipher_provider::{DiskCipherAlg, HardwareEngine};
use log::{debug, info};
use std::sync::{Arc, RwLock};

static GLOBAL: RwLock<Option<Arc<Diskcipher>>> = RwLock::new(None);

pub struct Diskcipher {
    config: DiskcipherConfig,
    registry: Registry,
    diag: Arc<Diagnostics>,
}

impl Diskcipher {
    /// Build a service from a validated configuration.
    pub fn new(config: DiskcipherConfig) -> DiskcipherResult<Self> {
        let issues = config.validate();
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues.join("; ")).into());
        }
        let diag = Arc::new(Diagnostics::new(config.diagnostics.enabled));
        let registry = Registry::new(config.naming.clone(), diag.clone());
        Ok(Self {
            config,
            registry,
            diag,
        })
    }

    pub fn config(&self) -> &DiskcipherConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diag
    }

    pub fn register(&self, alg: Arc<dyn DiskCipherAlg>) -> Result<(), ConfigError> {
        self.registry.register(alg)
    }

    pub fn register_batch(&self, algs: &[Arc<dyn DiskCipherAlg>]) -> Result<(), ConfigError> {
        self.registry.register_batch(algs)
    }

    pub fn unregister(&self, alg: &Arc<dyn DiskCipherAlg>) {
        self.registry.unregister(alg)
    }

    pub fn unregister_batch(&self, algs: &[Arc<dyn DiskCipherAlg>]) {
        self.registry.unregister_batch(algs)
    }

    /// Resolve `base_name` with default type and mask.
    pub fn allocate(
        &self,
        base_name: &str,
        force_disk_suffix: bool,
    ) -> Result<AlgHandle, ConfigError> {
        self.registry.allocate(base_name, 0, 0, force_disk_suffix)
    }

    /// Allocate and initialise a transform in one step.
    pub fn alloc_transform(
        &self,
        base_name: &str,
        force_disk_suffix: bool,
    ) -> Result<Arc<Transform>, ConfigError> {
        let handle = self.allocate(base_name, force_disk_suffix)?;
        Transform::init(handle)
    }

    /// Key `transform` for `file`, asking the key manager for its filesystem kind.
    pub fn set_key(
        &self,
        transform: &Transform,
        key: &[u8],
        persistent: bool,
        file: Option<FileId>,
        keys: &dyn FileKeyManager,
    ) -> Result<(), KeyError> {
        let owner = file.map(|id| OwnerFile::resolve(id, keys));
        transform.set_key(key, persistent, owner)
    }

    /// Merge decision using the configured data-unit size.
    pub fn may_merge(&self, front: &Bio, back: &Bio) -> bool {
        merge::may_merge(front, back, self.config.data_unit_shift())
    }

    pub fn evaluate_merge(&self, front: &Bio, back: &Bio) -> Result<bool, BindingError> {
        merge::evaluate_merge(front, back, self.config.data_unit_shift())
    }

    /// Dispatch bridge wired to this service's counters and dispatch settings.
    pub fn bridge(
        &self,
        engine: Arc<dyn HardwareEngine>,
        keys: Arc<dyn FileKeyManager>,
    ) -> HwBridge {
        HwBridge::new(
            engine,
            keys,
            self.diag.clone(),
            self.config.dispatch.cmdq_enabled,
        )
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.diag.snapshot()
    }

    /// Counter report in the text layout used by the status file.
    pub fn report(&self) -> String {
        self.diag.render()
    }
}

impl std::fmt::Debug for Diskcipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diskcipher")
            .field("algorithms", &self.registry.driver_names())
            .field("config", &self.config.path)
            .finish()
    }
}

/// Install the process-wide service. Fails if one is already installed.
pub fn install(config: DiskcipherConfig) -> DiskcipherResult<Arc<Diskcipher>> {
    let mut slot = GLOBAL.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_some() {
        return Err(DiskcipherError::AlreadyInstalled);
    }
    let service = Arc::new(Diskcipher::new(config)?);
    *slot = Some(service.clone());
    info!("diskcipher service installed");
    Ok(service)
}

/// The installed service.
pub fn global() -> DiskcipherResult<Arc<Diskcipher>> {
    GLOBAL
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
        .ok_or(DiskcipherError::NotInstalled)
}

/// Remove the process-wide service and hand it back to the caller.
pub fn shutdown() -> Option<Arc<Diskcipher>> {
    let service = GLOBAL
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    match &service {
        Some(svc) => info!(
            "diskcipher service shut down with {} algorithms registered",
            svc.registry.len()
        ),
        None => debug!("diskcipher shutdown requested but no service installed"),
    }
    service
}
