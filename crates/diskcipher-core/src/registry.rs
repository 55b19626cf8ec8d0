//! Transform registry.
//!
//! Maps algorithm names to provider hook tables. Mutations take the registry's
//! write lock for their whole duration, so a batch registration is either
//! fully visible to readers or not at all.

use crate::config::NamingCfg;
use crate::diagnostics::{DiagEvent, Diagnostics};
use crate::error::ConfigError;
use diskcipher_provider::{
    AlgDescriptor, DiskCipherAlg, CRYPTO_ALG_INTERNAL, CRYPTO_ALG_TYPE_DISKCIPHER,
    CRYPTO_ALG_TYPE_MASK,
};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Alignment the framework already guarantees for provider contexts.
pub const CTX_ALIGNMENT: usize = 8;

/// Context bytes a transform of `desc` needs once alignment slack is added.
pub fn extended_context_size(desc: &AlgDescriptor) -> usize {
    desc.ctx_size + (desc.alignmask & !(CTX_ALIGNMENT - 1))
}

struct Entry {
    alg: Arc<dyn DiskCipherAlg>,
    flags: u32,
}

impl Entry {
    fn descriptor(&self) -> &AlgDescriptor {
        self.alg.descriptor()
    }
}

/// Registered algorithm resolved by [`Registry::allocate`].
#[derive(Clone)]
pub struct AlgHandle {
    pub(crate) alg: Arc<dyn DiskCipherAlg>,
    pub(crate) diag: Arc<Diagnostics>,
}

impl AlgHandle {
    pub fn descriptor(&self) -> &AlgDescriptor {
        self.alg.descriptor()
    }
}

impl std::fmt::Debug for AlgHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgHandle")
            .field("driver_name", &self.descriptor().driver_name)
            .finish()
    }
}

/// Name-indexed table of diskcipher providers.
pub struct Registry {
    entries: RwLock<Vec<Entry>>,
    naming: NamingCfg,
    diag: Arc<Diagnostics>,
}

impl Registry {
    pub fn new(naming: NamingCfg, diag: Arc<Diagnostics>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            naming,
            diag,
        }
    }

    /// Add one provider, stamping it with the diskcipher type tag.
    pub fn register(&self, alg: Arc<dyn DiskCipherAlg>) -> Result<(), ConfigError> {
        let mut entries = self.write();
        self.register_locked(&mut entries, alg)
    }

    /// Add providers in order; on failure the earlier ones are removed again.
    pub fn register_batch(&self, algs: &[Arc<dyn DiskCipherAlg>]) -> Result<(), ConfigError> {
        let mut entries = self.write();
        for (idx, alg) in algs.iter().enumerate() {
            if let Err(err) = self.register_locked(&mut entries, alg.clone()) {
                warn!("diskcipher batch registration failed at entry {idx}: {err}; rolling back");
                for done in algs[..idx].iter().rev() {
                    unregister_locked(&mut entries, done);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn unregister(&self, alg: &Arc<dyn DiskCipherAlg>) {
        let mut entries = self.write();
        unregister_locked(&mut entries, alg);
    }

    /// Remove providers in reverse registration order.
    pub fn unregister_batch(&self, algs: &[Arc<dyn DiskCipherAlg>]) {
        let mut entries = self.write();
        for alg in algs.iter().rev() {
            unregister_locked(&mut entries, alg);
        }
    }

    /// Resolve `base_name` to a provider handle.
    ///
    /// With `force_disk_suffix` the configured suffix is appended first; a name
    /// that would not fit the name limit is rejected before it is built.
    pub fn allocate(
        &self,
        base_name: &str,
        type_: u32,
        mask: u32,
        force_disk_suffix: bool,
    ) -> Result<AlgHandle, ConfigError> {
        let result = self.allocate_inner(base_name, type_, mask, force_disk_suffix);
        self.diag.record(DiagEvent::Alloc, result.is_err());
        if let Err(err) = &result {
            warn!("diskcipher allocation for `{base_name}` failed: {err}");
        }
        result
    }

    fn allocate_inner(
        &self,
        base_name: &str,
        type_: u32,
        mask: u32,
        force_disk_suffix: bool,
    ) -> Result<AlgHandle, ConfigError> {
        let name = if force_disk_suffix {
            Cow::Owned(disk_name(base_name, &self.naming)?)
        } else {
            Cow::Borrowed(base_name)
        };

        let (type_, mut mask) = (
            (type_ & !CRYPTO_ALG_TYPE_MASK) | CRYPTO_ALG_TYPE_DISKCIPHER,
            mask | CRYPTO_ALG_TYPE_MASK,
        );
        if (type_ | mask) & CRYPTO_ALG_INTERNAL == 0 {
            mask |= CRYPTO_ALG_INTERNAL;
        }

        let entries = self.read();
        let mut best: Option<&Entry> = None;
        for entry in entries.iter() {
            if (entry.flags ^ type_) & mask != 0 {
                continue;
            }
            let desc = entry.descriptor();
            if desc.driver_name == name {
                best = Some(entry);
                break;
            }
            let better = best.map_or(true, |cur| desc.priority > cur.descriptor().priority);
            if desc.name == name && better {
                best = Some(entry);
            }
        }

        let entry = best.ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        debug!(
            "diskcipher `{name}` resolved to driver `{}`",
            entry.descriptor().driver_name
        );
        Ok(AlgHandle {
            alg: entry.alg.clone(),
            diag: self.diag.clone(),
        })
    }

    pub fn contains(&self, driver_name: &str) -> bool {
        self.read()
            .iter()
            .any(|entry| entry.descriptor().driver_name == driver_name)
    }

    /// Driver names in registration order.
    pub fn driver_names(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|entry| entry.descriptor().driver_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diag
    }

    fn register_locked(
        &self,
        entries: &mut Vec<Entry>,
        alg: Arc<dyn DiskCipherAlg>,
    ) -> Result<(), ConfigError> {
        let desc = alg.descriptor();
        if desc.name.is_empty() || desc.driver_name.is_empty() {
            return Err(ConfigError::Invalid(
                "diskcipher algorithm names must not be empty".into(),
            ));
        }
        let max = self.naming.max_name_len;
        for name in [&desc.name, &desc.driver_name] {
            if name.len() >= max {
                return Err(ConfigError::NameTooLong {
                    name: name.clone(),
                    suffix: String::new(),
                    max,
                });
            }
        }
        if entries
            .iter()
            .any(|entry| entry.descriptor().driver_name == desc.driver_name)
        {
            return Err(ConfigError::DuplicateName(desc.driver_name.clone()));
        }

        let flags = (desc.flags & !CRYPTO_ALG_TYPE_MASK) | CRYPTO_ALG_TYPE_DISKCIPHER;
        info!(
            "diskcipher registered `{}` ({}, priority {})",
            desc.name, desc.driver_name, desc.priority
        );
        entries.push(Entry { alg, flags });
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Build `base` + suffix after checking it fits the name limit.
pub fn disk_name(base: &str, naming: &NamingCfg) -> Result<String, ConfigError> {
    let suffix = naming.disk_suffix.as_str();
    if base.len() + suffix.len() >= naming.max_name_len {
        return Err(ConfigError::NameTooLong {
            name: base.to_string(),
            suffix: suffix.to_string(),
            max: naming.max_name_len,
        });
    }
    let mut name = String::with_capacity(base.len() + suffix.len());
    name.push_str(base);
    name.push_str(suffix);
    Ok(name)
}

fn same_alg(a: &Arc<dyn DiskCipherAlg>, b: &Arc<dyn DiskCipherAlg>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn unregister_locked(entries: &mut Vec<Entry>, alg: &Arc<dyn DiskCipherAlg>) {
    match entries.iter().position(|entry| same_alg(&entry.alg, alg)) {
        Some(idx) => {
            let entry = entries.remove(idx);
            info!(
                "diskcipher unregistered `{}`",
                entry.descriptor().driver_name
            );
        }
        None => debug!(
            "diskcipher `{}` not registered; nothing to remove",
            alg.descriptor().driver_name
        ),
    }
}
