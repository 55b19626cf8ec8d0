//! Transform instance lifecycle.
//!
//! A [`Transform`] is created from an [`AlgHandle`] and handed to the file key
//! manager as an `Arc`. Requests only ever hold a `Weak` to it. All mutable
//! fields are atomics; the owner serializes `set_key`, `clear_key` and
//! `destroy` against in-flight I/O on the same instance.

use crate::diagnostics::{DiagEvent, Diagnostics};
use crate::error::{ConfigError, KeyError};
use crate::file::{FileId, FilesystemKind, OwnerFile};
use crate::iv::IvMode;
use crate::registry::AlgHandle;
use diskcipher_provider::{AlgContext, AlgDescriptor, DiskCipherAlg};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Non-owning reference stored on requests.
pub type TransformRef = Weak<Transform>;

/// Lifecycle state of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransformStatus {
    Created = 0,
    Keyed = 1,
    Cleared = 2,
}

impl TransformStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => TransformStatus::Keyed,
            2 => TransformStatus::Cleared,
            _ => TransformStatus::Created,
        }
    }
}

const NO_OWNER: u64 = 0;

/// Keyed, algorithm-bound cryptographic context.
pub struct Transform {
    alg: Arc<dyn DiskCipherAlg>,
    context: Box<AlgContext>,
    algorithm_id: u32,
    iv_size: usize,
    owner: AtomicU64,
    iv_mode: AtomicU8,
    status: AtomicU8,
    diag: Arc<Diagnostics>,
}

impl Transform {
    /// Run the provider's `init` hook and return a fresh, unkeyed instance.
    pub fn init(handle: AlgHandle) -> Result<Arc<Transform>, ConfigError> {
        let AlgHandle { alg, diag } = handle;
        let setup = alg.init().map_err(|err| {
            warn!(
                "diskcipher init for `{}` failed: {err}",
                alg.descriptor().driver_name
            );
            ConfigError::ProviderInit(err)
        })?;
        debug!(
            "diskcipher transform created for `{}` (algo {}, iv {} bytes)",
            alg.descriptor().driver_name,
            setup.algorithm_id,
            setup.iv_size
        );
        Ok(Arc::new(Transform {
            alg,
            context: setup.context,
            algorithm_id: setup.algorithm_id,
            iv_size: setup.iv_size,
            owner: AtomicU64::new(NO_OWNER),
            iv_mode: AtomicU8::new(IvMode::Lba as u8),
            status: AtomicU8::new(TransformStatus::Created as u8),
            diag,
        }))
    }

    /// Program `key` and record the owning file.
    ///
    /// The owner and IV mode are recorded even when the provider rejects the
    /// key; the status only advances to `Keyed` on success.
    pub fn set_key(
        &self,
        key: &[u8],
        persistent: bool,
        owner: Option<OwnerFile>,
    ) -> Result<(), KeyError> {
        let requested = owner.map_or(NO_OWNER, |file| file.id.get());
        let bound = self.owner.load(Ordering::Acquire);
        if bound != NO_OWNER && bound != requested {
            self.diag.record(DiagEvent::SetKey, true);
            warn!("diskcipher setkey refused: transform bound to #{bound}, requested #{requested}");
            return Err(KeyError::OwnerConflict { bound, requested });
        }

        let result = self.alg.setkey(&*self.context, key, persistent);

        let mode = match owner {
            Some(file) if file.kind == FilesystemKind::Sequential => IvMode::Dun,
            _ => IvMode::Lba,
        };
        self.owner.store(requested, Ordering::Release);
        self.iv_mode.store(mode as u8, Ordering::Release);
        self.diag.record(DiagEvent::SetKey, result.is_err());

        match result {
            Ok(()) => {
                self.status
                    .store(TransformStatus::Keyed as u8, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "diskcipher setkey failed for `{}`: {err}",
                    self.descriptor().driver_name
                );
                Err(KeyError::ProviderRejected(err))
            }
        }
    }

    /// Remove the key from the engine. Owner and IV mode are left untouched.
    pub fn clear_key(&self) -> Result<(), KeyError> {
        let result = self.alg.clearkey(&*self.context);
        self.diag.record(DiagEvent::ClearKey, result.is_err());
        match result {
            Ok(()) => {
                self.status
                    .store(TransformStatus::Cleared as u8, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "diskcipher clearkey failed for `{}`: {err}",
                    self.descriptor().driver_name
                );
                Err(KeyError::ProviderRejected(err))
            }
        }
    }

    /// Release the instance. The caller guarantees no request still uses it.
    ///
    /// Returns `false` when other strong references are still alive: the
    /// provider's exit hook then runs only once the last of them is dropped,
    /// and the deferral is counted as `FREEREQ`.
    pub fn destroy(self: Arc<Self>) -> bool {
        let others = Arc::strong_count(&self) - 1;
        if others > 0 {
            warn!("diskcipher transform release deferred: {others} other strong references alive");
            self.diag.record(DiagEvent::FreeReq, false);
            return false;
        }
        drop(self);
        true
    }

    pub fn descriptor(&self) -> &AlgDescriptor {
        self.alg.descriptor()
    }

    pub fn algorithm_id(&self) -> u32 {
        self.algorithm_id
    }

    pub fn iv_size(&self) -> usize {
        self.iv_size
    }

    pub fn owner(&self) -> Option<FileId> {
        FileId::new(self.owner.load(Ordering::Acquire))
    }

    pub fn iv_mode(&self) -> IvMode {
        IvMode::from_raw(self.iv_mode.load(Ordering::Acquire))
    }

    pub fn status(&self) -> TransformStatus {
        TransformStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    pub fn downgrade(self: &Arc<Self>) -> TransformRef {
        Arc::downgrade(self)
    }

    pub(crate) fn alg(&self) -> &dyn DiskCipherAlg {
        &*self.alg
    }

    pub(crate) fn context(&self) -> &AlgContext {
        &*self.context
    }

    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }
}

impl Drop for Transform {
    fn drop(&mut self) {
        self.alg.exit(&*self.context);
        self.diag.record(DiagEvent::Free, false);
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("driver_name", &self.descriptor().driver_name)
            .field("algorithm_id", &self.algorithm_id)
            .field("iv_size", &self.iv_size)
            .field("owner", &self.owner())
            .field("iv_mode", &self.iv_mode())
            .field("status", &self.status())
            .finish()
    }
}
