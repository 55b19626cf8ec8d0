//! Algorithm provider contract.
//!
//! An inline engine exposes one [`DiskCipherAlg`] per cipher mode it supports.
//! The framework never touches key material or hardware state directly; it
//! only calls the hooks below with the per-instance context the provider
//! handed back from [`DiskCipherAlg::init`].

use crate::request::{HwRequest, TestRequest};
use std::any::Any;
use thiserror::Error;

/// Opaque per-instance state owned by a provider.
pub type AlgContext = dyn Any + Send + Sync;

/// Immutable description of a registered algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgDescriptor {
    /// Generic algorithm name used for lookups (e.g. `xts(aes)-disk`).
    pub name: String,
    /// Implementation-specific name; must be unique within a registry.
    pub driver_name: String,
    /// Higher values win when several drivers implement the same name.
    pub priority: i32,
    /// Bytes of provider context required per transform instance.
    pub ctx_size: usize,
    /// Alignment mask the provider context requires.
    pub alignmask: usize,
    /// Capability bits outside the type field.
    pub flags: u32,
}

impl AlgDescriptor {
    /// Describe an algorithm whose driver name equals its generic name.
    pub fn new(name: impl Into<String>, priority: i32, ctx_size: usize) -> Self {
        let name = name.into();
        Self {
            driver_name: name.clone(),
            name,
            priority,
            ctx_size,
            alignmask: 0,
            flags: 0,
        }
    }

    pub fn with_driver_name(mut self, driver_name: impl Into<String>) -> Self {
        self.driver_name = driver_name.into();
        self
    }

    pub fn with_alignmask(mut self, alignmask: usize) -> Self {
        self.alignmask = alignmask;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Values a provider's `init` hook hands back for a fresh transform.
pub struct TransformSetup {
    /// Provider-specific algorithm id; 0 means no crypto applies.
    pub algorithm_id: u32,
    /// IV length, in bytes, the engine consumes.
    pub iv_size: usize,
    /// Per-instance provider state.
    pub context: Box<AlgContext>,
}

impl Default for TransformSetup {
    fn default() -> Self {
        Self {
            algorithm_id: 0,
            iv_size: 0,
            context: Box::new(()),
        }
    }
}

impl std::fmt::Debug for TransformSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformSetup")
            .field("algorithm_id", &self.algorithm_id)
            .field("iv_size", &self.iv_size)
            .finish_non_exhaustive()
    }
}

/// Failure reported by a provider hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The engine refused the operation; `code` is the engine's status word.
    #[error("provider rejected operation (code {code}): {reason}")]
    Rejected { code: i32, reason: String },
    /// The provider does not implement this hook.
    #[error("operation not supported by provider")]
    Unsupported,
}

impl HookError {
    pub fn rejected(code: i32, reason: impl Into<String>) -> Self {
        HookError::Rejected {
            code,
            reason: reason.into(),
        }
    }
}

/// Hook table implemented by an inline crypto engine.
///
/// Hooks run synchronously on the block I/O path. They must not block and
/// should avoid allocating on the `crypt`/`clear` path.
pub trait DiskCipherAlg: Send + Sync {
    /// Registry-facing description of this algorithm.
    fn descriptor(&self) -> &AlgDescriptor;

    /// Prepare a new transform instance.
    fn init(&self) -> Result<TransformSetup, HookError> {
        Ok(TransformSetup::default())
    }

    /// Release per-instance state before the transform is dropped.
    fn exit(&self, _ctx: &AlgContext) {}

    /// Program `key` into the engine for this instance.
    fn setkey(&self, ctx: &AlgContext, key: &[u8], persistent: bool) -> Result<(), HookError>;

    /// Remove any key material programmed for this instance.
    fn clearkey(&self, ctx: &AlgContext) -> Result<(), HookError>;

    /// Fill the hardware descriptor for one data unit.
    fn crypt(&self, ctx: &AlgContext, req: &HwRequest) -> Result<(), HookError>;

    /// Tear down the hardware descriptor after completion.
    fn clear(&self, ctx: &AlgContext, req: &HwRequest) -> Result<(), HookError>;

    /// Run one cipher operation outside the block I/O path.
    fn self_test_crypt(
        &self,
        _ctx: &AlgContext,
        _req: &mut TestRequest<'_>,
    ) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }
}
