//! Inline disk-cipher coordination layer.
//!
//! Decides which transform governs each block request, derives the IV the
//! inline engine needs, checks that a request's binding still matches its
//! file's key state, and tells the block layer which requests may be merged.
//! Providers plug in through the contracts in `diskcipher-provider`.

pub mod binding;
pub mod bio;
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod file;
pub mod iv;
pub mod logging;
pub mod merge;
pub mod registry;
pub mod service;
pub mod transform;

#[cfg(test)]
mod test_support;

pub use binding::{bind, check, get, resolve};
pub use bio::{Bio, BioOp, PageOwner};
pub use bridge::{self_test_crypt, HwBridge};
pub use config::{ConfigFormat, DiskcipherConfig, DispatchCfg, IvCfg, NamingCfg};
pub use diagnostics::{DiagEvent, Diagnostics, DiagnosticsSnapshot, EventCount};
pub use error::{
    BindingError, ConfigError, DispatchError, DiskcipherError, DiskcipherResult, KeyError,
};
pub use file::{FileId, FileKeyManager, FilesystemKind, OwnerFile};
pub use iv::{derive_iv, Iv, IvMode, IvPosition};
pub use merge::{evaluate_merge, may_merge};
pub use registry::{disk_name, extended_context_size, AlgHandle, Registry};
pub use service::{global, install, shutdown, Diskcipher};
pub use transform::{Transform, TransformRef, TransformStatus};

pub use diskcipher_provider as provider;
