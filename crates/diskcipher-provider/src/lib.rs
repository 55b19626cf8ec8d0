#![forbid(unsafe_code)]

//! Provider contracts shared across the diskcipher workspace.
//!
//! Inline crypto engines implement [`DiskCipherAlg`] and register with the
//! framework in `diskcipher-core`. Keeping the contract here lets engine
//! crates and test doubles depend on it without pulling in the framework.

pub mod alg;
pub mod request;

pub use alg::{AlgContext, AlgDescriptor, DiskCipherAlg, HookError, TransformSetup};
pub use request::{HardwareEngine, HwRequest, TableAddr, TestRequest, HW_IV_MAX};

/// Mask covering the algorithm type bits of a capability word.
pub const CRYPTO_ALG_TYPE_MASK: u32 = 0x0000_000f;

/// Type tag the registry stamps on every diskcipher algorithm.
pub const CRYPTO_ALG_TYPE_DISKCIPHER: u32 = 0x0000_000e;

/// Capability bit: hidden from lookups that do not ask for internal algorithms.
pub const CRYPTO_ALG_INTERNAL: u32 = 0x0000_2000;
