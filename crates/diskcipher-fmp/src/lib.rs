//! Diskcipher providers for FMP-style inline crypto engines.
//!
//! [`FmpDevice::probe`] registers `xts(aes)-disk` and `cbc(aes)-disk` backed by
//! an [`FmpEngine`]. [`NullCipher`] is a pass-through provider for bring-up.

pub mod alg;
pub mod device;
pub mod engine;
pub mod null;
pub mod selftest;

pub use alg::{CryptoInfo, FmpAlg, FMP_IV_SIZE, FMP_PRIORITY};
pub use device::{FmpDevice, FMP_MODES};
pub use engine::{AlgoMode, DescriptorCfg, EncMode, EngineTest, FmpEngine};
pub use null::{NullCipher, NULL_ALG_NAME};
pub use selftest::{
    all_passed, run_known_answer_tests, KatFailure, KatOutcome, KatVector, BUILTIN_VECTORS,
};
