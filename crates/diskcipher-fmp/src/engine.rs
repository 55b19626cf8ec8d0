//! Inline engine collaborator.
//!
//! The FMP block sits in the storage host controller and encrypts data as it
//! moves between memory and flash. Key material reaches it either once per
//! device (disk encryption) or with every descriptor (file encryption).

use diskcipher_provider::{HookError, TableAddr};

/// Cipher mode the engine is programmed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AlgoMode {
    AesCbc = 1,
    AesXts = 2,
}

impl AlgoMode {
    /// Algorithm id reported to the framework; never zero.
    pub fn algorithm_id(self) -> u32 {
        self as u32
    }

    /// Key lengths, in bytes, the engine accepts for this mode.
    pub fn key_lengths(self) -> &'static [usize] {
        match self {
            AlgoMode::AesCbc => &[16, 24, 32],
            AlgoMode::AesXts => &[32, 64],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AlgoMode::AesCbc => "cbc(aes)",
            AlgoMode::AesXts => "xts(aes)",
        }
    }
}

/// Where a transform's key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncMode {
    /// Key written into every descriptor; descriptors must be scrubbed after use.
    File,
    /// Key programmed once into the engine's key slot.
    Disk,
}

/// Descriptor programming for one data unit.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorCfg<'a> {
    pub table: TableAddr,
    pub mode: AlgoMode,
    /// Per-descriptor key; `None` when the engine key slot is used.
    pub key: Option<&'a [u8]>,
    pub iv: &'a [u8],
    pub cmdq_enabled: bool,
}

/// One software-visible cipher operation run by the engine.
#[derive(Debug)]
pub struct EngineTest<'a> {
    pub mode: AlgoMode,
    pub key: &'a [u8],
    pub iv: &'a [u8],
    pub src: &'a [u8],
    pub dst: &'a mut [u8],
    pub encrypt: bool,
}

/// Operations the FMP providers need from the physical engine.
pub trait FmpEngine: Send + Sync {
    /// Load a persistent key into the engine's disk-encryption slot.
    fn program_disk_key(&self, mode: AlgoMode, key: &[u8]) -> Result<(), HookError>;

    fn clear_disk_key(&self) -> Result<(), HookError>;

    /// Fill the descriptor at `cfg.table` for an encrypted transfer.
    fn configure(&self, cfg: &DescriptorCfg<'_>) -> Result<(), HookError>;

    /// Scrub key material from the descriptor at `table`.
    fn clear_descriptor(&self, table: TableAddr) -> Result<(), HookError>;

    /// Mark the descriptor at `table` as plaintext.
    fn bypass(&self, table: TableAddr);

    fn test_crypt(&self, req: &mut EngineTest<'_>) -> Result<(), HookError>;

    /// Release engine resources once the providers are unregistered.
    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_ids_are_nonzero_and_distinct() {
        assert_ne!(AlgoMode::AesCbc.algorithm_id(), 0);
        assert_ne!(AlgoMode::AesXts.algorithm_id(), 0);
        assert_ne!(
            AlgoMode::AesCbc.algorithm_id(),
            AlgoMode::AesXts.algorithm_id()
        );
    }

    #[test]
    fn xts_needs_double_length_keys() {
        assert!(AlgoMode::AesXts.key_lengths().contains(&64));
        assert!(!AlgoMode::AesXts.key_lengths().contains(&16));
    }
}
