//! Value objects passed between the dispatch bridge and inline engines.

/// Largest IV an inline engine accepts.
pub const HW_IV_MAX: usize = 16;

/// Address of the engine's per-request descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableAddr(pub u64);

/// Per-dispatch request handed to the `crypt` / `clear` hooks.
///
/// Built on the stack for every call and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwRequest {
    pub table: TableAddr,
    iv: [u8; HW_IV_MAX],
    iv_size: usize,
    pub cmdq_enabled: bool,
}

impl HwRequest {
    /// Build a request carrying `iv`; bytes beyond [`HW_IV_MAX`] are ignored.
    pub fn new(table: TableAddr, iv: &[u8], cmdq_enabled: bool) -> Self {
        let iv_size = iv.len().min(HW_IV_MAX);
        let mut buf = [0u8; HW_IV_MAX];
        buf[..iv_size].copy_from_slice(&iv[..iv_size]);
        Self {
            table,
            iv: buf,
            iv_size,
            cmdq_enabled,
        }
    }

    /// Request with no IV, used for teardown.
    pub fn without_iv(table: TableAddr) -> Self {
        Self::new(table, &[], false)
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv[..self.iv_size]
    }

    pub fn iv_size(&self) -> usize {
        self.iv_size
    }
}

/// One cipher operation used for conformance testing.
#[derive(Debug)]
pub struct TestRequest<'a> {
    pub iv: &'a [u8],
    pub src: &'a [u8],
    pub dst: &'a mut [u8],
    pub encrypt: bool,
}

impl<'a> TestRequest<'a> {
    pub fn new(iv: &'a [u8], src: &'a [u8], dst: &'a mut [u8], encrypt: bool) -> Self {
        Self {
            iv,
            src,
            dst,
            encrypt,
        }
    }

    /// Number of bytes to process.
    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}

/// Hardware-engine entry points the dispatch bridge needs beyond the hooks.
pub trait HardwareEngine: Send + Sync {
    /// Mark the descriptor table as plaintext pass-through.
    ///
    /// Called for every request that carries no crypto so that state left in
    /// the slot by a previous request is not reused.
    fn bypass(&self, table: TableAddr);
}
