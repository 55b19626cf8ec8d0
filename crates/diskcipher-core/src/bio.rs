//! Block I/O request model.
//!
//! The block layer owns requests; the framework only reads their position and
//! page ownership and reads or writes the crypto fields below.

use crate::file::FileId;
use crate::transform::TransformRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioOp {
    Read,
    Write,
    Discard,
    Flush,
}

/// Who owns the first page of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOwner {
    Anonymous,
    SwapCache,
    /// Page with no address-space mapping.
    Unmapped,
    /// Page-cache page; `host` is the file behind the mapping, if any.
    Mapped { host: Option<FileId> },
}

/// Block I/O request with its crypto annotations.
#[derive(Debug, Clone)]
pub struct Bio {
    pub op: BioOp,
    /// First sector addressed by the request.
    pub sector: u64,
    /// Payload length in bytes.
    pub size: u32,
    pub first_page: Option<PageOwner>,
    crypt: bool,
    transform: Option<TransformRef>,
    dun: u64,
}

impl Bio {
    pub fn new(op: BioOp, sector: u64, size: u32) -> Self {
        Self {
            op,
            sector,
            size,
            first_page: None,
            crypt: false,
            transform: None,
            dun: 0,
        }
    }

    pub fn with_page(mut self, page: PageOwner) -> Self {
        self.first_page = Some(page);
        self
    }

    /// True when the crypto flag is set, whether or not a transform is bound.
    pub fn carries_crypto(&self) -> bool {
        self.crypt
    }

    pub fn transform(&self) -> Option<&TransformRef> {
        self.transform.as_ref()
    }

    /// Explicit data-unit number, if one was recorded.
    pub fn dun(&self) -> Option<u64> {
        (self.dun != 0).then_some(self.dun)
    }

    /// DUN one past the last data unit this request covers.
    ///
    /// `None` without a DUN, for a shift of 64 or more, or when the end does
    /// not fit in a `u64`.
    pub fn end_dun(&self, data_unit_shift: u32) -> Option<u64> {
        let units = u64::from(self.size).checked_shr(data_unit_shift)?;
        self.dun()?.checked_add(units)
    }

    pub fn is_discard(&self) -> bool {
        self.op == BioOp::Discard
    }

    pub(crate) fn attach(&mut self, transform: TransformRef, dun: u64) {
        self.crypt = true;
        self.transform = Some(transform);
        if dun != 0 {
            self.dun = dun;
        }
    }

    /// Set the crypto flag without binding a transform.
    ///
    /// Models a request whose binding was lost; such requests are rejected.
    pub fn mark_crypt(&mut self) {
        self.crypt = true;
    }

    /// Record a DUN without touching the binding (block-layer split/merge).
    pub fn set_dun(&mut self, dun: u64) {
        self.dun = dun;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_request_carries_no_crypto() {
        let bio = Bio::new(BioOp::Write, 2048, 8192);
        assert!(!bio.carries_crypto());
        assert!(bio.transform().is_none());
        assert_eq!(bio.dun(), None);
        assert_eq!(bio.end_dun(12), None);
    }

    #[test]
    fn end_dun_counts_data_units() {
        let mut bio = Bio::new(BioOp::Write, 0, 2 * 4096);
        bio.set_dun(100);
        assert_eq!(bio.dun(), Some(100));
        assert_eq!(bio.end_dun(12), Some(102));
    }

    #[test]
    fn end_dun_rejects_overflow_and_oversized_shift() {
        let mut bio = Bio::new(BioOp::Write, 0, 2 * 4096);
        bio.set_dun(u64::MAX - 1);
        assert_eq!(bio.end_dun(12), None);

        bio.set_dun(100);
        assert_eq!(bio.end_dun(64), None);
        assert_eq!(bio.end_dun(u32::MAX), None);
    }

    #[test]
    fn zero_dun_means_absent() {
        let mut bio = Bio::new(BioOp::Read, 0, 4096);
        bio.set_dun(0);
        assert_eq!(bio.dun(), None);
    }
}
