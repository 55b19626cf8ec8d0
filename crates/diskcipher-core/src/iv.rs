//! IV derivation policy.

/// Source of the IV seed for a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IvMode {
    /// Physical sector address. Keeps merges unrestricted.
    #[default]
    Lba = 0,
    /// Filesystem data-unit number. Survives block relocation.
    Dun = 1,
}

impl IvMode {
    pub(crate) fn from_raw(raw: u8) -> Self {
        if raw == IvMode::Dun as u8 {
            IvMode::Dun
        } else {
            IvMode::Lba
        }
    }
}

/// Where in a request the data unit being programmed sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IvPosition {
    /// Explicit DUN carried by the request (0 when absent).
    pub dun: u64,
    /// First sector of the request.
    pub sector: u64,
    /// Page index within the request.
    pub page_index: u32,
    /// Sector offset within the request.
    pub sector_offset: u32,
}

/// 64-bit IV counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv(pub u64);

impl Iv {
    pub const SIZE: usize = 8;

    /// Little-endian bytes handed to the engine.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }
}

/// Derive the IV for one data unit. Pure and deterministic.
pub fn derive_iv(mode: IvMode, pos: IvPosition) -> Iv {
    match mode {
        IvMode::Dun => Iv(pos.dun.wrapping_add(u64::from(pos.page_index))),
        IvMode::Lba => Iv(pos.sector.wrapping_add(u64::from(pos.sector_offset))),
    }
}
