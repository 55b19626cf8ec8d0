//! File-key-manager collaborator contract.
//!
//! The framework never owns files or keys. It identifies files by [`FileId`]
//! and asks a [`FileKeyManager`] about their current key state.

use crate::config::DiskcipherConfig;
use crate::transform::Transform;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

/// Stable identity of a file (inode number or equivalent). Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(NonZeroU64);

impl FileId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(FileId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a filesystem assigns sequential data-unit numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemKind {
    Sequential,
    Generic,
}

impl FilesystemKind {
    /// Classify a filesystem type name using the configured DUN filesystems.
    pub fn from_fs_type(fs_type: &str, config: &DiskcipherConfig) -> Self {
        if config.is_dun_filesystem(fs_type) {
            FilesystemKind::Sequential
        } else {
            FilesystemKind::Generic
        }
    }
}

/// File a transform is being keyed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerFile {
    pub id: FileId,
    pub kind: FilesystemKind,
}

impl OwnerFile {
    pub fn new(id: FileId, kind: FilesystemKind) -> Self {
        Self { id, kind }
    }

    /// Look up the filesystem kind through the key manager.
    pub fn resolve(id: FileId, keys: &dyn FileKeyManager) -> Self {
        Self {
            id,
            kind: keys.filesystem_kind(id),
        }
    }
}

/// Queries the framework needs answered by the filesystem key manager.
pub trait FileKeyManager: Send + Sync {
    /// True when the file has encryption info attached at all.
    fn has_key_material(&self, file: FileId) -> bool;

    /// True when the file's key is loaded and usable.
    fn has_valid_key(&self, file: FileId) -> bool;

    /// The transform currently installed for the file, if any.
    fn current_live_transform(&self, file: FileId) -> Option<Arc<Transform>>;

    fn filesystem_kind(&self, file: FileId) -> FilesystemKind;

    /// True while direct I/O is in flight; such requests skip the check.
    fn direct_io_in_flight(&self, _file: FileId) -> bool {
        false
    }
}
