//! Request binding and the pre-dispatch consistency check.

use crate::bio::{Bio, PageOwner};
use crate::diagnostics::DiagEvent;
use crate::error::BindingError;
use crate::file::{FileId, FileKeyManager};
use crate::transform::Transform;
use log::error;
use std::sync::Arc;

/// Attach `transform` (and a non-zero `dun`) to `bio`.
///
/// Does nothing when either side is missing.
pub fn bind(bio: Option<&mut Bio>, transform: Option<&Arc<Transform>>, dun: u64) {
    if let (Some(bio), Some(transform)) = (bio, transform) {
        bio.attach(Arc::downgrade(transform), dun);
        transform.diagnostics().record(DiagEvent::Set, false);
    }
}

/// Look up the transform bound to `bio`.
///
/// `Ok(None)` means no crypto applies. A request flagged for crypto whose
/// transform is missing or already destroyed is `Unbound`.
pub fn resolve(bio: &Bio) -> Result<Option<Arc<Transform>>, BindingError> {
    if !bio.carries_crypto() {
        return Ok(None);
    }
    bio.transform()
        .and_then(|weak| weak.upgrade())
        .map(Some)
        .ok_or(BindingError::Unbound)
}

/// Verify that the transform bound to `bio` is still the one its file uses.
pub fn check(bio: &Bio, keys: &dyn FileKeyManager) -> Result<(), BindingError> {
    match resolve(bio)? {
        Some(transform) => check_transform(bio, &transform, keys),
        None => Ok(()),
    }
}

/// Resolve and check in one step; what the dispatch path uses.
pub fn get(bio: &Bio, keys: &dyn FileKeyManager) -> Result<Option<Arc<Transform>>, BindingError> {
    let Some(transform) = resolve(bio)? else {
        return Ok(None);
    };
    let result = check_transform(bio, &transform, keys);
    let event = if transform.owner().is_some() {
        DiagEvent::Get
    } else {
        DiagEvent::GetDm
    };
    transform.diagnostics().record(event, result.is_err());
    result.map(|()| Some(transform))
}

fn check_transform(
    bio: &Bio,
    transform: &Arc<Transform>,
    keys: &dyn FileKeyManager,
) -> Result<(), BindingError> {
    // Device-level ciphers are not tied to a file.
    let Some(owner) = transform.owner() else {
        return Ok(());
    };
    if transform.algorithm_id() == 0 {
        return Ok(());
    }
    let Some(host) = page_host(bio) else {
        return Ok(());
    };
    if keys.direct_io_in_flight(owner) || !keys.has_key_material(host) {
        return Ok(());
    }

    let diag = transform.diagnostics();
    if host != owner {
        diag.record(DiagEvent::ErrInode, true);
        error!("diskcipher: transform keyed for {owner} but page belongs to {host}");
        return Err(BindingError::OwnerMismatch);
    }
    if !keys.has_valid_key(host) {
        diag.record(DiagEvent::ErrNoKey, true);
        error!("diskcipher: file {host} has no valid key");
        return Err(BindingError::KeyNotReady);
    }
    match keys.current_live_transform(host) {
        None => {
            diag.record(DiagEvent::ErrDiskc, true);
            error!("diskcipher: file {host} has no live transform");
            Err(BindingError::StaleBinding)
        }
        Some(live) if !Arc::ptr_eq(&live, transform) && !bio.is_discard() => {
            diag.record(DiagEvent::ErrSync, true);
            error!("diskcipher: request transform out of sync with file {host}");
            Err(BindingError::StaleBinding)
        }
        Some(_) => Ok(()),
    }
}

/// File behind the request's first page, when the page is file-backed.
fn page_host(bio: &Bio) -> Option<FileId> {
    match bio.first_page? {
        PageOwner::Mapped { host } => host,
        PageOwner::Anonymous | PageOwner::SwapCache | PageOwner::Unmapped => None,
    }
}
