//! Merge compatibility oracle consulted by the block layer.

use crate::bio::Bio;
use crate::diagnostics::DiagEvent;
use crate::error::BindingError;
use crate::iv::IvMode;
use crate::transform::Transform;
use log::error;
use std::sync::Arc;

/// Decide whether `back` may be appended to `front`.
///
/// Not symmetric: in DUN mode `front` must end exactly where `back` starts.
/// Any inconsistency reported by [`evaluate_merge`] refuses the merge, as does
/// a DUN range that cannot be computed (shift of 64 or more, or a front
/// request ending past `u64::MAX`).
pub fn may_merge(front: &Bio, back: &Bio, data_unit_shift: u32) -> bool {
    evaluate_merge(front, back, data_unit_shift).unwrap_or(false)
}

/// [`may_merge`] that reports inconsistent request pairs instead of hiding them.
///
/// Errors:
/// - `Unbound` when a request is flagged for crypto but its transform is gone.
/// - `OwnerMismatch` when the two transforms are keyed for different files, or
///   when a device-level transform (no owning file) is paired with requests
///   carrying a DUN.
pub fn evaluate_merge(front: &Bio, back: &Bio, data_unit_shift: u32) -> Result<bool, BindingError> {
    match (front.carries_crypto(), back.carries_crypto()) {
        (false, false) => return Ok(true),
        (true, false) | (false, true) => return Ok(false),
        (true, true) => {}
    }

    let first = live_transform(front)?;
    let second = live_transform(back)?;
    let diag = first.diagnostics();

    if !Arc::ptr_eq(&first, &second) {
        if let (Some(a), Some(b)) = (first.owner(), second.owner()) {
            if a != b {
                diag.record(DiagEvent::MergeNo, true);
                error!("diskcipher: adjacent requests keyed for different files {a} and {b}");
                return Err(BindingError::OwnerMismatch);
            }
        }
        diag.record(DiagEvent::MergeNo, false);
        return Ok(false);
    }

    if first.owner().is_none() {
        if front.dun().is_some() || back.dun().is_some() {
            diag.record(DiagEvent::MergeNo, true);
            error!("diskcipher: device-level transform paired with DUN-tagged requests");
            return Err(BindingError::OwnerMismatch);
        }
        diag.record(DiagEvent::MergeDm, false);
        return Ok(true);
    }

    match first.iv_mode() {
        IvMode::Dun => match (front.end_dun(data_unit_shift), back.dun()) {
            (Some(end), Some(start)) if end == start => {
                diag.record(DiagEvent::MergeDun, false);
                Ok(true)
            }
            _ => {
                diag.record(DiagEvent::MergeNo, false);
                Ok(false)
            }
        },
        IvMode::Lba => {
            diag.record(DiagEvent::Merge, false);
            Ok(true)
        }
    }
}

fn live_transform(bio: &Bio) -> Result<Arc<Transform>, BindingError> {
    bio.transform()
        .and_then(|weak| weak.upgrade())
        .ok_or(BindingError::Unbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::bio::BioOp;
    use crate::file::{FilesystemKind, OwnerFile};
    use crate::test_support::{file, keyed_transform};

    const SHIFT: u32 = 12;
    const UNIT: u32 = 1 << SHIFT;

    fn crypt_bio(tfm: &Arc<Transform>, sector: u64, units: u32, dun: u64) -> Bio {
        let mut bio = Bio::new(BioOp::Write, sector, units * UNIT);
        bind(Some(&mut bio), Some(tfm), dun);
        bio
    }

    fn dun_transform() -> Arc<Transform> {
        keyed_transform(Some(OwnerFile::new(file(1), FilesystemKind::Sequential)))
    }

    fn lba_transform() -> Arc<Transform> {
        keyed_transform(Some(OwnerFile::new(file(1), FilesystemKind::Generic)))
    }

    #[test]
    fn plain_requests_always_merge() {
        let a = Bio::new(BioOp::Write, 0, UNIT);
        let b = Bio::new(BioOp::Write, 800, UNIT);
        assert!(may_merge(&a, &b, SHIFT));
    }

    #[test]
    fn mixed_requests_never_merge() {
        let tfm = lba_transform();
        let plain = Bio::new(BioOp::Write, 0, UNIT);
        let crypt = crypt_bio(&tfm, 8, 1, 0);
        assert!(!may_merge(&plain, &crypt, SHIFT));
        assert!(!may_merge(&crypt, &plain, SHIFT));
    }

    #[test]
    fn different_transforms_never_merge() {
        let a = lba_transform();
        let b = lba_transform();
        assert!(!may_merge(&crypt_bio(&a, 0, 1, 0), &crypt_bio(&b, 8, 1, 0), SHIFT));
        assert_eq!(a.diagnostics().count(DiagEvent::MergeNo).ok, 1);
    }

    #[test]
    fn transforms_of_different_files_are_reported() {
        let a = keyed_transform(Some(OwnerFile::new(file(1), FilesystemKind::Generic)));
        let b = keyed_transform(Some(OwnerFile::new(file(2), FilesystemKind::Generic)));
        let front = crypt_bio(&a, 0, 1, 0);
        let back = crypt_bio(&b, 8, 1, 0);
        assert_eq!(
            evaluate_merge(&front, &back, SHIFT),
            Err(BindingError::OwnerMismatch)
        );
        assert!(!may_merge(&front, &back, SHIFT));
    }

    #[test]
    fn dun_requests_merge_only_when_contiguous() {
        let tfm = dun_transform();
        let front = crypt_bio(&tfm, 0, 2, 100);
        assert!(may_merge(&front, &crypt_bio(&tfm, 16, 1, 102), SHIFT));
        assert!(!may_merge(&front, &crypt_bio(&tfm, 16, 1, 103), SHIFT));
        assert_eq!(tfm.diagnostics().count(DiagEvent::MergeDun).ok, 1);
        assert_eq!(tfm.diagnostics().count(DiagEvent::MergeNo).ok, 1);
    }

    #[test]
    fn dun_at_end_of_range_refuses_merge() {
        let tfm = dun_transform();
        let front = crypt_bio(&tfm, 0, 2, u64::MAX - 1);
        let back = crypt_bio(&tfm, 16, 1, 1);
        assert_eq!(evaluate_merge(&front, &back, SHIFT), Ok(false));
        assert!(!may_merge(&front, &back, SHIFT));
        assert_eq!(tfm.diagnostics().count(DiagEvent::MergeNo).ok, 2);
    }

    #[test]
    fn oversized_data_unit_shift_refuses_merge() {
        let tfm = dun_transform();
        let front = crypt_bio(&tfm, 0, 2, 100);
        let back = crypt_bio(&tfm, 16, 1, 102);
        assert!(!may_merge(&front, &back, 64));
        assert!(!may_merge(&front, &back, u32::MAX));
        assert!(may_merge(&front, &back, SHIFT));
    }

    #[test]
    fn dun_merge_is_directional() {
        let tfm = dun_transform();
        let a = crypt_bio(&tfm, 0, 2, 100);
        let b = crypt_bio(&tfm, 16, 1, 102);
        assert!(may_merge(&a, &b, SHIFT));
        assert!(!may_merge(&b, &a, SHIFT));
    }

    #[test]
    fn dun_requests_without_dun_do_not_merge() {
        let tfm = dun_transform();
        let a = crypt_bio(&tfm, 0, 1, 0);
        let b = crypt_bio(&tfm, 8, 1, 1);
        assert!(!may_merge(&a, &b, SHIFT));
    }

    #[test]
    fn lba_requests_merge_regardless_of_gap() {
        let tfm = lba_transform();
        let a = crypt_bio(&tfm, 0, 1, 0);
        let b = crypt_bio(&tfm, 10_000, 1, 0);
        assert!(may_merge(&a, &b, SHIFT));
        assert_eq!(tfm.diagnostics().count(DiagEvent::Merge).ok, 1);
    }

    #[test]
    fn device_level_transform_merges() {
        let tfm = keyed_transform(None);
        let a = crypt_bio(&tfm, 0, 1, 0);
        let b = crypt_bio(&tfm, 8, 1, 0);
        assert!(may_merge(&a, &b, SHIFT));
        assert_eq!(tfm.diagnostics().count(DiagEvent::MergeDm).ok, 1);
    }

    #[test]
    fn device_level_transform_with_dun_is_rejected() {
        let tfm = keyed_transform(None);
        let a = crypt_bio(&tfm, 0, 1, 5);
        let b = crypt_bio(&tfm, 8, 1, 6);
        assert_eq!(
            evaluate_merge(&a, &b, SHIFT),
            Err(BindingError::OwnerMismatch)
        );
        assert!(!may_merge(&a, &b, SHIFT));
    }

    #[test]
    fn lost_binding_is_reported_and_refused() {
        let tfm = lba_transform();
        let a = crypt_bio(&tfm, 0, 1, 0);
        let mut b = Bio::new(BioOp::Write, 8, UNIT);
        b.mark_crypt();
        assert_eq!(evaluate_merge(&a, &b, SHIFT), Err(BindingError::Unbound));
        assert!(!may_merge(&a, &b, SHIFT));
    }
}
