//! Hardware dispatch bridge.
//!
//! Called by the storage host driver while it fills the engine's descriptor
//! table for a request. Requests without crypto are explicitly marked as
//! bypass so a descriptor slot never inherits a previous request's key.

use crate::binding;
use crate::bio::Bio;
use crate::diagnostics::{DiagEvent, Diagnostics};
use crate::error::DispatchError;
use crate::file::FileKeyManager;
use crate::iv::{derive_iv, IvPosition};
use crate::transform::Transform;
use diskcipher_provider::{HardwareEngine, HwRequest, TableAddr, TestRequest};
use log::{error, warn};
use std::sync::Arc;

/// Forwards per-request crypto setup to the inline engine.
#[derive(Clone)]
pub struct HwBridge {
    engine: Arc<dyn HardwareEngine>,
    keys: Arc<dyn FileKeyManager>,
    diag: Arc<Diagnostics>,
    cmdq_enabled: bool,
}

impl HwBridge {
    pub fn new(
        engine: Arc<dyn HardwareEngine>,
        keys: Arc<dyn FileKeyManager>,
        diag: Arc<Diagnostics>,
        cmdq_enabled: bool,
    ) -> Self {
        Self {
            engine,
            keys,
            diag,
            cmdq_enabled,
        }
    }

    /// Program the descriptor for one data unit of `bio`.
    ///
    /// `page_index` and `sector_unit` locate the data unit inside the request
    /// for DUN and LBA IVs respectively.
    pub fn dispatch_crypt(
        &self,
        bio: &Bio,
        table: TableAddr,
        page_index: u32,
        sector_unit: u32,
    ) -> Result<(), DispatchError> {
        let transform = match binding::get(bio, &*self.keys) {
            Ok(Some(transform)) => transform,
            Ok(None) => {
                self.engine.bypass(table);
                self.diag.record(DiagEvent::Bypass, false);
                return Ok(());
            }
            Err(err) => {
                error!("diskcipher: rejecting request at sector {}: {err}", bio.sector);
                self.engine.bypass(table);
                self.diag.record(DiagEvent::Bypass, true);
                self.diag.record(DiagEvent::Crypt, true);
                return Err(err.into());
            }
        };

        // Algorithm id 0 is a pass-through cipher: the slot must still be
        // marked plaintext.
        if transform.algorithm_id() == 0 {
            self.engine.bypass(table);
            self.diag.record(DiagEvent::Bypass, false);
            return Ok(());
        }

        let position = IvPosition {
            dun: bio.dun().unwrap_or(0),
            sector: bio.sector,
            page_index,
            sector_offset: sector_unit,
        };
        let iv = derive_iv(transform.iv_mode(), position);
        let req = HwRequest::new(table, &iv.to_bytes(), self.cmdq_enabled);

        let result = transform.alg().crypt(transform.context(), &req);
        self.diag.record(DiagEvent::Crypt, result.is_err());
        result.map_err(|err| {
            warn!(
                "diskcipher crypt failed on `{}`: {err}",
                transform.descriptor().driver_name
            );
            DispatchError::from(err)
        })
    }

    /// Release engine state programmed for `bio` once the request completes.
    pub fn dispatch_clear(&self, bio: &Bio, table: TableAddr) -> Result<(), DispatchError> {
        let transform = match binding::get(bio, &*self.keys) {
            Ok(Some(transform)) => transform,
            Ok(None) => return Ok(()),
            Err(err) => {
                error!("diskcipher: cannot clear request at sector {}: {err}", bio.sector);
                self.diag.record(DiagEvent::Clear, true);
                return Err(err.into());
            }
        };

        if transform.algorithm_id() == 0 {
            return Ok(());
        }

        let req = HwRequest::without_iv(table);
        let result = transform.alg().clear(transform.context(), &req);
        self.diag.record(DiagEvent::Clear, result.is_err());
        result.map_err(|err| {
            warn!(
                "diskcipher clear failed on `{}`: {err}",
                transform.descriptor().driver_name
            );
            DispatchError::from(err)
        })
    }

    pub fn self_test_crypt(
        &self,
        transform: &Transform,
        req: &mut TestRequest<'_>,
    ) -> Result<(), DispatchError> {
        self_test_crypt(transform, req)
    }
}

/// Run one cipher operation through the provider without any block I/O.
pub fn self_test_crypt(
    transform: &Transform,
    req: &mut TestRequest<'_>,
) -> Result<(), DispatchError> {
    let result = transform
        .alg()
        .self_test_crypt(transform.context(), req)
        .map_err(DispatchError::from);
    transform
        .diagnostics()
        .record(DiagEvent::SelfTest, result.is_err());
    if let Err(err) = &result {
        warn!(
            "diskcipher self-test on `{}` failed: {err}",
            transform.descriptor().driver_name
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::bio::{BioOp, PageOwner};
    use crate::error::BindingError;
    use crate::file::{FilesystemKind, OwnerFile};
    use crate::registry::AlgHandle;
    use crate::test_support::{file, MockKeys, NullAlg, RecordingEngine};
    use diskcipher_provider::HookError;

    struct Rig {
        alg: Arc<NullAlg>,
        engine: Arc<RecordingEngine>,
        diag: Arc<Diagnostics>,
    }

    impl Rig {
        fn new(alg: NullAlg) -> Self {
            Self {
                alg: Arc::new(alg),
                engine: Arc::new(RecordingEngine::default()),
                diag: Arc::new(Diagnostics::default()),
            }
        }

        fn transform(&self, owner: Option<OwnerFile>) -> Arc<Transform> {
            let handle = AlgHandle {
                alg: self.alg.clone(),
                diag: self.diag.clone(),
            };
            let tfm = Transform::init(handle).unwrap();
            tfm.set_key(&[0x11; 64], false, owner).unwrap();
            tfm
        }

        fn bridge(&self, keys: MockKeys) -> HwBridge {
            HwBridge::new(
                self.engine.clone(),
                Arc::new(keys),
                self.diag.clone(),
                false,
            )
        }
    }

    fn file_bio(host: u64, sector: u64) -> Bio {
        Bio::new(BioOp::Write, sector, 8192).with_page(PageOwner::Mapped {
            host: Some(file(host)),
        })
    }

    #[test]
    fn pass_through_transform_takes_bypass_path() {
        let rig = Rig::new(NullAlg::xts().pass_through());
        let bridge = rig.bridge(MockKeys::default());
        let tfm = rig.transform(None);
        let mut bio = Bio::new(BioOp::Write, 0, 4096);
        bind(Some(&mut bio), Some(&tfm), 0);

        bridge.dispatch_crypt(&bio, TableAddr(0x41), 0, 0).unwrap();
        bridge.dispatch_clear(&bio, TableAddr(0x41)).unwrap();
        assert_eq!(rig.engine.bypassed(), vec![TableAddr(0x41)]);
        assert!(rig.alg.crypts().is_empty());
        assert!(rig.alg.clears().is_empty());
        assert_eq!(rig.diag.count(DiagEvent::Bypass).ok, 1);
        assert!(rig.diag.count(DiagEvent::Crypt).is_zero());
    }

    #[test]
    fn plain_request_takes_bypass_path() {
        let rig = Rig::new(NullAlg::xts());
        let bridge = rig.bridge(MockKeys::default());
        let bio = Bio::new(BioOp::Write, 0, 4096).with_page(PageOwner::Anonymous);

        bridge.dispatch_crypt(&bio, TableAddr(0x40), 0, 0).unwrap();
        assert_eq!(rig.engine.bypassed(), vec![TableAddr(0x40)]);
        assert!(rig.alg.crypts().is_empty());
        assert_eq!(rig.diag.count(DiagEvent::Bypass).ok, 1);
    }

    #[test]
    fn dun_transform_programs_dun_based_iv() {
        let rig = Rig::new(NullAlg::xts());
        let owner = OwnerFile::new(file(5), FilesystemKind::Sequential);
        let tfm = rig.transform(Some(owner));
        let bridge = rig.bridge(MockKeys::default().with_file(5, Some(tfm.clone()), true));
        let mut bio = file_bio(5, 4096);
        bind(Some(&mut bio), Some(&tfm), 300);

        bridge.dispatch_crypt(&bio, TableAddr(1), 1, 8).unwrap();
        let crypts = rig.alg.crypts();
        assert_eq!(crypts.len(), 1);
        assert_eq!(crypts[0].iv(), &301u64.to_le_bytes());
        assert_eq!(crypts[0].table, TableAddr(1));
        assert!(rig.engine.bypassed().is_empty());
    }

    #[test]
    fn lba_transform_programs_sector_based_iv() {
        let rig = Rig::new(NullAlg::xts());
        let owner = OwnerFile::new(file(5), FilesystemKind::Generic);
        let tfm = rig.transform(Some(owner));
        let bridge = rig.bridge(MockKeys::default().with_file(5, Some(tfm.clone()), true));
        let mut bio = file_bio(5, 4096);
        bind(Some(&mut bio), Some(&tfm), 300);

        bridge.dispatch_crypt(&bio, TableAddr(1), 1, 8).unwrap();
        assert_eq!(rig.alg.crypts()[0].iv(), &4104u64.to_le_bytes());
    }

    #[test]
    fn binding_failure_bypasses_and_rejects() {
        let rig = Rig::new(NullAlg::xts());
        let bridge = rig.bridge(MockKeys::default());
        let mut bio = file_bio(5, 0);
        bio.mark_crypt();

        let err = bridge.dispatch_crypt(&bio, TableAddr(9), 0, 0).unwrap_err();
        assert_eq!(err, DispatchError::Binding(BindingError::Unbound));
        assert_eq!(rig.engine.bypassed(), vec![TableAddr(9)]);
        assert!(rig.alg.crypts().is_empty());
    }

    #[test]
    fn stale_binding_is_not_dispatched() {
        let rig = Rig::new(NullAlg::xts());
        let owner = OwnerFile::new(file(5), FilesystemKind::Generic);
        let old = rig.transform(Some(owner));
        let live = rig.transform(Some(owner));
        let bridge = rig.bridge(MockKeys::default().with_file(5, Some(live), true));
        let mut bio = file_bio(5, 0);
        bind(Some(&mut bio), Some(&old), 0);

        let err = bridge.dispatch_crypt(&bio, TableAddr(2), 0, 0).unwrap_err();
        assert_eq!(err, DispatchError::Binding(BindingError::StaleBinding));
        assert!(rig.alg.crypts().is_empty());
    }

    #[test]
    fn provider_failure_is_propagated() {
        let rig = Rig::new(NullAlg::xts().failing_crypt(HookError::rejected(-5, "slot busy")));
        let tfm = rig.transform(None);
        let bridge = rig.bridge(MockKeys::default());
        let mut bio = Bio::new(BioOp::Write, 0, 4096);
        bind(Some(&mut bio), Some(&tfm), 0);

        let err = bridge.dispatch_crypt(&bio, TableAddr(3), 0, 0).unwrap_err();
        assert!(matches!(err, DispatchError::ProviderFailed(_)));
        assert_eq!(rig.diag.count(DiagEvent::Crypt).err, 1);
    }

    #[test]
    fn clear_reaches_provider_only_for_crypto_requests() {
        let rig = Rig::new(NullAlg::xts());
        let tfm = rig.transform(None);
        let bridge = rig.bridge(MockKeys::default());

        let plain = Bio::new(BioOp::Read, 0, 4096);
        bridge.dispatch_clear(&plain, TableAddr(4)).unwrap();
        assert!(rig.alg.clears().is_empty());
        assert!(rig.engine.bypassed().is_empty());

        let mut bio = Bio::new(BioOp::Read, 0, 4096);
        bind(Some(&mut bio), Some(&tfm), 0);
        bridge.dispatch_clear(&bio, TableAddr(4)).unwrap();
        assert_eq!(rig.alg.clears(), vec![HwRequest::without_iv(TableAddr(4))]);
    }

    #[test]
    fn self_test_without_hook_is_unsupported() {
        let rig = Rig::new(NullAlg::xts());
        let tfm = rig.transform(None);
        let src = [0u8; 16];
        let mut dst = [0u8; 16];
        let mut req = TestRequest::new(&[0u8; 16], &src, &mut dst, true);

        assert_eq!(
            self_test_crypt(&tfm, &mut req),
            Err(DispatchError::Unsupported)
        );
        assert_eq!(rig.diag.count(DiagEvent::SelfTest).err, 1);
    }
}
