//! AES providers backed by the FMP engine.

use crate::engine::{AlgoMode, DescriptorCfg, EncMode, EngineTest, FmpEngine};
use diskcipher_provider::{
    AlgContext, AlgDescriptor, DiskCipherAlg, HookError, HwRequest, TestRequest, TransformSetup,
};
use log::{debug, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use zeroize::Zeroizing;

pub const FMP_PRIORITY: i32 = 200;
pub const FMP_IV_SIZE: usize = 16;

const EINVAL: i32 = -22;
const ENOKEY: i32 = -126;

/// Per-transform state kept by an FMP provider.
///
/// The key mode is an atomic so `clear` and disk-key `crypt` never lock.
/// Per-file key bytes sit behind a `RwLock` that only `setkey`, `clearkey`
/// and `exit` write, which the owner serializes against dispatch.
pub struct CryptoInfo {
    mode: AlgoMode,
    enc: AtomicU8,
    key: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

const ENC_NONE: u8 = 0;
const ENC_FILE: u8 = 1;
const ENC_DISK: u8 = 2;

impl CryptoInfo {
    fn new(mode: AlgoMode) -> Self {
        Self {
            mode,
            enc: AtomicU8::new(ENC_NONE),
            key: RwLock::new(None),
        }
    }

    pub fn mode(&self) -> AlgoMode {
        self.mode
    }

    /// How the current key is held, if one is programmed.
    pub fn enc_mode(&self) -> Option<EncMode> {
        match self.enc.load(Ordering::Acquire) {
            ENC_FILE => Some(EncMode::File),
            ENC_DISK => Some(EncMode::Disk),
            _ => None,
        }
    }

    fn set_enc(&self, enc: Option<EncMode>) {
        let raw = match enc {
            None => ENC_NONE,
            Some(EncMode::File) => ENC_FILE,
            Some(EncMode::Disk) => ENC_DISK,
        };
        self.enc.store(raw, Ordering::Release);
    }

    fn store_key(&self, key: Option<Zeroizing<Vec<u8>>>) {
        *self.key.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = key;
    }

    fn read_key(&self) -> RwLockReadGuard<'_, Option<Zeroizing<Vec<u8>>>> {
        self.key.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wipe(&self) {
        self.set_enc(None);
        self.store_key(None);
    }
}

/// `xts(aes)-disk` / `cbc(aes)-disk` provider.
pub struct FmpAlg {
    desc: AlgDescriptor,
    mode: AlgoMode,
    engine: Arc<dyn FmpEngine>,
}

impl FmpAlg {
    pub fn new(mode: AlgoMode, engine: Arc<dyn FmpEngine>) -> Self {
        let desc = AlgDescriptor::new(
            format!("{}-disk", mode.name()),
            FMP_PRIORITY,
            std::mem::size_of::<CryptoInfo>(),
        )
        .with_driver_name(format!("{}-disk(fmp)", mode.name()));
        Self { desc, mode, engine }
    }

    pub fn mode(&self) -> AlgoMode {
        self.mode
    }
}

fn info(ctx: &AlgContext) -> Result<&CryptoInfo, HookError> {
    ctx.downcast_ref::<CryptoInfo>()
        .ok_or_else(|| HookError::rejected(EINVAL, "context was not created by an FMP provider"))
}

fn missing_key(mode: AlgoMode) -> HookError {
    warn!("fmp {}: crypt requested without a key", mode.name());
    HookError::rejected(ENOKEY, "no key programmed")
}

impl DiskCipherAlg for FmpAlg {
    fn descriptor(&self) -> &AlgDescriptor {
        &self.desc
    }

    fn init(&self) -> Result<TransformSetup, HookError> {
        Ok(TransformSetup {
            algorithm_id: self.mode.algorithm_id(),
            iv_size: FMP_IV_SIZE,
            context: Box::new(CryptoInfo::new(self.mode)),
        })
    }

    fn exit(&self, ctx: &AlgContext) {
        if let Ok(info) = info(ctx) {
            info.wipe();
        }
    }

    fn setkey(&self, ctx: &AlgContext, key: &[u8], persistent: bool) -> Result<(), HookError> {
        let info = info(ctx)?;
        if !self.mode.key_lengths().contains(&key.len()) {
            return Err(HookError::rejected(
                EINVAL,
                format!("{} does not take {}-byte keys", self.mode.name(), key.len()),
            ));
        }

        if persistent {
            self.engine.program_disk_key(self.mode, key)?;
            info.store_key(None);
            info.set_enc(Some(EncMode::Disk));
        } else {
            info.store_key(Some(Zeroizing::new(key.to_vec())));
            info.set_enc(Some(EncMode::File));
        }
        debug!(
            "fmp {} key set ({} bytes, persistent: {persistent})",
            self.mode.name(),
            key.len()
        );
        Ok(())
    }

    fn clearkey(&self, ctx: &AlgContext) -> Result<(), HookError> {
        let info = info(ctx)?;
        if info.enc_mode() == Some(EncMode::Disk) {
            self.engine.clear_disk_key()?;
        }
        info.wipe();
        Ok(())
    }

    fn crypt(&self, ctx: &AlgContext, req: &HwRequest) -> Result<(), HookError> {
        let info = info(ctx)?;
        let configure = |key: Option<&[u8]>| {
            self.engine.configure(&DescriptorCfg {
                table: req.table,
                mode: self.mode,
                key,
                iv: req.iv(),
                cmdq_enabled: req.cmdq_enabled,
            })
        };
        match info.enc_mode() {
            Some(EncMode::Disk) => configure(None),
            Some(EncMode::File) => match info.read_key().as_ref() {
                Some(key) => configure(Some(key.as_slice())),
                None => Err(missing_key(self.mode)),
            },
            None => Err(missing_key(self.mode)),
        }
    }

    fn clear(&self, ctx: &AlgContext, req: &HwRequest) -> Result<(), HookError> {
        let info = info(ctx)?;
        // Only per-descriptor keys leave anything behind.
        if info.enc_mode() == Some(EncMode::File) {
            self.engine.clear_descriptor(req.table)?;
        }
        Ok(())
    }

    fn self_test_crypt(
        &self,
        ctx: &AlgContext,
        req: &mut TestRequest<'_>,
    ) -> Result<(), HookError> {
        let info = info(ctx)?;
        if req.iv.len() != FMP_IV_SIZE {
            return Err(HookError::rejected(
                EINVAL,
                format!("self-test needs a {FMP_IV_SIZE}-byte iv, got {}", req.iv.len()),
            ));
        }
        if req.dst.len() < req.len() {
            return Err(HookError::rejected(EINVAL, "destination shorter than source"));
        }
        let key = info.read_key();
        let key = key
            .as_ref()
            .ok_or_else(|| HookError::rejected(ENOKEY, "self-test needs a non-persistent key"))?;
        self.engine.test_crypt(&mut EngineTest {
            mode: self.mode,
            key: key.as_slice(),
            iv: req.iv,
            src: req.src,
            dst: &mut *req.dst,
            encrypt: req.encrypt,
        })
    }
}
