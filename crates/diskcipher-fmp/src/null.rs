//! Pass-through provider for bring-up and tests.
//!
//! Reports algorithm id 0, so transforms built from it are never checked
//! against a file's key state. Data is copied unchanged.

use diskcipher_provider::{
    AlgContext, AlgDescriptor, DiskCipherAlg, HookError, HwRequest, TestRequest, TransformSetup,
};

pub const NULL_ALG_NAME: &str = "cipher_null-disk";

pub struct NullCipher {
    desc: AlgDescriptor,
}

impl NullCipher {
    pub fn new() -> Self {
        Self {
            desc: AlgDescriptor::new(NULL_ALG_NAME, 0, 0)
                .with_driver_name(format!("{NULL_ALG_NAME}(generic)")),
        }
    }
}

impl Default for NullCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCipherAlg for NullCipher {
    fn descriptor(&self) -> &AlgDescriptor {
        &self.desc
    }

    fn init(&self) -> Result<TransformSetup, HookError> {
        Ok(TransformSetup::default())
    }

    fn setkey(&self, _ctx: &AlgContext, _key: &[u8], _persistent: bool) -> Result<(), HookError> {
        Ok(())
    }

    fn clearkey(&self, _ctx: &AlgContext) -> Result<(), HookError> {
        Ok(())
    }

    fn crypt(&self, _ctx: &AlgContext, _req: &HwRequest) -> Result<(), HookError> {
        Ok(())
    }

    fn clear(&self, _ctx: &AlgContext, _req: &HwRequest) -> Result<(), HookError> {
        Ok(())
    }

    fn self_test_crypt(
        &self,
        _ctx: &AlgContext,
        req: &mut TestRequest<'_>,
    ) -> Result<(), HookError> {
        let len = req.len();
        if req.dst.len() < len {
            return Err(HookError::rejected(-22, "destination shorter than source"));
        }
        req.dst[..len].copy_from_slice(req.src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_cipher_reports_no_crypto() {
        let alg = NullCipher::new();
        assert_eq!(alg.descriptor().driver_name, "cipher_null-disk(generic)");
        assert_eq!(alg.init().unwrap().algorithm_id, 0);
    }

    #[test]
    fn self_test_copies_input() {
        let alg = NullCipher::new();
        let ctx = alg.init().unwrap().context;
        let src = *b"sixteen byte blk";
        let mut dst = [0u8; 16];
        let mut req = TestRequest::new(&[], &src, &mut dst, true);
        alg.self_test_crypt(&*ctx, &mut req).unwrap();
        assert_eq!(&dst, &src);
    }
}
