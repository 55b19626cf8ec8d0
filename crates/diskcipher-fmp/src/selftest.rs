//! Known-answer tests run through the self-test hook.
//!
//! Each vector is run in both directions against the provider the service
//! resolves for its algorithm name. Vectors are hex encoded.

use diskcipher_core::{
    self_test_crypt, ConfigError, DispatchError, Diskcipher, KeyError, Transform,
};
use diskcipher_provider::TestRequest;
use log::{error, info};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KatVector {
    pub name: &'static str,
    /// Base algorithm name; the disk suffix is added on lookup.
    pub alg: &'static str,
    pub key: &'static str,
    pub iv: &'static str,
    pub plaintext: &'static str,
    pub ciphertext: &'static str,
}

/// IEEE 1619 XTS-AES-128 vector 1 and SP 800-38A CBC-AES128 block 1.
pub const BUILTIN_VECTORS: &[KatVector] = &[
    KatVector {
        name: "xts-aes128-ieee1619-1",
        alg: "xts(aes)",
        key: "0000000000000000000000000000000000000000000000000000000000000000",
        iv: "00000000000000000000000000000000",
        plaintext: "0000000000000000000000000000000000000000000000000000000000000000",
        ciphertext: "917cf69ebd68b2ec9b9fe9a3eadda692cd43d2f59598ed858c02c2652fbf922e",
    },
    KatVector {
        name: "cbc-aes128-sp800-38a-f21",
        alg: "cbc(aes)",
        key: "2b7e151628aed2a6abf7158809cf4f3c",
        iv: "000102030405060708090a0b0c0d0e0f",
        plaintext: "6bc1bee22e409f96e93d7e117393172a",
        ciphertext: "7649abac8119b246cee98e9b12e9197d",
    },
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KatFailure {
    #[error("vector field `{field}` is not valid hex: {source}")]
    Hex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("{direction} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        direction: &'static str,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KatOutcome {
    pub name: &'static str,
    /// Driver that ran the vector, when one was found.
    pub driver: Option<String>,
    pub result: Result<(), KatFailure>,
}

impl KatOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

pub fn all_passed(outcomes: &[KatOutcome]) -> bool {
    outcomes.iter().all(KatOutcome::passed)
}

/// Run every vector and report each outcome; a failure does not stop the run.
pub fn run_known_answer_tests(svc: &Diskcipher, vectors: &[KatVector]) -> Vec<KatOutcome> {
    vectors
        .iter()
        .map(|vector| {
            let mut driver = None;
            let result = run_vector(svc, vector, &mut driver);
            match &result {
                Ok(()) => info!(
                    "self-test {} passed on {}",
                    vector.name,
                    driver.as_deref().unwrap_or("?")
                ),
                Err(err) => error!("self-test {} failed: {err}", vector.name),
            }
            KatOutcome {
                name: vector.name,
                driver,
                result,
            }
        })
        .collect()
}

fn run_vector(
    svc: &Diskcipher,
    vector: &KatVector,
    driver: &mut Option<String>,
) -> Result<(), KatFailure> {
    let key = decode("key", vector.key)?;
    let iv = decode("iv", vector.iv)?;
    let plaintext = decode("plaintext", vector.plaintext)?;
    let ciphertext = decode("ciphertext", vector.ciphertext)?;

    let tfm = svc.alloc_transform(vector.alg, true)?;
    *driver = Some(tfm.descriptor().driver_name.clone());
    tfm.set_key(&key, false, None)?;

    let result = check_direction(&tfm, &iv, &plaintext, &ciphertext, true)
        .and_then(|()| check_direction(&tfm, &iv, &ciphertext, &plaintext, false));
    tfm.destroy();
    result
}

fn check_direction(
    tfm: &Arc<Transform>,
    iv: &[u8],
    input: &[u8],
    expected: &[u8],
    encrypt: bool,
) -> Result<(), KatFailure> {
    let mut output = vec![0u8; input.len()];
    let mut req = TestRequest::new(iv, input, &mut output, encrypt);
    self_test_crypt(tfm, &mut req)?;
    if output != expected {
        return Err(KatFailure::Mismatch {
            direction: if encrypt { "encrypt" } else { "decrypt" },
            expected: hex::encode(expected),
            actual: hex::encode(&output),
        });
    }
    Ok(())
}

fn decode(field: &'static str, value: &str) -> Result<Vec<u8>, KatFailure> {
    hex::decode(value).map_err(|source| KatFailure::Hex { field, source })
}
