//! Engine probe and removal.

use crate::alg::FmpAlg;
use crate::engine::{AlgoMode, FmpEngine};
use diskcipher_core::{ConfigError, Registry};
use diskcipher_provider::{DiskCipherAlg, HardwareEngine, TableAddr};
use log::{error, info};
use std::sync::Arc;

/// Modes every FMP engine exposes, in registration order.
pub const FMP_MODES: [AlgoMode; 2] = [AlgoMode::AesXts, AlgoMode::AesCbc];

/// A probed engine together with the providers it registered.
pub struct FmpDevice {
    engine: Arc<dyn FmpEngine>,
    algs: Vec<Arc<dyn DiskCipherAlg>>,
}

impl FmpDevice {
    /// Register one provider per mode. Nothing stays registered on failure
    /// and the engine is shut down again.
    pub fn probe(engine: Arc<dyn FmpEngine>, registry: &Registry) -> Result<Self, ConfigError> {
        let algs: Vec<Arc<dyn DiskCipherAlg>> = FMP_MODES
            .iter()
            .map(|mode| Arc::new(FmpAlg::new(*mode, engine.clone())) as Arc<dyn DiskCipherAlg>)
            .collect();

        if let Err(err) = registry.register_batch(&algs) {
            error!("fmp: failed to register diskcipher algorithms: {err}");
            engine.shutdown();
            return Err(err);
        }

        info!("fmp: engine registered {} diskcipher algorithms", algs.len());
        Ok(Self { engine, algs })
    }

    /// Unregister the providers and release the engine.
    pub fn remove(self, registry: &Registry) {
        registry.unregister_batch(&self.algs);
        self.engine.shutdown();
        info!("fmp: engine removed");
    }

    pub fn algorithms(&self) -> &[Arc<dyn DiskCipherAlg>] {
        &self.algs
    }

    /// Bypass entry point for the dispatch bridge.
    pub fn hardware(&self) -> Arc<dyn HardwareEngine> {
        Arc::new(EngineBypass {
            engine: self.engine.clone(),
        })
    }
}

impl std::fmt::Debug for FmpDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .algs
            .iter()
            .map(|alg| alg.descriptor().driver_name.as_str())
            .collect();
        f.debug_struct("FmpDevice").field("algorithms", &names).finish()
    }
}

struct EngineBypass {
    engine: Arc<dyn FmpEngine>,
}

impl HardwareEngine for EngineBypass {
    fn bypass(&self, table: TableAddr) {
        self.engine.bypass(table);
    }
}
