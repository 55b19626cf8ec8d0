//! Fakes shared by the unit tests.

use crate::diagnostics::Diagnostics;
use crate::file::{FileId, FileKeyManager, FilesystemKind, OwnerFile};
use crate::registry::AlgHandle;
use crate::transform::Transform;
use diskcipher_provider::{
    AlgContext, AlgDescriptor, DiskCipherAlg, HardwareEngine, HookError, HwRequest, TableAddr,
    TransformSetup,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn file(id: u64) -> FileId {
    FileId::new(id).expect("test file ids are non-zero")
}

/// Provider that records every hook call and fails on request.
pub struct NullAlg {
    desc: AlgDescriptor,
    init_error: Option<HookError>,
    setkey_error: Option<HookError>,
    crypt_error: Option<HookError>,
    algorithm_id: u32,
    crypts: Mutex<Vec<HwRequest>>,
    clears: Mutex<Vec<HwRequest>>,
    exits: AtomicUsize,
}

impl NullAlg {
    pub const ALGO_ID: u32 = 7;

    pub fn new(desc: AlgDescriptor) -> Self {
        Self {
            desc,
            init_error: None,
            setkey_error: None,
            crypt_error: None,
            algorithm_id: Self::ALGO_ID,
            crypts: Mutex::new(Vec::new()),
            clears: Mutex::new(Vec::new()),
            exits: AtomicUsize::new(0),
        }
    }

    pub fn xts() -> Self {
        Self::new(
            AlgDescriptor::new("xts(aes)-disk", 100, 64).with_driver_name("xts(aes)-disk(null)"),
        )
    }

    /// Report algorithm id 0 from `init`.
    pub fn pass_through(mut self) -> Self {
        self.algorithm_id = 0;
        self
    }

    pub fn failing_init(mut self, err: HookError) -> Self {
        self.init_error = Some(err);
        self
    }

    pub fn failing_setkey(mut self, err: HookError) -> Self {
        self.setkey_error = Some(err);
        self
    }

    pub fn failing_crypt(mut self, err: HookError) -> Self {
        self.crypt_error = Some(err);
        self
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    pub fn crypts(&self) -> Vec<HwRequest> {
        self.crypts.lock().unwrap().clone()
    }

    pub fn clears(&self) -> Vec<HwRequest> {
        self.clears.lock().unwrap().clone()
    }
}

impl DiskCipherAlg for NullAlg {
    fn descriptor(&self) -> &AlgDescriptor {
        &self.desc
    }

    fn init(&self) -> Result<TransformSetup, HookError> {
        if let Some(err) = &self.init_error {
            return Err(err.clone());
        }
        Ok(TransformSetup {
            algorithm_id: self.algorithm_id,
            iv_size: 16,
            context: Box::new(()),
        })
    }

    fn exit(&self, _ctx: &AlgContext) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn setkey(&self, _ctx: &AlgContext, _key: &[u8], _persistent: bool) -> Result<(), HookError> {
        self.setkey_error.clone().map_or(Ok(()), Err)
    }

    fn clearkey(&self, _ctx: &AlgContext) -> Result<(), HookError> {
        Ok(())
    }

    fn crypt(&self, _ctx: &AlgContext, req: &HwRequest) -> Result<(), HookError> {
        if let Some(err) = &self.crypt_error {
            return Err(err.clone());
        }
        self.crypts.lock().unwrap().push(*req);
        Ok(())
    }

    fn clear(&self, _ctx: &AlgContext, req: &HwRequest) -> Result<(), HookError> {
        self.clears.lock().unwrap().push(*req);
        Ok(())
    }
}

pub fn handle_for(alg: NullAlg) -> AlgHandle {
    AlgHandle {
        alg: Arc::new(alg),
        diag: Arc::new(Diagnostics::default()),
    }
}

/// Fresh keyed transform with its own diagnostics.
pub fn keyed_transform(owner: Option<OwnerFile>) -> Arc<Transform> {
    let tfm = Transform::init(handle_for(NullAlg::xts())).unwrap();
    tfm.set_key(&[0x22; 64], false, owner).unwrap();
    tfm
}

#[derive(Default)]
pub struct MockKeys {
    files: HashMap<u64, (Option<Arc<Transform>>, bool)>,
    direct_io: HashSet<u64>,
    sequential: HashSet<u64>,
}

impl MockKeys {
    /// Give `id` key material, an optional live transform and key validity.
    pub fn with_file(mut self, id: u64, live: Option<Arc<Transform>>, valid_key: bool) -> Self {
        self.files.insert(id, (live, valid_key));
        self
    }

    pub fn with_direct_io(mut self, id: u64) -> Self {
        self.direct_io.insert(id);
        self
    }

    pub fn with_sequential(mut self, id: u64) -> Self {
        self.sequential.insert(id);
        self
    }
}

impl FileKeyManager for MockKeys {
    fn has_key_material(&self, file: FileId) -> bool {
        self.files.contains_key(&file.get())
    }

    fn has_valid_key(&self, file: FileId) -> bool {
        self.files.get(&file.get()).map_or(false, |(_, valid)| *valid)
    }

    fn current_live_transform(&self, file: FileId) -> Option<Arc<Transform>> {
        self.files.get(&file.get()).and_then(|(live, _)| live.clone())
    }

    fn filesystem_kind(&self, file: FileId) -> FilesystemKind {
        if self.sequential.contains(&file.get()) {
            FilesystemKind::Sequential
        } else {
            FilesystemKind::Generic
        }
    }

    fn direct_io_in_flight(&self, file: FileId) -> bool {
        self.direct_io.contains(&file.get())
    }
}

/// Engine that remembers which descriptor tables were bypassed.
#[derive(Default)]
pub struct RecordingEngine {
    bypassed: Mutex<Vec<TableAddr>>,
}

impl RecordingEngine {
    pub fn bypassed(&self) -> Vec<TableAddr> {
        self.bypassed.lock().unwrap().clone()
    }
}

impl HardwareEngine for RecordingEngine {
    fn bypass(&self, table: TableAddr) {
        self.bypassed.lock().unwrap().push(table);
    }
}
