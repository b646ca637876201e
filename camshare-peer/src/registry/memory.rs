use crate::config::DEFAULT_REGISTRY_ENTRIES;
use crate::error::RegistryError;
use crate::registry::{CameraRegistry, upsert};
use camshare_core::RoomId;
use camshare_core::model::SavedCamera;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry kept in process memory. Clones share the same list.
#[derive(Clone)]
pub struct MemoryRegistry {
    cameras: Arc<Mutex<Vec<SavedCamera>>>,
    max_entries: usize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            cameras: Arc::new(Mutex::new(Vec::new())),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SavedCamera>> {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraRegistry for MemoryRegistry {
    fn saved(&self) -> Vec<SavedCamera> {
        self.lock().clone()
    }

    fn save(&self, camera: SavedCamera) -> Result<(), RegistryError> {
        upsert(&mut self.lock(), camera, self.max_entries);
        Ok(())
    }

    fn remove(&self, id: &RoomId) -> Result<(), RegistryError> {
        self.lock().retain(|c| &c.id != id);
        Ok(())
    }

    fn clear(&self) -> Result<(), RegistryError> {
        self.lock().clear();
        Ok(())
    }
}
