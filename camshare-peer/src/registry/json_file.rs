use crate::config::DEFAULT_REGISTRY_ENTRIES;
use crate::error::RegistryError;
use crate::registry::{CameraRegistry, upsert};
use camshare_core::RoomId;
use camshare_core::model::SavedCamera;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Serialize)]
struct DocumentRef<'a> {
    cameras: &'a [SavedCamera],
}

#[derive(Deserialize)]
struct RawDocument {
    cameras: Vec<serde_json::Value>,
}

/// Registry persisted as a JSON document `{"cameras": [...]}`.
///
/// Entries that fail to decode are skipped; a document that is not an object
/// with a `cameras` array reads as empty. A hand-edited document longer than
/// the capacity reads as its first `max_entries` entries.
pub struct JsonFileRegistry {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_REGISTRY_ENTRIES)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Vec<SavedCamera> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read camera registry {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        let document: RawDocument = match serde_json::from_str(&data) {
            Ok(document) => document,
            Err(e) => {
                warn!("Camera registry {:?} is malformed: {}", self.path, e);
                return Vec::new();
            }
        };

        let mut cameras: Vec<SavedCamera> = document
            .cameras
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<SavedCamera>(value) {
                Ok(camera) => Some(camera),
                Err(e) => {
                    debug!("Skipping unreadable registry entry: {}", e);
                    None
                }
            })
            .collect();

        if cameras.len() > self.max_entries {
            debug!(
                "Camera registry holds {} entries, keeping the first {}",
                cameras.len(),
                self.max_entries
            );
            cameras.truncate(self.max_entries);
        }
        cameras
    }

    fn write(&self, cameras: &[SavedCamera]) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&DocumentRef { cameras })?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Vec<SavedCamera>)) -> Result<(), RegistryError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut cameras = self.read();
        f(&mut cameras);
        self.write(&cameras)
    }
}

impl CameraRegistry for JsonFileRegistry {
    fn saved(&self) -> Vec<SavedCamera> {
        self.read()
    }

    fn save(&self, camera: SavedCamera) -> Result<(), RegistryError> {
        let max = self.max_entries;
        self.update(|cameras| upsert(cameras, camera, max))
    }

    fn remove(&self, id: &RoomId) -> Result<(), RegistryError> {
        self.update(|cameras| cameras.retain(|c| &c.id != id))
    }

    fn clear(&self) -> Result<(), RegistryError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
