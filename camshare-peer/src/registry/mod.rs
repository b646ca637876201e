mod json_file;
mod memory;

pub use json_file::JsonFileRegistry;
pub use memory::MemoryRegistry;

use crate::error::RegistryError;
use camshare_core::RoomId;
use camshare_core::model::SavedCamera;

/// Cameras a viewer device has connected to before, most recent first.
///
/// Reads never fail: storage that cannot be read or decoded is reported as an
/// empty list.
pub trait CameraRegistry: Send + Sync {
    fn saved(&self) -> Vec<SavedCamera>;

    /// Records `camera` at the front of the list, replacing any entry with
    /// the same id.
    fn save(&self, camera: SavedCamera) -> Result<(), RegistryError>;

    fn remove(&self, id: &RoomId) -> Result<(), RegistryError>;

    fn clear(&self) -> Result<(), RegistryError>;
}

fn upsert(cameras: &mut Vec<SavedCamera>, camera: SavedCamera, max_entries: usize) {
    cameras.retain(|c| c.id != camera.id);
    cameras.insert(0, camera);
    cameras.truncate(max_entries);
}
