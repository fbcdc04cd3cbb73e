//! Local storage for profiles
//!
//! Each profile owns two files in the storage directory: `<name>.txt`, the
//! filter list exactly as downloaded, and `<name>.json`, its metadata record.
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::profile::ProfileMetadata;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Open a store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.txt"))
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Cached list bytes, `None` when there is no cache file.
    pub fn read_list(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.list_path(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_list(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        atomic_write(&self.list_path(name), data)
    }

    pub fn remove_list(&self, name: &str) -> Result<(), StoreError> {
        remove_if_exists(&self.list_path(name))
    }

    pub fn save_metadata(&self, metadata: &ProfileMetadata) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(metadata)?;
        atomic_write(&self.metadata_path(&metadata.name), data.as_bytes())
    }

    /// Every readable metadata record, sorted by name. Unreadable records are
    /// logged and skipped.
    pub fn load_all_metadata(&self) -> Result<Vec<ProfileMetadata>, StoreError> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|data| serde_json::from_str::<ProfileMetadata>(&data).map_err(StoreError::from));
            match parsed {
                Ok(metadata) => records.push(metadata),
                Err(e) => log::warn!("Skipping profile record {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Delete both files of a profile.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.remove_list(name)?;
        remove_if_exists(&self.metadata_path(name))
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Atomic file write (write to temp, then rename). Every call gets its own
/// temp file, so concurrent writers of one path never share it.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(format!(
        ".{}.{}.tmp",
        process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let temp_path = PathBuf::from(temp_name);

    if let Err(e) = fs::write(&temp_path, data).and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
