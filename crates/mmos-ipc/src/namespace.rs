//! Where shared regions live and how they are found by name.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use memmap2::MmapOptions;

use crate::error::{IpcError, Result};
use crate::layout::{offset, region_bytes, valid_dimensions, REGION_FILE_EXTENSION};
use crate::region::SharedRegion;

/// A registry of named regions shared by the worker and the host.
///
/// The worker creates (and re-creates, on resize) regions; the host attaches to them. Attach
/// always runs full header validation.
pub trait RegionNamespace: Send + Sync + std::fmt::Debug {
    /// Create a zeroed region with an initialised header, replacing any region of the same name.
    fn create(&self, name: &str, width: u32, height: u32) -> Result<Arc<SharedRegion>>;

    fn attach(&self, name: &str) -> Result<Arc<SharedRegion>>;

    /// Remove the name. Existing handles stay valid until dropped. Removing an unknown name is
    /// not an error.
    fn remove(&self, name: &str) -> Result<()>;
}

/// In-process namespace used when the worker runs on a thread.
#[derive(Debug, Default)]
pub struct MemoryNamespace {
    regions: Mutex<HashMap<String, Arc<SharedRegion>>>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegionNamespace for MemoryNamespace {
    fn create(&self, name: &str, width: u32, height: u32) -> Result<Arc<SharedRegion>> {
        let region = Arc::new(SharedRegion::heap(name, width, height)?);
        self.regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&region));
        tracing::debug!(region = name, width, height, "created heap region");
        Ok(region)
    }

    fn attach(&self, name: &str) -> Result<Arc<SharedRegion>> {
        let region = self
            .regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| IpcError::NotFound(name.to_string()))?;
        region.validate()?;
        Ok(region)
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

/// File-backed namespace for the cross-process mode: each region is a memory-mapped
/// `<dir>/<name>.shm`.
#[derive(Debug, Clone)]
pub struct FileNamespace {
    dir: PathBuf,
}

impl FileNamespace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<temp-dir>/mmos`.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("mmos")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{REGION_FILE_EXTENSION}"))
    }
}

impl Default for FileNamespace {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl RegionNamespace for FileNamespace {
    fn create(&self, name: &str, width: u32, height: u32) -> Result<Arc<SharedRegion>> {
        if !valid_dimensions(width, height) {
            return Err(IpcError::InvalidDimensions { width, height });
        }
        fs::create_dir_all(&self.dir)?;

        let len = region_bytes(width, height);
        let path = self.path_for(name);
        let tmp = self
            .dir
            .join(format!(".{name}.{}.tmp", std::process::id()));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.set_len(len as u64)?;

        // SAFETY: the file was just created and sized by us; concurrent access from other
        // processes only ever goes through the region's atomics.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let region = SharedRegion::create_mapped(name, map, width, height)?;
        region.flush()?;

        // Publish under the real name only once the header is complete.
        fs::rename(&tmp, &path)?;
        tracing::debug!(region = name, path = %path.display(), width, height, "created mapped region");
        Ok(Arc::new(region))
    }

    fn attach(&self, name: &str) -> Result<Arc<SharedRegion>> {
        let path = self.path_for(name);
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(IpcError::NotFound(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        if len < offset::PIXELS {
            return Err(IpcError::RegionSizeMismatch {
                actual: len,
                expected: offset::PIXELS,
            });
        }

        // SAFETY: see `create`.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let region = SharedRegion::attach_mapped(name, map)?;
        tracing::debug!(region = name, path = %path.display(), "attached mapped region");
        Ok(Arc::new(region))
    }

    fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
