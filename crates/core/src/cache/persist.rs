//! Persistence facility for the bounded store.
//!
//! Entries and the manifest are opaque named blobs. Writes replace the
//! previous blob atomically: a crash mid-write leaves the old bytes intact.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tempfile::NamedTempFile;

use crate::Error;

/// Key-value blob storage keyed by file name.
pub trait BlobStore: Send + Sync {
    /// Read a blob; `Ok(None)` when it does not exist.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Write a blob, atomically replacing any previous content.
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), Error>;

    /// Remove a blob. Removing a missing blob is not an error.
    fn remove(&self, name: &str) -> Result<(), Error>;

    /// Size in bytes, `Ok(None)` when it does not exist.
    fn size(&self, name: &str) -> Result<Option<u64>, Error>;

    /// Move a blob over `to`, atomically replacing it.
    fn rename(&self, from: &str, to: &str) -> Result<(), Error>;

    fn exists(&self, name: &str) -> bool {
        matches!(self.size(name), Ok(Some(_)))
    }
}

/// Directory-backed blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (and create if needed) a blob directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a blob.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(self.path_for(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(name)).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn size(&self, name: &str) -> Result<Option<u64>, Error> {
        match fs::metadata(self.path_for(name)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), Error> {
        fs::rename(self.path_for(from), self.path_for(to))?;
        Ok(())
    }
}

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored blob, sorted.
    pub fn names(&self) -> Vec<String> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = blobs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, Error> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        blobs.remove(name);
        Ok(())
    }

    fn size(&self, name: &str) -> Result<Option<u64>, Error> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(name).map(|b| b.len() as u64))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), Error> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        let bytes = blobs
            .remove(from)
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotFound, format!("no blob named {from}"))))?;
        blobs.insert(to.to_string(), bytes);
        Ok(())
    }
}
