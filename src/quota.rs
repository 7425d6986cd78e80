//! Generation quota counter.
//!
//! The counter only grows. There is no automatic monthly rollover: it returns
//! to zero only through `reset`, which the HTTP API exposes explicitly.

use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QuotaError;

pub trait QuotaStore: Send + Sync {
  fn read(&self) -> Result<u32, QuotaError>;

  /// Add one and return the new value.
  fn increment(&self) -> Result<u32, QuotaError>;

  fn reset(&self) -> Result<(), QuotaError>;
}

/// In-process counter for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
  used: AtomicU32,
}

#[cfg(test)]
impl QuotaStore for MemoryQuotaStore {
  fn read(&self) -> Result<u32, QuotaError> {
    Ok(self.used.load(Ordering::SeqCst))
  }

  fn increment(&self) -> Result<u32, QuotaError> {
    Ok(self.used.fetch_add(1, Ordering::SeqCst) + 1)
  }

  fn reset(&self) -> Result<(), QuotaError> {
    self.used.store(0, Ordering::SeqCst);
    Ok(())
  }
}

#[derive(Serialize, Deserialize, Default)]
struct QuotaFile {
  used: u32,
}

/// Counter persisted as `{"used": n}`. A missing file reads as zero.
#[derive(Debug)]
pub struct FileQuotaStore {
  path: PathBuf,
  lock: Mutex<()>,
}

impl FileQuotaStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), lock: Mutex::new(()) }
  }

  pub fn path(&self) -> &Path { &self.path }

  fn io_err(&self, source: std::io::Error) -> QuotaError {
    QuotaError::Io { path: self.path.display().to_string(), source }
  }

  fn load(&self) -> Result<u32, QuotaError> {
    let s = match std::fs::read_to_string(&self.path) {
      Ok(s) => s,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
      Err(e) => return Err(self.io_err(e)),
    };
    if s.trim().is_empty() {
      return Ok(0);
    }
    serde_json::from_str::<QuotaFile>(&s)
      .map(|f| f.used)
      .map_err(|e| QuotaError::Corrupt { path: self.path.display().to_string(), message: e.to_string() })
  }

  fn store(&self, used: u32) -> Result<(), QuotaError> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
    }
    let body = serde_json::to_string(&QuotaFile { used })
      .map_err(|e| QuotaError::Corrupt { path: self.path.display().to_string(), message: e.to_string() })?;
    // temp file + rename: readers never see a partial write
    let tmp = self.path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
    std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
  }

  fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
    self.lock.lock().unwrap_or_else(|p| p.into_inner())
  }
}

impl QuotaStore for FileQuotaStore {
  fn read(&self) -> Result<u32, QuotaError> {
    let _g = self.guard();
    self.load()
  }

  fn increment(&self) -> Result<u32, QuotaError> {
    let _g = self.guard();
    let used = self.load()?.saturating_add(1);
    self.store(used)?;
    debug!(target: "capsule", path = %self.path.display(), used, "Quota counter incremented");
    Ok(used)
  }

  fn reset(&self) -> Result<(), QuotaError> {
    let _g = self.guard();
    self.store(0)?;
    info!(target: "capsule", path = %self.path.display(), "Quota counter reset");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn memory_store_counts_and_resets() {
    let q = MemoryQuotaStore::default();
    assert_eq!(q.read().unwrap(), 0);
    assert_eq!(q.increment().unwrap(), 1);
    assert_eq!(q.increment().unwrap(), 2);
    q.reset().unwrap();
    assert_eq!(q.read().unwrap(), 0);
  }

  #[test]
  fn file_store_missing_file_reads_zero_and_creates_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("quota.json");
    let q = FileQuotaStore::new(&path);
    assert_eq!(q.read().unwrap(), 0);
    assert_eq!(q.increment().unwrap(), 1);
    assert!(path.exists());
  }

  #[test]
  fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quota.json");
    {
      let q = FileQuotaStore::new(&path);
      for _ in 0..3 { q.increment().unwrap(); }
    }
    let q = FileQuotaStore::new(&path);
    assert_eq!(q.read().unwrap(), 3);
    q.reset().unwrap();
    assert_eq!(FileQuotaStore::new(&path).read().unwrap(), 0);
  }

  #[test]
  fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quota.json");
    std::fs::write(&path, "not json").unwrap();
    let err = FileQuotaStore::new(&path).read().unwrap_err();
    assert!(matches!(err, QuotaError::Corrupt { .. }));
  }

  #[test]
  fn concurrent_increments_do_not_undercount() {
    let dir = tempfile::tempdir().unwrap();
    let q = std::sync::Arc::new(FileQuotaStore::new(dir.path().join("quota.json")));
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let q = q.clone();
        std::thread::spawn(move || for _ in 0..5 { q.increment().unwrap(); })
      })
      .collect();
    for h in handles { h.join().unwrap(); }
    assert_eq!(q.read().unwrap(), 40);
  }
}
