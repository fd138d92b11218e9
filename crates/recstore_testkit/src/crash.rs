//! Crash recovery testing for recstore.
//!
//! [`CrashableBackend`] wraps any [`StorageBackend`] and simulates a
//! process dying partway through a write: the bytes up to the crash
//! point reach the inner backend, then every later write fails.
//!
//! [`ArchiveCrashHarness`] drives an [`ArchiveLog`] over in-memory
//! backends through a crash and reloads it the way a restarted process
//! would.
//!
//! ## Usage
//!
//! ```rust
//! use recstore_testkit::crash::{ArchiveCrashHarness, CrashPoint};
//!
//! let harness = ArchiveCrashHarness::new();
//! harness.populate(&[("kept", b"safe")]).unwrap();
//! assert!(harness.crash_append(CrashPoint::DuringManifestWrite, "lost", b"data").unwrap());
//! let log = harness.recover().unwrap();
//! assert!(log.contains("kept"));
//! assert!(!log.contains("lost"));
//! ```

use recstore_core::archive::ArchiveLog;
use recstore_core::CoreResult;
use recstore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Points at which a crash can be simulated during an archive append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash halfway through the payload write.
    DuringBlobWrite,
    /// Crash after the payload write, before any manifest byte.
    BeforeManifestWrite,
    /// Crash partway through the manifest line.
    DuringManifestWrite,
}

#[derive(Debug)]
struct CrashState {
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

/// Controls a [`CrashableBackend`] after it has been boxed and handed
/// to a store.
#[derive(Debug, Clone)]
pub struct CrashHandle {
    state: Arc<CrashState>,
}

impl CrashHandle {
    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.state.bytes_written.load(Ordering::SeqCst);
        self.state
            .crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Sets whether flush and sync should crash.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.state.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.state.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.state.bytes_written.store(0, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
        self.state.fail_on_sync.store(false, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// Returns the number of bytes written through the backend.
    pub fn bytes_written(&self) -> usize {
        self.state.bytes_written.load(Ordering::SeqCst)
    }
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            state: Arc::new(CrashState {
                crash_after_bytes: AtomicUsize::new(usize::MAX),
                bytes_written: AtomicUsize::new(0),
                crashed: AtomicBool::new(false),
                fail_on_sync: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a handle that controls this backend.
    pub fn handle(&self) -> CrashHandle {
        CrashHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn crash(&self, during: &str) -> StorageError {
        self.state.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::other(format!("simulated crash during {during}")))
    }

    fn check_alive(&self) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(self.crash("write after crash"));
        }
        Ok(())
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.check_alive()?;
        let current = self.state.bytes_written.fetch_add(bytes.len(), Ordering::SeqCst);
        let crash_threshold = self.state.crash_after_bytes.load(Ordering::SeqCst);

        if current >= crash_threshold {
            return Err(self.crash("write"));
        }

        // Check if this write will cross the crash threshold
        if current + bytes.len() > crash_threshold {
            // Write partial data up to crash point
            let partial_len = crash_threshold - current;
            if partial_len > 0 {
                let _ = self.inner.append(&bytes[..partial_len]);
            }
            return Err(self.crash("partial write"));
        }

        self.inner.append(bytes)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_alive()?;
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.crash("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_alive()?;
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.crash("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_alive()?;
        self.inner.truncate(new_size)
    }
}

/// Runs archive appends into a crash and reloads the survivors.
///
/// The blob and manifest live in shared in-memory backends, so a
/// reloaded log sees exactly the bytes that reached them before the
/// crash.
#[derive(Debug, Default)]
pub struct ArchiveCrashHarness {
    blob: InMemoryBackend,
    manifest: InMemoryBackend,
}

impl ArchiveCrashHarness {
    /// Creates a harness over an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `records` without any crash.
    pub fn populate<K, D>(&self, records: &[(K, D)]) -> CoreResult<()>
    where
        K: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let mut log = self.recover()?;
        for (key, data) in records {
            log.append(key.as_ref(), data.as_ref())?;
        }
        log.sync()
    }

    /// Appends `key` with a crash at `point`. Returns true if the append
    /// failed, as it does whenever the crash point is reached.
    pub fn crash_append(&self, point: CrashPoint, key: &str, data: &[u8]) -> CoreResult<bool> {
        let blob = CrashableBackend::new(Box::new(self.blob.clone()));
        let manifest = CrashableBackend::new(Box::new(self.manifest.clone()));
        let (blob_handle, manifest_handle) = (blob.handle(), manifest.handle());
        let mut log = ArchiveLog::load(Box::new(blob), Box::new(manifest), false)?;

        match point {
            CrashPoint::DuringBlobWrite => blob_handle.crash_after(data.len() / 2),
            CrashPoint::BeforeManifestWrite => manifest_handle.crash_after(0),
            CrashPoint::DuringManifestWrite => manifest_handle.crash_after(key.len() / 2 + 1),
        }
        Ok(log.append(key, data).is_err())
    }

    /// Loads the archive the way a restarted process would, repairing
    /// any torn manifest tail.
    pub fn recover(&self) -> CoreResult<ArchiveLog> {
        ArchiveLog::load(
            Box::new(self.blob.clone()),
            Box::new(self.manifest.clone()),
            true,
        )
    }

    /// Returns the raw manifest bytes.
    pub fn manifest_bytes(&self) -> Vec<u8> {
        self.manifest.data()
    }

    /// Returns the raw blob size.
    pub fn blob_len(&self) -> usize {
        self.blob.data().len()
    }
}
