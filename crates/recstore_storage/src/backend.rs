//! Append-only byte log trait.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// Backends are **opaque byte stores**: appended bytes are addressed by the
/// offset returned from [`append`](StorageBackend::append) and are never
/// rewritten in place. The only way to drop bytes is to cut the tail with
/// [`truncate`](StorageBackend::truncate). The archive blob and the archive manifest of
/// `recstore_core` are both written through this trait.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `size` is the offset the next `append` will write at
/// - Backends must be `Send + Sync`
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the log and returns its starting offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    ///
    /// Stronger than `flush`: after this returns, appended bytes survive
    /// power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the log back to `new_size` bytes.
    ///
    /// Used to discard a partially written tail before appending again.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// backend cannot shrink.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
