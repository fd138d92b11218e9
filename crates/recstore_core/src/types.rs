//! Core type definitions for record stores.

use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// Access mode of an open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Reads only; every mutator fails with a strategy error.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl Mode {
    /// Returns true for [`Mode::ReadOnly`].
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Backend strategy of a store, persisted as the `Type` control property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Append-only blob log with a text manifest.
    Archive,
    /// Ordered byte map with large-record segmentation.
    Segmented,
    /// Compression overlay over two inner stores.
    Compressed,
    /// One file per record.
    File,
    /// Read-only key list projected onto a source store.
    List,
}

impl StoreKind {
    /// Returns the name stored in the control file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Archive => "Archive",
            Self::Segmented => "Segmented",
            Self::Compressed => "Compressed",
            Self::File => "File",
            Self::List => "List",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Archive" => Ok(Self::Archive),
            "Segmented" => Ok(Self::Segmented),
            "Compressed" => Ok(Self::Compressed),
            "File" => Ok(Self::File),
            "List" => Ok(Self::List),
            other => Err(CoreError::strategy(format!("unknown store type: {other}"))),
        }
    }
}

/// Where a `sequence` call starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Restart from the first record.
    Start,
    /// Continue after the previously returned record.
    Next,
}

/// A key and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record key.
    pub key: String,
    /// The record payload.
    pub data: Vec<u8>,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }
}
