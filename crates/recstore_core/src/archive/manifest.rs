//! Manifest line format.
//!
//! Each line is `<key> <size> <offset>`. An offset of `-1` marks a
//! tombstone. Keys may contain spaces, so a line is split from the right.

use crate::error::{CoreError, CoreResult};

/// Offset written for a removed key.
pub const REMOVED: i64 = -1;

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// The record key.
    pub key: String,
    /// Payload length in bytes.
    pub size: u64,
    /// Blob offset, or `None` for a tombstone.
    pub offset: Option<u64>,
}

impl ManifestEntry {
    /// Creates an entry for a payload stored at `offset`.
    #[must_use]
    pub fn live(key: &str, size: u64, offset: u64) -> Self {
        Self {
            key: key.to_owned(),
            size,
            offset: Some(offset),
        }
    }

    /// Creates a tombstone for `key`.
    #[must_use]
    pub fn tombstone(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            size: 0,
            offset: None,
        }
    }

    /// Returns true if this entry removes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.offset.is_none()
    }

    /// Renders the entry as a newline-terminated line.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self.offset {
            Some(offset) => format!("{} {} {}\n", self.key, self.size, offset),
            None => format!("{} {} {}\n", self.key, self.size, REMOVED),
        }
    }

    /// Parses one line without its terminator.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if a field is missing or not a number.
    pub fn parse_line(line: &str) -> CoreResult<Self> {
        let bad = || CoreError::strategy(format!("malformed manifest line: {line:?}"));

        let mut fields = line.rsplitn(3, ' ');
        let offset = fields.next().ok_or_else(bad)?;
        let size = fields.next().ok_or_else(bad)?;
        let key = fields.next().filter(|k| !k.is_empty()).ok_or_else(bad)?;

        let size = size.parse::<u64>().map_err(|_| bad())?;
        let offset = match offset.parse::<i64>().map_err(|_| bad())? {
            REMOVED => None,
            n => Some(u64::try_from(n).map_err(|_| bad())?),
        };
        Ok(Self {
            key: key.to_owned(),
            size,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_render_as_key_size_offset() {
        assert_eq!(ManifestEntry::live("key1", 12, 40).to_line(), "key1 12 40\n");
        assert_eq!(ManifestEntry::tombstone("key1").to_line(), "key1 0 -1\n");
    }

    #[test]
    fn parse_splits_from_the_right() {
        let entry = ManifestEntry::parse_line("two words 5 100").unwrap();
        assert_eq!(entry, ManifestEntry::live("two words", 5, 100));

        let gone = ManifestEntry::parse_line("two words 0 -1").unwrap();
        assert!(gone.is_tombstone());
        assert_eq!(gone.key, "two words");
    }

    #[test]
    fn malformed_lines_fail() {
        for line in ["", "key", "key 5", " 5 0", "key x 0", "key 5 y", "key 5 -2"] {
            assert!(ManifestEntry::parse_line(line).unwrap_err().is_strategy(), "{line:?}");
        }
    }
}
