//! Error types for record stores.

use recstore_storage::StorageError;
use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Result type for record store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by record stores and unions.
///
/// "Not found" is always its own variant, so callers can tell a missing
/// key or an exhausted cursor apart from a failing disk.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A key or store path already exists.
    #[error("object exists: {name}")]
    ObjectExists {
        /// The duplicate key or path.
        name: String,
    },

    /// A key or store is missing, or a sequence is exhausted.
    #[error("object does not exist: {name}")]
    ObjectDoesNotExist {
        /// The missing key, path or cursor description.
        name: String,
    },

    /// I/O failure, corrupt control data, or a mutation on a read-only store.
    #[error("strategy error: {message}")]
    Strategy {
        /// Description of the failure.
        message: String,
    },

    /// A malformed key or an argument of the wrong shape.
    #[error("parameter error: {message}")]
    Parameter {
        /// Description of the bad argument.
        message: String,
    },

    /// A buffer could not be allocated.
    #[error("memory error: {message}")]
    Memory {
        /// Description of the failed allocation.
        message: String,
    },
}

impl CoreError {
    /// Creates an object-exists error.
    pub fn object_exists(name: impl Into<String>) -> Self {
        Self::ObjectExists { name: name.into() }
    }

    /// Creates an object-does-not-exist error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ObjectDoesNotExist { name: name.into() }
    }

    /// Creates a strategy error.
    pub fn strategy(message: impl Into<String>) -> Self {
        Self::Strategy {
            message: message.into(),
        }
    }

    /// Creates a parameter error.
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter {
            message: message.into(),
        }
    }

    /// Creates a memory error.
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::ObjectDoesNotExist`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectDoesNotExist { .. })
    }

    /// Returns true for [`CoreError::ObjectExists`].
    #[must_use]
    pub fn is_exists(&self) -> bool {
        matches!(self, Self::ObjectExists { .. })
    }

    /// Returns true for [`CoreError::Strategy`].
    #[must_use]
    pub fn is_strategy(&self) -> bool {
        matches!(self, Self::Strategy { .. })
    }

    /// Returns true for [`CoreError::Parameter`].
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        matches!(self, Self::Parameter { .. })
    }

    /// Returns the message without the variant prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::ObjectExists { name } | Self::ObjectDoesNotExist { name } => name,
            Self::Strategy { message } | Self::Parameter { message } | Self::Memory { message } => {
                message
            }
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::strategy(err.to_string())
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyExists(key) => Self::object_exists(key),
            other => Self::strategy(other.to_string()),
        }
    }
}

impl From<TryReserveError> for CoreError {
    fn from(err: TryReserveError) -> Self {
        Self::memory(err.to_string())
    }
}

/// Reserves room for `len` bytes, reporting failure as a memory error.
pub(crate) fn buffer_with_capacity(len: u64) -> CoreResult<Vec<u8>> {
    let len = usize::try_from(len)
        .map_err(|_| CoreError::memory(format!("{len} bytes exceed the address space")))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    Ok(buf)
}
