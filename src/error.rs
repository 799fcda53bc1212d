//! Error types for cells, stores and value conversion.

use std::io;
use std::path::PathBuf;

/// Stored text could not be decoded into the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {text:?} to {type_name}: {reason}")]
pub struct ConversionError {
    pub type_name: &'static str,
    pub text: String,
    pub reason: String,
}

impl ConversionError {
    pub fn new<T>(text: &str, reason: impl ToString) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            text: text.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of the backing settings file.
///
/// A store that hits one of these keeps working in memory; the error is
/// reported once and later flushes are skipped.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("settings file {path} is unavailable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("settings file {path} is not a valid settings document: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by [`PersistentCell`](crate::PersistentCell) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("cell {cell:?} cannot follow {source_cell:?}: the binding would form a cycle")]
    CyclicBinding { cell: String, source_cell: String },

    #[error("cell {cell:?} already follows another cell")]
    AlreadyBound { cell: String },

    #[error("cell {cell:?} has no default value to reset to")]
    NoDefault { cell: String },
}

pub type Result<T, E = CellError> = std::result::Result<T, E>;
