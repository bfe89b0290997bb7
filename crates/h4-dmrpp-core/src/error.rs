//! Fatal build errors and SNAFU context selectors.
//!
//! Anything in [`BuildError`] aborts the whole build: no document is produced.
//! Per-variable problems that only skip one array live in
//! [`crate::walk::SkipReason`] instead and never surface here.

use snafu::prelude::*;

use crate::{
    grid::EnumerateError, schema::NodeKind, store::StoreError, validate::ValidateError,
};

/// Result alias for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that abort a build.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BuildError {
    /// The input file is missing, unreadable, or not HDF4.
    #[snafu(display("{source}"))]
    InvalidInput {
        /// Underlying validation error.
        source: ValidateError,
    },

    /// The data file passed validation but could not be opened as a store.
    #[snafu(display("Cannot open {path} as an HDF4 file: {source}"))]
    OpenStore {
        /// Path of the data file.
        path: String,
        /// Underlying store error.
        source: StoreError,
    },

    /// A variable kind that is structurally disallowed (grids).
    #[snafu(display("{kind} variables are not supported: {path}"))]
    UnsupportedVariableKind {
        /// Fully-qualified path of the variable.
        path: String,
        /// Its kind.
        kind: NodeKind,
    },

    /// The store could not select or describe a dataset.
    #[snafu(display("Cannot read storage information for {path}: {source}"))]
    DescribeDataset {
        /// Fully-qualified path of the array.
        path: String,
        /// Underlying store error.
        source: StoreError,
    },

    /// Chunk enumeration failed; the data file is unreadable.
    #[snafu(display("Cannot catalog chunks of {path}: {source}"))]
    Enumerate {
        /// Fully-qualified path of the array.
        path: String,
        /// Underlying enumeration error.
        source: EnumerateError,
    },
}

impl BuildError {
    /// Whether the build failed because a block location was unreadable.
    pub fn is_unreadable_block_location(&self) -> bool {
        matches!(
            self,
            BuildError::Enumerate {
                source: EnumerateError::UnreadableBlockLocation { .. },
                ..
            }
        )
    }

    /// Whether the build failed because the input had the wrong signature.
    pub fn is_wrong_format(&self) -> bool {
        matches!(
            self,
            BuildError::InvalidInput {
                source: ValidateError::WrongFormat { .. },
            }
        )
    }
}
