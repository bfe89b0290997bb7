//! Input file checks run before any traversal.
//!
//! The data file must be named, openable for reading, and start with the
//! HDF4 signature. Every failure here is fatal for the build.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use snafu::{Backtrace, IntoError, prelude::*};

/// Magic bytes at the start of every HDF4 file (`^N^C^S^A`).
pub const HDF4_SIGNATURE: [u8; 4] = [0x0e, 0x03, 0x13, 0x01];

/// Errors from [`validate`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ValidateError {
    /// No input path was supplied.
    #[snafu(display(
        "HDF4 input file name must be provided (-f <input>) and be a fully qualified path name"
    ))]
    MissingPath,

    /// The file could not be opened or read.
    #[snafu(display(
        "Cannot read {path}: {source} (kind: {kind:?}, not found: {not_found}). \
         Check that the file exists at the expected location and that your user may read it."
    ))]
    Unreadable {
        /// The offending path.
        path: String,
        /// Kind of the underlying I/O failure.
        kind: io::ErrorKind,
        /// Whether the failure was a missing file rather than a permission or
        /// device problem.
        not_found: bool,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },

    /// The file does not start with the HDF4 signature.
    #[snafu(display("The provided file {path} is not an HDF4 file"))]
    WrongFormat {
        /// The offending path.
        path: String,
    },
}

impl ValidateError {
    /// Whether this error means the input does not exist at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ValidateError::MissingPath)
            || matches!(self, ValidateError::Unreadable { not_found: true, .. })
    }
}

fn unreadable(path: &Path, source: io::Error) -> ValidateError {
    let kind = source.kind();
    UnreadableSnafu {
        path: path.display().to_string(),
        kind,
        not_found: kind == io::ErrorKind::NotFound,
    }
    .into_error(source)
}

/// Check that `path` names a readable HDF4 file.
pub fn validate(path: &Path) -> Result<(), ValidateError> {
    ensure!(!path.as_os_str().is_empty(), MissingPathSnafu);

    let file = File::open(path).map_err(|e| unreadable(path, e))?;

    let mut head = Vec::with_capacity(HDF4_SIGNATURE.len());
    file.take(HDF4_SIGNATURE.len() as u64)
        .read_to_end(&mut head)
        .map_err(|e| unreadable(path, e))?;

    ensure!(
        head == HDF4_SIGNATURE,
        WrongFormatSnafu {
            path: path.display().to_string(),
        }
    );

    Ok(())
}
