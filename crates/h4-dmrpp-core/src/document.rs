//! JSON rendering of an annotated schema tree.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

use crate::schema::Group;

/// Format version written into every document.
pub const DOCUMENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors from rendering or writing a document.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DocumentError {
    /// Serialization failed.
    #[snafu(display("Cannot serialize document: {source}"))]
    Serialize {
        /// Underlying serde error.
        source: serde_json::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },

    /// Writing the output file failed.
    #[snafu(display("Cannot write document to {path}: {source}"))]
    Write {
        /// Output path.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },
}

/// Provenance recorded when production metadata is requested.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildMetadata {
    /// Name of the producing tool.
    pub tool: String,
    /// Version of the producing tool.
    pub version: String,
    /// The command line that produced the document.
    pub invocation: String,
}

/// How a document is rendered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Where readers fetch the data bytes from. Usually the data file path or
    /// a URL template.
    pub href: String,
    /// Optional provenance block.
    pub build_metadata: Option<BuildMetadata>,
}

/// The top-level output document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Data file reference.
    pub href: String,
    /// Document format version.
    pub version: String,
    /// Provenance, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_metadata: Option<BuildMetadata>,
    /// The annotated tree.
    pub root: Group,
}

impl Document {
    /// Wrap an annotated tree.
    pub fn new(root: Group, options: RenderOptions) -> Self {
        Document {
            href: options.href,
            version: DOCUMENT_VERSION.to_string(),
            build_metadata: options.build_metadata,
            root,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).context(SerializeSnafu)
    }

    /// Write pretty-printed JSON to `writer`, followed by a newline.
    pub fn write_to(&self, mut writer: impl io::Write) -> Result<(), DocumentError> {
        serde_json::to_writer_pretty(&mut writer, self).context(SerializeSnafu)?;
        writer
            .write_all(b"\n")
            .context(WriteSnafu { path: "<writer>" })
    }

    /// Write pretty-printed JSON to the file at `path`, replacing it.
    pub fn write_file(&self, path: &Path) -> Result<(), DocumentError> {
        let mut json = self.to_json()?;
        json.push('\n');
        fs::write(path, json).context(WriteSnafu {
            path: path.display().to_string(),
        })
    }
}
