use h4_dmrpp_core::{BuildError, document::DocumentError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Schema document not found or not readable: {path}: {source}"))]
    ReadSchema {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "Schema document {path} is not valid: {source}. \
         Expected a JSON group with \"variables\" and \"groups\"."
    ))]
    ParseSchema {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display("{source}"))]
    Build {
        #[snafu(source(from(BuildError, Box::new)))]
        source: Box<BuildError>,
    },

    #[snafu(display("Failed to write the annotated document: {source}"))]
    Render { source: DocumentError },
}
