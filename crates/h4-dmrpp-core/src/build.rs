//! Build driver: validate the input, open the store, walk the tree.
//!
//! The store is owned by the build and dropped before the result is returned,
//! on success and on every error path.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{BuildResult, InvalidInputSnafu, OpenStoreSnafu},
    grid::TrailingChunks,
    hdf4::Hdf4File,
    schema::Group,
    store::BackingStore,
    validate::validate,
    walk::{BuildReport, Walker},
};

/// Knobs for one build.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildOptions {
    /// How trailing partial chunks are treated by grid enumeration.
    #[serde(default)]
    pub trailing_chunks: TrailingChunks,
}

impl BuildOptions {
    /// Options with the given trailing-chunk policy.
    pub fn with_trailing_chunks(mut self, trailing_chunks: TrailingChunks) -> Self {
        self.trailing_chunks = trailing_chunks;
        self
    }
}

/// The annotated tree and what happened while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// The input tree with catalogs attached to every indexable array.
    pub schema: Group,
    /// Cataloged paths and recoverable skips.
    pub report: BuildReport,
}

/// Annotate `schema` with chunk catalogs read from the HDF4 file at `path`.
pub fn build(schema: Group, path: &Path, options: &BuildOptions) -> BuildResult<Build> {
    validate(path).context(InvalidInputSnafu)?;

    let store = Hdf4File::open(path).context(OpenStoreSnafu {
        path: path.display().to_string(),
    })?;

    log::info!("Building chunk catalogs for {}", path.display());
    build_with_store(schema, store, options)
}

/// Annotate `schema` with chunk catalogs from any backing store.
///
/// Takes the store by value and releases it before returning.
pub fn build_with_store<S: BackingStore>(
    mut schema: Group,
    store: S,
    options: &BuildOptions,
) -> BuildResult<Build> {
    let outcome = Walker::new(&store, options).walk(&mut schema);
    drop(store);

    let report = outcome?;
    log::info!(
        "Cataloged {} array(s), skipped {} variable(s)",
        report.cataloged.len(),
        report.skipped.len()
    );
    Ok(Build { schema, report })
}
