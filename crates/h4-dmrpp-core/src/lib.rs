//! Chunk catalogs for HDF4 scientific data sets.
//!
//! This crate annotates a variable schema tree with the byte ranges of every
//! stored block of every array, so that a downstream reader can fetch data
//! straight from the original HDF4 file (or an object-store copy of it)
//! without parsing HDF4 structures again.
//!
//! The pieces, leaf-first:
//!
//! - Input validation: the file must be readable and carry the HDF4
//!   signature (`validate` module).
//! - A [`store::BackingStore`] trait for the two queries the pipeline needs,
//!   with an HDF4 file implementation (`hdf4` module) and an in-memory one
//!   (`store::memory`).
//! - Layout classification of one array (`layout` module).
//! - Chunk grid enumeration in row-major order (`grid` module).
//! - Catalog assembly (`catalog` module).
//! - The schema walker that applies the per-kind support policy and isolates
//!   per-variable failures (`walk` module).
//! - The build driver (`build` module) and JSON rendering of the annotated
//!   tree (`document` module).
//!
//! ```
//! use h4_dmrpp_core::{
//!     build::{BuildOptions, build_with_store},
//!     schema::{ArrayVariable, Group, Variable},
//!     store::{BlockLocation, DatasetDescription, memory::{MemoryDataset, MemoryStore}},
//! };
//!
//! let mut root = Group::root();
//! root.variables.push(Variable::array("lat", ArrayVariable::new("Float32", [10])));
//!
//! let store = MemoryStore::new().with_dataset(
//!     "lat",
//!     MemoryDataset::new(DatasetDescription::contiguous([10], "littleEndian"))
//!         .with_blocks(None, vec![BlockLocation::new(294, 40)]),
//! );
//!
//! let built = build_with_store(root, store, &BuildOptions::default()).unwrap();
//! let lat = built.schema.find_array("/lat").unwrap();
//! assert_eq!(lat.chunks.as_ref().unwrap().catalog.len(), 1);
//! ```
#![deny(missing_docs)]

pub mod build;
pub mod catalog;
pub mod document;
pub mod error;
pub mod grid;
pub mod hdf4;
pub mod layout;
pub mod schema;
pub mod store;
pub mod validate;
pub mod walk;

pub use build::{Build, BuildOptions, build, build_with_store};
pub use error::{BuildError, BuildResult};
pub use grid::TrailingChunks;
pub use schema::Group;
