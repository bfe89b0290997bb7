//! Backing-store abstraction.
//!
//! The pipeline asks a store two things about an array:
//!
//! - [`BackingStore::describe`]: rank, dimension sizes, chunking flag,
//!   byte-order descriptor and emptiness;
//! - [`BackingStore::block_locations`]: the physical blocks stored for the
//!   whole element (contiguous arrays) or for one chunk, addressed by its
//!   grid coordinate.
//!
//! [`crate::hdf4::Hdf4File`] answers these from an HDF4 file;
//! [`memory::MemoryStore`] answers them from values supplied by the caller.
//!
//! Any error returned from a store is fatal to the build: the walker only
//! turns layout *classification* problems into per-variable skips.

use std::io;

use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

pub mod memory;

/// General result type for store queries.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by backing stores.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The data file could not be opened.
    #[snafu(display("Cannot open data file {path}: {source}"))]
    Open {
        /// Path of the data file.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },

    /// Reading from the data file failed.
    #[snafu(display("I/O error reading {what} at offset {offset}: {source}"))]
    Read {
        /// What was being read.
        what: String,
        /// File offset of the read.
        offset: u64,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },

    /// The file structure is inconsistent.
    #[snafu(display("Corrupt data file: {message}"))]
    Corrupt {
        /// What was wrong.
        message: String,
    },

    /// No dataset with this name exists in the store.
    #[snafu(display("Dataset not found: {name}"))]
    DatasetNotFound {
        /// Requested dataset name.
        name: String,
    },

    /// The dataset's data is stored in a way that has no byte range in this
    /// file (for example an external element).
    #[snafu(display("Unsupported storage for tag {tag} ref {reference}: {what}"))]
    UnsupportedElement {
        /// Element tag.
        tag: u16,
        /// Element reference number.
        reference: u16,
        /// Description of the unsupported storage.
        what: String,
    },
}

/// Chunking flag as reported by the store, before any policy is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkingFlag {
    /// Not chunked.
    None,
    /// Chunked, uncompressed.
    Chunked {
        /// Chunk size along each dimension.
        chunk_dims: Vec<u64>,
    },
    /// Chunked and compressed with a byte-oriented codec.
    Compressed {
        /// Chunk size along each dimension.
        chunk_dims: Vec<u64>,
        /// Compression family name.
        codec: String,
    },
    /// Chunked with the bit-packed (N-bit) codec.
    NBit {
        /// Chunk size along each dimension.
        chunk_dims: Vec<u64>,
    },
    /// Any other raw flag value.
    Unknown(i32),
}

/// What the store knows about one dataset's storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetDescription {
    /// Rank as reported by the store. May be zero (or negative, for broken
    /// metadata).
    pub rank: i32,
    /// Dimension sizes, slowest-varying first.
    pub dims: Vec<u64>,
    /// Chunking flag.
    pub chunking: ChunkingFlag,
    /// Number-type byte-order descriptor, for example `bigEndian`.
    pub byte_order: String,
    /// True when no data has been written for the dataset.
    pub empty: bool,
}

impl DatasetDescription {
    fn with_chunking(
        dims: impl IntoIterator<Item = u64>,
        chunking: ChunkingFlag,
        byte_order: &str,
    ) -> Self {
        let dims: Vec<u64> = dims.into_iter().collect();
        DatasetDescription {
            rank: i32::try_from(dims.len()).unwrap_or(i32::MAX),
            dims,
            chunking,
            byte_order: byte_order.to_string(),
            empty: false,
        }
    }

    /// An unchunked dataset.
    pub fn contiguous(dims: impl IntoIterator<Item = u64>, byte_order: &str) -> Self {
        Self::with_chunking(dims, ChunkingFlag::None, byte_order)
    }

    /// An uncompressed chunked dataset.
    pub fn chunked(
        dims: impl IntoIterator<Item = u64>,
        chunk_dims: impl IntoIterator<Item = u64>,
        byte_order: &str,
    ) -> Self {
        let chunk_dims = chunk_dims.into_iter().collect();
        Self::with_chunking(dims, ChunkingFlag::Chunked { chunk_dims }, byte_order)
    }

    /// A compressed chunked dataset.
    pub fn compressed(
        dims: impl IntoIterator<Item = u64>,
        chunk_dims: impl IntoIterator<Item = u64>,
        codec: &str,
        byte_order: &str,
    ) -> Self {
        let chunking = ChunkingFlag::Compressed {
            chunk_dims: chunk_dims.into_iter().collect(),
            codec: codec.to_string(),
        };
        Self::with_chunking(dims, chunking, byte_order)
    }

    /// Override the chunking flag.
    pub fn with_flag(mut self, chunking: ChunkingFlag) -> Self {
        self.chunking = chunking;
        self
    }

    /// Override the reported rank.
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }

    /// Mark the dataset as having no data written.
    pub fn into_empty(mut self) -> Self {
        self.empty = true;
        self
    }
}

/// One physical block in the data file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BlockLocation {
    /// Absolute byte offset.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

impl BlockLocation {
    /// A block at `offset` spanning `length` bytes.
    pub fn new(offset: u64, length: u64) -> Self {
        BlockLocation { offset, length }
    }
}

/// Read-only access to dataset layout and block locations.
///
/// A store is owned by one build and shared by reference for the whole walk;
/// queries take `&self`. Dropping the store releases whatever it holds.
pub trait BackingStore {
    /// Handle for a selected dataset.
    type Dataset;

    /// Look up a dataset by name.
    fn select(&self, name: &str) -> StoreResult<Self::Dataset>;

    /// Describe the dataset's storage.
    fn describe(&self, dataset: &Self::Dataset) -> StoreResult<DatasetDescription>;

    /// Physical blocks of the whole element (`None`) or of the chunk at a
    /// grid coordinate (`Some`, in chunk units).
    ///
    /// A chunk that was never written yields an empty vector. Blocks come
    /// back in store order.
    fn block_locations(
        &self,
        dataset: &Self::Dataset,
        coordinate: Option<&[u64]>,
    ) -> StoreResult<Vec<BlockLocation>>;
}

impl<S: BackingStore + ?Sized> BackingStore for &S {
    type Dataset = S::Dataset;

    fn select(&self, name: &str) -> StoreResult<Self::Dataset> {
        (**self).select(name)
    }

    fn describe(&self, dataset: &Self::Dataset) -> StoreResult<DatasetDescription> {
        (**self).describe(dataset)
    }

    fn block_locations(
        &self,
        dataset: &Self::Dataset,
        coordinate: Option<&[u64]>,
    ) -> StoreResult<Vec<BlockLocation>> {
        (**self).block_locations(dataset, coordinate)
    }
}
