//! Chunk layout classification for one array.
//!
//! [`inspect`] applies the support policy to what the store reported:
//!
//! | reported                          | outcome                         |
//! |-----------------------------------|---------------------------------|
//! | not chunked                       | [`ChunkLayout::Contiguous`]     |
//! | chunked, rank ≤ 0                 | [`InspectError::InvalidRank`]   |
//! | chunked                           | [`ChunkLayout::Chunked`]        |
//! | chunked + compressed              | [`ChunkLayout::ChunkedCompressed`] |
//! | chunked with the N-bit codec      | [`InspectError::UnsupportedCodec`] |
//! | anything else                     | [`InspectError::UnknownChunkingFlag`] |
//! | no data written                   | [`InspectError::EmptyArray`]    |
//!
//! Every [`InspectError`] is recoverable: the walker skips the array and
//! carries on. The chunking policy is evaluated before the emptiness check.

use snafu::prelude::*;

use crate::{
    catalog::{ByteOrder, ChunkLayout},
    store::{ChunkingFlag, DatasetDescription},
};

/// Layout of one array, ready for grid enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inspection {
    /// Storage layout.
    pub layout: ChunkLayout,
    /// Element byte order.
    pub byte_order: ByteOrder,
    /// Dimension sizes as reported by the store.
    pub dims: Vec<u64>,
}

/// Reasons an array cannot be cataloged. All recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InspectError {
    /// Chunked storage needs a positive rank that matches the chunk shape.
    #[snafu(display("Invalid rank {rank} for chunked storage"))]
    InvalidRank {
        /// Rank reported by the store.
        rank: i32,
    },

    /// A chunk dimension is zero or the chunk shape disagrees with the rank.
    #[snafu(display("Invalid chunk shape {chunk_dims:?} for dimensions {dims:?}"))]
    InvalidChunkShape {
        /// Dimension sizes.
        dims: Vec<u64>,
        /// Chunk sizes.
        chunk_dims: Vec<u64>,
    },

    /// The codec packs values at bit granularity, so chunks have no
    /// byte-addressable layout.
    #[snafu(display("{codec} compressed chunks are not byte-range addressable"))]
    UnsupportedCodec {
        /// Codec name.
        codec: String,
    },

    /// The store reported a chunking flag this crate does not know.
    #[snafu(display("Unknown chunking flag {flag}"))]
    UnknownChunkingFlag {
        /// Raw flag value.
        flag: i32,
    },

    /// No data has been written; readers should treat the array as all fill
    /// values.
    #[snafu(display("Array has no data written (all fill values)"))]
    EmptyArray,
}

/// Classify a dataset's storage.
pub fn inspect(description: &DatasetDescription) -> Result<Inspection, InspectError> {
    let layout = match &description.chunking {
        ChunkingFlag::None => ChunkLayout::Contiguous,
        ChunkingFlag::Chunked { chunk_dims } => {
            check_chunk_shape(description, chunk_dims)?;
            ChunkLayout::Chunked {
                chunk_dims: chunk_dims.clone(),
            }
        }
        ChunkingFlag::Compressed { chunk_dims, codec } => {
            check_chunk_shape(description, chunk_dims)?;
            ChunkLayout::ChunkedCompressed {
                chunk_dims: chunk_dims.clone(),
                codec: codec.clone(),
            }
        }
        ChunkingFlag::NBit { .. } => {
            return UnsupportedCodecSnafu { codec: "nbit" }.fail();
        }
        ChunkingFlag::Unknown(flag) => {
            return UnknownChunkingFlagSnafu { flag: *flag }.fail();
        }
    };

    let byte_order = ByteOrder::from_descriptor(&description.byte_order);

    ensure!(!description.empty, EmptyArraySnafu);

    Ok(Inspection {
        layout,
        byte_order,
        dims: description.dims.clone(),
    })
}

fn check_chunk_shape(description: &DatasetDescription, chunk_dims: &[u64]) -> Result<(), InspectError> {
    let rank = description.rank;
    ensure!(rank > 0, InvalidRankSnafu { rank });
    ensure!(
        usize::try_from(rank).is_ok_and(|r| r == chunk_dims.len() && r == description.dims.len()),
        InvalidRankSnafu { rank }
    );
    ensure!(
        chunk_dims.iter().all(|&c| c > 0),
        InvalidChunkShapeSnafu {
            dims: description.dims.clone(),
            chunk_dims: chunk_dims.to_vec(),
        }
    );
    Ok(())
}
