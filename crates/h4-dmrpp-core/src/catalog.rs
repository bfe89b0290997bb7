//! Chunk layouts, chunk descriptors, and per-array catalog assembly.
//!
//! A [`Catalog`] lists one [`ChunkDescriptor`] per physical block, in the
//! order the grid enumerator discovered them. It is not sorted by offset, and
//! several descriptors share a position when one logical chunk is stored as
//! several blocks.
//!
//! JSON layout example (as attached to an array under `"chunks"`):
//!
//! ```json
//! {
//!   "layout": "chunked_compressed",
//!   "chunk_dims": [2, 2],
//!   "codec": "deflate",
//!   "byte_order": "BE",
//!   "catalog": [
//!     { "offset": 4096, "length": 12, "byte_order": "BE", "position": [0, 0] },
//!     { "offset": 4108, "length": 11, "byte_order": "BE", "position": [0, 2] }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::store::BlockLocation;

/// Element byte order of the stored data.
///
/// Advisory only: an unrecognized encoding maps to [`ByteOrder::Unknown`]
/// instead of failing.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Big endian.
    #[serde(rename = "BE")]
    Big,
    /// Little endian.
    #[serde(rename = "LE")]
    Little,
    /// Anything else.
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ByteOrder {
    /// Resolve a number-type byte-order descriptor (`bigEndian`,
    /// `littleEndian`, ...) as reported by the backing store.
    pub fn from_descriptor(descriptor: &str) -> Self {
        if descriptor.starts_with("bigEndian") {
            ByteOrder::Big
        } else if descriptor.starts_with("littleEndian") {
            ByteOrder::Little
        } else {
            ByteOrder::Unknown
        }
    }

    /// Short label used in documents and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            ByteOrder::Big => "BE",
            ByteOrder::Little => "LE",
            ByteOrder::Unknown => "UNKNOWN",
        }
    }
}

/// Storage layout of one array.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ChunkLayout {
    /// One unchunked element; every descriptor sits at the origin.
    Contiguous,

    /// Regular chunks, stored uncompressed.
    Chunked {
        /// Chunk size along each dimension; `len == rank`, all positive.
        chunk_dims: Vec<u64>,
    },

    /// Regular chunks, each compressed with `codec`.
    ChunkedCompressed {
        /// Chunk size along each dimension; `len == rank`, all positive.
        chunk_dims: Vec<u64>,
        /// Compression family name, for example `deflate`.
        codec: String,
    },
}

impl ChunkLayout {
    /// Chunk dimension sizes, if the layout is chunked.
    pub fn chunk_dims(&self) -> Option<&[u64]> {
        match self {
            ChunkLayout::Contiguous => None,
            ChunkLayout::Chunked { chunk_dims } | ChunkLayout::ChunkedCompressed { chunk_dims, .. } => {
                Some(chunk_dims)
            }
        }
    }

    /// Codec name, if the layout is compressed.
    pub fn codec(&self) -> Option<&str> {
        match self {
            ChunkLayout::ChunkedCompressed { codec, .. } => Some(codec),
            _ => None,
        }
    }
}

/// Byte range and logical position of one physical block.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Absolute byte offset of the block in the data file.
    pub offset: u64,
    /// Block length in bytes (compressed length for compressed chunks).
    pub length: u64,
    /// Element byte order.
    pub byte_order: ByteOrder,
    /// Element index of the chunk's first element along each dimension.
    pub position: Vec<u64>,
}

/// Ordered chunk descriptors of one array, in discovery order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Catalog(Vec<ChunkDescriptor>);

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Catalog(Vec::new())
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the catalog has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate descriptors in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChunkDescriptor> {
        self.0.iter()
    }

    /// Distinct positions, sorted.
    pub fn positions(&self) -> BTreeSet<&[u64]> {
        self.0.iter().map(|d| d.position.as_slice()).collect()
    }

    fn push(&mut self, descriptor: ChunkDescriptor) {
        self.0.push(descriptor);
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ChunkDescriptor;
    type IntoIter = std::slice::Iter<'a, ChunkDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Everything the walker attaches to an indexed array.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkAnnotation {
    /// Layout, including chunk dims and codec when present.
    #[serde(flatten)]
    pub layout: ChunkLayout,
    /// Element byte order shared by every descriptor.
    pub byte_order: ByteOrder,
    /// The catalog itself.
    pub catalog: Catalog,
}

/// Accumulates descriptors for one array.
///
/// Pure accumulation: no I/O, no failure modes. Descriptors keep the order in
/// which [`CatalogAssembler::append`] was called.
#[derive(Debug)]
pub struct CatalogAssembler {
    layout: ChunkLayout,
    byte_order: ByteOrder,
    catalog: Catalog,
}

impl CatalogAssembler {
    /// Start an empty catalog for an array with this layout and byte order.
    pub fn new(layout: ChunkLayout, byte_order: ByteOrder) -> Self {
        CatalogAssembler {
            layout,
            byte_order,
            catalog: Catalog::new(),
        }
    }

    /// The layout the catalog is being built for.
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Append one descriptor per block, all sharing `position`.
    pub fn append(&mut self, position: &[u64], blocks: &[BlockLocation]) {
        for block in blocks {
            self.catalog.push(ChunkDescriptor {
                offset: block.offset,
                length: block.length,
                byte_order: self.byte_order,
                position: position.to_vec(),
            });
        }
    }

    /// Number of descriptors appended so far.
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Finish the catalog.
    pub fn finish(self) -> ChunkAnnotation {
        ChunkAnnotation {
            layout: self.layout,
            byte_order: self.byte_order,
            catalog: self.catalog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn byte_order_descriptors_resolve_by_prefix() {
        assert_eq!(ByteOrder::from_descriptor("bigEndian"), ByteOrder::Big);
        assert_eq!(ByteOrder::from_descriptor("littleEndian"), ByteOrder::Little);
        assert_eq!(ByteOrder::from_descriptor("vaxEndian"), ByteOrder::Unknown);
        assert_eq!(ByteOrder::from_descriptor(""), ByteOrder::Unknown);
    }

    #[test]
    fn assembler_keeps_append_order_and_shares_positions() {
        let layout = ChunkLayout::Chunked {
            chunk_dims: vec![2, 2],
        };
        let mut asm = CatalogAssembler::new(layout.clone(), ByteOrder::Little);
        asm.append(&[0, 2], &[BlockLocation::new(900, 16)]);
        asm.append(
            &[0, 0],
            &[BlockLocation::new(500, 8), BlockLocation::new(100, 8)],
        );
        asm.append(&[2, 0], &[]);

        let ann = asm.finish();
        assert_eq!(ann.layout, layout);
        let offsets: Vec<u64> = ann.catalog.iter().map(|d| d.offset).collect();
        assert_eq!(offsets, vec![900, 500, 100]);
        assert_eq!(ann.catalog.positions().len(), 2);
        assert!(ann.catalog.iter().all(|d| d.byte_order == ByteOrder::Little));
    }

    #[test]
    fn annotation_json_flattens_layout() -> TestResult {
        let mut asm = CatalogAssembler::new(
            ChunkLayout::ChunkedCompressed {
                chunk_dims: vec![2],
                codec: "deflate".to_string(),
            },
            ByteOrder::Big,
        );
        asm.append(&[0], &[BlockLocation::new(4096, 12)]);

        let value = serde_json::to_value(asm.finish())?;
        assert_eq!(value["layout"], "chunked_compressed");
        assert_eq!(value["codec"], "deflate");
        assert_eq!(value["chunk_dims"], serde_json::json!([2]));
        assert_eq!(value["catalog"][0]["byte_order"], "BE");
        assert_eq!(value["catalog"][0]["position"], serde_json::json!([0]));

        let back: ChunkAnnotation = serde_json::from_value(value)?;
        assert_eq!(back.layout.codec(), Some("deflate"));
        Ok(())
    }
}
