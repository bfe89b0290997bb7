//! Chunk grid enumeration.
//!
//! For dimension sizes `D` and chunk sizes `C`, the grid has `S[i]` steps
//! along dimension `i` and `product(S)` coordinates. [`ChunkGrid::coords`]
//! yields every coordinate in row-major order (last dimension fastest).
//! Each call starts a fresh, independent iterator.
//!
//! `S[i]` depends on [`TrailingChunks`]:
//!
//! - `Cover` (default): `ceil(D[i] / C[i])`, so a trailing partial chunk is
//!   visited.
//! - `Truncate`: `D[i] / C[i]` (integer division), which never visits a
//!   trailing partial chunk. Kept for parity with catalogs produced by older
//!   tooling.
//!
//! [`enumerate`] drives the grid against a [`BackingStore`] and feeds every
//! block into a [`CatalogAssembler`]. A store failure here is fatal: it means
//! the file is damaged, not that a feature is unsupported.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    catalog::{CatalogAssembler, ChunkLayout},
    store::{BackingStore, StoreError},
};

/// How a dimension that is not a multiple of its chunk size is treated.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrailingChunks {
    /// Visit the trailing partial chunk.
    #[default]
    Cover,
    /// Drop the trailing partial chunk (integer division).
    Truncate,
}

/// Fatal errors while enumerating chunks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EnumerateError {
    /// The store could not report block locations for a coordinate.
    #[snafu(display("Unreadable block location at chunk {coordinate:?}: {source}"))]
    UnreadableBlockLocation {
        /// Grid coordinate (chunk units), or empty for the whole element.
        coordinate: Vec<u64>,
        /// Underlying store error.
        source: StoreError,
    },

    /// An element position does not fit in `u64`.
    #[snafu(display("Chunk position overflows u64 at chunk {coordinate:?}"))]
    PositionOverflow {
        /// Grid coordinate (chunk units).
        coordinate: Vec<u64>,
    },
}

/// Regular chunk grid over an array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkGrid {
    chunk_dims: Vec<u64>,
    steps: Vec<u64>,
}

impl ChunkGrid {
    /// Grid for `dims` split into chunks of `chunk_dims`.
    ///
    /// Both slices must have the same length and every chunk dimension must
    /// be positive; the layout inspector guarantees this for chunked arrays.
    pub fn new(dims: &[u64], chunk_dims: &[u64], trailing: TrailingChunks) -> Self {
        debug_assert_eq!(dims.len(), chunk_dims.len());
        let steps = dims
            .iter()
            .zip(chunk_dims)
            .map(|(&d, &c)| match (c, trailing) {
                (0, _) => 0,
                (c, TrailingChunks::Cover) => d.div_ceil(c),
                (c, TrailingChunks::Truncate) => d / c,
            })
            .collect();
        ChunkGrid {
            chunk_dims: chunk_dims.to_vec(),
            steps,
        }
    }

    /// Chunk size along each dimension.
    pub fn chunk_dims(&self) -> &[u64] {
        &self.chunk_dims
    }

    /// Steps per dimension (`S`).
    pub fn steps(&self) -> &[u64] {
        &self.steps
    }

    /// Number of coordinates (`product(S)`), saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.steps
            .iter()
            .try_fold(1u64, |acc, &s| acc.checked_mul(s))
            .unwrap_or(u64::MAX)
    }

    /// Every grid coordinate, last dimension fastest.
    pub fn coords(&self) -> GridCoords<'_> {
        GridCoords::new(&self.steps)
    }

    /// Element position of the chunk at `coordinate`: `G[i] * C[i]`.
    pub fn position(&self, coordinate: &[u64]) -> Option<Vec<u64>> {
        coordinate
            .iter()
            .zip(&self.chunk_dims)
            .map(|(&g, &c)| g.checked_mul(c))
            .collect()
    }
}

/// Lazy row-major walk over `[0, S[0]) × … × [0, S[n-1])`.
#[derive(Clone, Debug)]
pub struct GridCoords<'a> {
    steps: &'a [u64],
    next: Option<Vec<u64>>,
    remaining: u64,
}

impl<'a> GridCoords<'a> {
    fn new(steps: &'a [u64]) -> Self {
        let remaining = steps
            .iter()
            .try_fold(1u64, |acc, &s| acc.checked_mul(s))
            .unwrap_or(u64::MAX);
        let next = (remaining > 0).then(|| vec![0; steps.len()]);
        GridCoords {
            steps,
            next,
            remaining,
        }
    }
}

impl Iterator for GridCoords<'_> {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        let current = self.next.take()?;
        self.remaining = self.remaining.saturating_sub(1);

        // Odometer carry from the last dimension.
        let mut following = current.clone();
        let mut advanced = false;
        for i in (0..following.len()).rev() {
            following[i] += 1;
            if following[i] < self.steps[i] {
                advanced = true;
                break;
            }
            following[i] = 0;
        }
        if advanced {
            self.next = Some(following);
        }

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.next.is_none() {
            return (0, Some(0));
        }
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for GridCoords<'_> {}

/// Query `store` for every block of the array and append descriptors to
/// `assembler`, in grid order.
///
/// Contiguous layouts have exactly one coordinate, the origin, queried as the
/// whole element. Chunked layouts visit every coordinate of the grid built
/// from `dims` and the layout's chunk dims.
pub fn enumerate<S: BackingStore>(
    store: &S,
    dataset: &S::Dataset,
    dims: &[u64],
    trailing: TrailingChunks,
    assembler: &mut CatalogAssembler,
) -> Result<(), EnumerateError> {
    let chunk_dims = match assembler.layout() {
        ChunkLayout::Contiguous => {
            let blocks = store
                .block_locations(dataset, None)
                .context(UnreadableBlockLocationSnafu {
                    coordinate: Vec::<u64>::new(),
                })?;
            let origin = vec![0; dims.len()];
            log::debug!("contiguous element: {} block(s)", blocks.len());
            assembler.append(&origin, &blocks);
            return Ok(());
        }
        layout => layout.chunk_dims().unwrap_or_default().to_vec(),
    };

    let grid = ChunkGrid::new(dims, &chunk_dims, trailing);
    log::debug!(
        "chunk grid: dims {dims:?}, chunk dims {chunk_dims:?}, steps {:?}, {} chunk(s)",
        grid.steps(),
        grid.total()
    );

    for coordinate in grid.coords() {
        let position = grid
            .position(&coordinate)
            .context(PositionOverflowSnafu {
                coordinate: coordinate.clone(),
            })?;
        // Owned per coordinate; dropped before the next query.
        let blocks = store
            .block_locations(dataset, Some(&coordinate))
            .context(UnreadableBlockLocationSnafu {
                coordinate: coordinate.clone(),
            })?;
        log::trace!("chunk {coordinate:?} at {position:?}: {blocks:?}");
        assembler.append(&position, &blocks);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::ByteOrder,
        store::{
            BlockLocation, DatasetDescription,
            memory::{MemoryDataset, MemoryStore},
        },
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn four_by_four_in_two_by_two_chunks() {
        let grid = ChunkGrid::new(&[4, 4], &[2, 2], TrailingChunks::Cover);
        assert_eq!(grid.steps(), &[2, 2]);
        assert_eq!(grid.total(), 4);

        let coords: Vec<Vec<u64>> = grid.coords().collect();
        assert_eq!(coords, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        let positions: Vec<Vec<u64>> = coords
            .iter()
            .map(|c| grid.position(c).unwrap())
            .collect();
        assert_eq!(
            positions,
            vec![vec![0, 0], vec![0, 2], vec![2, 0], vec![2, 2]]
        );
    }

    #[test]
    fn last_dimension_varies_fastest_in_three_dims() {
        let grid = ChunkGrid::new(&[2, 3, 2], &[1, 1, 1], TrailingChunks::Cover);
        let coords: Vec<Vec<u64>> = grid.coords().collect();
        assert_eq!(coords.len(), 12);
        assert_eq!(coords[0], vec![0, 0, 0]);
        assert_eq!(coords[1], vec![0, 0, 1]);
        assert_eq!(coords[2], vec![0, 1, 0]);
        assert_eq!(coords[6], vec![1, 0, 0]);
        assert_eq!(coords[11], vec![1, 2, 1]);

        let mut sorted = coords.clone();
        sorted.sort();
        assert_eq!(sorted, coords, "row-major order is lexicographic");
    }

    #[test]
    fn coords_restart_and_report_exact_size() {
        let grid = ChunkGrid::new(&[6, 4], &[2, 2], TrailingChunks::Cover);
        let mut it = grid.coords();
        assert_eq!(it.size_hint(), (6, Some(6)));
        it.next();
        assert_eq!(it.size_hint(), (5, Some(5)));

        let first: Vec<_> = grid.coords().collect();
        let second: Vec<_> = grid.coords().collect();
        assert_eq!(first, second);
        assert_eq!(first.len() as u64, grid.total());
    }

    #[test]
    fn cover_visits_trailing_partial_chunks() {
        let grid = ChunkGrid::new(&[5, 3], &[2, 2], TrailingChunks::Cover);
        assert_eq!(grid.steps(), &[3, 2]);
        let positions: Vec<Vec<u64>> = grid
            .coords()
            .map(|c| grid.position(&c).unwrap())
            .collect();
        assert_eq!(positions.last(), Some(&vec![4, 2]));
        assert_eq!(positions.len(), 6);
    }

    #[test]
    fn truncate_drops_trailing_partial_chunks() {
        let grid = ChunkGrid::new(&[5, 3], &[2, 2], TrailingChunks::Truncate);
        assert_eq!(grid.steps(), &[2, 1]);
        let coords: Vec<Vec<u64>> = grid.coords().collect();
        assert_eq!(coords, vec![vec![0, 0], vec![1, 0]]);
    }

    #[test]
    fn zero_length_dimension_has_no_coordinates() {
        let grid = ChunkGrid::new(&[0, 4], &[2, 2], TrailingChunks::Cover);
        assert_eq!(grid.total(), 0);
        assert_eq!(grid.coords().count(), 0);
    }

    #[test]
    fn position_overflow_is_detected() {
        let grid = ChunkGrid::new(&[u64::MAX], &[u64::MAX / 2], TrailingChunks::Cover);
        assert_eq!(grid.position(&[3]), None);
    }

    #[test]
    fn enumerate_contiguous_queries_origin_once() -> TestResult {
        let store = MemoryStore::new().with_dataset(
            "lat",
            MemoryDataset::new(DatasetDescription::contiguous([10], "bigEndian")).with_blocks(
                None,
                vec![BlockLocation::new(100, 20), BlockLocation::new(400, 20)],
            ),
        );
        let ds = store.select("lat")?;
        let mut asm = CatalogAssembler::new(ChunkLayout::Contiguous, ByteOrder::Big);
        enumerate(&store, &ds, &[10], TrailingChunks::Cover, &mut asm)?;

        let ann = asm.finish();
        assert_eq!(ann.catalog.len(), 2);
        assert!(ann.catalog.iter().all(|d| d.position == vec![0]));
        Ok(())
    }

    #[test]
    fn enumerate_chunked_keeps_store_block_order() -> TestResult {
        let store = MemoryStore::new().with_dataset(
            "temp",
            MemoryDataset::new(DatasetDescription::chunked([4, 4], [2, 2], "bigEndian"))
                .with_blocks(Some(vec![0, 0]), vec![BlockLocation::new(10, 8)])
                .with_blocks(
                    Some(vec![0, 1]),
                    vec![BlockLocation::new(90, 4), BlockLocation::new(20, 4)],
                )
                .with_blocks(Some(vec![1, 1]), vec![BlockLocation::new(40, 8)]),
        );
        let ds = store.select("temp")?;
        let mut asm = CatalogAssembler::new(
            ChunkLayout::Chunked {
                chunk_dims: vec![2, 2],
            },
            ByteOrder::Big,
        );
        enumerate(&store, &ds, &[4, 4], TrailingChunks::Cover, &mut asm)?;

        let got: Vec<(u64, Vec<u64>)> = asm
            .finish()
            .catalog
            .iter()
            .map(|d| (d.offset, d.position.clone()))
            .collect();
        assert_eq!(
            got,
            vec![
                (10, vec![0, 0]),
                (90, vec![0, 2]),
                (20, vec![0, 2]),
                (40, vec![2, 2]),
            ]
        );
        Ok(())
    }

    #[test]
    fn enumerate_fails_on_unreadable_chunk() -> TestResult {
        let store = MemoryStore::new().with_dataset(
            "temp",
            MemoryDataset::new(DatasetDescription::chunked([4], [2], "bigEndian"))
                .with_unreadable(Some(vec![1])),
        );
        let ds = store.select("temp")?;
        let mut asm = CatalogAssembler::new(
            ChunkLayout::Chunked {
                chunk_dims: vec![2],
            },
            ByteOrder::Big,
        );
        let err = enumerate(&store, &ds, &[4], TrailingChunks::Cover, &mut asm).unwrap_err();
        assert!(matches!(
            err,
            EnumerateError::UnreadableBlockLocation { ref coordinate, .. } if coordinate == &vec![1]
        ));
        Ok(())
    }
}
