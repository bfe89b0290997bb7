//! In-memory backing store.
//!
//! Useful when the caller already knows the layout of every dataset (for
//! example from a previous run) and in tests. Block lists are keyed by the
//! coordinate passed to [`BackingStore::block_locations`]: `None` for the
//! whole element, `Some(grid_coordinate)` for a chunk.

use std::collections::{HashMap, HashSet};

use snafu::prelude::*;

use super::{
    BackingStore, BlockLocation, CorruptSnafu, DatasetDescription, DatasetNotFoundSnafu,
    StoreResult,
};

type CoordinateKey = Option<Vec<u64>>;

/// Description and blocks of one in-memory dataset.
#[derive(Clone, Debug)]
pub struct MemoryDataset {
    description: DatasetDescription,
    blocks: HashMap<CoordinateKey, Vec<BlockLocation>>,
    unreadable: HashSet<CoordinateKey>,
}

impl MemoryDataset {
    /// A dataset with no blocks yet.
    pub fn new(description: DatasetDescription) -> Self {
        MemoryDataset {
            description,
            blocks: HashMap::new(),
            unreadable: HashSet::new(),
        }
    }

    /// Set the blocks returned for `coordinate`.
    pub fn with_blocks(mut self, coordinate: Option<Vec<u64>>, blocks: Vec<BlockLocation>) -> Self {
        self.blocks.insert(coordinate, blocks);
        self
    }

    /// Make block lookups at `coordinate` fail as if the file were damaged.
    pub fn with_unreadable(mut self, coordinate: Option<Vec<u64>>) -> Self {
        self.unreadable.insert(coordinate);
        self
    }

    /// The dataset's description.
    pub fn description(&self) -> &DatasetDescription {
        &self.description
    }
}

/// A [`BackingStore`] over caller-supplied datasets, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    datasets: HashMap<String, MemoryDataset>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a dataset, builder style.
    pub fn with_dataset(mut self, name: impl Into<String>, dataset: MemoryDataset) -> Self {
        self.insert(name, dataset);
        self
    }

    /// Add (or replace) a dataset.
    pub fn insert(&mut self, name: impl Into<String>, dataset: MemoryDataset) {
        self.datasets.insert(name.into(), dataset);
    }

    fn dataset(&self, name: &str) -> StoreResult<&MemoryDataset> {
        self.datasets
            .get(name)
            .context(DatasetNotFoundSnafu { name })
    }
}

impl BackingStore for MemoryStore {
    type Dataset = String;

    fn select(&self, name: &str) -> StoreResult<String> {
        self.dataset(name).map(|_| name.to_string())
    }

    fn describe(&self, dataset: &String) -> StoreResult<DatasetDescription> {
        Ok(self.dataset(dataset)?.description.clone())
    }

    fn block_locations(
        &self,
        dataset: &String,
        coordinate: Option<&[u64]>,
    ) -> StoreResult<Vec<BlockLocation>> {
        let ds = self.dataset(dataset)?;
        let key = coordinate.map(<[u64]>::to_vec);
        if ds.unreadable.contains(&key) {
            return CorruptSnafu {
                message: format!("{dataset}: block table unreadable at {coordinate:?}"),
            }
            .fail();
        }
        Ok(ds.blocks.get(&key).cloned().unwrap_or_default())
    }
}
