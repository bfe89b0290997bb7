//! The data descriptor (DD) table: where every `(tag, ref)` element lives.
//!
//! DDs are stored in blocks chained from offset 4. Each block starts with a
//! `u16` entry count and the `u32` offset of the next block (0 ends the chain),
//! followed by 12-byte entries.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
};

use snafu::prelude::*;

use super::{
    read_at,
    records::RecordReader,
    tags::{self, DFTAG_NULL},
};
use crate::{
    store::{BlockLocation, CorruptSnafu, StoreResult},
    validate::HDF4_SIGNATURE,
};

const BLOCK_HEADER_LEN: usize = 6;
const DD_LEN: usize = 12;

/// One data descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Descriptor {
    pub tag: u16,
    pub reference: u16,
    pub offset: u64,
    pub length: u64,
}

impl Descriptor {
    pub(crate) fn is_special(&self) -> bool {
        tags::is_special(self.tag)
    }

    /// The element's bytes as one block; `None` when nothing is stored.
    pub(crate) fn block(&self) -> Option<BlockLocation> {
        (self.length > 0).then(|| BlockLocation::new(self.offset, self.length))
    }
}

/// All descriptors of a file, indexed by `(tag, ref)`.
#[derive(Debug, Default)]
pub(crate) struct DescriptorTable {
    entries: Vec<Descriptor>,
    index: HashMap<(u16, u16), usize>,
}

impl DescriptorTable {
    /// Read the whole DD chain.
    pub(crate) fn read(file: &File) -> StoreResult<Self> {
        let mut table = DescriptorTable::default();
        let mut visited = HashSet::new();
        let mut next = HDF4_SIGNATURE.len() as u64;

        while next != 0 {
            ensure!(
                visited.insert(next),
                CorruptSnafu {
                    message: format!("descriptor block chain loops back to offset {next}"),
                }
            );

            let mut header = RecordReader::new(
                read_at(file, next, BLOCK_HEADER_LEN, "descriptor block header")?,
                "descriptor block header",
            );
            let count = usize::from(header.u16()?);
            let following = u64::from(header.u32()?);

            let mut r = RecordReader::new(
                read_at(
                    file,
                    next + BLOCK_HEADER_LEN as u64,
                    count * DD_LEN,
                    "descriptor block",
                )?,
                "descriptor block",
            );
            for _ in 0..count {
                let tag = r.u16()?;
                let reference = r.u16()?;
                let offset = u64::from(r.u32()?);
                let length = u64::from(r.u32()?);
                if tag == DFTAG_NULL {
                    continue;
                }
                table.insert(Descriptor {
                    tag,
                    reference,
                    offset,
                    length,
                });
            }

            log::trace!("Read {count} descriptor(s) at offset {next}");
            next = following;
        }

        Ok(table)
    }

    fn insert(&mut self, descriptor: Descriptor) {
        let slot = self.entries.len();
        self.index
            .entry((descriptor.tag, descriptor.reference))
            .or_insert(slot);
        self.entries.push(descriptor);
    }

    /// Exact `(tag, ref)` lookup.
    pub(crate) fn get(&self, tag: u16, reference: u16) -> Option<&Descriptor> {
        self.index
            .get(&(tag, reference))
            .and_then(|&i| self.entries.get(i))
    }

    /// Lookup that also finds the element when it is stored as special.
    pub(crate) fn element(&self, tag: u16, reference: u16) -> Option<&Descriptor> {
        self.get(tag, reference)
            .or_else(|| self.get(tags::special(tag), reference))
    }

    /// Every descriptor carrying `tag`, in file order.
    pub(crate) fn with_tag(&self, tag: u16) -> impl Iterator<Item = &Descriptor> + '_ {
        self.entries.iter().filter(move |d| d.tag == tag)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{hdf4::tags::DFTAG_SD, store::StoreError};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn dd(tag: u16, reference: u16, offset: u32, length: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&tag.to_be_bytes());
        v.extend_from_slice(&reference.to_be_bytes());
        v.extend_from_slice(&offset.to_be_bytes());
        v.extend_from_slice(&length.to_be_bytes());
        v
    }

    fn block(next: u32, dds: &[Vec<u8>]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&(dds.len() as u16).to_be_bytes());
        v.extend_from_slice(&next.to_be_bytes());
        dds.iter().for_each(|d| v.extend_from_slice(d));
        v
    }

    fn file_with(bytes: &[u8]) -> std::io::Result<(tempfile::TempDir, File)> {
        let tmp = tempfile::TempDir::new()?;
        let path = tmp.path().join("t.hdf");
        File::create(&path)?.write_all(bytes)?;
        let file = File::open(&path)?;
        Ok((tmp, file))
    }

    #[test]
    fn chained_blocks_are_followed_and_nulls_skipped() -> TestResult {
        let mut bytes = HDF4_SIGNATURE.to_vec();
        // first block: 2 DDs (one null), chained to a second block at offset 64
        bytes.extend(block(64, &[dd(DFTAG_NULL, 0, 0, 0), dd(DFTAG_SD, 2, 100, 8)]));
        bytes.resize(64, 0);
        bytes.extend(block(0, &[dd(tags::special(DFTAG_SD), 3, 200, 16)]));

        let (_tmp, file) = file_with(&bytes)?;
        let table = DescriptorTable::read(&file)?;

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(DFTAG_SD, 2).and_then(Descriptor::block),
            Some(BlockLocation::new(100, 8))
        );
        assert!(table.get(DFTAG_SD, 3).is_none());
        assert!(table.element(DFTAG_SD, 3).is_some_and(Descriptor::is_special));
        assert_eq!(table.with_tag(DFTAG_SD).count(), 1);
        Ok(())
    }

    #[test]
    fn looping_chain_is_corrupt() -> TestResult {
        let mut bytes = HDF4_SIGNATURE.to_vec();
        bytes.extend(block(4, &[dd(DFTAG_SD, 2, 100, 8)]));

        let (_tmp, file) = file_with(&bytes)?;
        assert!(matches!(
            DescriptorTable::read(&file),
            Err(StoreError::Corrupt { .. })
        ));
        Ok(())
    }

    #[test]
    fn truncated_block_is_a_read_error() -> TestResult {
        let mut bytes = HDF4_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0, 3, 0, 0, 0, 0]);

        let (_tmp, file) = file_with(&bytes)?;
        assert!(matches!(
            DescriptorTable::read(&file),
            Err(StoreError::Read { .. })
        ));
        Ok(())
    }
}
