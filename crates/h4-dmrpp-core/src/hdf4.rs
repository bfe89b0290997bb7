//! Read-only HDF4 backing store.
//!
//! Only the structures needed to locate scientific-dataset bytes are decoded:
//!
//! - the data descriptor chain (`dd`);
//! - `Var`-class vgroups, numeric data groups, dimension records and number
//!   types (`records`);
//! - special-element headers for linked, compressed and chunked storage
//!   (`special`), plus the chunk table vdata of chunked elements.
//!
//! Datasets are selected by name through the vgroup the SD interface writes
//! for every variable. External elements and unknown special kinds have no
//! byte range inside the file; asking for their blocks is an error.
//!
//! The file is opened once and read through `&File`, so every query takes
//! `&self`. The handle is closed when the [`Hdf4File`] is dropped.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::prelude::*;

use crate::{
    store::{
        BackingStore, BlockLocation, ChunkingFlag, CorruptSnafu, DatasetDescription,
        DatasetNotFoundSnafu, OpenSnafu, ReadSnafu, StoreResult, UnsupportedElementSnafu,
    },
    validate::HDF4_SIGNATURE,
};

mod dd;
mod records;
mod special;
pub mod tags;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

use dd::{Descriptor, DescriptorTable};
use records::{NumberType, RecordReader, Sdd, VDataHeader, VGroup, parse_tag_refs};
use special::{ChunkedHeader, LinkedHeader, SpecialHeader};
use tags::{
    COMP_CODE_NBIT, COMP_CODE_NONE, DFNT_INT32, DFTAG_COMPRESSED, DFTAG_LINKED, DFTAG_NDG,
    DFTAG_SD, DFTAG_SDD, DFTAG_SDG, DFTAG_VG, DFTAG_VH, DFTAG_VS,
};

/// Vgroup class the SD interface gives every variable.
const VARIABLE_CLASS: &str = "Var";

/// Special elements may wrap each other (a compressed chunk stored as linked
/// blocks); deeper nesting means a corrupt file.
const MAX_NESTING: usize = 4;

/// Read `len` bytes at `offset`.
pub(crate) fn read_at(file: &File, offset: u64, len: usize, what: &str) -> StoreResult<Bytes> {
    let mut buf = vec![0; len];
    let mut reader = file;
    reader
        .seek(SeekFrom::Start(offset))
        .context(ReadSnafu { what, offset })?;
    reader
        .read_exact(&mut buf)
        .context(ReadSnafu { what, offset })?;
    Ok(Bytes::from(buf))
}

/// An open HDF4 file.
#[derive(Debug)]
pub struct Hdf4File {
    path: PathBuf,
    file: File,
    dds: DescriptorTable,
}

/// A dataset selected from an [`Hdf4File`].
#[derive(Debug, Clone)]
pub struct Hdf4Dataset {
    name: String,
    rank: u16,
    dims: Vec<u64>,
    byte_order: &'static str,
    storage: Storage,
}

impl Hdf4Dataset {
    /// The dataset's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
enum Storage {
    /// No data element was ever written.
    Missing,
    /// One element, plain or special but not chunked.
    Element {
        descriptor: Descriptor,
        header: Option<SpecialHeader>,
    },
    /// A chunked element and its chunk table, keyed by chunk coordinate.
    Chunked {
        header: ChunkedHeader,
        chunks: HashMap<Vec<u64>, (u16, u16)>,
    },
}

impl Hdf4File {
    /// Open `path` and read its descriptor table.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(OpenSnafu {
            path: path.display().to_string(),
        })?;

        let signature = read_at(&file, 0, HDF4_SIGNATURE.len(), "signature")?;
        ensure!(
            signature[..] == HDF4_SIGNATURE,
            CorruptSnafu {
                message: format!("{} does not start with the HDF4 signature", path.display()),
            }
        );

        let dds = DescriptorTable::read(&file)?;
        log::debug!("Opened {} ({} data descriptors)", path.display(), dds.len());

        Ok(Hdf4File {
            path: path.to_path_buf(),
            file,
            dds,
        })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_element(&self, descriptor: &Descriptor, what: &str) -> StoreResult<Bytes> {
        let len = usize::try_from(descriptor.length).map_err(|_| {
            CorruptSnafu {
                message: format!("{what} of {} bytes does not fit in memory", descriptor.length),
            }
            .build()
        })?;
        read_at(&self.file, descriptor.offset, len, what)
    }

    fn require(&self, tag: u16, reference: u16, what: &str) -> StoreResult<&Descriptor> {
        self.dds.element(tag, reference).context(CorruptSnafu {
            message: format!("missing {what} (tag {tag}, ref {reference})"),
        })
    }

    fn variable_group(&self, name: &str) -> StoreResult<VGroup> {
        for descriptor in self.dds.with_tag(DFTAG_VG) {
            let group = VGroup::parse(self.read_element(descriptor, "vgroup")?)?;
            if group.class == VARIABLE_CLASS && group.name == name {
                return Ok(group);
            }
        }
        DatasetNotFoundSnafu { name }.fail()
    }

    fn special_header(&self, descriptor: &Descriptor) -> StoreResult<SpecialHeader> {
        SpecialHeader::parse(self.read_element(descriptor, "special element header")?)
    }

    fn storage(&self, descriptor: &Descriptor) -> StoreResult<Storage> {
        if !descriptor.is_special() {
            return Ok(Storage::Element {
                descriptor: *descriptor,
                header: None,
            });
        }
        match self.special_header(descriptor)? {
            SpecialHeader::Chunked(header) => {
                let chunks = self.chunk_table(&header)?;
                Ok(Storage::Chunked { header, chunks })
            }
            other => Ok(Storage::Element {
                descriptor: *descriptor,
                header: Some(other),
            }),
        }
    }

    /// Map chunk coordinate to chunk element, from the chunk table vdata.
    fn chunk_table(&self, header: &ChunkedHeader) -> StoreResult<HashMap<Vec<u64>, (u16, u16)>> {
        let (table_tag, table_ref) = header.table;
        ensure!(
            table_tag == DFTAG_VH,
            CorruptSnafu {
                message: format!("chunk table has tag {table_tag}, expected a vdata header"),
            }
        );

        let vh = VDataHeader::parse(
            self.read_element(self.require(DFTAG_VH, table_ref, "chunk table")?, "chunk table")?,
        )?;
        let mut chunks = HashMap::new();
        if vh.records == 0 {
            return Ok(chunks);
        }

        let rank = header.chunk_dims.len();
        let origin = vh.field("origin")?;
        let chunk_tag = vh.field("chk_tag")?;
        let chunk_ref = vh.field("chk_ref")?;
        ensure!(
            origin.number_type == DFNT_INT32 && origin.order == rank,
            CorruptSnafu {
                message: format!(
                    "chunk table origin field is type {} x {}, expected int32 x {rank}",
                    origin.number_type, origin.order
                ),
            }
        );
        let fits = |offset: usize, width: usize| offset.saturating_add(width) <= vh.record_size;
        ensure!(
            fits(origin.offset, 4 * rank) && fits(chunk_tag.offset, 2) && fits(chunk_ref.offset, 2),
            CorruptSnafu {
                message: format!("chunk table fields overrun the {}-byte record", vh.record_size),
            }
        );

        let records = self.read_contents(
            self.require(DFTAG_VS, table_ref, "chunk table records")?,
            "chunk table records",
        )?;
        let needed = vh.records.checked_mul(vh.record_size);
        ensure!(
            needed.is_some_and(|n| n <= records.len()),
            CorruptSnafu {
                message: format!(
                    "chunk table holds {} bytes, too few for {} records",
                    records.len(),
                    vh.records
                ),
            }
        );

        for i in 0..vh.records {
            let record = records.slice(i * vh.record_size..(i + 1) * vh.record_size);
            let field = |offset: usize| {
                RecordReader::new(record.slice(offset..), "chunk table record")
            };

            let mut r = field(origin.offset);
            let coordinate = (0..rank)
                .map(|_| r.size("chunk origin"))
                .collect::<StoreResult<Vec<_>>>()?;
            let element = (field(chunk_tag.offset).u16()?, field(chunk_ref.offset).u16()?);

            log::trace!("Chunk {coordinate:?} is element {element:?}");
            chunks.entry(coordinate).or_insert(element);
        }
        Ok(chunks)
    }

    /// Full contents of a plain or linked-block element.
    fn read_contents(&self, descriptor: &Descriptor, what: &str) -> StoreResult<Bytes> {
        if !descriptor.is_special() {
            return self.read_element(descriptor, what);
        }
        match self.special_header(descriptor)? {
            SpecialHeader::Linked(header) => {
                let mut out = Vec::new();
                for block in self.linked_blocks(&header)? {
                    let len = usize::try_from(block.length).unwrap_or(usize::MAX);
                    out.extend_from_slice(&read_at(&self.file, block.offset, len, what)?);
                }
                Ok(Bytes::from(out))
            }
            other => UnsupportedElementSnafu {
                tag: descriptor.tag,
                reference: descriptor.reference,
                what: format!("{what} stored as special element code {}", other.code()),
            }
            .fail(),
        }
    }

    fn element_blocks(&self, descriptor: &Descriptor, depth: usize) -> StoreResult<Vec<BlockLocation>> {
        if !descriptor.is_special() {
            return Ok(descriptor.block().into_iter().collect());
        }
        let header = self.special_header(descriptor)?;
        self.special_blocks(descriptor, &header, depth)
    }

    fn special_blocks(
        &self,
        descriptor: &Descriptor,
        header: &SpecialHeader,
        depth: usize,
    ) -> StoreResult<Vec<BlockLocation>> {
        ensure!(
            depth < MAX_NESTING,
            CorruptSnafu {
                message: format!(
                    "special elements nested too deeply at tag {} ref {}",
                    descriptor.tag, descriptor.reference
                ),
            }
        );

        match header {
            SpecialHeader::Linked(linked) => self.linked_blocks(linked),
            SpecialHeader::Compressed(compressed) => {
                let payload =
                    self.require(DFTAG_COMPRESSED, compressed.comp_ref, "compressed payload")?;
                self.element_blocks(payload, depth + 1)
            }
            SpecialHeader::Chunked(_) => CorruptSnafu {
                message: format!(
                    "chunked element nested inside tag {} ref {}",
                    descriptor.tag, descriptor.reference
                ),
            }
            .fail(),
            SpecialHeader::External => UnsupportedElementSnafu {
                tag: descriptor.tag,
                reference: descriptor.reference,
                what: "data stored in an external file",
            }
            .fail(),
            SpecialHeader::Other(code) => UnsupportedElementSnafu {
                tag: descriptor.tag,
                reference: descriptor.reference,
                what: format!("special element code {code}"),
            }
            .fail(),
        }
    }

    /// Blocks of a linked-block element, in link order, trimmed to the
    /// element's logical length.
    fn linked_blocks(&self, header: &LinkedHeader) -> StoreResult<Vec<BlockLocation>> {
        let mut blocks = Vec::new();
        let mut remaining = header.length;
        let mut table_ref = header.link_ref;
        let mut visited = HashSet::new();

        while table_ref != 0 && remaining > 0 {
            ensure!(
                visited.insert(table_ref),
                CorruptSnafu {
                    message: format!("link table chain loops back to ref {table_ref}"),
                }
            );
            let table = self.require(DFTAG_LINKED, table_ref, "link table")?;
            let mut r = RecordReader::new(self.read_element(table, "link table")?, "link table");
            let next = r.u16()?;

            for _ in 0..header.blocks_per_table {
                let block_ref = r.u16()?;
                if block_ref == 0 || remaining == 0 {
                    break;
                }
                let block = self.require(DFTAG_LINKED, block_ref, "linked block")?;
                let length = block.length.min(remaining);
                remaining -= length;
                if length > 0 {
                    blocks.push(BlockLocation::new(block.offset, length));
                }
            }
            table_ref = next;
        }
        Ok(blocks)
    }
}

fn chunked_flag(header: &ChunkedHeader) -> ChunkingFlag {
    let chunk_dims = header.chunk_dims.clone();
    match header.coder {
        None | Some(COMP_CODE_NONE) => ChunkingFlag::Chunked { chunk_dims },
        Some(COMP_CODE_NBIT) => ChunkingFlag::NBit { chunk_dims },
        Some(coder) => match tags::codec_name(coder) {
            Some(codec) => ChunkingFlag::Compressed {
                chunk_dims,
                codec: codec.to_string(),
            },
            None => ChunkingFlag::Unknown(i32::from(coder)),
        },
    }
}

impl BackingStore for Hdf4File {
    type Dataset = Hdf4Dataset;

    fn select(&self, name: &str) -> StoreResult<Hdf4Dataset> {
        let group = self.variable_group(name)?;
        let (group_tag, group_ref) = group.member(&[DFTAG_NDG, DFTAG_SDG]).context(CorruptSnafu {
            message: format!("variable {name:?} has no data group"),
        })?;
        let members = parse_tag_refs(
            self.read_element(self.require(group_tag, group_ref, "data group")?, "data group")?,
        )?;
        let member = |tag: u16| {
            members
                .iter()
                .find(|(t, _)| tags::base(*t) == tag)
                .map(|&(_, r)| r)
        };

        let sdd_ref = member(DFTAG_SDD).context(CorruptSnafu {
            message: format!("variable {name:?} has no dimension record"),
        })?;
        let sdd = Sdd::parse(self.read_element(
            self.require(DFTAG_SDD, sdd_ref, "dimension record")?,
            "dimension record",
        )?)?;
        let (nt_tag, nt_ref) = sdd.nt;
        let nt = NumberType::parse(
            self.read_element(self.require(nt_tag, nt_ref, "number type")?, "number type")?,
        )?;
        log::debug!(
            "{name}: rank {}, dims {:?}, number type {} ({} bytes, class {})",
            sdd.rank,
            sdd.dims,
            nt.number_type,
            nt.width,
            nt.class
        );

        let storage = match member(DFTAG_SD).and_then(|r| self.dds.element(DFTAG_SD, r)) {
            Some(descriptor) => self.storage(descriptor)?,
            None => Storage::Missing,
        };

        Ok(Hdf4Dataset {
            name: name.to_string(),
            rank: sdd.rank,
            dims: sdd.dims,
            byte_order: nt.byte_order(),
            storage,
        })
    }

    fn describe(&self, dataset: &Hdf4Dataset) -> StoreResult<DatasetDescription> {
        let (chunking, empty) = match &dataset.storage {
            Storage::Missing => (ChunkingFlag::None, true),
            Storage::Element {
                descriptor,
                header: None,
            } => (ChunkingFlag::None, descriptor.length == 0),
            Storage::Element {
                header: Some(header),
                ..
            } => match header {
                SpecialHeader::Other(code) => (ChunkingFlag::Unknown(i32::from(*code)), false),
                _ => (ChunkingFlag::None, header.logical_length() == Some(0)),
            },
            Storage::Chunked { header, chunks } => (chunked_flag(header), chunks.is_empty()),
        };

        Ok(DatasetDescription {
            rank: i32::from(dataset.rank),
            dims: dataset.dims.clone(),
            chunking,
            byte_order: dataset.byte_order.to_string(),
            empty,
        })
    }

    fn block_locations(
        &self,
        dataset: &Hdf4Dataset,
        coordinate: Option<&[u64]>,
    ) -> StoreResult<Vec<BlockLocation>> {
        match (&dataset.storage, coordinate) {
            (Storage::Missing, _) => Ok(Vec::new()),
            (Storage::Element { descriptor, header }, None) => match header {
                None => Ok(descriptor.block().into_iter().collect()),
                Some(header) => self.special_blocks(descriptor, header, 0),
            },
            (Storage::Chunked { chunks, .. }, Some(coordinate)) => match chunks.get(coordinate) {
                None => Ok(Vec::new()),
                Some(&(tag, reference)) => {
                    let chunk = self.require(tag, reference, "chunk")?;
                    self.element_blocks(chunk, 1)
                }
            },
            (Storage::Element { .. }, Some(coordinate)) => CorruptSnafu {
                message: format!(
                    "{} is not chunked; no chunk at {coordinate:?}",
                    dataset.name
                ),
            }
            .fail(),
            (Storage::Chunked { .. }, None) => CorruptSnafu {
                message: format!("{} is chunked; a chunk coordinate is required", dataset.name),
            }
            .fail(),
        }
    }
}

impl Drop for Hdf4File {
    fn drop(&mut self) {
        log::debug!("Closing {}", self.path.display());
    }
}
