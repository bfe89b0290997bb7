//! Writer for small synthetic HDF4 files.
//!
//! Produces just enough structure for [`super::Hdf4File`] to select datasets
//! by name: one descriptor block, then every element's bytes in insertion
//! order. Used by this crate's tests and, behind the `test-util` feature, by
//! the CLI's end-to-end tests.

use std::{fs, io, path::Path};

use super::tags::{
    self, COMP_CODE_DEFLATE, DFNT_INT32, DFNT_UINT16, DFTAG_CHUNK, DFTAG_COMPRESSED,
    DFTAG_LINKED, DFTAG_NDG, DFTAG_NT, DFTAG_SD, DFTAG_SDD, DFTAG_VG, DFTAG_VH, DFTAG_VS,
    SPECIAL_CHUNKED, SPECIAL_COMP, SPECIAL_EXT, SPECIAL_LINKED,
};
use crate::{store::BlockLocation, validate::HDF4_SIGNATURE};

/// `float32` number type, used for every dataset the builder writes.
const DFNT_FLOAT32: u8 = 5;
const ELEMENT_SIZE: u64 = 4;

/// How a dataset's data element is stored.
#[derive(Clone, Debug)]
pub enum SdsData {
    /// No data element.
    Absent,
    /// One plain element.
    Contiguous(Vec<u8>),
    /// Linked blocks of `block_length` bytes, `blocks_per_table` per link
    /// table.
    Linked {
        /// Element bytes.
        data: Vec<u8>,
        /// Bytes per block.
        block_length: usize,
        /// Block references per link table.
        blocks_per_table: usize,
    },
    /// One compressed element.
    Compressed {
        /// Coder type.
        coder: u16,
        /// Uncompressed length.
        length: u64,
        /// Compressed bytes.
        payload: Vec<u8>,
    },
    /// A chunked element; each chunk is compressed when `coder` is set.
    Chunked {
        /// Chunk length along each dimension.
        chunk_dims: Vec<u64>,
        /// Coder type for every chunk.
        coder: Option<u16>,
        /// Chunk coordinate and stored bytes, in table order.
        chunks: Vec<(Vec<u64>, Vec<u8>)>,
    },
    /// Data in an external file.
    External,
}

/// Where the builder put a dataset's bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SdsLayout {
    /// `(tag, ref)` of every element holding stored data bytes: the plain
    /// element, each linked block, the compressed payload, or each chunk's
    /// payload, in the order given to the builder.
    pub data: Vec<(u16, u16)>,
}

#[derive(Clone, Debug)]
struct Element {
    tag: u16,
    reference: u16,
    data: Vec<u8>,
}

/// Accumulates elements and writes them as an HDF4 file.
#[derive(Clone, Debug)]
pub struct H4Builder {
    elements: Vec<Element>,
    next_ref: u16,
}

impl Default for H4Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn be16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn be32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn be_size(out: &mut Vec<u8>, v: u64) {
    let v = i32::try_from(v).unwrap_or(i32::MAX);
    out.extend_from_slice(&v.to_be_bytes());
}

fn string16(out: &mut Vec<u8>, s: &str) {
    be16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

impl H4Builder {
    /// An empty file.
    pub fn new() -> Self {
        H4Builder {
            elements: Vec::new(),
            next_ref: 1,
        }
    }

    /// Allocate a fresh reference number.
    pub fn next_ref(&mut self) -> u16 {
        let r = self.next_ref;
        self.next_ref += 1;
        r
    }

    /// Add a raw element.
    pub fn element(&mut self, tag: u16, reference: u16, data: impl Into<Vec<u8>>) -> &mut Self {
        self.elements.push(Element {
            tag,
            reference,
            data: data.into(),
        });
        self
    }

    /// Add a vgroup; returns its reference.
    pub fn vgroup(&mut self, name: &str, class: &str, members: &[(u16, u16)]) -> u16 {
        let mut out = Vec::new();
        be16(&mut out, members.len() as u16);
        members.iter().for_each(|&(t, _)| be16(&mut out, t));
        members.iter().for_each(|&(_, r)| be16(&mut out, r));
        string16(&mut out, name);
        string16(&mut out, class);
        be16(&mut out, 0); // extag
        be16(&mut out, 0); // exref
        be16(&mut out, 3); // version
        let r = self.next_ref();
        self.element(DFTAG_VG, r, out);
        r
    }

    /// Add a scientific dataset the way the SD interface lays it out: number
    /// type, dimension record, data element, numeric data group and a
    /// `Var` vgroup named after the dataset.
    pub fn sds(&mut self, name: &str, dims: &[u64], nt_class: u8, data: SdsData) -> SdsLayout {
        let r = self.next_ref();
        self.element(DFTAG_NT, r, vec![1, DFNT_FLOAT32, ELEMENT_SIZE as u8, nt_class]);

        let mut sdd = Vec::new();
        be16(&mut sdd, dims.len() as u16);
        dims.iter().for_each(|&d| be_size(&mut sdd, d));
        be16(&mut sdd, DFTAG_NT);
        be16(&mut sdd, r);
        for _ in dims {
            be16(&mut sdd, DFTAG_NT);
            be16(&mut sdd, r);
        }
        self.element(DFTAG_SDD, r, sdd);

        let logical_length = dims.iter().product::<u64>() * ELEMENT_SIZE;
        let layout = self.data_element(r, dims, logical_length, data);

        let mut ndg = Vec::new();
        for (tag, reference) in [(DFTAG_NT, r), (DFTAG_SDD, r), (DFTAG_SD, r)] {
            be16(&mut ndg, tag);
            be16(&mut ndg, reference);
        }
        self.element(DFTAG_NDG, r, ndg);
        self.vgroup(name, "Var", &[(DFTAG_NDG, r)]);
        layout
    }

    fn data_element(&mut self, r: u16, dims: &[u64], logical_length: u64, data: SdsData) -> SdsLayout {
        let mut layout = SdsLayout::default();
        match data {
            SdsData::Absent => {}
            SdsData::Contiguous(bytes) => {
                self.element(DFTAG_SD, r, bytes);
                layout.data.push((DFTAG_SD, r));
            }
            SdsData::Linked {
                data,
                block_length,
                blocks_per_table,
            } => {
                let block_refs: Vec<u16> = data
                    .chunks(block_length.max(1))
                    .map(|block| {
                        let br = self.next_ref();
                        self.element(DFTAG_LINKED, br, block.to_vec());
                        layout.data.push((DFTAG_LINKED, br));
                        br
                    })
                    .collect();

                let tables: Vec<&[u16]> = block_refs.chunks(blocks_per_table.max(1)).collect();
                let table_refs: Vec<u16> = tables.iter().map(|_| self.next_ref()).collect();
                for (i, refs) in tables.iter().enumerate() {
                    let mut table = Vec::new();
                    be16(&mut table, table_refs.get(i + 1).copied().unwrap_or(0));
                    for slot in 0..blocks_per_table {
                        be16(&mut table, refs.get(slot).copied().unwrap_or(0));
                    }
                    self.element(DFTAG_LINKED, table_refs[i], table);
                }

                let mut header = Vec::new();
                be16(&mut header, SPECIAL_LINKED);
                be_size(&mut header, data.len() as u64);
                be_size(&mut header, block_length as u64);
                be_size(&mut header, blocks_per_table as u64);
                be16(&mut header, table_refs.first().copied().unwrap_or(0));
                self.element(tags::special(DFTAG_SD), r, header);
            }
            SdsData::Compressed {
                coder,
                length,
                payload,
            } => {
                let key = self.compressed(tags::special(DFTAG_SD), r, coder, length, payload);
                layout.data.push(key);
            }
            SdsData::Chunked {
                chunk_dims,
                coder,
                chunks,
            } => {
                let chunk_bytes = chunk_dims.iter().product::<u64>() * ELEMENT_SIZE;
                let table_ref = self.next_ref();

                let mut records = Vec::new();
                for (origin, bytes) in &chunks {
                    let cr = self.next_ref();
                    let key = match coder {
                        Some(c) => self.compressed(
                            tags::special(DFTAG_CHUNK),
                            cr,
                            c,
                            chunk_bytes,
                            bytes.clone(),
                        ),
                        None => {
                            self.element(DFTAG_CHUNK, cr, bytes.clone());
                            (DFTAG_CHUNK, cr)
                        }
                    };
                    layout.data.push(key);

                    origin.iter().for_each(|&o| be_size(&mut records, o));
                    be16(&mut records, DFTAG_CHUNK);
                    be16(&mut records, cr);
                }

                let rank = chunk_dims.len() as u16;
                let mut vh = Vec::new();
                be16(&mut vh, 0); // interlace
                be_size(&mut vh, chunks.len() as u64);
                be16(&mut vh, 4 * rank + 4);
                be16(&mut vh, 3);
                [DFNT_INT32, DFNT_UINT16, DFNT_UINT16]
                    .iter()
                    .for_each(|&t| be16(&mut vh, t));
                [4 * rank, 2, 2].iter().for_each(|&s| be16(&mut vh, s));
                [0, 4 * rank, 4 * rank + 2]
                    .iter()
                    .for_each(|&o| be16(&mut vh, o));
                [rank, 1, 1].iter().for_each(|&o| be16(&mut vh, o));
                for field in ["origin", "chk_tag", "chk_ref"] {
                    string16(&mut vh, field);
                }
                string16(&mut vh, "_HDF_CHK_TBL_0");
                string16(&mut vh, "_HDF_CHK_TBL_");
                self.element(DFTAG_VH, table_ref, vh);
                self.element(DFTAG_VS, table_ref, records);

                let mut header = Vec::new();
                be16(&mut header, SPECIAL_CHUNKED);
                be32(&mut header, 0); // header length, not checked by the reader
                header.push(1); // version
                be32(&mut header, if coder.is_some() { SPECIAL_COMP.into() } else { 0 });
                be_size(&mut header, logical_length);
                be_size(&mut header, chunk_bytes);
                be_size(&mut header, ELEMENT_SIZE);
                be16(&mut header, DFTAG_VH);
                be16(&mut header, table_ref);
                be16(&mut header, DFTAG_CHUNK);
                be16(&mut header, 0);
                be_size(&mut header, chunk_dims.len() as u64);
                for (i, &chunk) in chunk_dims.iter().enumerate() {
                    be32(&mut header, 0);
                    be_size(&mut header, dims.get(i).copied().unwrap_or(0));
                    be_size(&mut header, chunk);
                }
                be_size(&mut header, ELEMENT_SIZE);
                header.extend_from_slice(&[0; ELEMENT_SIZE as usize]);
                if let Some(c) = coder {
                    be32(&mut header, 4);
                    be16(&mut header, 0); // model
                    be16(&mut header, c);
                }
                self.element(tags::special(DFTAG_SD), r, header);
            }
            SdsData::External => {
                let mut header = Vec::new();
                be16(&mut header, SPECIAL_EXT);
                be_size(&mut header, logical_length);
                be_size(&mut header, 0);
                string16(&mut header, "elsewhere.dat");
                self.element(tags::special(DFTAG_SD), r, header);
            }
        }
        layout
    }

    /// Add a compressed special element and its payload; returns the
    /// payload's `(tag, ref)`.
    fn compressed(
        &mut self,
        tag: u16,
        reference: u16,
        coder: u16,
        length: u64,
        payload: Vec<u8>,
    ) -> (u16, u16) {
        let comp_ref = self.next_ref();
        self.element(DFTAG_COMPRESSED, comp_ref, payload);

        let mut header = Vec::new();
        be16(&mut header, SPECIAL_COMP);
        be16(&mut header, 0); // version
        be_size(&mut header, length);
        be16(&mut header, comp_ref);
        be16(&mut header, 0); // model
        be16(&mut header, coder);
        if coder == COMP_CODE_DEFLATE {
            be16(&mut header, 6); // deflate level
        }
        self.element(tag, reference, header);
        (DFTAG_COMPRESSED, comp_ref)
    }

    fn data_start(&self) -> u64 {
        (HDF4_SIGNATURE.len() + 6 + 12 * self.elements.len()) as u64
    }

    /// Where the element `(tag, ref)` lands in the written file.
    ///
    /// Only valid once every element has been added.
    pub fn block(&self, (tag, reference): (u16, u16)) -> Option<BlockLocation> {
        let mut offset = self.data_start();
        for e in &self.elements {
            if e.tag == tag && e.reference == reference {
                return Some(BlockLocation::new(offset, e.data.len() as u64));
            }
            offset += e.data.len() as u64;
        }
        None
    }

    /// The complete file image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = HDF4_SIGNATURE.to_vec();
        be16(&mut out, self.elements.len() as u16);
        be32(&mut out, 0);

        let mut offset = self.data_start();
        for e in &self.elements {
            be16(&mut out, e.tag);
            be16(&mut out, e.reference);
            be32(&mut out, offset as u32);
            be32(&mut out, e.data.len() as u32);
            offset += e.data.len() as u64;
        }
        for e in &self.elements {
            out.extend_from_slice(&e.data);
        }
        out
    }

    /// Write the file image to `path`.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_bytes())
    }
}
