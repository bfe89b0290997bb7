//! Special-element headers.
//!
//! An element whose tag has the special bit set stores a header instead of
//! data. The header starts with a `u16` code naming the kind of special
//! element; the rest depends on the code.

use bytes::Bytes;
use snafu::prelude::*;

use super::{
    records::RecordReader,
    tags::{SPECIAL_CHUNKED, SPECIAL_COMP, SPECIAL_EXT, SPECIAL_LINKED},
};
use crate::store::{CorruptSnafu, StoreResult};

/// Data stored as a chain of blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LinkedHeader {
    /// Logical length of the element.
    pub length: u64,
    /// Number of block references per link table.
    pub blocks_per_table: usize,
    /// Reference of the first link table.
    pub link_ref: u16,
}

/// Data stored compressed in one `DFTAG_COMPRESSED` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CompressedHeader {
    /// Uncompressed length.
    pub length: u64,
    /// Reference of the compressed payload.
    pub comp_ref: u16,
    /// Coder type.
    pub coder: u16,
}

/// Data stored as a regular grid of chunk elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChunkedHeader {
    /// Tag and reference of the chunk table vdata.
    pub table: (u16, u16),
    /// Chunk length along each dimension.
    pub chunk_dims: Vec<u64>,
    /// Coder type when every chunk is compressed.
    pub coder: Option<u16>,
}

/// A decoded special-element header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SpecialHeader {
    Linked(LinkedHeader),
    Compressed(CompressedHeader),
    Chunked(ChunkedHeader),
    External,
    Other(u16),
}

impl SpecialHeader {
    pub(crate) fn parse(buf: Bytes) -> StoreResult<Self> {
        let mut r = RecordReader::new(buf, "special element header");
        let code = r.u16()?;
        let header = match code {
            SPECIAL_LINKED => {
                let length = r.size("logical length")?;
                let _block_length = r.size("block length")?;
                let blocks_per_table =
                    usize::try_from(r.size("block count")?).unwrap_or(usize::MAX);
                let link_ref = r.u16()?;
                SpecialHeader::Linked(LinkedHeader {
                    length,
                    blocks_per_table,
                    link_ref,
                })
            }
            SPECIAL_COMP => {
                let _version = r.u16()?;
                let length = r.size("logical length")?;
                let comp_ref = r.u16()?;
                let _model = r.u16()?;
                let coder = r.u16()?;
                SpecialHeader::Compressed(CompressedHeader {
                    length,
                    comp_ref,
                    coder,
                })
            }
            SPECIAL_CHUNKED => SpecialHeader::Chunked(parse_chunked(&mut r)?),
            SPECIAL_EXT => SpecialHeader::External,
            other => SpecialHeader::Other(other),
        };
        Ok(header)
    }

    pub(crate) fn code(&self) -> u16 {
        match self {
            SpecialHeader::Linked(_) => SPECIAL_LINKED,
            SpecialHeader::Compressed(_) => SPECIAL_COMP,
            SpecialHeader::Chunked(_) => SPECIAL_CHUNKED,
            SpecialHeader::External => SPECIAL_EXT,
            SpecialHeader::Other(code) => *code,
        }
    }

    /// Logical data length, for the kinds that record one.
    pub(crate) fn logical_length(&self) -> Option<u64> {
        match self {
            SpecialHeader::Linked(h) => Some(h.length),
            SpecialHeader::Compressed(h) => Some(h.length),
            _ => None,
        }
    }
}

fn parse_chunked(r: &mut RecordReader) -> StoreResult<ChunkedHeader> {
    let _header_len = r.i32()?;
    let _version = r.u8()?;
    let flags = r.i32()?;
    let _length = r.size("logical length")?;
    let _chunk_size = r.size("chunk size")?;
    let _nt_size = r.i32()?;
    let table = (r.u16()?, r.u16()?);
    let _chunk_tag = r.u16()?;
    let _chunk_ref = r.u16()?;

    let ndims = r.size("rank")?;
    let mut chunk_dims = Vec::new();
    for _ in 0..ndims {
        let _flag = r.i32()?;
        let _dim_length = r.size("dimension length")?;
        chunk_dims.push(r.size("chunk length")?);
    }

    let fill_len = usize::try_from(r.size("fill value length")?).unwrap_or(usize::MAX);
    let _fill = r.take(fill_len)?;

    let coder = if flags & 0xff == i32::from(SPECIAL_COMP) {
        let _comp_header_len = r.i32()?;
        let _model = r.u16()?;
        Some(r.u16()?)
    } else {
        ensure!(
            flags & 0xff == 0,
            CorruptSnafu {
                message: format!("unsupported chunked element flags {flags:#x}"),
            }
        );
        None
    };

    Ok(ChunkedHeader {
        table,
        chunk_dims,
        coder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hdf4::tags::COMP_CODE_DEFLATE, store::StoreError};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn linked_header() -> TestResult {
        let raw: &[u8] = &[0, 1, 0, 0, 0, 40, 0, 0, 0, 16, 0, 0, 0, 3, 0, 9];
        let h = SpecialHeader::parse(Bytes::from_static(raw))?;
        assert_eq!(
            h,
            SpecialHeader::Linked(LinkedHeader {
                length: 40,
                blocks_per_table: 3,
                link_ref: 9,
            })
        );
        assert_eq!(h.logical_length(), Some(40));
        Ok(())
    }

    #[test]
    fn compressed_header() -> TestResult {
        let raw: &[u8] = &[0, 3, 0, 0, 0, 0, 0, 64, 0, 7, 0, 0, 0, 4];
        let h = SpecialHeader::parse(Bytes::from_static(raw))?;
        assert_eq!(
            h,
            SpecialHeader::Compressed(CompressedHeader {
                length: 64,
                comp_ref: 7,
                coder: COMP_CODE_DEFLATE,
            })
        );
        assert_eq!(h.code(), SPECIAL_COMP);
        Ok(())
    }

    #[test]
    fn unknown_codes_are_kept() -> TestResult {
        let h = SpecialHeader::parse(Bytes::from_static(&[0, 6]))?;
        assert_eq!(h, SpecialHeader::Other(6));
        assert_eq!(h.code(), 6);
        assert_eq!(h.logical_length(), None);
        Ok(())
    }

    #[test]
    fn truncated_chunked_header_is_corrupt() {
        let raw: &[u8] = &[0, 5, 0, 0, 0, 30, 1];
        assert!(matches!(
            SpecialHeader::parse(Bytes::from_static(raw)),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
