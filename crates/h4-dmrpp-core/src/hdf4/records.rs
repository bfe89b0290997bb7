//! Decoding of the fixed-layout HDF4 records the reader needs.
//!
//! All HDF4 structures are big-endian. Every read is bounds-checked: a
//! truncated record is a [`crate::store::StoreError::Corrupt`], never a panic.

use bytes::{Buf, Bytes};
use snafu::prelude::*;

use super::tags::{DFNTF_IEEE, DFNTF_PC};
use crate::store::{CorruptSnafu, StoreResult};

/// Bounds-checked big-endian reader over one record.
#[derive(Debug)]
pub(crate) struct RecordReader {
    buf: Bytes,
    what: &'static str,
}

impl RecordReader {
    pub(crate) fn new(buf: Bytes, what: &'static str) -> Self {
        RecordReader { buf, what }
    }

    fn need(&self, n: usize) -> StoreResult<()> {
        ensure!(
            self.buf.remaining() >= n,
            CorruptSnafu {
                message: format!(
                    "truncated {} record: need {n} more byte(s), {} left",
                    self.what,
                    self.buf.remaining()
                ),
            }
        );
        Ok(())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn u8(&mut self) -> StoreResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> StoreResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn i32(&mut self) -> StoreResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub(crate) fn u32(&mut self) -> StoreResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    /// An `int32` that must not be negative (sizes, lengths, indices).
    pub(crate) fn size(&mut self, field: &str) -> StoreResult<u64> {
        let v = self.i32()?;
        u64::try_from(v).map_err(|_| {
            CorruptSnafu {
                message: format!("negative {field} {v} in {} record", self.what),
            }
            .build()
        })
    }

    pub(crate) fn take(&mut self, n: usize) -> StoreResult<Bytes> {
        self.need(n)?;
        Ok(self.buf.split_to(n))
    }

    /// A `u16`-length-prefixed string.
    pub(crate) fn string(&mut self) -> StoreResult<String> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// Member list and identity of a vgroup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VGroup {
    pub members: Vec<(u16, u16)>,
    pub name: String,
    pub class: String,
}

impl VGroup {
    pub(crate) fn parse(buf: Bytes) -> StoreResult<Self> {
        let mut r = RecordReader::new(buf, "vgroup");
        let nelt = usize::from(r.u16()?);
        let tags = (0..nelt).map(|_| r.u16()).collect::<StoreResult<Vec<_>>>()?;
        let refs = (0..nelt).map(|_| r.u16()).collect::<StoreResult<Vec<_>>>()?;
        let name = r.string()?;
        let class = r.string()?;
        Ok(VGroup {
            members: tags.into_iter().zip(refs).collect(),
            name,
            class,
        })
    }

    /// Reference of the first member with one of `tags`.
    pub(crate) fn member(&self, tags: &[u16]) -> Option<(u16, u16)> {
        self.members.iter().copied().find(|(t, _)| tags.contains(t))
    }
}

/// A numeric data group: a flat list of `(tag, ref)` pairs.
pub(crate) fn parse_tag_refs(buf: Bytes) -> StoreResult<Vec<(u16, u16)>> {
    let mut r = RecordReader::new(buf, "data group");
    let mut out = Vec::with_capacity(r.remaining() / 4);
    while r.remaining() >= 4 {
        out.push((r.u16()?, r.u16()?));
    }
    Ok(out)
}

/// Dimension record of a scientific dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Sdd {
    pub rank: u16,
    pub dims: Vec<u64>,
    pub nt: (u16, u16),
}

impl Sdd {
    pub(crate) fn parse(buf: Bytes) -> StoreResult<Self> {
        let mut r = RecordReader::new(buf, "dimension");
        let rank = r.u16()?;
        let dims = (0..rank)
            .map(|_| r.size("dimension size"))
            .collect::<StoreResult<Vec<_>>>()?;
        let nt = (r.u16()?, r.u16()?);
        Ok(Sdd { rank, dims, nt })
    }
}

/// Number-type record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NumberType {
    pub number_type: u8,
    pub width: u8,
    pub class: u8,
}

impl NumberType {
    pub(crate) fn parse(buf: Bytes) -> StoreResult<Self> {
        let mut r = RecordReader::new(buf, "number type");
        let _version = r.u8()?;
        Ok(NumberType {
            number_type: r.u8()?,
            width: r.u8()?,
            class: r.u8()?,
        })
    }

    /// Byte-order descriptor in the form the layout inspector expects.
    pub(crate) fn byte_order(&self) -> &'static str {
        match self.class {
            DFNTF_IEEE => "bigEndian",
            DFNTF_PC => "littleEndian",
            _ => "unknown",
        }
    }
}

/// One field of a vdata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VDataField {
    pub name: String,
    pub number_type: u16,
    pub offset: usize,
    pub order: usize,
}

/// Vdata header: record count, record size and field layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VDataHeader {
    pub records: usize,
    pub record_size: usize,
    pub fields: Vec<VDataField>,
    pub name: String,
}

impl VDataHeader {
    pub(crate) fn parse(buf: Bytes) -> StoreResult<Self> {
        let mut r = RecordReader::new(buf, "vdata header");
        let _interlace = r.u16()?;
        let records = usize::try_from(r.size("record count")?).unwrap_or(usize::MAX);
        let record_size = usize::from(r.u16()?);
        let nfields = usize::from(r.u16()?);

        let read_u16s = |r: &mut RecordReader| {
            (0..nfields)
                .map(|_| r.u16())
                .collect::<StoreResult<Vec<_>>>()
        };
        let types = read_u16s(&mut r)?;
        let _isizes = read_u16s(&mut r)?;
        let offsets = read_u16s(&mut r)?;
        let orders = read_u16s(&mut r)?;

        let mut fields = Vec::with_capacity(nfields);
        for ((number_type, offset), order) in types.into_iter().zip(offsets).zip(orders) {
            fields.push(VDataField {
                name: r.string()?,
                number_type,
                offset: usize::from(offset),
                order: usize::from(order),
            });
        }
        let name = r.string()?;

        Ok(VDataHeader {
            records,
            record_size,
            fields,
            name,
        })
    }

    pub(crate) fn field(&self, name: &str) -> StoreResult<&VDataField> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .context(CorruptSnafu {
                message: format!("vdata {:?} has no field {name:?}", self.name),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hdf4::tags::{DFTAG_NDG, DFTAG_NT, DFTAG_SDD},
        store::StoreError,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn truncated_record_is_corrupt_not_panic() {
        let mut r = RecordReader::new(Bytes::from_static(&[0x00]), "test");
        assert!(matches!(r.u16(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn negative_sizes_are_rejected() {
        let mut r = RecordReader::new(Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]), "test");
        let err = r.size("length").unwrap_err();
        assert!(err.to_string().contains("negative length -1"));
    }

    #[test]
    fn vgroup_members_and_names() -> TestResult {
        let raw: &[u8] = &[
            0, 2, // nelt
            0x02, 0xd0, 0x02, 0xbd, // tags: NDG, SDD
            0, 5, 0, 6, // refs
            0, 4, b't', b'e', b'm', b'p', // name
            0, 3, b'V', b'a', b'r', // class
        ];
        let vg = VGroup::parse(Bytes::from_static(raw))?;
        assert_eq!(vg.name, "temp");
        assert_eq!(vg.class, "Var");
        assert_eq!(vg.members, vec![(DFTAG_NDG, 5), (DFTAG_SDD, 6)]);
        assert_eq!(vg.member(&[DFTAG_SDD]), Some((DFTAG_SDD, 6)));
        assert_eq!(vg.member(&[DFTAG_NT]), None);
        Ok(())
    }

    #[test]
    fn sdd_reads_rank_dims_and_number_type() -> TestResult {
        let raw: &[u8] = &[0, 2, 0, 0, 0, 4, 0, 0, 0, 6, 0, 106, 0, 9];
        let sdd = Sdd::parse(Bytes::from_static(raw))?;
        assert_eq!(sdd.rank, 2);
        assert_eq!(sdd.dims, vec![4, 6]);
        assert_eq!(sdd.nt, (DFTAG_NT, 9));
        Ok(())
    }

    #[test]
    fn number_type_class_maps_to_byte_order() -> TestResult {
        let be = NumberType::parse(Bytes::from_static(&[1, 5, 4, 1]))?;
        let le = NumberType::parse(Bytes::from_static(&[1, 5, 4, 4]))?;
        let vax = NumberType::parse(Bytes::from_static(&[1, 5, 4, 2]))?;
        assert_eq!(be.byte_order(), "bigEndian");
        assert_eq!(le.byte_order(), "littleEndian");
        assert_eq!(vax.byte_order(), "unknown");
        assert_eq!(be.width, 4);
        Ok(())
    }
}
