//! HDF4 tag numbers, special-element codes and coder types used by the reader.

/// Placeholder for an unused data descriptor.
pub const DFTAG_NULL: u16 = 1;
/// Block of a linked-block element, or a linked-block table.
pub const DFTAG_LINKED: u16 = 20;
/// Compressed payload of a compressed element.
pub const DFTAG_COMPRESSED: u16 = 40;
/// One chunk of a chunked element.
pub const DFTAG_CHUNK: u16 = 61;
/// Number type.
pub const DFTAG_NT: u16 = 106;
/// Scientific data group (old style).
pub const DFTAG_SDG: u16 = 700;
/// Scientific data dimension record.
pub const DFTAG_SDD: u16 = 701;
/// Scientific data.
pub const DFTAG_SD: u16 = 702;
/// Numeric data group.
pub const DFTAG_NDG: u16 = 720;
/// Vdata header.
pub const DFTAG_VH: u16 = 1962;
/// Vdata storage.
pub const DFTAG_VS: u16 = 1963;
/// Vgroup.
pub const DFTAG_VG: u16 = 1965;

/// Bit set on the tag of an element whose data is a special header.
pub const SPECIAL_BIT: u16 = 0x4000;

/// Linked-block element.
pub const SPECIAL_LINKED: u16 = 1;
/// External element.
pub const SPECIAL_EXT: u16 = 2;
/// Compressed element.
pub const SPECIAL_COMP: u16 = 3;
/// Variable-length linked-block element.
pub const SPECIAL_VLINKED: u16 = 4;
/// Chunked element.
pub const SPECIAL_CHUNKED: u16 = 5;
/// Buffered element.
pub const SPECIAL_BUFFERED: u16 = 6;
/// Compressed raster element.
pub const SPECIAL_COMPRAS: u16 = 7;

/// No compression.
pub const COMP_CODE_NONE: u16 = 0;
/// Run-length encoding.
pub const COMP_CODE_RLE: u16 = 1;
/// N-bit packing.
pub const COMP_CODE_NBIT: u16 = 2;
/// Skipping Huffman.
pub const COMP_CODE_SKPHUFF: u16 = 3;
/// Deflate (gzip).
pub const COMP_CODE_DEFLATE: u16 = 4;
/// Szip.
pub const COMP_CODE_SZIP: u16 = 5;
/// JPEG.
pub const COMP_CODE_JPEG: u16 = 7;

/// `int32` number type.
pub const DFNT_INT32: u16 = 24;
/// `uint16` number type.
pub const DFNT_UINT16: u16 = 23;

/// Number-type class for big-endian IEEE data.
pub const DFNTF_IEEE: u8 = 1;
/// Number-type class for little-endian (PC) data.
pub const DFNTF_PC: u8 = 4;

/// Tag with the special bit set.
pub const fn special(tag: u16) -> u16 {
    tag | SPECIAL_BIT
}

/// Whether `tag` marks a special element.
pub const fn is_special(tag: u16) -> bool {
    tag & SPECIAL_BIT != 0
}

/// Tag with the special bit cleared.
pub const fn base(tag: u16) -> u16 {
    tag & !SPECIAL_BIT
}

/// Codec name reported for a coder type, if it is a byte-oriented codec.
pub fn codec_name(coder: u16) -> Option<&'static str> {
    match coder {
        COMP_CODE_RLE => Some("rle"),
        COMP_CODE_SKPHUFF => Some("skphuff"),
        COMP_CODE_DEFLATE => Some("deflate"),
        COMP_CODE_SZIP => Some("szip"),
        COMP_CODE_JPEG => Some("jpeg"),
        _ => None,
    }
}
