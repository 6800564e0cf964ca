//! Format detection for archive and model payloads.
//!
//! Formats are identified from magic bytes without decoding payloads.
//! Binder generations also carry an ASCII sub version tag at offsets
//! 0x10..0x18 that distinguishes game revisions, so a binder magic
//! followed by a garbage tag is treated as a false positive.
use std::io::Cursor;

use binrw::{BinRead, BinReaderExt};

/// The detected format family of a payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FormatTag {
    /// General purpose binders used up to Dark Souls.
    Bnd3,
    /// General purpose binders used by Dark Souls 2 and later games.
    Bnd4,
    /// Split binder header and data files of the BND3 generation.
    Bxf3,
    /// Split binder header and data files of the BND4 generation.
    Bxf4,
    /// A single compressed payload.
    Dcx,
    /// A texture pack with named entries.
    Tpf,
    /// Models used up to Demon's Souls.
    Flver0,
    /// Models used by Dark Souls and later games.
    Flver2,
    /// Havok physics and animation data.
    Hkx,
    Unknown,
}

impl FormatTag {
    /// Whether payloads with this tag expand into further named entries.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            FormatTag::Bnd3
                | FormatTag::Bnd4
                | FormatTag::Bxf3
                | FormatTag::Bxf4
                | FormatTag::Tpf
        )
    }
}

#[derive(BinRead)]
enum RawHeader {
    #[br(magic(b"BND3"))]
    Bnd3 {
        #[br(pad_before = 12)]
        version_tag: [u8; 8],
    },
    #[br(magic(b"BND4"))]
    Bnd4 {
        #[br(pad_before = 12)]
        version_tag: [u8; 8],
    },
    #[br(magic(b"BHF3"))]
    Bhf3 {
        #[br(pad_before = 12)]
        version_tag: [u8; 8],
    },
    #[br(magic(b"BDF3"))]
    Bdf3 {
        #[br(pad_before = 12)]
        version_tag: [u8; 8],
    },
    #[br(magic(b"BHF4"))]
    Bhf4 {
        #[br(pad_before = 12)]
        version_tag: [u8; 8],
    },
    #[br(magic(b"BDF4"))]
    Bdf4 {
        #[br(pad_before = 12)]
        version_tag: [u8; 8],
    },
    #[br(magic(b"DCX\0"))]
    Dcx,
    #[br(magic(b"TPF\0"))]
    Tpf,
    #[br(magic(b"FLVER\0"))]
    Flver {
        endian: [u8; 2],
        #[br(is_big = endian == *b"B\0")]
        version: u32,
    },
    // Havok packfile magic.
    #[br(magic(b"\x57\xE0\xE0\x57"))]
    Hkx,
}

/// Detect the format of `data` from its header bytes.
pub fn sniff(data: &[u8]) -> FormatTag {
    let Ok(header) = Cursor::new(data).read_le() else {
        return FormatTag::Unknown;
    };
    match header {
        RawHeader::Bnd3 { version_tag } => binder_tag(FormatTag::Bnd3, version_tag),
        RawHeader::Bnd4 { version_tag } => binder_tag(FormatTag::Bnd4, version_tag),
        RawHeader::Bhf3 { version_tag } | RawHeader::Bdf3 { version_tag } => {
            binder_tag(FormatTag::Bxf3, version_tag)
        }
        RawHeader::Bhf4 { version_tag } | RawHeader::Bdf4 { version_tag } => {
            binder_tag(FormatTag::Bxf4, version_tag)
        }
        RawHeader::Dcx => FormatTag::Dcx,
        RawHeader::Tpf => FormatTag::Tpf,
        RawHeader::Flver { version, .. } => {
            if version >= 0x20000 {
                FormatTag::Flver2
            } else {
                FormatTag::Flver0
            }
        }
        RawHeader::Hkx => FormatTag::Hkx,
    }
}

fn binder_tag(tag: FormatTag, version_tag: [u8; 8]) -> FormatTag {
    if version_tag.iter().all(|b| b.is_ascii_graphic() || *b == 0) {
        tag
    } else {
        FormatTag::Unknown
    }
}
