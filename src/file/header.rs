//! File header: magic, version, feature flags, codec ids, and the
//! serialized layout, guarded by a trailing XXH32.
//!
//! Wire form (little-endian):
//!
//! ```text
//!  0  [4]  magic            = "BCSV"
//!  4  [3]  version (major, minor, patch)
//!  7  [1]  reserved         = 0
//!  8  [4]  file_flags
//! 12  [2]  file_codec_id
//! 14  [2]  row_codec_id
//! 16  [1]  compression_level (0..=22)
//! 17  [3]  reserved
//! 20  [4]  block_size_hint_bytes
//! 24  [N]  serialized layout
//! 24+N [4] header_checksum over bytes [0, 24+N)
//! ```

use std::io::{Read, Write};
use std::ops::BitOr;

use crate::checksum::checksum32;
use crate::codec_row::RowCodecId;
use crate::error::{BcsvError, Result};
use crate::file::codec::FileCodecId;
use crate::layout::Layout;

/// File magic.
pub const FILE_MAGIC: [u8; 4] = *b"BCSV";

/// Format version written by this library.
pub const FORMAT_VERSION: (u8, u8, u8) = (1, 0, 0);

/// Size of the fixed prefix before the serialized layout.
pub const FILE_HEADER_FIXED_SIZE: usize = 24;

/// Highest meaningful compression level.
pub const MAX_COMPRESSION_LEVEL: u8 = 22;

// ─────────────────────────────────────────────────────────────────────────────
// FileFlags
// ─────────────────────────────────────────────────────────────────────────────

/// Feature-flag bitfield stored in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const NONE: FileFlags = FileFlags(0);
    /// Row codec is zero-order-hold. Redundant with the row codec id but
    /// kept for quick inspection of a hex dump.
    pub const ZERO_ORDER_HOLD: FileFlags = FileFlags(1);

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        FileFlags(bits)
    }

    #[inline]
    pub fn contains(self, other: FileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: FileFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for FileFlags {
    type Output = FileFlags;

    fn bitor(self, rhs: FileFlags) -> FileFlags {
        FileFlags(self.0 | rhs.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FileHeader
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a reader needs to interpret the file body.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub version: (u8, u8, u8),
    pub flags: FileFlags,
    pub file_codec: FileCodecId,
    pub row_codec: RowCodecId,
    pub compression_level: u8,
    pub block_size_hint: u32,
    pub layout: Layout,
}

impl FileHeader {
    /// Header for a fresh file at the current format version.
    pub fn new(
        layout: Layout,
        file_codec: FileCodecId,
        row_codec: RowCodecId,
        compression_level: u8,
        block_size_hint: u32,
        flags: FileFlags,
    ) -> Self {
        FileHeader {
            version: FORMAT_VERSION,
            flags,
            file_codec,
            row_codec,
            compression_level,
            block_size_hint,
            layout,
        }
    }

    /// Total serialized size, checksum included.
    pub fn encoded_size(&self) -> usize {
        FILE_HEADER_FIXED_SIZE + self.layout.encoded_size() + 4
    }

    /// Serializes the header, checksum included.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&FILE_MAGIC);
        buf.push(self.version.0);
        buf.push(self.version.1);
        buf.push(self.version.2);
        buf.push(0); // reserved
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        buf.extend_from_slice(&self.file_codec.to_wire().to_le_bytes());
        buf.extend_from_slice(&self.row_codec.to_wire().to_le_bytes());
        buf.push(self.compression_level);
        buf.extend_from_slice(&[0u8; 3]); // reserved
        buf.extend_from_slice(&self.block_size_hint.to_le_bytes());
        self.layout.encode_into(&mut buf);
        let crc = checksum32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Writes the header; returns the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<u64> {
        let buf = self.encode();
        w.write_all(&buf)?;
        Ok(buf.len() as u64)
    }

    /// Reads and validates a header; returns it with the number of bytes
    /// consumed.
    pub fn read_from<R: Read>(r: &mut R) -> Result<(FileHeader, u64)> {
        let mut fixed = [0u8; FILE_HEADER_FIXED_SIZE];
        r.read_exact(&mut fixed)?;
        if fixed[0..4] != FILE_MAGIC {
            return Err(BcsvError::format(format!(
                "bad file magic {:02x?}",
                &fixed[0..4]
            )));
        }
        let version = (fixed[4], fixed[5], fixed[6]);
        if version.0 != FORMAT_VERSION.0 {
            return Err(BcsvError::format(format!(
                "unsupported format version {}.{}.{}",
                version.0, version.1, version.2
            )));
        }
        let flags = FileFlags::from_bits(u32::from_le_bytes(fixed[8..12].try_into().unwrap()));
        let file_codec =
            FileCodecId::from_wire(u16::from_le_bytes(fixed[12..14].try_into().unwrap()))?;
        let row_codec =
            RowCodecId::from_wire(u16::from_le_bytes(fixed[14..16].try_into().unwrap()))?;
        let compression_level = fixed[16];
        if compression_level > MAX_COMPRESSION_LEVEL {
            return Err(BcsvError::format(format!(
                "compression level {compression_level} out of range"
            )));
        }
        let block_size_hint = u32::from_le_bytes(fixed[20..24].try_into().unwrap());

        let mut raw = fixed.to_vec();
        let layout = Layout::read_wire(r, &mut raw)?;

        let mut crc_bytes = [0u8; 4];
        r.read_exact(&mut crc_bytes)?;
        let stored = u32::from_le_bytes(crc_bytes);
        let computed = checksum32(&raw);
        if stored != computed {
            return Err(BcsvError::checksum(format!(
                "file header: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        let header = FileHeader {
            version,
            flags,
            file_codec,
            row_codec,
            compression_level,
            block_size_hint,
            layout,
        };
        let consumed = raw.len() as u64 + 4;
        Ok((header, consumed))
    }
}
