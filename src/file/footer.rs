//! Footer: the packet directory plus file totals, anchored by a fixed
//! 32-byte tail.
//!
//! Wire form (little-endian):
//!
//! ```text
//! "BIDX" [4]
//!   directory entries, 16 bytes each:
//!     u64 byte_offset, u64 first_row
//! "EIDX" [4]
//! u32 directory_offset_from_tail     distance from EOF back to "BIDX"
//! u64 last_payload_checksum
//! u64 total_row_count
//! u64 directory_checksum             XXH64 over "BIDX"..total_row_count
//! ```
//!
//! Readers seek to `file_size - 32`, verify the end marker, then use the
//! offset to find the directory. Encoded size is `36 + 16 * entries`.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::checksum::checksum64;
use crate::error::{BcsvError, Result};

/// Directory begin marker.
pub const INDEX_BEGIN_MAGIC: [u8; 4] = *b"BIDX";

/// Directory end marker.
pub const INDEX_END_MAGIC: [u8; 4] = *b"EIDX";

/// Size of the fixed section at the very end of the file.
pub const FOOTER_TAIL_SIZE: usize = 32;

/// Encoded size of an empty footer.
pub const FOOTER_MIN_SIZE: usize = 36;

/// Size of one directory entry.
pub const INDEX_ENTRY_SIZE: usize = 16;

/// One directory entry: where a packet starts and which row it begins
/// with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketIndexEntry {
    /// Byte offset of the packet header from the start of the file.
    pub byte_offset: u64,
    /// Absolute index of the packet's first row.
    pub first_row: u64,
}

impl PacketIndexEntry {
    pub fn new(byte_offset: u64, first_row: u64) -> Self {
        PacketIndexEntry {
            byte_offset,
            first_row,
        }
    }
}

/// Packet directory and file totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFooter {
    pub entries: Vec<PacketIndexEntry>,
    pub last_payload_checksum: u64,
    pub total_row_count: u64,
}

impl FileFooter {
    pub fn new() -> Self {
        FileFooter::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_payload_checksum = 0;
        self.total_row_count = 0;
    }

    /// Serialized size in bytes.
    pub fn encoded_size(&self) -> usize {
        FOOTER_MIN_SIZE + self.entries.len() * INDEX_ENTRY_SIZE
    }

    /// Index of the packet containing `row`, by binary search on
    /// `first_row`. `None` when the directory is empty or `row` precedes
    /// the first entry (which cannot happen in a valid file).
    pub fn locate(&self, row: u64) -> Option<usize> {
        let after = self.entries.partition_point(|e| e.first_row <= row);
        after.checked_sub(1)
    }

    /// Rows held by packet `k`, derived from neighbouring entries and the
    /// total row count.
    pub fn rows_in_packet(&self, k: usize) -> u64 {
        let first = self.entries[k].first_row;
        match self.entries.get(k + 1) {
            Some(next) => next.first_row - first,
            None => self.total_row_count - first,
        }
    }

    /// Serializes the footer, computing the directory checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&INDEX_BEGIN_MAGIC);
        for e in &self.entries {
            buf.extend_from_slice(&e.byte_offset.to_le_bytes());
            buf.extend_from_slice(&e.first_row.to_le_bytes());
        }
        buf.extend_from_slice(&INDEX_END_MAGIC);
        buf.extend_from_slice(&(self.encoded_size() as u32).to_le_bytes());
        buf.extend_from_slice(&self.last_payload_checksum.to_le_bytes());
        buf.extend_from_slice(&self.total_row_count.to_le_bytes());
        let crc = checksum64(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.encode())?;
        Ok(())
    }

    /// Loads the footer from the tail of a stream of `file_len` bytes,
    /// validating markers, checksum, and directory invariants.
    pub fn read_from_tail<R: Read + Seek>(r: &mut R, file_len: u64) -> Result<FileFooter> {
        if file_len < FOOTER_MIN_SIZE as u64 {
            return Err(BcsvError::format("file too short to hold a footer"));
        }
        r.seek(SeekFrom::Start(file_len - FOOTER_TAIL_SIZE as u64))?;
        let mut tail = [0u8; FOOTER_TAIL_SIZE];
        r.read_exact(&mut tail)?;
        if tail[0..4] != INDEX_END_MAGIC {
            return Err(BcsvError::format("footer end marker not found"));
        }
        let offset = u32::from_le_bytes(tail[4..8].try_into().unwrap()) as u64;
        if offset < FOOTER_MIN_SIZE as u64
            || offset > file_len
            || (offset - FOOTER_MIN_SIZE as u64) % INDEX_ENTRY_SIZE as u64 != 0
        {
            return Err(BcsvError::format(format!(
                "implausible footer directory offset {offset}"
            )));
        }

        r.seek(SeekFrom::Start(file_len - offset))?;
        let mut buf = vec![0u8; offset as usize];
        r.read_exact(&mut buf)?;
        if buf[0..4] != INDEX_BEGIN_MAGIC {
            return Err(BcsvError::format("footer begin marker not found"));
        }
        let entry_count = (offset as usize - FOOTER_MIN_SIZE) / INDEX_ENTRY_SIZE;
        let end_magic_at = 4 + entry_count * INDEX_ENTRY_SIZE;
        if buf[end_magic_at..end_magic_at + 4] != INDEX_END_MAGIC {
            return Err(BcsvError::format("footer end marker not found"));
        }

        let stored = u64::from_le_bytes(buf[offset as usize - 8..].try_into().unwrap());
        let computed = checksum64(&buf[..offset as usize - 8]);
        if stored != computed {
            return Err(BcsvError::checksum(format!(
                "footer directory: stored {stored:#018x}, computed {computed:#018x}"
            )));
        }

        let mut entries = Vec::with_capacity(entry_count);
        for k in 0..entry_count {
            let at = 4 + k * INDEX_ENTRY_SIZE;
            entries.push(PacketIndexEntry {
                byte_offset: u64::from_le_bytes(buf[at..at + 8].try_into().unwrap()),
                first_row: u64::from_le_bytes(buf[at + 8..at + 16].try_into().unwrap()),
            });
        }
        let last_payload_checksum =
            u64::from_le_bytes(buf[end_magic_at + 8..end_magic_at + 16].try_into().unwrap());
        let total_row_count =
            u64::from_le_bytes(buf[end_magic_at + 16..end_magic_at + 24].try_into().unwrap());

        let footer = FileFooter {
            entries,
            last_payload_checksum,
            total_row_count,
        };
        footer.validate()?;
        Ok(footer)
    }

    /// Directory invariants: offsets and first rows strictly increase,
    /// entry 0 starts at row 0, totals cover every entry.
    pub fn validate(&self) -> Result<()> {
        if let Some(first) = self.entries.first() {
            if first.first_row != 0 {
                return Err(BcsvError::format(
                    "footer directory does not start at row 0",
                ));
            }
        }
        for pair in self.entries.windows(2) {
            if pair[1].byte_offset <= pair[0].byte_offset || pair[1].first_row <= pair[0].first_row
            {
                return Err(BcsvError::format(
                    "footer directory entries are not strictly increasing",
                ));
            }
        }
        if let Some(last) = self.entries.last() {
            if self.total_row_count < last.first_row {
                return Err(BcsvError::format(
                    "footer row total is below the last directory entry",
                ));
            }
        }
        Ok(())
    }
}
