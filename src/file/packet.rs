//! Fixed 24-byte packet header.
//!
//! Wire form (little-endian):
//!
//! ```text
//!  0 [4]  magic = "BPKT"
//!  4 [8]  first_row_index
//! 12 [8]  prev_payload_checksum
//! 20 [4]  header_checksum over bytes [0, 20)
//! ```
//!
//! `prev_payload_checksum` carries the XXH64 of the preceding packet's
//! uncompressed payload (0 for packet 0), chaining packets in order:
//! corrupting or reordering any packet breaks validation of its successor.

use std::io::{Read, Write};

use crate::checksum::checksum32;
use crate::error::{BcsvError, Result};

/// Packet magic.
pub const PACKET_MAGIC: [u8; 4] = *b"BPKT";

/// Serialized packet header size.
pub const PACKET_HEADER_SIZE: usize = 24;

/// Header of one framed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Absolute index of the first row stored in this packet.
    pub first_row_index: u64,
    /// XXH64 of the previous packet's uncompressed payload; 0 for the
    /// first packet.
    pub prev_payload_checksum: u64,
}

impl PacketHeader {
    pub fn new(first_row_index: u64, prev_payload_checksum: u64) -> Self {
        PacketHeader {
            first_row_index,
            prev_payload_checksum,
        }
    }

    /// Serializes the header, computing the self checksum.
    pub fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        buf[0..4].copy_from_slice(&PACKET_MAGIC);
        buf[4..12].copy_from_slice(&self.first_row_index.to_le_bytes());
        buf[12..20].copy_from_slice(&self.prev_payload_checksum.to_le_bytes());
        let crc = checksum32(&buf[0..20]);
        buf[20..24].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parses and validates 24 header bytes.
    pub fn decode(buf: &[u8; PACKET_HEADER_SIZE]) -> Result<PacketHeader> {
        if buf[0..4] != PACKET_MAGIC {
            return Err(BcsvError::format(format!(
                "bad packet magic {:02x?}",
                &buf[0..4]
            )));
        }
        let stored = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let computed = checksum32(&buf[0..20]);
        if stored != computed {
            return Err(BcsvError::checksum(format!(
                "packet header: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }
        Ok(PacketHeader {
            first_row_index: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            prev_payload_checksum: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.encode())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<PacketHeader> {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        r.read_exact(&mut buf)?;
        PacketHeader::decode(&buf)
    }
}
