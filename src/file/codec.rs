//! File-codec dispatch: framing x compression x optional batch mode.
//!
//! A closed set of wire ids selects how row payloads are laid into the
//! file. Stream variants write the whole body as one continuous payload;
//! packet variants frame each payload with a [`PacketHeader`] and a `u32`
//! compressed length, making packets independently decodable. The batch
//! variant chains an LZ4 dictionary across packets inside a fixed-size
//! group for a better ratio at a bounded random-access cost.
//!
//! [`PacketHeader`]: super::packet::PacketHeader

use lz4_flex::block::{
    compress_prepend_size, compress_prepend_size_with_dict, decompress_size_prepended,
    decompress_size_prepended_with_dict,
};

use crate::error::{BcsvError, Result};

/// Packets per batch group. The LZ4 dictionary chain resets at every
/// multiple of this, so random access decompresses at most one group.
pub const BATCH_GROUP_LEN: u64 = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Ids and the resolution matrix
// ─────────────────────────────────────────────────────────────────────────────

/// How payloads are delimited in the file body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One continuous payload for the whole file.
    Stream,
    /// Independently framed, checksummed packets.
    Packet,
}

/// Payload compression applied before bytes hit the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lz4,
}

/// Wire id of a file codec. The discriminant is serialized into the file
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FileCodecId {
    /// Continuous body, no compression.
    Stream001 = 0,
    /// Continuous body, compressed as one LZ4 block.
    StreamLz4001 = 1,
    /// Per-packet framing, payloads stored raw.
    Packet001 = 2,
    /// Per-packet framing, each payload an independent LZ4 block.
    PacketLz4001 = 3,
    /// Per-packet framing, LZ4 with a dictionary chained across packets
    /// within a batch group.
    PacketLz4Batch001 = 4,
}

impl FileCodecId {
    pub fn from_wire(id: u16) -> Result<Self> {
        use FileCodecId::*;
        Ok(match id {
            0 => Stream001,
            1 => StreamLz4001,
            2 => Packet001,
            3 => PacketLz4001,
            4 => PacketLz4Batch001,
            other => return Err(BcsvError::format(format!("unknown file codec id {other}"))),
        })
    }

    #[inline]
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    pub fn framing(self) -> Framing {
        match self {
            FileCodecId::Stream001 | FileCodecId::StreamLz4001 => Framing::Stream,
            _ => Framing::Packet,
        }
    }

    pub fn compression(self) -> Compression {
        match self {
            FileCodecId::Stream001 | FileCodecId::Packet001 => Compression::None,
            _ => Compression::Lz4,
        }
    }

    #[inline]
    pub fn is_batch(self) -> bool {
        self == FileCodecId::PacketLz4Batch001
    }

    pub fn name(self) -> &'static str {
        match self {
            FileCodecId::Stream001 => "Stream001",
            FileCodecId::StreamLz4001 => "StreamLZ4001",
            FileCodecId::Packet001 => "Packet001",
            FileCodecId::PacketLz4001 => "PacketLZ4001",
            FileCodecId::PacketLz4Batch001 => "PacketLZ4Batch001",
        }
    }
}

/// Maps a framing/compression/batch request onto a codec id, rejecting
/// combinations outside the matrix. Batching requires per-packet framing
/// with LZ4.
pub fn resolve_file_codec_id(
    framing: Framing,
    compression: Compression,
    batch: bool,
) -> Result<FileCodecId> {
    match (framing, compression, batch) {
        (Framing::Stream, Compression::None, false) => Ok(FileCodecId::Stream001),
        (Framing::Stream, Compression::Lz4, false) => Ok(FileCodecId::StreamLz4001),
        (Framing::Packet, Compression::None, false) => Ok(FileCodecId::Packet001),
        (Framing::Packet, Compression::Lz4, false) => Ok(FileCodecId::PacketLz4001),
        (Framing::Packet, Compression::Lz4, true) => Ok(FileCodecId::PacketLz4Batch001),
        (f, c, true) => Err(BcsvError::format(format!(
            "batch mode requires packet framing with LZ4, got {f:?}/{c:?}"
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload transform
// ─────────────────────────────────────────────────────────────────────────────

/// Sequential payload transformer for one side (writer or reader).
///
/// Payloads must be fed in packet order; the batch variant keeps the
/// previous packet's uncompressed payload as the dictionary for the next.
/// [`PayloadCodec::reset_to_group`] repositions the chain at a group
/// boundary for random access.
#[derive(Debug)]
pub struct PayloadCodec {
    id: FileCodecId,
    seq: u64,
    dict: Option<Vec<u8>>,
}

impl PayloadCodec {
    pub fn new(id: FileCodecId) -> Self {
        PayloadCodec {
            id,
            seq: 0,
            dict: None,
        }
    }

    /// Index of the next payload this codec expects.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The file codec this transformer was built for.
    #[inline]
    pub fn file_codec(&self) -> FileCodecId {
        self.id
    }

    /// Repositions the sequence counter without touching the dictionary.
    /// Only meaningful for non-batch codecs, where payloads are
    /// independent.
    pub(crate) fn set_seq(&mut self, seq: u64) {
        debug_assert!(!self.id.is_batch());
        self.seq = seq;
    }

    /// Restarts the chain from packet 0.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.dict = None;
    }

    /// Repositions the chain at the start of the group containing
    /// `packet_index`. Only group boundaries are valid entry points.
    pub fn reset_to_group(&mut self, packet_index: u64) {
        debug_assert_eq!(packet_index % BATCH_GROUP_LEN, 0);
        self.seq = packet_index;
        self.dict = None;
    }

    /// The dictionary for the upcoming payload: the previous payload of
    /// the same batch group, absent at group boundaries.
    fn dict(&self) -> Option<&[u8]> {
        if self.id.is_batch() && self.seq % BATCH_GROUP_LEN != 0 {
            self.dict.as_deref()
        } else {
            None
        }
    }

    /// Transforms the next raw payload into its on-file form.
    pub fn compress_next(&mut self, raw: &[u8]) -> Vec<u8> {
        let out = match (self.id.compression(), self.dict()) {
            (Compression::None, _) => raw.to_vec(),
            (Compression::Lz4, Some(dict)) => compress_prepend_size_with_dict(raw, dict),
            (Compression::Lz4, None) => compress_prepend_size(raw),
        };
        if self.id.is_batch() {
            self.dict = Some(raw.to_vec());
        }
        self.seq += 1;
        out
    }

    /// Inverse of [`PayloadCodec::compress_next`] for the next payload in
    /// sequence.
    pub fn decompress_next(&mut self, stored: &[u8]) -> Result<Vec<u8>> {
        let raw = match (self.id.compression(), self.dict()) {
            (Compression::None, _) => stored.to_vec(),
            (Compression::Lz4, dict) => {
                let res = match dict {
                    Some(dict) => decompress_size_prepended_with_dict(stored, dict),
                    None => decompress_size_prepended(stored),
                };
                res.map_err(|e| {
                    BcsvError::format(format!("lz4 decompression failed (packet {}): {e}", self.seq))
                })?
            }
        };
        if self.id.is_batch() {
            self.dict = Some(raw.clone());
        }
        self.seq += 1;
        Ok(raw)
    }
}
