//! Reader: footer-indexed sequential and random access over a packet
//! stream, with recovery for unsealed files.
//!
//! Open sequence: validate the file header, load the footer from the file
//! tail, and fall back to a forward packet scan when the footer is absent
//! or invalid. Recovery walks packet headers from the body start, stops at
//! the first structurally or semantically invalid packet, and rebuilds the
//! directory in memory; the file then reads normally up to the last intact
//! packet and [`Reader::warning`] reports the condition.
//!
//! Random access binary-searches the directory on `first_row`, seeks the
//! packet, decompresses it, resets row-codec state, and decodes forward.
//! Zero-order-hold state is never carried across packet boundaries, which
//! is what makes this work on differential streams.
//!
//! Any checksum mismatch during reading is fatal: the error is returned
//! and the reader transitions to closed.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::checksum::checksum64;
use crate::codec_row::{make_row_codec, DecodeEvent, RowCodec};
use crate::error::{BcsvError, Result};
use crate::file::codec::{Framing, PayloadCodec, BATCH_GROUP_LEN};
use crate::file::footer::{FileFooter, PacketIndexEntry};
use crate::file::header::FileHeader;
use crate::file::packet::{PacketHeader, PACKET_HEADER_SIZE};
use crate::layout::Layout;
use crate::row::Row;

/// Packet header plus the u32 stored-length prefix.
const PACKET_FRAME_OVERHEAD: u64 = PACKET_HEADER_SIZE as u64 + 4;

struct ReaderState {
    file: BufReader<File>,
    path: PathBuf,
    header: FileHeader,
    layout: Arc<Layout>,
    footer: FileFooter,
    sealed: bool,
    warning: Option<String>,
    body_start: u64,
    data_end: u64,
    row_codec: Box<dyn RowCodec>,
    payload_codec: PayloadCodec,
    current: Row,
    /// Directory index of the loaded packet.
    packet_idx: Option<usize>,
    /// Decompressed payload of the loaded packet.
    payload: Vec<u8>,
    payload_pos: usize,
    /// Absolute index of the row the next decode step would produce.
    next_row: u64,
    /// Packet index and checksum of the most recently decompressed
    /// payload; feeds chain validation of its successor.
    last_payload: Option<(usize, u64)>,
    row_pos: Option<u64>,
}

/// Reads one BCSV file sequentially or by row index.
#[derive(Default)]
pub struct Reader {
    inner: Option<ReaderState>,
}

impl Reader {
    pub fn new() -> Self {
        Reader::default()
    }

    /// Opens a file: header, footer, and recovery fallback. Fails if the
    /// reader is already open.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.inner.is_some() {
            return Err(BcsvError::state("reader is already open"));
        }
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut file = BufReader::new(file);

        let (header, body_start) = FileHeader::read_from(&mut file)?;
        let layout = Arc::new(header.layout.clone());

        let mut sealed = true;
        let mut warning = None;
        let (footer, data_end) = match FileFooter::read_from_tail(&mut file, file_len) {
            Ok(footer) => {
                let end = file_len - footer.encoded_size() as u64;
                (footer, end)
            }
            Err(cause) => {
                sealed = false;
                let (footer, end) = match header.file_codec.framing() {
                    Framing::Packet => {
                        recover_packets(&mut file, &header, &layout, body_start, file_len)?
                    }
                    Framing::Stream => {
                        recover_stream(&mut file, &header, &layout, body_start, file_len)?
                    }
                };
                warn!(
                    "{}: unsealed file, recovered {} packets / {} rows",
                    path.display(),
                    footer.entries.len(),
                    footer.total_row_count
                );
                warning = Some(format!(
                    "file is unsealed ({cause}); recovered {} packets, {} rows",
                    footer.entries.len(),
                    footer.total_row_count
                ));
                (footer, end)
            }
        };

        if header.file_codec.framing() == Framing::Packet {
            for e in &footer.entries {
                if e.byte_offset < body_start
                    || e.byte_offset + PACKET_FRAME_OVERHEAD > data_end
                {
                    return Err(BcsvError::format(format!(
                        "directory entry at offset {} lies outside the file body",
                        e.byte_offset
                    )));
                }
            }
        }

        let current = Row::new(layout.clone());
        let row_codec = make_row_codec(header.row_codec, &layout);
        let payload_codec = PayloadCodec::new(header.file_codec);
        debug!(
            "opened {} ({} rows, {} packets, sealed: {sealed})",
            path.display(),
            footer.total_row_count,
            footer.entries.len()
        );
        self.inner = Some(ReaderState {
            file,
            path: path.to_path_buf(),
            header,
            layout,
            footer,
            sealed,
            warning,
            body_start,
            data_end,
            row_codec,
            payload_codec,
            current,
            packet_idx: None,
            payload: Vec::new(),
            payload_pos: 0,
            next_row: 0,
            last_payload: None,
            row_pos: None,
        });
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.inner = None;
        Ok(())
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// True when the footer was present and validated at open.
    pub fn is_sealed(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| s.sealed)
    }

    /// Recovery report for unsealed files, `None` otherwise.
    pub fn warning(&self) -> Option<&str> {
        self.inner.as_ref().and_then(|s| s.warning.as_deref())
    }

    /// Total rows addressable through this reader.
    pub fn row_count(&self) -> u64 {
        self.inner
            .as_ref()
            .map_or(0, |s| s.footer.total_row_count)
    }

    /// Index of the last row returned, if any row was read yet.
    pub fn row_pos(&self) -> Option<u64> {
        self.inner.as_ref().and_then(|s| s.row_pos)
    }

    /// Number of packets in the directory.
    pub fn packet_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |s| s.footer.entries.len())
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.inner.as_ref().map(|s| s.path.as_path())
    }

    /// The validated file header.
    pub fn file_header(&self) -> Option<&FileHeader> {
        self.inner.as_ref().map(|s| &s.header)
    }

    /// Layout of the open file.
    ///
    /// # Panics
    /// If the reader is not open.
    pub fn layout(&self) -> &Arc<Layout> {
        &self.state().layout
    }

    /// The most recently decoded row.
    ///
    /// # Panics
    /// If the reader is not open.
    pub fn row(&self) -> &Row {
        &self.state().current
    }

    fn state(&self) -> &ReaderState {
        self.inner.as_ref().expect("reader is not open")
    }

    /// Advances to the next row. Returns `false` at end of file. Checksum
    /// or format failures are fatal and close the reader.
    pub fn read_next(&mut self) -> Result<bool> {
        let st = self
            .inner
            .as_mut()
            .ok_or_else(|| BcsvError::state("read_next on a closed reader"))?;
        let next = st.row_pos.map_or(0, |p| p + 1);
        if next >= st.footer.total_row_count {
            return Ok(false);
        }
        match st.advance_to(next) {
            Ok(()) => {
                st.row_pos = Some(next);
                Ok(true)
            }
            Err(e) => {
                self.inner = None;
                Err(e)
            }
        }
    }

    /// Random access: positions on row `i` and returns it. Continues
    /// forward inside the loaded packet when possible, otherwise seeks the
    /// owning packet and decodes from its first row.
    pub fn read(&mut self, i: u64) -> Result<&Row> {
        let st = self
            .inner
            .as_mut()
            .ok_or_else(|| BcsvError::state("read on a closed reader"))?;
        if i >= st.footer.total_row_count {
            return Err(BcsvError::range(format!(
                "row {i} out of range ({} rows)",
                st.footer.total_row_count
            )));
        }
        match st.advance_to(i) {
            Ok(()) => {
                st.row_pos = Some(i);
            }
            Err(e) => {
                self.inner = None;
                return Err(e);
            }
        }
        Ok(self.row())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Packet traversal
// ─────────────────────────────────────────────────────────────────────────────

impl ReaderState {
    /// Decodes forward until `target` is in the current-row buffer,
    /// repositioning to another packet first when needed.
    fn advance_to(&mut self, target: u64) -> Result<()> {
        let p = self
            .footer
            .locate(target)
            .ok_or_else(|| BcsvError::format("row not covered by the packet directory"))?;
        let in_current = self.packet_idx == Some(p) && self.next_row <= target;
        if !in_current {
            self.position_at_packet(p)?;
        }
        while self.next_row <= target {
            match self
                .row_codec
                .decode_row(&self.payload, &mut self.payload_pos, &mut self.current)?
            {
                DecodeEvent::Row => self.next_row += 1,
                DecodeEvent::EndOfPayload => {
                    return Err(BcsvError::format(format!(
                        "packet {p} ended before row {target}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Loads packet `p` and resets decode state to its first row. For the
    /// batch codec this may roll forward from the packet's group boundary
    /// to rebuild the dictionary chain.
    fn position_at_packet(&mut self, p: usize) -> Result<()> {
        match self.header.file_codec.framing() {
            Framing::Stream => self.load_stream_body()?,
            Framing::Packet => {
                if self.header.file_codec.is_batch() {
                    let group_start = p - p % BATCH_GROUP_LEN as usize;
                    let seq = self.payload_codec.seq() as usize;
                    let start = if seq > group_start && seq <= p {
                        seq
                    } else {
                        self.payload_codec.reset_to_group(group_start as u64);
                        group_start
                    };
                    for j in start..p {
                        self.load_packet(j)?;
                    }
                } else if self.payload_codec.seq() != p as u64 {
                    self.payload_codec.set_seq(p as u64);
                }
                self.load_packet(p)?;
            }
        }
        self.packet_idx = Some(p);
        self.payload_pos = 0;
        self.row_codec.reset();
        self.next_row = self.footer.entries[p].first_row;
        Ok(())
    }

    /// Reads, validates, and decompresses packet `k` into `self.payload`.
    /// The payload codec must be positioned at sequence `k`.
    fn load_packet(&mut self, k: usize) -> Result<()> {
        debug_assert_eq!(self.payload_codec.seq(), k as u64);
        let entry = self.footer.entries[k];
        self.file.seek(SeekFrom::Start(entry.byte_offset))?;
        let header = PacketHeader::read_from(&mut self.file)?;
        if header.first_row_index != entry.first_row {
            return Err(BcsvError::format(format!(
                "packet {k}: header first row {} disagrees with directory entry {}",
                header.first_row_index, entry.first_row
            )));
        }
        if k == 0 {
            if header.prev_payload_checksum != 0 {
                return Err(BcsvError::checksum(
                    "packet 0 carries a nonzero chain link",
                ));
            }
        } else if let Some((idx, ck)) = self.last_payload {
            if idx + 1 == k && header.prev_payload_checksum != ck {
                return Err(BcsvError::checksum(format!(
                    "packet {k}: chain link {:#018x} does not match predecessor payload {ck:#018x}",
                    header.prev_payload_checksum
                )));
            }
        }

        let mut len_bytes = [0u8; 4];
        self.file.read_exact(&mut len_bytes)?;
        let stored_len = u32::from_le_bytes(len_bytes) as u64;
        if entry.byte_offset + PACKET_FRAME_OVERHEAD + stored_len > self.data_end {
            return Err(BcsvError::format(format!(
                "packet {k}: stored length {stored_len} overruns the file body"
            )));
        }
        let mut stored = vec![0u8; stored_len as usize];
        self.file.read_exact(&mut stored)?;
        let raw = self.payload_codec.decompress_next(&stored)?;
        let ck = checksum64(&raw);
        if self.sealed
            && k + 1 == self.footer.entries.len()
            && ck != self.footer.last_payload_checksum
        {
            return Err(BcsvError::checksum(format!(
                "last packet payload {ck:#018x} does not match the footer record"
            )));
        }
        self.last_payload = Some((k, ck));
        self.payload = raw;
        Ok(())
    }

    /// Stream framing: the body between header and footer is one payload.
    fn load_stream_body(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.body_start))?;
        let mut stored = vec![0u8; (self.data_end - self.body_start) as usize];
        self.file.read_exact(&mut stored)?;
        self.payload_codec.reset();
        let raw = self.payload_codec.decompress_next(&stored)?;
        let ck = checksum64(&raw);
        if self.sealed && ck != self.footer.last_payload_checksum {
            return Err(BcsvError::checksum(format!(
                "stream payload {ck:#018x} does not match the footer record"
            )));
        }
        self.last_payload = Some((0, ck));
        self.payload = raw;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unsealed-file recovery
// ─────────────────────────────────────────────────────────────────────────────

/// Forward scan over packet frames. Phase one walks headers and length
/// prefixes to find structurally complete packets; phase two decompresses
/// them in order, verifying the chain and counting rows, and stops at the
/// first packet that fails any check.
fn recover_packets(
    file: &mut BufReader<File>,
    header: &FileHeader,
    layout: &Arc<Layout>,
    body_start: u64,
    file_len: u64,
) -> Result<(FileFooter, u64)> {
    struct Candidate {
        offset: u64,
        header: PacketHeader,
        stored_len: u64,
    }

    let mut candidates = Vec::new();
    let mut offset = body_start;
    loop {
        if offset + PACKET_FRAME_OVERHEAD > file_len {
            break;
        }
        if file.seek(SeekFrom::Start(offset)).is_err() {
            break;
        }
        let mut frame = [0u8; PACKET_HEADER_SIZE + 4];
        if file.read_exact(&mut frame).is_err() {
            break;
        }
        let head: &[u8; PACKET_HEADER_SIZE] = frame[..PACKET_HEADER_SIZE].try_into().unwrap();
        let Ok(packet) = PacketHeader::decode(head) else {
            break;
        };
        let stored_len = u32::from_le_bytes(frame[PACKET_HEADER_SIZE..].try_into().unwrap()) as u64;
        if offset + PACKET_FRAME_OVERHEAD + stored_len > file_len {
            break;
        }
        candidates.push(Candidate {
            offset,
            header: packet,
            stored_len,
        });
        offset += PACKET_FRAME_OVERHEAD + stored_len;
    }

    let mut footer = FileFooter::new();
    let mut payload_codec = PayloadCodec::new(header.file_codec);
    let mut row_codec = make_row_codec(header.row_codec, layout);
    let mut probe = Row::new(layout.clone());
    let mut prev_checksum = 0u64;
    let mut total = 0u64;
    let mut end = body_start;

    for c in &candidates {
        if c.header.prev_payload_checksum != prev_checksum || c.header.first_row_index != total {
            break;
        }
        file.seek(SeekFrom::Start(c.offset + PACKET_FRAME_OVERHEAD))?;
        let mut stored = vec![0u8; c.stored_len as usize];
        if file.read_exact(&mut stored).is_err() {
            break;
        }
        let Ok(raw) = payload_codec.decompress_next(&stored) else {
            break;
        };
        row_codec.reset();
        let mut pos = 0usize;
        let mut rows = 0u64;
        let mut intact = true;
        loop {
            match row_codec.decode_row(&raw, &mut pos, &mut probe) {
                Ok(DecodeEvent::Row) => rows += 1,
                Ok(DecodeEvent::EndOfPayload) => break,
                Err(_) => {
                    intact = false;
                    break;
                }
            }
        }
        if !intact || rows == 0 {
            break;
        }
        footer
            .entries
            .push(PacketIndexEntry::new(c.offset, c.header.first_row_index));
        prev_checksum = checksum64(&raw);
        total += rows;
        end = c.offset + PACKET_FRAME_OVERHEAD + c.stored_len;
    }

    footer.total_row_count = total;
    footer.last_payload_checksum = prev_checksum;
    Ok((footer, end))
}

/// Stream framing recovery: decode the body as far as it goes.
fn recover_stream(
    file: &mut BufReader<File>,
    header: &FileHeader,
    layout: &Arc<Layout>,
    body_start: u64,
    file_len: u64,
) -> Result<(FileFooter, u64)> {
    let mut footer = FileFooter::new();
    if file_len <= body_start {
        return Ok((footer, file_len.max(body_start)));
    }
    file.seek(SeekFrom::Start(body_start))?;
    let mut stored = vec![0u8; (file_len - body_start) as usize];
    file.read_exact(&mut stored)?;
    let mut payload_codec = PayloadCodec::new(header.file_codec);
    let Ok(raw) = payload_codec.decompress_next(&stored) else {
        return Ok((footer, file_len));
    };
    let mut row_codec = make_row_codec(header.row_codec, layout);
    let mut probe = Row::new(layout.clone());
    let mut pos = 0usize;
    let mut rows = 0u64;
    loop {
        match row_codec.decode_row(&raw, &mut pos, &mut probe) {
            Ok(DecodeEvent::Row) => rows += 1,
            Ok(DecodeEvent::EndOfPayload) | Err(_) => break,
        }
    }
    if rows > 0 {
        footer.entries.push(PacketIndexEntry::new(body_start, 0));
        footer.total_row_count = rows;
        footer.last_payload_checksum = checksum64(&raw);
    }
    Ok((footer, file_len))
}
