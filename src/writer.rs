//! Writer: row staging, packet assembly, compression, and the footer
//! index, behind a `Closed -> Open -> Closed` state machine.
//!
//! Rows are staged in a mutable [`Row`], committed with
//! [`Writer::write_row`], and accumulate in an in-memory payload buffer.
//! A packet flushes when the payload reaches the block size, on an
//! explicit [`Writer::flush`], or at [`Writer::close`]. Packet headers are
//! written only after their payload is checksummed and sized, so an
//! interrupted writer leaves a file readable up to its last complete
//! packet.
//!
//! `close` seals the file with the footer and is idempotent; dropping an
//! open writer closes it best-effort.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::checksum::checksum64;
use crate::codec_row::{make_row_codec, RowCodec, RowCodecId};
use crate::error::{BcsvError, Result};
use crate::file::codec::{FileCodecId, Framing, PayloadCodec};
use crate::file::footer::{FileFooter, PacketIndexEntry};
use crate::file::header::{FileFlags, FileHeader};
use crate::file::packet::{PacketHeader, PACKET_HEADER_SIZE};
use crate::layout::Layout;
use crate::row::Row;

/// Payload size that triggers a packet flush when no block size is given.
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

/// Codec and framing configuration for a new file.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub file_codec: FileCodecId,
    pub row_codec: RowCodecId,
    /// Recorded in the header; 0..=22.
    pub compression_level: u8,
    /// Packet flush threshold in payload bytes; 0 selects
    /// [`DEFAULT_BLOCK_SIZE`].
    pub block_size: u32,
    pub flags: FileFlags,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            file_codec: FileCodecId::PacketLz4001,
            row_codec: RowCodecId::Flat001,
            compression_level: 1,
            block_size: DEFAULT_BLOCK_SIZE,
            flags: FileFlags::NONE,
        }
    }
}

impl WriterOptions {
    /// Zero-order-hold preset over the default packet codec.
    pub fn zoh() -> Self {
        WriterOptions {
            row_codec: RowCodecId::Zoh001,
            ..WriterOptions::default()
        }
    }
}

struct WriterState {
    file: BufWriter<std::fs::File>,
    path: PathBuf,
    payload: Vec<u8>,
    payload_codec: PayloadCodec,
    row_codec: Box<dyn RowCodec>,
    block_size: u32,
    /// Absolute row index of the first row in the packet being assembled.
    packet_first_row: u64,
    rows_in_packet: u64,
    prev_payload_checksum: u64,
    /// Current file offset.
    offset: u64,
    footer: FileFooter,
}

/// Appends rows to one BCSV file.
pub struct Writer {
    layout: Arc<Layout>,
    staging: Row,
    opts: WriterOptions,
    inner: Option<WriterState>,
    row_count: u64,
}

impl Writer {
    /// A closed writer for `layout` with default options.
    pub fn new(layout: Layout) -> Self {
        Writer::with_options(layout, WriterOptions::default())
    }

    pub fn with_options(layout: Layout, opts: WriterOptions) -> Self {
        let layout = Arc::new(layout);
        let staging = Row::new(layout.clone());
        Writer {
            layout,
            staging,
            opts,
            inner: None,
            row_count: 0,
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Rows committed to the current file.
    #[inline]
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    #[inline]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Mutable access to the staging row. Cells set here are committed by
    /// the next [`Writer::write_row`].
    #[inline]
    pub fn row(&mut self) -> &mut Row {
        &mut self.staging
    }

    /// Creates the file and writes its header. Fails if the writer is
    /// already open, or if the file exists and `overwrite` is false.
    pub fn open(&mut self, path: impl AsRef<Path>, overwrite: bool) -> Result<()> {
        if self.inner.is_some() {
            return Err(BcsvError::state("writer is already open"));
        }
        if self.opts.compression_level > crate::file::header::MAX_COMPRESSION_LEVEL {
            return Err(BcsvError::format(format!(
                "compression level {} out of range",
                self.opts.compression_level
            )));
        }
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(path)?;
        let mut file = BufWriter::new(file);

        let mut flags = self.opts.flags;
        if self.opts.row_codec == RowCodecId::Zoh001 {
            flags.insert(FileFlags::ZERO_ORDER_HOLD);
        }
        let block_size = if self.opts.block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            self.opts.block_size
        };
        let header = FileHeader::new(
            (*self.layout).clone(),
            self.opts.file_codec,
            self.opts.row_codec,
            self.opts.compression_level,
            block_size,
            flags,
        );
        let offset = header.write_to(&mut file)?;

        self.inner = Some(WriterState {
            file,
            path: path.to_path_buf(),
            payload: Vec::with_capacity(block_size as usize),
            payload_codec: PayloadCodec::new(self.opts.file_codec),
            row_codec: make_row_codec(self.opts.row_codec, &self.layout),
            block_size,
            packet_first_row: 0,
            rows_in_packet: 0,
            prev_payload_checksum: 0,
            offset,
            footer: FileFooter::new(),
        });
        self.row_count = 0;
        self.staging = Row::new(self.layout.clone());
        debug!(
            "opened {} for writing ({} / {})",
            path.display(),
            self.opts.file_codec.name(),
            self.opts.row_codec.name()
        );
        Ok(())
    }

    /// Commits the staging row. A failure closes the writer; the file
    /// stays readable up to its last complete packet.
    pub fn write_row(&mut self) -> Result<()> {
        let state = self
            .inner
            .as_mut()
            .ok_or_else(|| BcsvError::state("write_row on a closed writer"))?;
        let result: Result<()> = (|| {
            state.row_codec.encode_row(&self.staging, &mut state.payload)?;
            state.rows_in_packet += 1;
            if state.payload_codec_framing() == Framing::Packet
                && state.payload.len() >= state.block_size as usize
            {
                state.flush_packet()?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.row_count += 1;
                self.staging.clear_presence();
                Ok(())
            }
            Err(e) => {
                self.inner = None;
                Err(e)
            }
        }
    }

    /// Copies an external row into the staging row, then commits it.
    pub fn write(&mut self, row: &Row) -> Result<()> {
        self.staging.copy_from(row)?;
        self.write_row()
    }

    /// Closes the packet being assembled, if it holds any rows. A no-op
    /// under stream framing, where the body is one payload written at
    /// close.
    pub fn flush(&mut self) -> Result<()> {
        let state = self
            .inner
            .as_mut()
            .ok_or_else(|| BcsvError::state("flush on a closed writer"))?;
        if state.payload_codec_framing() == Framing::Stream {
            debug!("flush ignored under stream framing");
            return Ok(());
        }
        match state.flush_packet() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner = None;
                Err(e)
            }
        }
    }

    /// Flushes any pending packet and seals the file with its footer.
    /// Idempotent: closing a closed writer is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.inner.take() else {
            return Ok(());
        };
        match state.payload_codec_framing() {
            Framing::Packet => state.flush_packet()?,
            Framing::Stream => state.flush_stream_body()?,
        }
        state.footer.total_row_count = self.row_count;
        state.footer.last_payload_checksum = state.prev_payload_checksum;
        state.footer.write_to(&mut state.file)?;
        state.file.flush()?;
        debug!(
            "sealed {} ({} rows, {} packets)",
            state.path.display(),
            self.row_count,
            state.footer.entries.len()
        );
        Ok(())
    }
}

impl WriterState {
    fn payload_codec_framing(&self) -> Framing {
        self.payload_codec.file_codec().framing()
    }

    /// Steps 1..6 of a packet flush: checksum, compress, header, payload,
    /// directory entry, reset.
    fn flush_packet(&mut self) -> Result<()> {
        if self.rows_in_packet == 0 {
            return Ok(());
        }
        self.row_codec.finish_payload(&mut self.payload);
        let payload_checksum = checksum64(&self.payload);
        let stored = self.payload_codec.compress_next(&self.payload);

        let header = PacketHeader::new(self.packet_first_row, self.prev_payload_checksum);
        header.write_to(&mut self.file)?;
        self.file.write_all(&(stored.len() as u32).to_le_bytes())?;
        self.file.write_all(&stored)?;

        self.footer
            .entries
            .push(PacketIndexEntry::new(self.offset, self.packet_first_row));
        debug!(
            "packet {} flushed: rows [{}, {}), {} -> {} bytes",
            self.footer.entries.len() - 1,
            self.packet_first_row,
            self.packet_first_row + self.rows_in_packet,
            self.payload.len(),
            stored.len()
        );

        self.offset += (PACKET_HEADER_SIZE + 4 + stored.len()) as u64;
        self.prev_payload_checksum = payload_checksum;
        self.packet_first_row += self.rows_in_packet;
        self.rows_in_packet = 0;
        self.payload.clear();
        self.row_codec.reset();
        Ok(())
    }

    /// Stream framing: the whole body is one payload written at close.
    fn flush_stream_body(&mut self) -> Result<()> {
        if self.rows_in_packet == 0 {
            return Ok(());
        }
        self.row_codec.finish_payload(&mut self.payload);
        let payload_checksum = checksum64(&self.payload);
        let stored = self.payload_codec.compress_next(&self.payload);
        let body_start = self.offset;
        self.file.write_all(&stored)?;
        self.footer
            .entries
            .push(PacketIndexEntry::new(body_start, 0));
        self.offset += stored.len() as u64;
        self.prev_payload_checksum = payload_checksum;
        self.rows_in_packet = 0;
        self.payload.clear();
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.close() {
                warn!("writer close failed in drop: {e}");
            }
        }
    }
}
