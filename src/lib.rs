//! BCSV: a binary columnar row-store file format.
//!
//! A compact, schema-declared, compressed alternative to CSV for
//! structured tabular telemetry. Files carry framed, checksummed packets
//! of encoded rows plus a footer index, so readers can random-access any
//! row without scanning from the start.
//!
//! ```no_run
//! use bcsv::{Column, ColumnType, Layout, Reader, Writer};
//!
//! # fn main() -> bcsv::Result<()> {
//! let mut layout = Layout::new();
//! layout.add_column(Column::new("id", ColumnType::Int32))?;
//! layout.add_column(Column::new("name", ColumnType::String))?;
//!
//! let mut writer = Writer::new(layout);
//! writer.open("people.bcsv", true)?;
//! writer.row().set(0, 1i32)?;
//! writer.row().set(1, "Alice".to_string())?;
//! writer.write_row()?;
//! writer.close()?;
//!
//! let mut reader = Reader::new();
//! reader.open("people.bcsv")?;
//! while reader.read_next()? {
//!     println!("{}", reader.row().get::<i32>(0)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bitvec;
pub mod checksum;
pub mod codec_row;
pub mod error;
pub mod file;
pub mod layout;
pub mod reader;
pub mod row;
pub mod sampler;
pub mod writer;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the common API surface.
// ─────────────────────────────────────────────────────────────────────────────

pub use bitvec::{BitVec, Bits, FixedBitVec};
pub use codec_row::{RowCodecId, ZOH_EOF_SENTINEL, ZOH_REPEAT_SENTINEL};
pub use error::{BcsvError, Result};
pub use file::{
    resolve_file_codec_id, Compression, FileCodecId, FileFlags, FileFooter, FileHeader, Framing,
    PacketHeader, PacketIndexEntry,
};
pub use layout::{Column, ColumnType, Layout};
pub use reader::Reader;
pub use row::{CellValue, Row};
pub use sampler::{CompileResult, RowRead, Sampler};
pub use writer::{Writer, WriterOptions};
