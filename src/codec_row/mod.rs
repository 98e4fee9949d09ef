//! Row codecs: how one row becomes bytes inside a packet payload.
//!
//! Two codecs exist. Flat lays every cell out every time; zero-order-hold
//! encodes only the cells that changed since the previous row. Both share
//! the same scalar and string cell encodings, and both are driven through
//! the [`RowCodec`] trait so the writer and reader dispatch once per file,
//! not per cell.
//!
//! The per-column type schedule is fixed by the layout, so it is computed
//! once at codec construction and the decode hot loop never re-derives it.

pub mod flat;
pub mod zoh;

use std::sync::Arc;

use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, Layout};
use crate::row::{CellValue, Row};

pub use flat::FlatCodec;
pub use zoh::{ZohCodec, ZOH_EOF_SENTINEL, ZOH_REPEAT_SENTINEL};

// ─────────────────────────────────────────────────────────────────────────────
// Ids
// ─────────────────────────────────────────────────────────────────────────────

/// Wire id of a row codec, serialized into the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RowCodecId {
    Flat001 = 0,
    Zoh001 = 1,
}

impl RowCodecId {
    pub fn from_wire(id: u16) -> Result<Self> {
        match id {
            0 => Ok(RowCodecId::Flat001),
            1 => Ok(RowCodecId::Zoh001),
            other => Err(BcsvError::format(format!("unknown row codec id {other}"))),
        }
    }

    #[inline]
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            RowCodecId::Flat001 => "Flat001",
            RowCodecId::Zoh001 => "ZoH001",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RowCodec trait
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A row was decoded into the caller's buffer.
    Row,
    /// The payload ended before another row.
    EndOfPayload,
}

/// One row in, bytes out, and back again.
///
/// Codec state (the ZoH previous row) is scoped to a packet payload:
/// `reset` is called at every packet boundary on both sides, which is what
/// makes packets independently decodable.
pub trait RowCodec {
    fn id(&self) -> RowCodecId;

    /// Drops any cross-row state. Called when a packet is opened (reader)
    /// or closed (writer).
    fn reset(&mut self);

    /// Appends the encoding of `row` to `out`.
    fn encode_row(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes one row from `buf` at `*pos` into `row`, advancing `*pos`.
    /// Cells not covered by the record keep their previous values, which
    /// is how zero-order-hold carries unchanged cells forward.
    fn decode_row(&mut self, buf: &[u8], pos: &mut usize, row: &mut Row) -> Result<DecodeEvent>;

    /// Appends any payload terminator. Called once per packet payload,
    /// after the last row.
    fn finish_payload(&self, out: &mut Vec<u8>);
}

/// Instantiates the codec selected by `id` for `layout`.
pub fn make_row_codec(id: RowCodecId, layout: &Arc<Layout>) -> Box<dyn RowCodec> {
    match id {
        RowCodecId::Flat001 => Box::new(FlatCodec::new(layout.clone())),
        RowCodecId::Zoh001 => Box::new(ZohCodec::new(layout.clone())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared column schedule and cell encodings
// ─────────────────────────────────────────────────────────────────────────────

/// Column positions grouped by storage class, in column order within each
/// group.
#[derive(Debug, Clone)]
pub(crate) struct ColumnSchedule {
    /// Bool columns: bit-packed, never in the scalar area.
    pub bool_cols: Vec<usize>,
    /// Fixed-width scalar columns with their byte widths.
    pub scalar_cols: Vec<(usize, usize)>,
    /// String columns: length-prefixed.
    pub string_cols: Vec<usize>,
}

impl ColumnSchedule {
    pub fn new(layout: &Layout) -> Self {
        let mut bool_cols = Vec::new();
        let mut scalar_cols = Vec::new();
        let mut string_cols = Vec::new();
        for i in 0..layout.column_count() {
            match layout.column_type(i) {
                ColumnType::Bool => bool_cols.push(i),
                ColumnType::String => string_cols.push(i),
                ty => scalar_cols.push((i, ty.scalar_width().unwrap())),
            }
        }
        ColumnSchedule {
            bool_cols,
            scalar_cols,
            string_cols,
        }
    }

    /// Fixed byte cost of one flat row before string data: the bool
    /// bitmap plus every scalar.
    pub fn fixed_row_size(&self) -> usize {
        self.bool_cols.len().div_ceil(8) + self.scalar_cols.iter().map(|&(_, w)| w).sum::<usize>()
    }
}

/// Appends the little-endian bytes of a fixed-width scalar cell.
pub(crate) fn encode_scalar(cell: &CellValue, out: &mut Vec<u8>) {
    match cell {
        CellValue::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::UInt8(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        CellValue::Bool(_) | CellValue::Str(_) => {
            unreachable!("bool and string cells are not scalars")
        }
    }
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    if *pos + n > buf.len() {
        return Err(BcsvError::format(format!(
            "truncated payload: need {n} bytes at offset {}",
            *pos
        )));
    }
    let slice = &buf[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

/// Reads the little-endian bytes of one fixed-width scalar of type `ty`.
pub(crate) fn decode_scalar(ty: ColumnType, buf: &[u8], pos: &mut usize) -> Result<CellValue> {
    Ok(match ty {
        ColumnType::Int8 => CellValue::Int8(i8::from_le_bytes(take(buf, pos, 1)?.try_into().unwrap())),
        ColumnType::Int16 => {
            CellValue::Int16(i16::from_le_bytes(take(buf, pos, 2)?.try_into().unwrap()))
        }
        ColumnType::Int32 => {
            CellValue::Int32(i32::from_le_bytes(take(buf, pos, 4)?.try_into().unwrap()))
        }
        ColumnType::Int64 => {
            CellValue::Int64(i64::from_le_bytes(take(buf, pos, 8)?.try_into().unwrap()))
        }
        ColumnType::UInt8 => {
            CellValue::UInt8(u8::from_le_bytes(take(buf, pos, 1)?.try_into().unwrap()))
        }
        ColumnType::UInt16 => {
            CellValue::UInt16(u16::from_le_bytes(take(buf, pos, 2)?.try_into().unwrap()))
        }
        ColumnType::UInt32 => {
            CellValue::UInt32(u32::from_le_bytes(take(buf, pos, 4)?.try_into().unwrap()))
        }
        ColumnType::UInt64 => {
            CellValue::UInt64(u64::from_le_bytes(take(buf, pos, 8)?.try_into().unwrap()))
        }
        ColumnType::Float => {
            CellValue::Float(f32::from_le_bytes(take(buf, pos, 4)?.try_into().unwrap()))
        }
        ColumnType::Double => {
            CellValue::Double(f64::from_le_bytes(take(buf, pos, 8)?.try_into().unwrap()))
        }
        ColumnType::Bool | ColumnType::String => {
            unreachable!("bool and string cells are not scalars")
        }
    })
}

/// Appends a length-prefixed string cell: `u32` byte length, then UTF-8
/// bytes. The fixed u32 prefix is part of the frozen wire format.
pub(crate) fn encode_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Reads a length-prefixed string cell.
pub(crate) fn decode_string(buf: &[u8], pos: &mut usize) -> Result<String> {
    let len = u32::from_le_bytes(take(buf, pos, 4)?.try_into().unwrap()) as usize;
    let bytes = take(buf, pos, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| BcsvError::format("string cell is not valid UTF-8"))
}
