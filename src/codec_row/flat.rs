//! Flat row codec: fixed-width layout over a bit-packed bool bitmap.
//!
//! One row encodes as:
//!
//! ```text
//! [ bool bitmap: ceil(bools/8) bytes, bools in column order, LSB first ]
//! [ scalars: fixed-width little-endian, in column order ]
//! [ strings: u32 length + UTF-8 bytes, in column order ]
//! ```
//!
//! The encoded size depends only on the layout plus string byte counts,
//! which the writer uses to size packet payload buffers. The codec is
//! stateless; `reset` is a no-op.

use std::sync::Arc;

use crate::error::{BcsvError, Result};
use crate::layout::Layout;
use crate::row::{CellValue, Row};

use super::{
    decode_scalar, decode_string, encode_scalar, encode_string, ColumnSchedule, DecodeEvent,
    RowCodec, RowCodecId,
};

pub struct FlatCodec {
    layout: Arc<Layout>,
    schedule: ColumnSchedule,
    bitmap_bytes: usize,
}

impl FlatCodec {
    pub fn new(layout: Arc<Layout>) -> Self {
        let schedule = ColumnSchedule::new(&layout);
        let bitmap_bytes = schedule.bool_cols.len().div_ceil(8);
        FlatCodec {
            layout,
            schedule,
            bitmap_bytes,
        }
    }

    /// Byte cost of `row` under this codec.
    pub fn encoded_size(&self, row: &Row) -> usize {
        let strings: usize = self
            .schedule
            .string_cols
            .iter()
            .map(|&c| match row.value(c) {
                CellValue::Str(s) => 4 + s.len(),
                _ => 4,
            })
            .sum();
        self.schedule.fixed_row_size() + strings
    }
}

impl RowCodec for FlatCodec {
    fn id(&self) -> RowCodecId {
        RowCodecId::Flat001
    }

    fn reset(&mut self) {}

    fn encode_row(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()> {
        let bitmap_at = out.len();
        out.resize(bitmap_at + self.bitmap_bytes, 0);
        for (j, &c) in self.schedule.bool_cols.iter().enumerate() {
            if matches!(row.value(c), CellValue::Bool(true)) {
                out[bitmap_at + j / 8] |= 1 << (j % 8);
            }
        }
        for &(c, _) in &self.schedule.scalar_cols {
            encode_scalar(row.value(c), out);
        }
        for &c in &self.schedule.string_cols {
            match row.value(c) {
                CellValue::Str(s) => encode_string(s, out),
                other => {
                    return Err(BcsvError::format(format!(
                        "column {c} holds {} where the layout declares STRING",
                        other.column_type()
                    )))
                }
            }
        }
        Ok(())
    }

    fn decode_row(&mut self, buf: &[u8], pos: &mut usize, row: &mut Row) -> Result<DecodeEvent> {
        if *pos >= buf.len() {
            return Ok(DecodeEvent::EndOfPayload);
        }
        if *pos + self.bitmap_bytes > buf.len() {
            return Err(BcsvError::format("truncated payload in bool bitmap"));
        }
        let bitmap = &buf[*pos..*pos + self.bitmap_bytes];
        *pos += self.bitmap_bytes;
        for (j, &c) in self.schedule.bool_cols.iter().enumerate() {
            let v = bitmap[j / 8] >> (j % 8) & 1 == 1;
            row.set_value(c, CellValue::Bool(v))?;
        }
        for &(c, _) in &self.schedule.scalar_cols {
            let cell = decode_scalar(self.layout.column_type(c), buf, pos)?;
            row.set_value(c, cell)?;
        }
        for &c in &self.schedule.string_cols {
            let s = decode_string(buf, pos)?;
            row.set_value(c, CellValue::Str(s))?;
        }
        Ok(DecodeEvent::Row)
    }

    fn finish_payload(&self, _out: &mut Vec<u8>) {}
}
