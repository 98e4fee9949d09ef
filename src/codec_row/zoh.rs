//! Zero-order-hold row codec: when consecutive rows are largely
//! identical, emit only the cells that changed.
//!
//! One record encodes as:
//!
//! ```text
//! [ change mask: ceil((columns+1)/8) bytes ]
//! [ changed bools: ceil(changed_bools/8) bytes, in column order ]
//! [ changed scalars: fixed-width little-endian, in column order ]
//! [ changed strings: u32 length + UTF-8 bytes, in column order ]
//! ```
//!
//! Bit 0 of the change mask is a record bit and is always 1; column `c`
//! maps to bit `c + 1` (LSB-first packing). The first byte of every
//! normal record is therefore odd, which is what lets the two sentinel
//! bytes below be told apart from a mask for any layout width.
//!
//! A row identical to its predecessor is written as the single byte
//! [`ZOH_REPEAT_SENTINEL`]; [`ZOH_EOF_SENTINEL`] terminates a packet
//! payload. Cell equality is computed across all columns, bools included:
//! bools live in the presence-style bitmap rather than the scalar area,
//! but a bool-only transition is still a changed row.
//!
//! The first row of a packet is always emitted in full (all mask bits
//! set), so a reader can start decoding at any packet boundary without
//! prior context.

use std::sync::Arc;

use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, Layout};
use crate::row::{CellValue, Row};

use super::{
    decode_scalar, decode_string, encode_scalar, encode_string, ColumnSchedule, DecodeEvent,
    RowCodec, RowCodecId,
};

/// Single-byte record meaning "this row equals the previous row".
/// Even, so it can never be the first byte of a change mask.
pub const ZOH_REPEAT_SENTINEL: u8 = 0xFE;

/// Single-byte record terminating a packet payload. Even, and distinct
/// from the repeat sentinel.
pub const ZOH_EOF_SENTINEL: u8 = 0xFC;

pub struct ZohCodec {
    layout: Arc<Layout>,
    schedule: ColumnSchedule,
    mask_bytes: usize,
    /// Encoder side: the previously encoded row.
    prev: Option<Row>,
    /// Decoder side: whether the caller's row buffer holds a decoded row.
    primed: bool,
}

impl ZohCodec {
    pub fn new(layout: Arc<Layout>) -> Self {
        let schedule = ColumnSchedule::new(&layout);
        let mask_bytes = (layout.column_count() + 1).div_ceil(8);
        ZohCodec {
            layout,
            schedule,
            mask_bytes,
            prev: None,
            primed: false,
        }
    }

    #[inline]
    fn mask_test(mask: &[u8], col: usize) -> bool {
        let bit = col + 1;
        mask[bit / 8] >> (bit % 8) & 1 == 1
    }

    #[inline]
    fn mask_set(mask: &mut [u8], col: usize) {
        let bit = col + 1;
        mask[bit / 8] |= 1 << (bit % 8);
    }
}

impl RowCodec for ZohCodec {
    fn id(&self) -> RowCodecId {
        RowCodecId::Zoh001
    }

    fn reset(&mut self) {
        self.prev = None;
        self.primed = false;
    }

    fn encode_row(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()> {
        let cols = self.layout.column_count();

        if let Some(prev) = &self.prev {
            if row.values_equal(prev) {
                out.push(ZOH_REPEAT_SENTINEL);
                return Ok(());
            }
        }

        let mask_at = out.len();
        out.resize(mask_at + self.mask_bytes, 0);
        out[mask_at] |= 1; // record bit
        let mut changed = vec![false; cols];
        match &self.prev {
            Some(prev) => {
                for c in 0..cols {
                    if row.value(c) != prev.value(c) {
                        changed[c] = true;
                    }
                }
            }
            None => changed.fill(true), // packet opener: full row
        }
        for c in 0..cols {
            if changed[c] {
                Self::mask_set(&mut out[mask_at..mask_at + self.mask_bytes], c);
            }
        }

        let changed_bools: Vec<usize> = self
            .schedule
            .bool_cols
            .iter()
            .copied()
            .filter(|&c| changed[c])
            .collect();
        if !changed_bools.is_empty() {
            let bitmap_at = out.len();
            out.resize(bitmap_at + changed_bools.len().div_ceil(8), 0);
            for (j, &c) in changed_bools.iter().enumerate() {
                if matches!(row.value(c), CellValue::Bool(true)) {
                    out[bitmap_at + j / 8] |= 1 << (j % 8);
                }
            }
        }
        for &(c, _) in &self.schedule.scalar_cols {
            if changed[c] {
                encode_scalar(row.value(c), out);
            }
        }
        for &c in &self.schedule.string_cols {
            if changed[c] {
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
        }

        match &mut self.prev {
            Some(prev) => prev.copy_from(row)?,
            None => self.prev = Some(row.clone()),
        }
        Ok(())
    }

    fn decode_row(&mut self, buf: &[u8], pos: &mut usize, row: &mut Row) -> Result<DecodeEvent> {
        if *pos >= buf.len() {
            return Ok(DecodeEvent::EndOfPayload);
        }
        match buf[*pos] {
            ZOH_EOF_SENTINEL => {
                *pos += 1;
                return Ok(DecodeEvent::EndOfPayload);
            }
            ZOH_REPEAT_SENTINEL => {
                if !self.primed {
                    return Err(BcsvError::format(
                        "repeat record with no previous row in packet",
                    ));
                }
                *pos += 1;
                return Ok(DecodeEvent::Row);
            }
            first if first & 1 == 0 => {
                return Err(BcsvError::format(format!(
                    "invalid record marker byte {first:#04x}"
                )));
            }
            _ => {}
        }

        if *pos + self.mask_bytes > buf.len() {
            return Err(BcsvError::format("truncated payload in change mask"));
        }
        let mask = buf[*pos..*pos + self.mask_bytes].to_vec();
        *pos += self.mask_bytes;

        let cols = self.layout.column_count();
        if !self.primed {
            let all = (0..cols).all(|c| Self::mask_test(&mask, c));
            if !all {
                return Err(BcsvError::format(
                    "packet payload does not begin with a full row",
                ));
            }
        }

        let changed_bools: Vec<usize> = self
            .schedule
            .bool_cols
            .iter()
            .copied()
            .filter(|&c| Self::mask_test(&mask, c))
            .collect();
        if !changed_bools.is_empty() {
            let nbytes = changed_bools.len().div_ceil(8);
            if *pos + nbytes > buf.len() {
                return Err(BcsvError::format("truncated payload in bool bitmap"));
            }
            let bitmap = &buf[*pos..*pos + nbytes];
            *pos += nbytes;
            for (j, &c) in changed_bools.iter().enumerate() {
                let v = bitmap[j / 8] >> (j % 8) & 1 == 1;
                row.set_value(c, CellValue::Bool(v))?;
            }
        }
        for &(c, _) in &self.schedule.scalar_cols {
            if Self::mask_test(&mask, c) {
                let cell = decode_scalar(self.layout.column_type(c), buf, pos)?;
                row.set_value(c, cell)?;
            }
        }
        for &c in &self.schedule.string_cols {
            if Self::mask_test(&mask, c) {
                debug_assert_eq!(self.layout.column_type(c), ColumnType::String);
                let s = decode_string(buf, pos)?;
                row.set_value(c, CellValue::Str(s))?;
            }
        }

        self.primed = true;
        Ok(DecodeEvent::Row)
    }

    fn finish_payload(&self, out: &mut Vec<u8>) {
        out.push(ZOH_EOF_SENTINEL);
    }
}
