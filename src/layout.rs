//! Column schema: an ordered list of typed, named columns with a
//! name-to-index map kept in lockstep.
//!
//! The map is exactly the inverse of the positional name lookup at all
//! times. `add_column`, `remove_column`, and `set_name` each rebuild or
//! patch the map so the invariant survives any call sequence; a desync here
//! would be an internal bug, so those paths use debug assertions rather
//! than returned errors.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use crate::error::{BcsvError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// ColumnType
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of cell types supported by the format.
///
/// The discriminant is the wire id serialized into the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    /// 32-bit IEEE-754.
    Float = 9,
    /// 64-bit IEEE-754.
    Double = 10,
    /// UTF-8 byte sequence, length-prefixed on the wire.
    String = 11,
}

impl ColumnType {
    /// Decodes a wire id back into a type.
    pub fn from_wire(id: u8) -> Result<Self> {
        use ColumnType::*;
        Ok(match id {
            0 => Bool,
            1 => Int8,
            2 => Int16,
            3 => Int32,
            4 => Int64,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => UInt64,
            9 => Float,
            10 => Double,
            11 => String,
            other => return Err(BcsvError::format(format!("unknown column type id {other}"))),
        })
    }

    /// Wire id of this type.
    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Serialized width in bytes for fixed-width scalars. `None` for
    /// `Bool` (bit-packed) and `String` (length-prefixed).
    pub fn scalar_width(self) -> Option<usize> {
        use ColumnType::*;
        match self {
            Int8 | UInt8 => Some(1),
            Int16 | UInt16 => Some(2),
            Int32 | UInt32 | Float => Some(4),
            Int64 | UInt64 | Double => Some(8),
            Bool | String => None,
        }
    }

    /// Human-readable name, as printed by the CLI tools.
    pub fn name(self) -> &'static str {
        use ColumnType::*;
        match self {
            Bool => "BOOL",
            Int8 => "INT8",
            Int16 => "INT16",
            Int32 => "INT32",
            Int64 => "INT64",
            UInt8 => "UINT8",
            UInt16 => "UINT16",
            UInt32 => "UINT32",
            UInt64 => "UINT64",
            Float => "FLOAT",
            Double => "DOUBLE",
            String => "STRING",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered sequence of columns with unique non-empty names.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Layout {
    pub fn new() -> Self {
        Layout::default()
    }

    /// Builds a layout from `(name, type)` pairs.
    pub fn from_columns<I>(cols: I) -> Result<Self>
    where
        I: IntoIterator<Item = Column>,
    {
        let mut layout = Layout::new();
        for c in cols {
            layout.add_column(c)?;
        }
        Ok(layout)
    }

    /// Appends a column. Fails if the name is empty or already present.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if column.name.is_empty() {
            return Err(BcsvError::format("column name must not be empty"));
        }
        if self.index.contains_key(&column.name) {
            return Err(BcsvError::format(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
        self.index.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        self.debug_check_sync();
        Ok(())
    }

    /// Removes column `i`, shifting successors down and rebuilding the
    /// name map.
    pub fn remove_column(&mut self, i: usize) -> Result<()> {
        if i >= self.columns.len() {
            return Err(BcsvError::range(format!(
                "column index {i} out of range (count {})",
                self.columns.len()
            )));
        }
        let removed = self.columns.remove(i);
        self.index.remove(&removed.name);
        for (pos, c) in self.columns.iter().enumerate().skip(i) {
            self.index.insert(c.name.clone(), pos);
        }
        self.debug_check_sync();
        Ok(())
    }

    /// Renames column `i`. Fails on an empty name or a collision with a
    /// different column.
    pub fn set_name(&mut self, i: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if i >= self.columns.len() {
            return Err(BcsvError::range(format!(
                "column index {i} out of range (count {})",
                self.columns.len()
            )));
        }
        if name.is_empty() {
            return Err(BcsvError::format("column name must not be empty"));
        }
        if let Some(&existing) = self.index.get(&name) {
            if existing != i {
                return Err(BcsvError::format(format!("duplicate column name '{name}'")));
            }
            return Ok(()); // renaming to itself
        }
        let old = std::mem::replace(&mut self.columns[i].name, name.clone());
        self.index.remove(&old);
        self.index.insert(name, i);
        self.debug_check_sync();
        Ok(())
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Name of column `i`.
    ///
    /// # Panics
    /// If `i >= column_count()`.
    #[inline]
    pub fn name(&self, i: usize) -> &str {
        &self.columns[i].name
    }

    /// Type of column `i`.
    ///
    /// # Panics
    /// If `i >= column_count()`.
    #[inline]
    pub fn column_type(&self, i: usize) -> ColumnType {
        self.columns[i].ty
    }

    /// Position of the column named `name`, if any.
    #[inline]
    pub fn index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Type-sequence compatibility: names may differ.
    pub fn is_compatible(&self, other: &Layout) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.ty == b.ty)
    }

    fn debug_check_sync(&self) {
        debug_assert_eq!(self.index.len(), self.columns.len());
        debug_assert!(self
            .columns
            .iter()
            .enumerate()
            .all(|(i, c)| self.index.get(&c.name) == Some(&i)));
    }

    // ── Wire form ────────────────────────────────────────────────────────
    //
    // u32 column_count, then per column: u16 name_len, name bytes (UTF-8,
    // no terminator), u8 type id. Little-endian throughout.

    /// Appends the serialized layout to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for c in &self.columns {
            buf.extend_from_slice(&(c.name.len() as u16).to_le_bytes());
            buf.extend_from_slice(c.name.as_bytes());
            buf.push(c.ty.to_wire());
        }
    }

    /// Serialized size in bytes.
    pub fn encoded_size(&self) -> usize {
        4 + self
            .columns
            .iter()
            .map(|c| 2 + c.name.len() + 1)
            .sum::<usize>()
    }

    /// Reads a serialized layout from `r`, mirroring every consumed byte
    /// into `raw` so the caller can checksum the exact wire bytes.
    pub fn read_wire<R: Read>(r: &mut R, raw: &mut Vec<u8>) -> Result<Layout> {
        let mut count_bytes = [0u8; 4];
        r.read_exact(&mut count_bytes)?;
        raw.extend_from_slice(&count_bytes);
        let count = u32::from_le_bytes(count_bytes) as usize;

        let mut layout = Layout::new();
        for _ in 0..count {
            let mut len_bytes = [0u8; 2];
            r.read_exact(&mut len_bytes)?;
            raw.extend_from_slice(&len_bytes);
            let name_len = u16::from_le_bytes(len_bytes) as usize;

            let mut name_bytes = vec![0u8; name_len];
            r.read_exact(&mut name_bytes)?;
            raw.extend_from_slice(&name_bytes);
            let name = String::from_utf8(name_bytes)
                .map_err(|_| BcsvError::format("column name is not valid UTF-8"))?;

            let mut ty_byte = [0u8; 1];
            r.read_exact(&mut ty_byte)?;
            raw.extend_from_slice(&ty_byte);
            let ty = ColumnType::from_wire(ty_byte[0])?;

            layout.add_column(Column::new(name, ty))?;
        }
        Ok(layout)
    }
}

/// Equality compares both the type sequence and the name sequence.
impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Layout {}
