//! Typed cell storage for one row.
//!
//! Cells are a tagged variant over the twelve primitive types, so the codec
//! hot loops dispatch on one `match` instead of a per-type template zoo.
//! A row is created against a [`Layout`] and shares it via `Arc`; writer,
//! reader, and sampler rows over the same file all point at one layout.
//!
//! Presence bits track which cells were explicitly assigned since the last
//! [`Row::clear_presence`]. They are a row-builder concept and are kept
//! strictly separate from any codec change mask.

use std::fmt;
use std::sync::Arc;

use crate::bitvec::{BitVec, Bits};
use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, Layout};

// ─────────────────────────────────────────────────────────────────────────────
// CellValue
// ─────────────────────────────────────────────────────────────────────────────

/// One cell: a value of exactly one supported column type.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl CellValue {
    /// The column type this value inhabits.
    pub fn column_type(&self) -> ColumnType {
        use CellValue::*;
        match self {
            Bool(_) => ColumnType::Bool,
            Int8(_) => ColumnType::Int8,
            Int16(_) => ColumnType::Int16,
            Int32(_) => ColumnType::Int32,
            Int64(_) => ColumnType::Int64,
            UInt8(_) => ColumnType::UInt8,
            UInt16(_) => ColumnType::UInt16,
            UInt32(_) => ColumnType::UInt32,
            UInt64(_) => ColumnType::UInt64,
            Float(_) => ColumnType::Float,
            Double(_) => ColumnType::Double,
            Str(_) => ColumnType::String,
        }
    }

    /// Zero value of the given type.
    pub fn default_for(ty: ColumnType) -> CellValue {
        match ty {
            ColumnType::Bool => CellValue::Bool(false),
            ColumnType::Int8 => CellValue::Int8(0),
            ColumnType::Int16 => CellValue::Int16(0),
            ColumnType::Int32 => CellValue::Int32(0),
            ColumnType::Int64 => CellValue::Int64(0),
            ColumnType::UInt8 => CellValue::UInt8(0),
            ColumnType::UInt16 => CellValue::UInt16(0),
            ColumnType::UInt32 => CellValue::UInt32(0),
            ColumnType::UInt64 => CellValue::UInt64(0),
            ColumnType::Float => CellValue::Float(0.0),
            ColumnType::Double => CellValue::Double(0.0),
            ColumnType::String => CellValue::Str(String::new()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CellValue::*;
        match self {
            Bool(v) => write!(f, "{v}"),
            Int8(v) => write!(f, "{v}"),
            Int16(v) => write!(f, "{v}"),
            Int32(v) => write!(f, "{v}"),
            Int64(v) => write!(f, "{v}"),
            UInt8(v) => write!(f, "{v}"),
            UInt16(v) => write!(f, "{v}"),
            UInt32(v) => write!(f, "{v}"),
            UInt64(v) => write!(f, "{v}"),
            Float(v) => write!(f, "{v}"),
            Double(v) => write!(f, "{v}"),
            Str(v) => f.write_str(v),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cell: Rust type <-> CellValue bridge for typed access
// ─────────────────────────────────────────────────────────────────────────────

/// Rust types that map onto exactly one [`ColumnType`].
///
/// Powers the typed accessors (`Row::get`, `Row::set`, the typed bulk
/// visitors). The runtime type check compares `Self::TYPE` against the
/// layout once per call.
pub trait Cell: Sized {
    const TYPE: ColumnType;
    fn into_cell(self) -> CellValue;
    fn from_cell(cell: &CellValue) -> Option<Self>;
    fn cell_ref(cell: &CellValue) -> Option<&Self>;
    fn cell_mut(cell: &mut CellValue) -> Option<&mut Self>;
}

macro_rules! impl_cell {
    ($rust:ty, $variant:ident, $ctype:ident) => {
        impl Cell for $rust {
            const TYPE: ColumnType = ColumnType::$ctype;

            #[inline]
            fn into_cell(self) -> CellValue {
                CellValue::$variant(self)
            }

            #[inline]
            fn from_cell(cell: &CellValue) -> Option<Self> {
                match cell {
                    CellValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            #[inline]
            fn cell_ref(cell: &CellValue) -> Option<&Self> {
                match cell {
                    CellValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn cell_mut(cell: &mut CellValue) -> Option<&mut Self> {
                match cell {
                    CellValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_cell!(bool, Bool, Bool);
impl_cell!(i8, Int8, Int8);
impl_cell!(i16, Int16, Int16);
impl_cell!(i32, Int32, Int32);
impl_cell!(i64, Int64, Int64);
impl_cell!(u8, UInt8, UInt8);
impl_cell!(u16, UInt16, UInt16);
impl_cell!(u32, UInt32, UInt32);
impl_cell!(u64, UInt64, UInt64);
impl_cell!(f32, Float, Float);
impl_cell!(f64, Double, Double);
impl_cell!(String, Str, String);

// ─────────────────────────────────────────────────────────────────────────────
// Row
// ─────────────────────────────────────────────────────────────────────────────

/// One record conforming to a [`Layout`].
#[derive(Debug, Clone)]
pub struct Row {
    layout: Arc<Layout>,
    cells: Vec<CellValue>,
    presence: BitVec,
}

impl Row {
    /// Zero-valued row for `layout`, all presence bits clear.
    pub fn new(layout: Arc<Layout>) -> Self {
        let cells = (0..layout.column_count())
            .map(|i| CellValue::default_for(layout.column_type(i)))
            .collect();
        let presence = BitVec::new(layout.column_count());
        Row {
            layout,
            cells,
            presence,
        }
    }

    #[inline]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.cells.len()
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.cells.len() {
            return Err(BcsvError::range(format!(
                "column index {i} out of range (count {})",
                self.cells.len()
            )));
        }
        Ok(())
    }

    fn check_type(&self, i: usize, ty: ColumnType) -> Result<()> {
        let actual = self.layout.column_type(i);
        if actual != ty {
            return Err(BcsvError::range(format!(
                "column {i} ('{}') holds {actual}, accessed as {ty}",
                self.layout.name(i)
            )));
        }
        Ok(())
    }

    /// Typed read of cell `i`.
    pub fn get<T: Cell>(&self, i: usize) -> Result<T> {
        self.check_index(i)?;
        self.check_type(i, T::TYPE)?;
        Ok(T::from_cell(&self.cells[i]).unwrap())
    }

    /// Borrowing read of a string cell.
    pub fn get_str(&self, i: usize) -> Result<&str> {
        self.check_index(i)?;
        match &self.cells[i] {
            CellValue::Str(s) => Ok(s),
            other => Err(BcsvError::range(format!(
                "column {i} holds {}, accessed as STRING",
                other.column_type()
            ))),
        }
    }

    /// Typed write of cell `i`; marks the cell present.
    pub fn set<T: Cell>(&mut self, i: usize, value: T) -> Result<()> {
        self.check_index(i)?;
        self.check_type(i, T::TYPE)?;
        self.cells[i] = value.into_cell();
        self.presence.set(i);
        Ok(())
    }

    /// Writes `values.len()` cells starting at column `i0`. Fails without
    /// touching the row if the span overflows the layout or any column in
    /// it has a different type.
    pub fn set_slice<T: Cell + Clone>(&mut self, i0: usize, values: &[T]) -> Result<()> {
        let end = i0 + values.len();
        if end > self.cells.len() {
            return Err(BcsvError::range(format!(
                "bulk set of {} cells at column {i0} overflows layout (count {})",
                values.len(),
                self.cells.len()
            )));
        }
        for i in i0..end {
            self.check_type(i, T::TYPE)?;
        }
        for (i, v) in values.iter().enumerate() {
            self.cells[i0 + i] = v.clone().into_cell();
            self.presence.set(i0 + i);
        }
        Ok(())
    }

    /// Untyped read of cell `i`.
    ///
    /// # Panics
    /// If `i >= column_count()`.
    #[inline]
    pub fn value(&self, i: usize) -> &CellValue {
        &self.cells[i]
    }

    /// Untyped write of cell `i` with a runtime type check against the
    /// layout; marks the cell present.
    pub fn set_value(&mut self, i: usize, value: CellValue) -> Result<()> {
        self.check_index(i)?;
        self.check_type(i, value.column_type())?;
        self.cells[i] = value;
        self.presence.set(i);
        Ok(())
    }

    /// Per-cell presence bits: set by every explicit assignment since the
    /// last [`Row::clear_presence`].
    #[inline]
    pub fn presence(&self) -> &BitVec {
        &self.presence
    }

    pub fn clear_presence(&mut self) {
        self.presence.reset_all();
    }

    pub fn mark_all_present(&mut self) {
        self.presence.set_all();
    }

    /// Copies all cells from `other`. Layouts must be type-compatible.
    /// Every cell of `self` becomes present.
    pub fn copy_from(&mut self, other: &Row) -> Result<()> {
        if !self.layout.is_compatible(other.layout()) {
            return Err(BcsvError::format(
                "cannot copy row: layouts are not compatible",
            ));
        }
        self.cells.clone_from_slice(&other.cells);
        self.presence.set_all();
        Ok(())
    }

    /// Value equality across all columns, bools included.
    pub fn values_equal(&self, other: &Row) -> bool {
        self.cells == other.cells
    }

    // ── Visitors ─────────────────────────────────────────────────────────

    /// Invokes `f` for each cell in column order.
    pub fn visit<F: FnMut(usize, &CellValue)>(&self, mut f: F) {
        for (i, cell) in self.cells.iter().enumerate() {
            f(i, cell);
        }
    }

    /// Mutable visit. `f` returns whether it changed the cell; changed
    /// cells are folded into the presence bitmap.
    pub fn visit_mut<F: FnMut(usize, &mut CellValue) -> bool>(&mut self, mut f: F) {
        for (i, cell) in self.cells.iter_mut().enumerate() {
            if f(i, cell) {
                self.presence.set(i);
            }
        }
    }

    /// Typed bulk visit over `n` consecutive columns of one known type,
    /// skipping the per-cell type switch. Fails if any column in the range
    /// is not of type `T`.
    pub fn visit_typed<T: Cell, F: FnMut(usize, &T)>(
        &self,
        i0: usize,
        n: usize,
        mut f: F,
    ) -> Result<()> {
        let end = i0 + n;
        if end > self.cells.len() {
            return Err(BcsvError::range(format!(
                "typed visit of {n} cells at column {i0} overflows layout"
            )));
        }
        for i in i0..end {
            self.check_type(i, T::TYPE)?;
        }
        for i in i0..end {
            f(i, T::cell_ref(&self.cells[i]).unwrap());
        }
        Ok(())
    }

    /// Mutable counterpart of [`Row::visit_typed`]; `f` reports per-cell
    /// changes which are folded into the presence bitmap.
    pub fn visit_typed_mut<T: Cell, F: FnMut(usize, &mut T) -> bool>(
        &mut self,
        i0: usize,
        n: usize,
        mut f: F,
    ) -> Result<()> {
        let end = i0 + n;
        if end > self.cells.len() {
            return Err(BcsvError::range(format!(
                "typed visit of {n} cells at column {i0} overflows layout"
            )));
        }
        for i in i0..end {
            self.check_type(i, T::TYPE)?;
        }
        for i in i0..end {
            if f(i, T::cell_mut(&mut self.cells[i]).unwrap()) {
                self.presence.set(i);
            }
        }
        Ok(())
    }
}
