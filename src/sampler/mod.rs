//! Sampler: a streaming filter-and-project operator over any row reader.
//!
//! Two expressions drive it: a boolean conditional that drops rows, and a
//! comma-separated selection list that produces the output row (and, by
//! type inference, the output layout). Expressions reference cells as
//! `X[row_offset][column]` with lookbehind and lookahead; the window of
//! buffered input rows is sized at compile time from the offsets actually
//! used.
//!
//! Rows whose window is incomplete, at the start of the stream for
//! lookbehind or at its end for lookahead, are skipped (truncation mode).

mod compiler;
mod lexer;
mod parser;
mod vm;
mod window;

use std::sync::Arc;

use crate::error::{BcsvError, Result};
use crate::layout::{Column, ColumnType, Layout};
use crate::reader::Reader;
use crate::row::Row;

use compiler::{compile_conditional, compile_selection, CompiledConditional, CompiledSelection};
use vm::{cell_to_value, Value, Vm};
use window::RowWindow;

pub use vm::ValueType;

// ─────────────────────────────────────────────────────────────────────────────
// RowRead
// ─────────────────────────────────────────────────────────────────────────────

/// Anything the sampler can pull rows from.
pub trait RowRead {
    fn layout(&self) -> &Arc<Layout>;
    /// Advances to the next row; `false` at end of input.
    fn read_next(&mut self) -> Result<bool>;
    /// The current row; valid after `read_next` returned `true`.
    fn row(&self) -> &Row;
}

impl RowRead for Reader {
    fn layout(&self) -> &Arc<Layout> {
        Reader::layout(self)
    }

    fn read_next(&mut self) -> Result<bool> {
        Reader::read_next(self)
    }

    fn row(&self) -> &Row {
        Reader::row(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampler
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of compiling a conditional or selection expression.
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub success: bool,
    pub error_msg: String,
}

impl CompileResult {
    fn ok() -> Self {
        CompileResult {
            success: true,
            error_msg: String::new(),
        }
    }

    fn fail(err: BcsvError) -> Self {
        CompileResult {
            success: false,
            error_msg: err.to_string(),
        }
    }
}

/// Filter-and-project operator wrapping a [`RowRead`].
pub struct Sampler<R: RowRead> {
    reader: R,
    layout: Arc<Layout>,
    cond: Option<CompiledConditional>,
    sel: Option<CompiledSelection>,
    out_layout: Arc<Layout>,
    out_row: Row,
    window: RowWindow,
    vm: Vm,
    /// Input index the next evaluation considers.
    eval_pos: u64,
    /// Input rows pulled so far; also the absolute index of the next pull.
    input_count: u64,
    input_done: bool,
}

impl<R: RowRead> Sampler<R> {
    /// Wraps `reader`. Until [`Sampler::set_selection`] succeeds, the
    /// projection is the identity and the output layout equals the input
    /// layout.
    pub fn new(reader: R) -> Self {
        let layout = reader.layout().clone();
        let out_layout = layout.clone();
        let out_row = Row::new(out_layout.clone());
        Sampler {
            reader,
            layout,
            cond: None,
            sel: None,
            out_layout,
            out_row,
            window: RowWindow::new(),
            vm: Vm::new(),
            eval_pos: 0,
            input_count: 0,
            input_done: false,
        }
    }

    /// Compiles the row filter. On failure the previous conditional is
    /// kept and the error is reported in the result. Call before
    /// iterating.
    pub fn set_conditional(&mut self, src: &str) -> CompileResult {
        match compile_conditional(src, &self.layout) {
            Ok(compiled) => {
                self.cond = Some(compiled);
                CompileResult::ok()
            }
            Err(e) => CompileResult::fail(e),
        }
    }

    /// Compiles the projection list and infers the output layout from the
    /// expression types. On failure the previous selection is kept. Call
    /// before iterating.
    pub fn set_selection(&mut self, src: &str) -> CompileResult {
        let compiled = match compile_selection(src, &self.layout) {
            Ok(c) => c,
            Err(e) => return CompileResult::fail(e),
        };
        let mut layout = Layout::new();
        for (i, oc) in compiled.output.iter().enumerate() {
            let base = oc
                .name_hint
                .clone()
                .unwrap_or_else(|| format!("expr{i}"));
            let mut name = base.clone();
            let mut suffix = 2;
            while layout.has(&name) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            let ty = match oc.ty {
                ValueType::Bool => ColumnType::Bool,
                ValueType::Int => ColumnType::Int64,
                ValueType::Float => ColumnType::Double,
                ValueType::Str => ColumnType::String,
            };
            if let Err(e) = layout.add_column(Column::new(name, ty)) {
                return CompileResult::fail(e);
            }
        }
        self.out_layout = Arc::new(layout);
        self.out_row = Row::new(self.out_layout.clone());
        self.sel = Some(compiled);
        CompileResult::ok()
    }

    /// Layout of the projected rows.
    pub fn output_layout(&self) -> &Arc<Layout> {
        &self.out_layout
    }

    /// The current projected row; valid after [`Sampler::next`] returned
    /// `true`.
    pub fn row(&self) -> &Row {
        &self.out_row
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Combined window bounds over both programs.
    fn bounds(&self) -> (i32, i32) {
        let mut lo = 0;
        let mut hi = 0;
        if let Some(c) = &self.cond {
            lo = lo.min(c.min_offset);
            hi = hi.max(c.max_offset);
        }
        if let Some(s) = &self.sel {
            lo = lo.min(s.min_offset);
            hi = hi.max(s.max_offset);
        }
        (lo, hi)
    }

    /// Advances to the next input row that passes the conditional with a
    /// complete window, and projects it. Returns `false` when the input
    /// is exhausted.
    pub fn next(&mut self) -> Result<bool> {
        let (min_off, max_off) = self.bounds();
        loop {
            let e = self.eval_pos;
            if (e as i64) + (min_off as i64) < 0 {
                // lookbehind not yet available
                self.eval_pos += 1;
                continue;
            }
            let needed_max = e + max_off as u64;
            while !self.input_done && self.input_count <= needed_max {
                if self.reader.read_next()? {
                    self.window.push(self.reader.row().clone());
                    self.input_count += 1;
                } else {
                    self.input_done = true;
                }
            }
            if self.input_count <= needed_max {
                // lookahead truncated at end of stream
                return Ok(false);
            }
            self.window.evict_below((e as i64 + min_off as i64) as u64);

            let pass = match &self.cond {
                Some(c) => {
                    let window = &self.window;
                    let fetch = |off: i32, col: usize| -> Value {
                        let abs = (e as i64 + off as i64) as u64;
                        cell_to_value(window.get(abs).expect("window row in range").value(col))
                    };
                    match self.vm.eval(&c.program, fetch, None)? {
                        Some(Value::Bool(b)) => b,
                        _ => {
                            return Err(BcsvError::expression(
                                "internal: conditional did not produce a BOOL",
                            ))
                        }
                    }
                }
                None => true,
            };
            if !pass {
                self.eval_pos += 1;
                continue;
            }

            match &self.sel {
                Some(s) => {
                    let window = &self.window;
                    let fetch = |off: i32, col: usize| -> Value {
                        let abs = (e as i64 + off as i64) as u64;
                        cell_to_value(window.get(abs).expect("window row in range").value(col))
                    };
                    self.vm.eval(&s.program, fetch, Some(&mut self.out_row))?;
                }
                None => {
                    let src = self.window.get(e).expect("window row in range");
                    self.out_row.copy_from(src)?;
                }
            }
            self.eval_pos += 1;
            return Ok(true);
        }
    }

    /// Drains the input and returns every projected row.
    pub fn bulk(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push(self.out_row.clone());
        }
        Ok(rows)
    }

    /// Text listing of the compiled bytecode for diagnostics.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        if let Some(c) = &self.cond {
            out.push_str("; conditional\n");
            out.push_str(&c.program.disassemble());
        }
        if let Some(s) = &self.sel {
            out.push_str("; selection\n");
            out.push_str(&s.program.disassemble());
        }
        out
    }
}
