//! Stack virtual machine for compiled sampler expressions.
//!
//! Values are a typed union of `i64`, `f64`, `bool`, and `String`; the
//! compiler guarantees operand types per opcode, so the interpreter is a
//! single match with no runtime dispatch beyond it. Short-circuit `&&` and
//! `||` compile to peek-and-jump opcodes around the right operand.

use crate::error::{BcsvError, Result};
use crate::row::{CellValue, Row};

/// Static type of a stack value; also the inferred type of a selection
/// expression, from which the output layout is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "BOOL",
            ValueType::Int => "INT",
            ValueType::Float => "FLOAT",
            ValueType::Str => "STRING",
        }
    }
}

/// One runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Widens an input cell to the VM's value union: every integer width maps
/// to `i64`, both float widths to `f64`.
pub(crate) fn cell_to_value(cell: &CellValue) -> Value {
    match cell {
        CellValue::Bool(v) => Value::Bool(*v),
        CellValue::Int8(v) => Value::Int(*v as i64),
        CellValue::Int16(v) => Value::Int(*v as i64),
        CellValue::Int32(v) => Value::Int(*v as i64),
        CellValue::Int64(v) => Value::Int(*v),
        CellValue::UInt8(v) => Value::Int(*v as i64),
        CellValue::UInt16(v) => Value::Int(*v as i64),
        CellValue::UInt32(v) => Value::Int(*v as i64),
        CellValue::UInt64(v) => Value::Int(*v as i64),
        CellValue::Float(v) => Value::Float(*v as f64),
        CellValue::Double(v) => Value::Float(*v),
        CellValue::Str(s) => Value::Str(s.clone()),
    }
}

/// Bytecode instruction set.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Push the cell at (window row offset, column index).
    LoadCell { row_offset: i32, col: usize },
    /// Push constant pool entry `0`-indexed.
    LoadConst(usize),
    CastIntToFloat,
    NegInt,
    NegFloat,
    NotBool,
    BitNotInt,
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    ModInt,
    AddFloat,
    SubFloat,
    MulFloat,
    DivFloat,
    ModFloat,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    EqInt,
    NeInt,
    LtInt,
    LeInt,
    GtInt,
    GeInt,
    EqFloat,
    NeFloat,
    LtFloat,
    LeFloat,
    GtFloat,
    GeFloat,
    EqBool,
    NeBool,
    EqStr,
    NeStr,
    /// Jump when the top of stack is false, keeping it.
    JumpIfFalsePeek(usize),
    /// Jump when the top of stack is true, keeping it.
    JumpIfTruePeek(usize),
    Pop,
    /// Pop a value into output cell `i`.
    StoreOutput(usize),
}

/// A compiled expression: opcodes plus a constant pool.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub ops: Vec<Op>,
    pub consts: Vec<Value>,
}

impl Program {
    /// Text listing for diagnostics, one opcode per line.
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (pc, op) in self.ops.iter().enumerate() {
            let _ = write!(out, "{pc:04}  ");
            match op {
                Op::LoadCell { row_offset, col } => {
                    let _ = writeln!(out, "LOAD_CELL     r={row_offset:+} c={col}");
                }
                Op::LoadConst(k) => {
                    let _ = writeln!(out, "LOAD_CONST    #{k} ({:?})", self.consts[*k]);
                }
                Op::JumpIfFalsePeek(t) => {
                    let _ = writeln!(out, "JZ_PEEK       -> {t:04}");
                }
                Op::JumpIfTruePeek(t) => {
                    let _ = writeln!(out, "JNZ_PEEK      -> {t:04}");
                }
                Op::StoreOutput(i) => {
                    let _ = writeln!(out, "STORE_OUTPUT  [{i}]");
                }
                other => {
                    let _ = writeln!(out, "{}", op_name(other));
                }
            }
        }
        out
    }
}

fn op_name(op: &Op) -> &'static str {
    use Op::*;
    match op {
        CastIntToFloat => "CAST_I2F",
        NegInt => "NEG_INT",
        NegFloat => "NEG_FLOAT",
        NotBool => "NOT_BOOL",
        BitNotInt => "BITNOT_INT",
        AddInt => "ADD_INT",
        SubInt => "SUB_INT",
        MulInt => "MUL_INT",
        DivInt => "DIV_INT",
        ModInt => "MOD_INT",
        AddFloat => "ADD_FLOAT",
        SubFloat => "SUB_FLOAT",
        MulFloat => "MUL_FLOAT",
        DivFloat => "DIV_FLOAT",
        ModFloat => "MOD_FLOAT",
        BitAnd => "BITAND",
        BitOr => "BITOR",
        BitXor => "BITXOR",
        Shl => "SHL",
        Shr => "SHR",
        EqInt => "EQ_INT",
        NeInt => "NE_INT",
        LtInt => "LT_INT",
        LeInt => "LE_INT",
        GtInt => "GT_INT",
        GeInt => "GE_INT",
        EqFloat => "EQ_FLOAT",
        NeFloat => "NE_FLOAT",
        LtFloat => "LT_FLOAT",
        LeFloat => "LE_FLOAT",
        GtFloat => "GT_FLOAT",
        GeFloat => "GE_FLOAT",
        EqBool => "EQ_BOOL",
        NeBool => "NE_BOOL",
        EqStr => "EQ_STR",
        NeStr => "NE_STR",
        Pop => "POP",
        LoadCell { .. } | LoadConst(_) | JumpIfFalsePeek(_) | JumpIfTruePeek(_)
        | StoreOutput(_) => unreachable!("operand-carrying ops are printed inline"),
    }
}

fn underflow() -> BcsvError {
    BcsvError::expression("internal: vm stack underflow")
}

fn confusion() -> BcsvError {
    BcsvError::expression("internal: vm operand type confusion")
}

/// Stack interpreter. One instance is reused across rows; the stack is
/// cleared per evaluation.
#[derive(Debug, Default)]
pub(crate) struct Vm {
    stack: Vec<Value>,
}

impl Vm {
    pub fn new() -> Self {
        Vm::default()
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(underflow)
    }

    fn pop_int(&mut self) -> Result<i64> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            _ => Err(confusion()),
        }
    }

    fn pop_float(&mut self) -> Result<f64> {
        match self.pop()? {
            Value::Float(v) => Ok(v),
            _ => Err(confusion()),
        }
    }

    fn pop_bool(&mut self) -> Result<bool> {
        match self.pop()? {
            Value::Bool(v) => Ok(v),
            _ => Err(confusion()),
        }
    }

    fn pop_str(&mut self) -> Result<String> {
        match self.pop()? {
            Value::Str(v) => Ok(v),
            _ => Err(confusion()),
        }
    }

    fn store_output(out: &mut Option<&mut Row>, i: usize, value: Value) -> Result<()> {
        let row = out
            .as_deref_mut()
            .ok_or_else(|| BcsvError::expression("internal: STORE_OUTPUT with no output row"))?;
        let cell = match value {
            Value::Bool(v) => CellValue::Bool(v),
            Value::Int(v) => CellValue::Int64(v),
            Value::Float(v) => CellValue::Double(v),
            Value::Str(v) => CellValue::Str(v),
        };
        row.set_value(i, cell)
    }

    /// Runs `prog` with `fetch` resolving cell loads. Returns the value
    /// left on the stack, if any; selection programs drain their results
    /// into `out` and leave none.
    pub fn eval<F>(
        &mut self,
        prog: &Program,
        fetch: F,
        mut out: Option<&mut Row>,
    ) -> Result<Option<Value>>
    where
        F: Fn(i32, usize) -> Value,
    {
        self.stack.clear();
        let mut pc = 0usize;
        while pc < prog.ops.len() {
            let mut jumped = false;
            match &prog.ops[pc] {
                Op::LoadCell { row_offset, col } => {
                    self.stack.push(fetch(*row_offset, *col));
                }
                Op::LoadConst(k) => self.stack.push(prog.consts[*k].clone()),
                Op::CastIntToFloat => {
                    let v = self.pop_int()?;
                    self.stack.push(Value::Float(v as f64));
                }
                Op::NegInt => {
                    let v = self.pop_int()?;
                    self.stack.push(Value::Int(v.wrapping_neg()));
                }
                Op::NegFloat => {
                    let v = self.pop_float()?;
                    self.stack.push(Value::Float(-v));
                }
                Op::NotBool => {
                    let v = self.pop_bool()?;
                    self.stack.push(Value::Bool(!v));
                }
                Op::BitNotInt => {
                    let v = self.pop_int()?;
                    self.stack.push(Value::Int(!v));
                }
                Op::AddInt => self.int_binop(|a, b| Ok(a.wrapping_add(b)))?,
                Op::SubInt => self.int_binop(|a, b| Ok(a.wrapping_sub(b)))?,
                Op::MulInt => self.int_binop(|a, b| Ok(a.wrapping_mul(b)))?,
                Op::DivInt => self.int_binop(|a, b| {
                    if b == 0 {
                        Err(BcsvError::expression("division by zero"))
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Op::ModInt => self.int_binop(|a, b| {
                    if b == 0 {
                        Err(BcsvError::expression("modulo by zero"))
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                Op::AddFloat => self.float_binop(|a, b| a + b)?,
                Op::SubFloat => self.float_binop(|a, b| a - b)?,
                Op::MulFloat => self.float_binop(|a, b| a * b)?,
                Op::DivFloat => self.float_binop(|a, b| a / b)?,
                Op::ModFloat => self.float_binop(|a, b| a % b)?,
                Op::BitAnd => self.int_binop(|a, b| Ok(a & b))?,
                Op::BitOr => self.int_binop(|a, b| Ok(a | b))?,
                Op::BitXor => self.int_binop(|a, b| Ok(a ^ b))?,
                Op::Shl => self.int_binop(|a, b| Ok(a.wrapping_shl(b as u32)))?,
                Op::Shr => self.int_binop(|a, b| Ok(a.wrapping_shr(b as u32)))?,
                Op::EqInt => self.int_cmp(|a, b| a == b)?,
                Op::NeInt => self.int_cmp(|a, b| a != b)?,
                Op::LtInt => self.int_cmp(|a, b| a < b)?,
                Op::LeInt => self.int_cmp(|a, b| a <= b)?,
                Op::GtInt => self.int_cmp(|a, b| a > b)?,
                Op::GeInt => self.int_cmp(|a, b| a >= b)?,
                Op::EqFloat => self.float_cmp(|a, b| a == b)?,
                Op::NeFloat => self.float_cmp(|a, b| a != b)?,
                Op::LtFloat => self.float_cmp(|a, b| a < b)?,
                Op::LeFloat => self.float_cmp(|a, b| a <= b)?,
                Op::GtFloat => self.float_cmp(|a, b| a > b)?,
                Op::GeFloat => self.float_cmp(|a, b| a >= b)?,
                Op::EqBool => {
                    let b = self.pop_bool()?;
                    let a = self.pop_bool()?;
                    self.stack.push(Value::Bool(a == b));
                }
                Op::NeBool => {
                    let b = self.pop_bool()?;
                    let a = self.pop_bool()?;
                    self.stack.push(Value::Bool(a != b));
                }
                Op::EqStr => {
                    let b = self.pop_str()?;
                    let a = self.pop_str()?;
                    self.stack.push(Value::Bool(a == b));
                }
                Op::NeStr => {
                    let b = self.pop_str()?;
                    let a = self.pop_str()?;
                    self.stack.push(Value::Bool(a != b));
                }
                Op::JumpIfFalsePeek(target) => {
                    let top = self.stack.last().ok_or_else(underflow)?;
                    if matches!(top, Value::Bool(false)) {
                        pc = *target;
                        jumped = true;
                    }
                }
                Op::JumpIfTruePeek(target) => {
                    let top = self.stack.last().ok_or_else(underflow)?;
                    if matches!(top, Value::Bool(true)) {
                        pc = *target;
                        jumped = true;
                    }
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::StoreOutput(i) => {
                    let value = self.pop()?;
                    Self::store_output(&mut out, *i, value)?;
                }
            }
            if !jumped {
                pc += 1;
            }
        }
        Ok(self.stack.pop())
    }

    fn int_binop<F: FnOnce(i64, i64) -> Result<i64>>(&mut self, f: F) -> Result<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.stack.push(Value::Int(f(a, b)?));
        Ok(())
    }

    fn float_binop<F: FnOnce(f64, f64) -> f64>(&mut self, f: F) -> Result<()> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.stack.push(Value::Float(f(a, b)));
        Ok(())
    }

    fn int_cmp<F: FnOnce(i64, i64) -> bool>(&mut self, f: F) -> Result<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.stack.push(Value::Bool(f(a, b)));
        Ok(())
    }

    fn float_cmp<F: FnOnce(f64, f64) -> bool>(&mut self, f: F) -> Result<()> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.stack.push(Value::Bool(f(a, b)));
        Ok(())
    }
}
