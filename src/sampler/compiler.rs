//! Compiler: AST type-check, constant folding, and lowering to stack
//! bytecode against a concrete input layout.
//!
//! Integer and float operands promote to float when mixed; strings
//! support only `==` and `!=`; `&&` and `||` require boolean operands and
//! compile to short-circuit jumps. Constant sub-expressions fold before
//! lowering, which is where an integer division by a constant zero is
//! caught.

use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, Layout};

use super::parser::{
    parse_expression, parse_expression_list, BinaryOp, ColRef, Expr, UnaryOp,
};
use super::vm::{Op, Program, Value, ValueType};

/// Compiled row filter.
pub(crate) struct CompiledConditional {
    pub program: Program,
    pub min_offset: i32,
    pub max_offset: i32,
}

/// One projected output column: inferred type plus a name hint when the
/// expression is a plain cell reference.
pub(crate) struct OutputColumn {
    pub ty: ValueType,
    pub name_hint: Option<String>,
}

/// Compiled projection list.
pub(crate) struct CompiledSelection {
    pub program: Program,
    pub output: Vec<OutputColumn>,
    pub min_offset: i32,
    pub max_offset: i32,
}

pub(crate) fn compile_conditional(src: &str, layout: &Layout) -> Result<CompiledConditional> {
    let expr = fold(parse_expression(src)?)?;
    let mut cg = Codegen::new(layout);
    let ty = cg.emit(&expr)?;
    if ty != ValueType::Bool {
        return Err(BcsvError::expression(format!(
            "conditional must evaluate to BOOL, found {}",
            ty.name()
        )));
    }
    Ok(CompiledConditional {
        min_offset: cg.min_offset,
        max_offset: cg.max_offset,
        program: cg.finish(),
    })
}

pub(crate) fn compile_selection(src: &str, layout: &Layout) -> Result<CompiledSelection> {
    let exprs = parse_expression_list(src)?;
    let mut cg = Codegen::new(layout);
    let mut output = Vec::with_capacity(exprs.len());
    for (i, expr) in exprs.into_iter().enumerate() {
        let expr = fold(expr)?;
        let name_hint = match &expr {
            Expr::Cell { col, .. } => Some(resolve_column(layout, col)?.1),
            _ => None,
        };
        let ty = cg.emit(&expr)?;
        cg.ops.push(Op::StoreOutput(i));
        output.push(OutputColumn { ty, name_hint });
    }
    Ok(CompiledSelection {
        output,
        min_offset: cg.min_offset,
        max_offset: cg.max_offset,
        program: cg.finish(),
    })
}

fn resolve_column(layout: &Layout, col: &ColRef) -> Result<(usize, String)> {
    match col {
        ColRef::Index(i) => {
            if *i >= layout.column_count() {
                return Err(BcsvError::expression(format!(
                    "column index {i} out of range (layout has {} columns)",
                    layout.column_count()
                )));
            }
            Ok((*i, layout.name(*i).to_string()))
        }
        ColRef::Name(name) => match layout.index(name) {
            Some(i) => Ok((i, name.clone())),
            None => Err(BcsvError::expression(format!("unknown column '{name}'"))),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Constant folding
// ─────────────────────────────────────────────────────────────────────────────

fn fold(expr: Expr) -> Result<Expr> {
    Ok(match expr {
        Expr::Unary { op, expr } => {
            let inner = fold(*expr)?;
            match (op, &inner) {
                (UnaryOp::Neg, Expr::IntLit(v)) => Expr::IntLit(v.wrapping_neg()),
                (UnaryOp::Neg, Expr::FloatLit(v)) => Expr::FloatLit(-v),
                (UnaryOp::Not, Expr::BoolLit(v)) => Expr::BoolLit(!v),
                (UnaryOp::BitNot, Expr::IntLit(v)) => Expr::IntLit(!v),
                _ => Expr::Unary {
                    op,
                    expr: Box::new(inner),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = fold(*lhs)?;
            let rhs = fold(*rhs)?;
            if let (Expr::IntLit(a), Expr::IntLit(b)) = (&lhs, &rhs) {
                if let Some(folded) = fold_int(op, *a, *b)? {
                    return Ok(folded);
                }
            }
            if let (Some(a), Some(b)) = (numeric_lit(&lhs), numeric_lit(&rhs)) {
                if matches!(&lhs, Expr::FloatLit(_)) || matches!(&rhs, Expr::FloatLit(_)) {
                    if let Some(folded) = fold_float(op, a, b) {
                        return Ok(folded);
                    }
                }
            }
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }
        leaf => leaf,
    })
}

fn numeric_lit(e: &Expr) -> Option<f64> {
    match e {
        Expr::IntLit(v) => Some(*v as f64),
        Expr::FloatLit(v) => Some(*v),
        _ => None,
    }
}

fn fold_int(op: BinaryOp, a: i64, b: i64) -> Result<Option<Expr>> {
    use BinaryOp::*;
    Ok(Some(match op {
        Add => Expr::IntLit(a.wrapping_add(b)),
        Sub => Expr::IntLit(a.wrapping_sub(b)),
        Mul => Expr::IntLit(a.wrapping_mul(b)),
        Div => {
            if b == 0 {
                return Err(BcsvError::expression(
                    "division by zero in constant expression",
                ));
            }
            Expr::IntLit(a.wrapping_div(b))
        }
        Mod => {
            if b == 0 {
                return Err(BcsvError::expression(
                    "modulo by zero in constant expression",
                ));
            }
            Expr::IntLit(a.wrapping_rem(b))
        }
        BitAnd => Expr::IntLit(a & b),
        BitOr => Expr::IntLit(a | b),
        BitXor => Expr::IntLit(a ^ b),
        Shl => Expr::IntLit(a.wrapping_shl(b as u32)),
        Shr => Expr::IntLit(a.wrapping_shr(b as u32)),
        Eq => Expr::BoolLit(a == b),
        Ne => Expr::BoolLit(a != b),
        Lt => Expr::BoolLit(a < b),
        Le => Expr::BoolLit(a <= b),
        Gt => Expr::BoolLit(a > b),
        Ge => Expr::BoolLit(a >= b),
        Or | And => return Ok(None),
    }))
}

fn fold_float(op: BinaryOp, a: f64, b: f64) -> Option<Expr> {
    use BinaryOp::*;
    Some(match op {
        Add => Expr::FloatLit(a + b),
        Sub => Expr::FloatLit(a - b),
        Mul => Expr::FloatLit(a * b),
        Div => Expr::FloatLit(a / b),
        Mod => Expr::FloatLit(a % b),
        Eq => Expr::BoolLit(a == b),
        Ne => Expr::BoolLit(a != b),
        Lt => Expr::BoolLit(a < b),
        Le => Expr::BoolLit(a <= b),
        Gt => Expr::BoolLit(a > b),
        Ge => Expr::BoolLit(a >= b),
        _ => return None,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Lowering
// ─────────────────────────────────────────────────────────────────────────────

struct Codegen<'a> {
    layout: &'a Layout,
    ops: Vec<Op>,
    consts: Vec<Value>,
    min_offset: i32,
    max_offset: i32,
}

impl<'a> Codegen<'a> {
    fn new(layout: &'a Layout) -> Self {
        Codegen {
            layout,
            ops: Vec::new(),
            consts: Vec::new(),
            min_offset: 0,
            max_offset: 0,
        }
    }

    fn finish(self) -> Program {
        Program {
            ops: self.ops,
            consts: self.consts,
        }
    }

    fn push_const(&mut self, value: Value) {
        let k = self.consts.len();
        self.consts.push(value);
        self.ops.push(Op::LoadConst(k));
    }

    /// Emits code leaving the expression value on the stack; returns its
    /// static type.
    fn emit(&mut self, expr: &Expr) -> Result<ValueType> {
        match expr {
            Expr::IntLit(v) => {
                self.push_const(Value::Int(*v));
                Ok(ValueType::Int)
            }
            Expr::FloatLit(v) => {
                self.push_const(Value::Float(*v));
                Ok(ValueType::Float)
            }
            Expr::StrLit(s) => {
                self.push_const(Value::Str(s.clone()));
                Ok(ValueType::Str)
            }
            Expr::BoolLit(v) => {
                self.push_const(Value::Bool(*v));
                Ok(ValueType::Bool)
            }
            Expr::Cell { row_offset, col } => {
                let (idx, _) = resolve_column(self.layout, col)?;
                self.min_offset = self.min_offset.min(*row_offset);
                self.max_offset = self.max_offset.max(*row_offset);
                self.ops.push(Op::LoadCell {
                    row_offset: *row_offset,
                    col: idx,
                });
                Ok(match self.layout.column_type(idx) {
                    ColumnType::Bool => ValueType::Bool,
                    ColumnType::Float | ColumnType::Double => ValueType::Float,
                    ColumnType::String => ValueType::Str,
                    _ => ValueType::Int,
                })
            }
            Expr::Unary { op, expr } => self.emit_unary(*op, expr),
            Expr::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, expr: &Expr) -> Result<ValueType> {
        let ty = self.emit(expr)?;
        match (op, ty) {
            (UnaryOp::Neg, ValueType::Int) => {
                self.ops.push(Op::NegInt);
                Ok(ValueType::Int)
            }
            (UnaryOp::Neg, ValueType::Float) => {
                self.ops.push(Op::NegFloat);
                Ok(ValueType::Float)
            }
            (UnaryOp::Not, ValueType::Bool) => {
                self.ops.push(Op::NotBool);
                Ok(ValueType::Bool)
            }
            (UnaryOp::BitNot, ValueType::Int) => {
                self.ops.push(Op::BitNotInt);
                Ok(ValueType::Int)
            }
            (UnaryOp::Neg, other) => Err(BcsvError::expression(format!(
                "operator '-' requires a numeric operand, found {}",
                other.name()
            ))),
            (UnaryOp::Not, other) => Err(BcsvError::expression(format!(
                "operator '!' requires a boolean operand, found {}",
                other.name()
            ))),
            (UnaryOp::BitNot, other) => Err(BcsvError::expression(format!(
                "operator '~' requires an integer operand, found {}",
                other.name()
            ))),
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<ValueType> {
        use BinaryOp::*;
        match op {
            And | Or => {
                let lty = self.emit(lhs)?;
                if lty != ValueType::Bool {
                    return Err(BcsvError::expression(format!(
                        "left operand of '{}' must be BOOL, found {}",
                        op.symbol(),
                        lty.name()
                    )));
                }
                let jump_at = self.ops.len();
                self.ops.push(if op == And {
                    Op::JumpIfFalsePeek(0)
                } else {
                    Op::JumpIfTruePeek(0)
                });
                self.ops.push(Op::Pop);
                let rty = self.emit(rhs)?;
                if rty != ValueType::Bool {
                    return Err(BcsvError::expression(format!(
                        "right operand of '{}' must be BOOL, found {}",
                        op.symbol(),
                        rty.name()
                    )));
                }
                let target = self.ops.len();
                self.ops[jump_at] = if op == And {
                    Op::JumpIfFalsePeek(target)
                } else {
                    Op::JumpIfTruePeek(target)
                };
                Ok(ValueType::Bool)
            }

            Add | Sub | Mul | Div | Mod => {
                let (ty, int_rhs_lit) = self.emit_numeric_pair(op, lhs, rhs)?;
                if matches!(op, Div | Mod) && ty == ValueType::Int && int_rhs_lit == Some(0) {
                    return Err(BcsvError::expression(format!(
                        "{} by zero in constant expression",
                        if op == Div { "division" } else { "modulo" }
                    )));
                }
                let code = match (op, ty) {
                    (Add, ValueType::Int) => Op::AddInt,
                    (Sub, ValueType::Int) => Op::SubInt,
                    (Mul, ValueType::Int) => Op::MulInt,
                    (Div, ValueType::Int) => Op::DivInt,
                    (Mod, ValueType::Int) => Op::ModInt,
                    (Add, _) => Op::AddFloat,
                    (Sub, _) => Op::SubFloat,
                    (Mul, _) => Op::MulFloat,
                    (Div, _) => Op::DivFloat,
                    (Mod, _) => Op::ModFloat,
                    _ => unreachable!(),
                };
                self.ops.push(code);
                Ok(ty)
            }

            BitAnd | BitOr | BitXor | Shl | Shr => {
                let lty = self.emit(lhs)?;
                let rty = self.emit(rhs)?;
                if lty != ValueType::Int || rty != ValueType::Int {
                    return Err(BcsvError::expression(format!(
                        "operator '{}' requires integer operands, found {} and {}",
                        op.symbol(),
                        lty.name(),
                        rty.name()
                    )));
                }
                self.ops.push(match op {
                    BitAnd => Op::BitAnd,
                    BitOr => Op::BitOr,
                    BitXor => Op::BitXor,
                    Shl => Op::Shl,
                    Shr => Op::Shr,
                    _ => unreachable!(),
                });
                Ok(ValueType::Int)
            }

            Eq | Ne | Lt | Le | Gt | Ge => {
                let lty = self.peek_type(lhs)?;
                let rty = self.peek_type(rhs)?;
                match (lty, rty) {
                    (ValueType::Str, ValueType::Str) => {
                        if !matches!(op, Eq | Ne) {
                            return Err(BcsvError::expression(format!(
                                "operator '{}' is not defined for strings",
                                op.symbol()
                            )));
                        }
                        self.emit(lhs)?;
                        self.emit(rhs)?;
                        self.ops.push(if op == Eq { Op::EqStr } else { Op::NeStr });
                        Ok(ValueType::Bool)
                    }
                    (ValueType::Bool, ValueType::Bool) => {
                        if !matches!(op, Eq | Ne) {
                            return Err(BcsvError::expression(format!(
                                "operator '{}' is not defined for booleans",
                                op.symbol()
                            )));
                        }
                        self.emit(lhs)?;
                        self.emit(rhs)?;
                        self.ops.push(if op == Eq { Op::EqBool } else { Op::NeBool });
                        Ok(ValueType::Bool)
                    }
                    (ValueType::Int | ValueType::Float, ValueType::Int | ValueType::Float) => {
                        let (ty, _) = self.emit_numeric_pair(op, lhs, rhs)?;
                        let int = ty == ValueType::Int;
                        self.ops.push(match op {
                            Eq => {
                                if int {
                                    Op::EqInt
                                } else {
                                    Op::EqFloat
                                }
                            }
                            Ne => {
                                if int {
                                    Op::NeInt
                                } else {
                                    Op::NeFloat
                                }
                            }
                            Lt => {
                                if int {
                                    Op::LtInt
                                } else {
                                    Op::LtFloat
                                }
                            }
                            Le => {
                                if int {
                                    Op::LeInt
                                } else {
                                    Op::LeFloat
                                }
                            }
                            Gt => {
                                if int {
                                    Op::GtInt
                                } else {
                                    Op::GtFloat
                                }
                            }
                            Ge => {
                                if int {
                                    Op::GeInt
                                } else {
                                    Op::GeFloat
                                }
                            }
                            _ => unreachable!(),
                        });
                        Ok(ValueType::Bool)
                    }
                    (l, r) => {
                        // lower the operands anyway so a fault inside
                        // them (string arithmetic, unknown column) is
                        // reported in preference to the mismatch
                        self.emit(lhs)?;
                        self.emit(rhs)?;
                        Err(BcsvError::expression(format!(
                            "cannot compare {} with {}",
                            l.name(),
                            r.name()
                        )))
                    }
                }
            }
        }
    }

    /// Emits both numeric operands, promoting to float when mixed, and
    /// reports a constant integer right operand (for division-by-zero
    /// detection). Numeric subtrees never contain jump ops, so inserting
    /// the left-hand cast between the operands is safe.
    fn emit_numeric_pair(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<(ValueType, Option<i64>)> {
        let lty = self.emit(lhs)?;
        let mark = self.ops.len();
        let rty = self.emit(rhs)?;
        let result = match (lty, rty) {
            (ValueType::Int, ValueType::Int) => ValueType::Int,
            (ValueType::Float, ValueType::Float) => ValueType::Float,
            (ValueType::Int, ValueType::Float) => {
                self.ops.insert(mark, Op::CastIntToFloat);
                ValueType::Float
            }
            (ValueType::Float, ValueType::Int) => {
                self.ops.push(Op::CastIntToFloat);
                ValueType::Float
            }
            (l, r) => {
                return Err(BcsvError::expression(format!(
                    "operator '{}' is not defined for {} and {}",
                    op.symbol(),
                    l.name(),
                    r.name()
                )))
            }
        };
        let int_rhs_lit = match rhs {
            Expr::IntLit(v) => Some(*v),
            _ => None,
        };
        Ok((result, int_rhs_lit))
    }

    /// Type of an expression without emitting code. Used to pick the
    /// comparison family before lowering the operands.
    fn peek_type(&mut self, expr: &Expr) -> Result<ValueType> {
        match expr {
            Expr::IntLit(_) => Ok(ValueType::Int),
            Expr::FloatLit(_) => Ok(ValueType::Float),
            Expr::StrLit(_) => Ok(ValueType::Str),
            Expr::BoolLit(_) => Ok(ValueType::Bool),
            Expr::Cell { col, .. } => {
                let (idx, _) = resolve_column(self.layout, col)?;
                Ok(match self.layout.column_type(idx) {
                    ColumnType::Bool => ValueType::Bool,
                    ColumnType::Float | ColumnType::Double => ValueType::Float,
                    ColumnType::String => ValueType::Str,
                    _ => ValueType::Int,
                })
            }
            Expr::Unary { op, expr } => {
                let inner = self.peek_type(expr)?;
                Ok(match op {
                    UnaryOp::Neg => inner,
                    UnaryOp::Not => ValueType::Bool,
                    UnaryOp::BitNot => ValueType::Int,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                use BinaryOp::*;
                match op {
                    Or | And | Eq | Ne | Lt | Le | Gt | Ge => Ok(ValueType::Bool),
                    BitAnd | BitOr | BitXor | Shl | Shr => Ok(ValueType::Int),
                    Add | Sub | Mul | Div | Mod => {
                        let l = self.peek_type(lhs)?;
                        let r = self.peek_type(rhs)?;
                        Ok(if l == ValueType::Float || r == ValueType::Float {
                            ValueType::Float
                        } else {
                            l
                        })
                    }
                }
            }
        }
    }
}
