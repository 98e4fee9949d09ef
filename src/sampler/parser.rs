//! Precedence-climbing parser producing the expression AST.
//!
//! Grammar, loosest to tightest: `||`, `&&`, comparison, `|`, `^`, `&`,
//! shift, additive, multiplicative, unary, primary. Cell references are
//! `X[row_offset][column]` with a signed integer offset and either an
//! integer index or a quoted column name.

use crate::error::{BcsvError, Result};

use super::lexer::{tokenize, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum ColRef {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Or => "||",
            And => "&&",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            BitOr => "|",
            BitXor => "^",
            BitAnd => "&",
            Shl => "<<",
            Shr => ">>",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    BoolLit(bool),
    Cell { row_offset: i32, col: ColRef },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

/// Parses a single expression; trailing tokens are an error.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_or()?;
    p.expect_end()?;
    Ok(expr)
}

/// Parses a comma-separated, non-empty expression list.
pub fn parse_expression_list(src: &str) -> Result<Vec<Expr>> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let mut exprs = vec![p.parse_or()?];
    while p.eat(&Token::Comma) {
        exprs.push(p.parse_or()?);
    }
    p.expect_end()?;
    Ok(exprs)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(BcsvError::expression(format!(
                "expected {what}, found {:?}",
                self.peek()
            )))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(BcsvError::expression(format!(
                "unexpected trailing token {t:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitor()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_bitor()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = binary(BinaryOp::BitOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(&Token::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = binary(BinaryOp::BitXor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_shift()?;
        while self.eat(&Token::Amp) {
            let rhs = self.parse_shift()?;
            lhs = binary(BinaryOp::BitAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Shl) => BinaryOp::Shl,
                Some(Token::Shr) => BinaryOp::Shr,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            Some(Token::Plus) => {
                // unary plus is a no-op
                self.pos += 1;
                return self.parse_unary();
            }
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::IntLit(v)),
            Some(Token::Float(v)) => Ok(Expr::FloatLit(v)),
            Some(Token::Str(s)) => Ok(Expr::StrLit(s)),
            Some(Token::Ident(id)) if id == "true" => Ok(Expr::BoolLit(true)),
            Some(Token::Ident(id)) if id == "false" => Ok(Expr::BoolLit(false)),
            Some(Token::Ident(id)) if id == "X" => self.parse_cell(),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(id)) => Err(BcsvError::expression(format!(
                "unknown identifier '{id}'; cell references are written X[row][col]"
            ))),
            other => Err(BcsvError::expression(format!(
                "expected an expression, found {other:?}"
            ))),
        }
    }

    /// `X` was consumed; parses `[offset][column]`.
    fn parse_cell(&mut self) -> Result<Expr> {
        self.expect(&Token::LBracket, "'[' after X")?;
        let negative = if self.eat(&Token::Minus) {
            true
        } else {
            self.eat(&Token::Plus);
            false
        };
        let row_offset = match self.next() {
            Some(Token::Int(v)) => {
                let v = i32::try_from(v)
                    .map_err(|_| BcsvError::expression("row offset out of range"))?;
                if negative {
                    -v
                } else {
                    v
                }
            }
            other => {
                return Err(BcsvError::expression(format!(
                    "expected an integer row offset, found {other:?}"
                )))
            }
        };
        self.expect(&Token::RBracket, "']' after row offset")?;
        self.expect(&Token::LBracket, "'[' before column")?;
        let col = match self.next() {
            Some(Token::Int(v)) => {
                let v = usize::try_from(v)
                    .map_err(|_| BcsvError::expression("column index must not be negative"))?;
                ColRef::Index(v)
            }
            Some(Token::Str(name)) => ColRef::Name(name),
            other => {
                return Err(BcsvError::expression(format!(
                    "expected a column index or quoted column name, found {other:?}"
                )))
            }
        };
        self.expect(&Token::RBracket, "']' after column")?;
        Ok(Expr::Cell { row_offset, col })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
