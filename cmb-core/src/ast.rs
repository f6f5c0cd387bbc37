//! Expression and statement trees produced by stack reconstruction.
//!
//! Trees are exclusively owned; `Clone` is a deep copy.

use crate::slice::label_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitwiseNot,
    /// Value at address, rendered `[e]`.
    Deref,
    /// Address of a variable, rendered `&e`.
    Addrof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Or,
    And,
    Xor,
    Lsl,
    Lsr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    EqStr,
    NeStr,
    LogicalAnd,
    LogicalOr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Int(i32),
    Str(String),
    Named(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn named(name: impl Into<String>) -> Self {
        Expr::Named(name.into())
    }

    pub fn unary(op: UnaryOp, a: Expr) -> Self {
        Expr::Unary(op, Box::new(a))
    }

    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    pub fn deref(a: Expr) -> Self {
        Self::unary(UnaryOp::Deref, a)
    }

    pub fn addrof(a: Expr) -> Self {
        Self::unary(UnaryOp::Addrof, a)
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// A value left on the evaluation stack.
    Push(Expr),
    /// An expression evaluated for its side effects.
    Expr(Expr),
    Goto(Expr),
    /// Target first, then condition.
    GotoIf(Expr, Expr),
    Yield,
    Return(Expr),
}

impl Stmt {
    pub fn goto(target: u32) -> Self {
        Stmt::Goto(Expr::Named(label_name(target)))
    }

    pub fn goto_if(target: u32, cond: Expr) -> Self {
        Stmt::GotoIf(Expr::Named(label_name(target)), cond)
    }

    #[inline]
    pub fn is_push(&self) -> bool {
        matches!(self, Stmt::Push(_))
    }
}
