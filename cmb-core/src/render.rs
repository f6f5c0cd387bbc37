//! Pseudo-source rendering.
//!
//! Sub-expressions are parenthesized only where operator precedence would
//! otherwise change the tree a reader recovers from the text.

use std::fmt::{self, Write};

use itertools::Itertools;

use crate::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::DecompiledScene;

const ATOM: u8 = 100;
const UNARY: u8 = 90;

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Assign => "=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Or => "|",
            BinaryOp::And => "&",
            BinaryOp::Xor => "^",
            BinaryOp::Lsl => "<<",
            BinaryOp::Lsr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<?",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">?",
            BinaryOp::Ge => ">=?",
            BinaryOp::EqStr => "<=>",
            BinaryOp::NeStr => "<!>",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 80,
            BinaryOp::Add | BinaryOp::Sub => 70,
            BinaryOp::Lsl | BinaryOp::Lsr => 65,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 60,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::EqStr | BinaryOp::NeStr => 55,
            BinaryOp::And => 50,
            BinaryOp::Xor => 45,
            BinaryOp::Or => 40,
            BinaryOp::LogicalAnd => 30,
            BinaryOp::LogicalOr => 20,
            BinaryOp::Assign => 10,
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitwiseNot => "~",
            UnaryOp::Addrof => "&",
            // bracketed, see `Expr::render`
            UnaryOp::Deref => "[]",
        }
    }
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Unary(UnaryOp::Deref, _) => ATOM,
            Expr::Unary(_, _) => UNARY,
            Expr::Binary(op, _, _) => op.precedence(),
            _ => ATOM,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, parent_prec: u8) -> fmt::Result {
        let my_prec = self.precedence();
        let wrap = my_prec < parent_prec;
        if wrap {
            f.write_char('(')?;
        }
        match self {
            Expr::Int(v) => write!(f, "{}", v)?,
            Expr::Str(s) => {
                let lit = s.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{}\"", lit)?
            }
            Expr::Named(name) => f.write_str(name)?,
            Expr::Unary(UnaryOp::Deref, a) => {
                f.write_char('[')?;
                a.render(f, 0)?;
                f.write_char(']')?
            }
            Expr::Unary(op, a) => {
                f.write_str(op.symbol())?;
                // `-(-4)`, not `--4`
                let doubled = match (op, a.as_ref()) {
                    (UnaryOp::Neg, Expr::Int(v)) => *v < 0,
                    (UnaryOp::Neg, Expr::Unary(UnaryOp::Neg, _)) => true,
                    _ => false,
                };
                a.render(f, if doubled { ATOM + 1 } else { my_prec })?
            }
            Expr::Binary(BinaryOp::Assign, l, r) => {
                f.write_char('[')?;
                l.render(f, 0)?;
                f.write_str("] = ")?;
                r.render(f, my_prec)?
            }
            Expr::Binary(op, a, b) => {
                a.render(f, my_prec)?;
                write!(f, " {} ", op.symbol())?;
                b.render(f, my_prec + 1)?
            }
            Expr::Call { name, args } => write!(f, "{}({})", name, args.iter().join(", "))?,
        }
        if wrap {
            f.write_char(')')?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Push(e) => write!(f, "push {};", e),
            Stmt::Expr(e) => write!(f, "{};", e),
            Stmt::Goto(label) => write!(f, "goto {};", label),
            Stmt::GotoIf(label, cond) => write!(f, "goto {} if {};", label, cond),
            Stmt::Yield => f.write_str("yield;"),
            Stmt::Return(e) => write!(f, "return {};", e),
        }
    }
}

/// `EVENT` block of one scene.
pub fn write_scene<W: Write>(out: &mut W, scene: &DecompiledScene) -> fmt::Result {
    write!(out, "EVENT {}({})", scene.name, scene.parameters.iter().join(", "))?;
    if scene.is_global {
        out.write_str(" global")?;
    }
    out.write_str("\n{\n")?;

    for (i, (start, stmts)) in scene.slices.iter().enumerate() {
        if i != 0 {
            out.write_char('\n')?;
        }
        if let Some(label) = scene.labels.get(start) {
            writeln!(out, "{}:", label)?;
        }
        for stmt in stmts {
            writeln!(out, "  {}", stmt)?;
        }
    }

    out.write_str("}\n\n")
}

/// Global declarations followed by every scene, in order.
pub fn write_module<W: Write>(out: &mut W, globals: &[String], scenes: &[DecompiledScene]) -> fmt::Result {
    for name in globals {
        writeln!(out, "VARIABLE {};", name)?;
    }
    if !globals.is_empty() {
        out.write_char('\n')?;
    }
    for scene in scenes {
        write_scene(out, scene)?;
    }
    Ok(())
}

pub fn render_module(globals: &[String], scenes: &[DecompiledScene]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_module(&mut out, globals, scenes)?;
    Ok(out)
}
