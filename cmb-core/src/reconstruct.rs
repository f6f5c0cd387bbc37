//! Symbolic execution of one normalized slice.
//!
//! The evaluation stack is never materialized: it is the trailing run of
//! `Push` statements already emitted. Each opcode pops from and pushes onto
//! that run, mirroring its declared stack effect.

use crate::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::container::{Module, Scene};
use crate::error::{Error, Result};
use crate::instruction::Instruction;
use crate::opcode::Opcode;

struct StatementBuilder<'a> {
    module: &'a Module,
    scene: &'a Scene,
    stmts: Vec<Stmt>,
}

impl<'a> StatementBuilder<'a> {
    fn new(module: &'a Module, scene: &'a Scene, capacity: usize) -> Self {
        Self {
            module,
            scene,
            stmts: Vec::with_capacity(capacity),
        }
    }

    fn trailing_pushes(&self) -> usize {
        unmatched_pushes(&self.stmts)
    }

    fn push(&mut self, expr: Expr) {
        self.stmts.push(Stmt::Push(expr));
    }

    fn require(&self, inst: &Instruction, n: usize) -> Result<()> {
        let available = self.trailing_pushes();
        if available < n {
            return Err(Error::StackUnderflow {
                location: inst.location,
                opcode: inst.opcode,
                required: n,
                available,
            });
        }
        Ok(())
    }

    /// Remove the last `n` pushes, returned in push order.
    fn pop_n(&mut self, inst: &Instruction, n: usize) -> Result<Vec<Expr>> {
        self.require(inst, n)?;
        let start = self.stmts.len() - n;
        Ok(self
            .stmts
            .drain(start..)
            .filter_map(|s| match s {
                Stmt::Push(e) => Some(e),
                _ => None,
            })
            .collect())
    }

    fn pop(&mut self, inst: &Instruction) -> Result<Expr> {
        match self.stmts.pop() {
            Some(Stmt::Push(e)) => Ok(e),
            other => {
                self.stmts.extend(other);
                Err(Error::StackUnderflow {
                    location: inst.location,
                    opcode: inst.opcode,
                    required: 1,
                    available: 0,
                })
            }
        }
    }

    fn top(&self, inst: &Instruction) -> Result<&Expr> {
        match self.stmts.last() {
            Some(Stmt::Push(e)) => Ok(e),
            _ => Err(Error::StackUnderflow {
                location: inst.location,
                opcode: inst.opcode,
                required: 1,
                available: 0,
            }),
        }
    }

    fn unop(&mut self, inst: &Instruction, op: UnaryOp) -> Result<()> {
        let a = self.pop(inst)?;
        self.push(Expr::unary(op, a));
        Ok(())
    }

    fn binop(&mut self, inst: &Instruction, op: BinaryOp) -> Result<()> {
        self.require(inst, 2)?;
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;
        self.push(Expr::binary(op, a, b));
        Ok(())
    }

    fn call(&mut self, inst: &Instruction, name: String, argc: usize) -> Result<()> {
        let args = self.pop_n(inst, argc)?;
        self.push(Expr::call(name, args));
        Ok(())
    }

    /// Turn the value on top of the stack into a standalone statement.
    fn discard(&mut self, inst: &Instruction) -> Result<()> {
        let e = self.pop(inst)?;
        self.stmts.push(Stmt::Expr(e));
        Ok(())
    }

    fn local(&self, inst: &Instruction) -> Result<Expr> {
        let names = &self.scene.variable_names;
        usize::try_from(inst.operand)
            .ok()
            .and_then(|i| names.get(i))
            .map(|name| Expr::named(name.as_str()))
            .ok_or(Error::VariableOutOfRange {
                location: inst.location,
                index: inst.operand,
                count: names.len(),
            })
    }

    fn global(&self, inst: &Instruction) -> Result<Expr> {
        let names = &self.module.global_names;
        usize::try_from(inst.operand)
            .ok()
            .and_then(|i| names.get(i))
            .map(|name| Expr::named(name.as_str()))
            .ok_or(Error::GlobalOutOfRange {
                location: inst.location,
                index: inst.operand,
                count: names.len(),
            })
    }

    fn pool_string(&self, inst: &Instruction, offset: i64) -> Result<String> {
        u32::try_from(offset)
            .ok()
            .and_then(|off| self.module.pool_string(off))
            .ok_or(Error::StringOffsetOutOfRange {
                location: inst.location,
                offset,
                pool_len: self.module.string_pool.len(),
            })
    }

    /// `push a` => `push [&base + a]`, `push &base + a`, `push [base + a]`
    /// or `push base + a`.
    fn indexed(&mut self, inst: &Instruction, base: Expr, take_address: bool, load: bool) -> Result<()> {
        let a = self.pop(inst)?;
        let base = if take_address { Expr::addrof(base) } else { base };
        let sum = Expr::binary(BinaryOp::Add, base, a);
        self.push(if load { Expr::deref(sum) } else { sum });
        Ok(())
    }

    /// `push a` => `[a] = [a] +/- 1`
    fn step(&mut self, inst: &Instruction, op: BinaryOp) -> Result<()> {
        let a = self.pop(inst)?;
        let value = Expr::binary(op, Expr::deref(a.clone()), Expr::Int(1));
        self.stmts
            .push(Stmt::Expr(Expr::binary(BinaryOp::Assign, a, value)));
        Ok(())
    }

    fn apply(&mut self, inst: &Instruction) -> Result<()> {
        use Opcode::*;

        match inst.opcode {
            Nop | Unk40 => {}

            Val8 | Val16 => {
                let v = self.local(inst)?;
                self.push(v);
            }
            ValX8 | ValX16 => {
                let v = self.local(inst)?;
                self.indexed(inst, v, true, true)?;
            }
            ValY8 | ValY16 => {
                let v = self.local(inst)?;
                self.indexed(inst, v, false, true)?;
            }
            Ref8 | Ref16 => {
                let v = self.local(inst)?;
                self.push(Expr::addrof(v));
            }
            RefX8 | RefX16 => {
                let v = self.local(inst)?;
                self.indexed(inst, v, true, false)?;
            }
            RefY8 | RefY16 => {
                let v = self.local(inst)?;
                self.indexed(inst, v, false, false)?;
            }

            GVal8 | GVal16 => {
                let v = self.global(inst)?;
                self.push(v);
            }
            GValX8 | GValX16 => {
                let v = self.global(inst)?;
                self.indexed(inst, v, true, true)?;
            }
            GValY8 | GValY16 => {
                let v = self.global(inst)?;
                self.indexed(inst, v, false, true)?;
            }
            GRef8 | GRef16 => {
                let v = self.global(inst)?;
                self.push(Expr::addrof(v));
            }
            GRefX8 | GRefX16 => {
                let v = self.global(inst)?;
                self.indexed(inst, v, true, false)?;
            }
            GRefY8 | GRefY16 => {
                let v = self.global(inst)?;
                self.indexed(inst, v, false, false)?;
            }

            Number8 | Number16 | Number32 => self.push(Expr::Int(inst.operand)),
            String8 | String16 | String32 => {
                let s = self.pool_string(inst, inst.operand as i64)?;
                self.push(Expr::Str(s));
            }

            // push a => push a, [a]
            Deref => {
                let copy = self.top(inst)?.clone();
                self.push(Expr::deref(copy));
            }
            // push a => push a, a
            Dup => {
                let copy = self.top(inst)?.clone();
                self.push(copy);
            }
            Disc => self.discard(inst)?,

            Store => self.binop(inst, BinaryOp::Assign)?,
            Assign => {
                self.binop(inst, BinaryOp::Assign)?;
                self.discard(inst)?;
            }
            Add => self.binop(inst, BinaryOp::Add)?,
            Sub => self.binop(inst, BinaryOp::Sub)?,
            Mul => self.binop(inst, BinaryOp::Mul)?,
            Div => self.binop(inst, BinaryOp::Div)?,
            Mod => self.binop(inst, BinaryOp::Mod)?,
            Orr => self.binop(inst, BinaryOp::Or)?,
            And => self.binop(inst, BinaryOp::And)?,
            Xor => self.binop(inst, BinaryOp::Xor)?,
            Lsl => self.binop(inst, BinaryOp::Lsl)?,
            Lsr => self.binop(inst, BinaryOp::Lsr)?,
            Eq => self.binop(inst, BinaryOp::Eq)?,
            Ne => self.binop(inst, BinaryOp::Ne)?,
            Lt => self.binop(inst, BinaryOp::Lt)?,
            Le => self.binop(inst, BinaryOp::Le)?,
            Gt => self.binop(inst, BinaryOp::Gt)?,
            Ge => self.binop(inst, BinaryOp::Ge)?,
            EqStr => self.binop(inst, BinaryOp::EqStr)?,
            NeStr => self.binop(inst, BinaryOp::NeStr)?,
            LogicalAnd => self.binop(inst, BinaryOp::LogicalAnd)?,
            LogicalOr => self.binop(inst, BinaryOp::LogicalOr)?,

            Neg => self.unop(inst, UnaryOp::Neg)?,
            Not => self.unop(inst, UnaryOp::Not)?,
            Mvn => self.unop(inst, UnaryOp::BitwiseNot)?,

            Inc => self.step(inst, BinaryOp::Add)?,
            Dec => self.step(inst, BinaryOp::Sub)?,

            Call => {
                let callee = usize::try_from(inst.operand)
                    .ok()
                    .and_then(|i| self.module.scene(i))
                    .ok_or(Error::SceneIndexOutOfRange {
                        location: inst.location,
                        index: inst.operand,
                        count: self.module.scenes.len(),
                    })?;
                let (name, argc) = (callee.name.clone(), callee.arg_count as usize);
                self.call(inst, name, argc)?;
            }
            CallExt => {
                // 24-bit field: pool offset of the name, then the argument count
                let raw = inst.operand as u32 & 0x00FF_FFFF;
                let name = self.pool_string(inst, (raw >> 8) as i64)?;
                self.call(inst, name, (raw & 0xFF) as usize)?;
            }
            Printf => {
                self.call(inst, "__printf".to_string(), inst.operand as u8 as usize)?;
                self.discard(inst)?;
            }

            Return => {
                let e = self.pop(inst)?;
                self.stmts.push(Stmt::Return(e));
            }
            RetN => self.stmts.push(Stmt::Return(Expr::Int(0))),
            RetY => self.stmts.push(Stmt::Return(Expr::Int(1))),

            B => self.stmts.push(Stmt::goto(inst.target())),
            By => {
                let cond = self.pop(inst)?;
                self.stmts.push(Stmt::goto_if(inst.target(), cond));
            }
            Bn => {
                let cond = self.pop(inst)?;
                self.stmts
                    .push(Stmt::goto_if(inst.target(), Expr::unary(UnaryOp::Not, cond)));
            }
            Yield => self.stmts.push(Stmt::Yield),

            // must have been folded by the normalizer
            Bky | Bkn => {
                return Err(Error::UnsupportedOpcode {
                    location: inst.location,
                    opcode: inst.opcode,
                })
            }
        }
        Ok(())
    }
}

/// Rebuild the statements of one normalized slice.
pub fn reconstruct_slice(module: &Module, scene: &Scene, insts: &[Instruction]) -> Result<Vec<Stmt>> {
    let mut builder = StatementBuilder::new(module, scene, insts.len());
    for inst in insts {
        builder.apply(inst)?;
    }
    Ok(builder.stmts)
}

/// Number of values a statement list leaves on the stack.
pub fn unmatched_pushes(stmts: &[Stmt]) -> usize {
    stmts.iter().rev().take_while(|s| s.is_push()).count()
}
