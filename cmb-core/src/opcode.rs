use std::fmt;
use std::str::FromStr;

use strum::FromRepr;

/// Every opcode value the decompiler knows about.
///
/// `0x00..0x42` exist in both dialects, `0x42..0x48` only in the extended one.
/// `LogicalAnd`/`LogicalOr` never appear in raw bytecode: they are produced by
/// the short-circuit normalizer and consumed by the stack reconstructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,

    // memory addressing, locals
    Val8 = 0x01, // push [l+imm]
    Val16 = 0x02,
    ValX8 = 0x03, // push [l+imm+@0]
    ValX16 = 0x04,
    ValY8 = 0x05, // push [[l+imm]+@0]
    ValY16 = 0x06,
    Ref8 = 0x07, // push l+imm
    Ref16 = 0x08,
    RefX8 = 0x09, // push l+imm+@0
    RefX16 = 0x0A,
    RefY8 = 0x0B, // push [l+imm]+@0
    RefY16 = 0x0C,

    // memory addressing, globals
    GVal8 = 0x0D,
    GVal16 = 0x0E,
    GValX8 = 0x0F,
    GValX16 = 0x10,
    GValY8 = 0x11,
    GValY16 = 0x12,
    GRef8 = 0x13,
    GRef16 = 0x14,
    GRefX8 = 0x15,
    GRefX16 = 0x16,
    GRefY8 = 0x17,
    GRefY16 = 0x18,

    // constants
    Number8 = 0x19,
    Number16 = 0x1A,
    Number32 = 0x1B,
    String8 = 0x1C, // push strpool+imm
    String16 = 0x1D,
    String32 = 0x1E,

    Deref = 0x1F,
    Disc = 0x20,
    Store = 0x21,
    Add = 0x22,
    Sub = 0x23,
    Mul = 0x24,
    Div = 0x25,
    Mod = 0x26,
    Neg = 0x27,
    Mvn = 0x28,
    Not = 0x29,
    Orr = 0x2A,
    And = 0x2B,
    Xor = 0x2C,
    Lsl = 0x2D,
    Lsr = 0x2E,
    Eq = 0x2F,
    Ne = 0x30,
    Lt = 0x31,
    Le = 0x32,
    Gt = 0x33,
    Ge = 0x34,
    EqStr = 0x35,
    NeStr = 0x36,

    Call = 0x37,    // by scene index
    CallExt = 0x38, // by name, inline argument count
    Return = 0x39,
    B = 0x3A,
    By = 0x3B,
    Bky = 0x3C,
    Bn = 0x3D,
    Bkn = 0x3E,
    Yield = 0x3F,

    // debug leftovers
    Unk40 = 0x40,
    Printf = 0x41,

    // extended dialect
    Inc = 0x42,
    Dec = 0x43,
    Dup = 0x44,
    RetN = 0x45,
    RetY = 0x46,
    Assign = 0x47,

    // synthetic
    LogicalAnd = 0x48,
    LogicalOr = 0x49,
}

pub const OPCODE_COUNT: usize = Opcode::LogicalOr as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackDelta {
    Fixed(i8),
    /// Depends on the operand (calls, printf) or on control flow (branch-and-keep).
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub stack_delta: StackDelta,
    /// Operand byte width: 0, 1, 2, 3 or 4. The extended-dialect `call` may
    /// consume one more byte than declared here.
    pub operand_width: u8,
    pub is_jump: bool,
}

const fn op(mnemonic: &'static str, delta: i8, operand_width: u8) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        stack_delta: StackDelta::Fixed(delta),
        operand_width,
        is_jump: false,
    }
}

const fn var(mnemonic: &'static str, operand_width: u8) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        stack_delta: StackDelta::Variable,
        operand_width,
        is_jump: false,
    }
}

const fn jump(mnemonic: &'static str, stack_delta: StackDelta) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        stack_delta,
        operand_width: 2,
        is_jump: true,
    }
}

static OPCODE_INFO: [OpcodeInfo; OPCODE_COUNT] = [
    op("nop", 0, 0),
    op("val", 1, 1),
    op("val", 1, 2),
    op("valx", 1, 1),
    op("valx", 1, 2),
    op("valy", 1, 1),
    op("valy", 1, 2),
    op("ref", 1, 1),
    op("ref", 1, 2),
    op("refx", 1, 1),
    op("refx", 1, 2),
    op("refy", 1, 1),
    op("refy", 1, 2),
    op("gval", 1, 1),
    op("gval", 1, 2),
    op("gvalx", 1, 1),
    op("gvalx", 1, 2),
    op("gvaly", 1, 1),
    op("gvaly", 1, 2),
    op("gref", 1, 1),
    op("gref", 1, 2),
    op("grefx", 1, 1),
    op("grefx", 1, 2),
    op("grefy", 1, 1),
    op("grefy", 1, 2),
    op("number", 1, 1),
    op("number", 1, 2),
    op("number", 1, 4),
    op("string", 1, 1),
    op("string", 1, 2),
    op("string", 1, 4),
    op("deref", 1, 0),
    op("disc", -1, 0),
    op("store", -1, 0),
    op("add", -1, 0),
    op("sub", -1, 0),
    op("mul", -1, 0),
    op("div", -1, 0),
    op("mod", -1, 0),
    op("neg", 0, 0),
    op("mvn", 0, 0),
    op("not", 0, 0),
    op("orr", -1, 0),
    op("and", -1, 0),
    op("xor", -1, 0),
    op("lsl", -1, 0),
    op("lsr", -1, 0),
    op("eq", -1, 0),
    op("ne", -1, 0),
    op("lt?", -1, 0),
    op("le", -1, 0),
    op("gt?", -1, 0),
    op("ge?", -1, 0),
    op("eqstr", -1, 0),
    op("nestr", -1, 0),
    var("call", 1),
    var("callext", 3),
    op("ret", 0, 0),
    jump("b", StackDelta::Fixed(0)),
    jump("by", StackDelta::Fixed(-1)),
    jump("bky", StackDelta::Variable),
    jump("bn", StackDelta::Fixed(-1)),
    jump("bkn", StackDelta::Variable),
    op("yield", 0, 0),
    op("unk", 0, 4),
    var("printf", 1),
    op("inc", -1, 0),
    op("dec", -1, 0),
    op("dup", 1, 0),
    op("retn", 0, 0),
    op("rety", 0, 0),
    op("assign", -2, 0),
    op("land", -1, 0),
    op("lorr", -1, 0),
];

impl Opcode {
    #[inline]
    pub fn info(self) -> &'static OpcodeInfo {
        &OPCODE_INFO[self as usize]
    }

    #[inline]
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    #[inline]
    pub fn operand_width(self) -> u8 {
        self.info().operand_width
    }

    #[inline]
    pub fn is_jump(self) -> bool {
        self.info().is_jump
    }

    /// Branches that leave the tested value on the stack when taken.
    #[inline]
    pub fn is_jump_keep(self) -> bool {
        matches!(self, Opcode::Bky | Opcode::Bkn)
    }

    /// Return-class opcodes.
    #[inline]
    pub fn is_end(self) -> bool {
        matches!(self, Opcode::Return | Opcode::RetN | Opcode::RetY)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Opcode set and encoding rules, fixed for a whole decode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    Base,
    #[default]
    Extended,
}

impl Dialect {
    /// Raw opcode bytes must be strictly below this value.
    pub const fn opcode_count(self) -> u8 {
        match self {
            Dialect::Base => Opcode::Inc as u8,
            Dialect::Extended => Opcode::LogicalAnd as u8,
        }
    }

    /// Resolve a raw bytecode byte. Synthetic opcodes are never valid here.
    pub fn opcode(self, byte: u8) -> Option<Opcode> {
        if byte < self.opcode_count() {
            Opcode::from_repr(byte)
        } else {
            None
        }
    }

    /// Whether `call` uses the 1-or-2 byte operand encoding.
    #[inline]
    pub fn has_wide_call(self) -> bool {
        self == Dialect::Extended
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Dialect::Base),
            "extended" => Ok(Dialect::Extended),
            _ => Err(format!("unknown dialect: {}", s)),
        }
    }
}
