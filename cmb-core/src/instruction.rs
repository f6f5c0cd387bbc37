use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::opcode::{Dialect, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte, relative to the start of the scene's script.
    pub location: u32,
    pub opcode: Opcode,
    /// Sign-extended operand. For branches, the absolute target offset.
    pub operand: i32,
}

impl Instruction {
    pub fn new(location: u32, opcode: Opcode, operand: i32) -> Self {
        Self {
            location,
            opcode,
            operand,
        }
    }

    /// Offset right after this instruction, assuming the declared operand
    /// width. Exact for branches and returns, which have fixed encodings.
    #[inline]
    pub fn next_location(&self) -> u32 {
        self.location + 1 + self.opcode.operand_width() as u32
    }

    /// Absolute target of a branch.
    #[inline]
    pub fn target(&self) -> u32 {
        self.operand as u32
    }
}

/// Decode one instruction at `pc`. Returns the instruction and the cursor
/// right after it.
pub fn decode_instruction(data: &[u8], pc: usize, dialect: Dialect) -> Result<(Instruction, usize)> {
    let location = pc as u32;
    let byte = *data.get(pc).ok_or(Error::UnreachableEnd { len: data.len() })?;
    let opcode = dialect
        .opcode(byte)
        .ok_or(Error::InvalidOpcode { location, byte })?;

    let mut cur = pc + 1;
    let width = opcode.operand_width() as usize;
    let mut operand = 0i32;

    if width > 0 {
        if cur + width > data.len() {
            return Err(Error::OperandTruncated { location, opcode });
        }
        operand = BigEndian::read_int(&data[cur..cur + width], width) as i32;
        cur += width;

        // In the extended dialect, a call operand with its top bit set is
        // followed by a low byte: ((first & 0x7F) << 8) | next.
        if opcode == Opcode::Call && dialect.has_wide_call() && operand & 0x80 != 0 {
            let low = *data
                .get(cur)
                .ok_or(Error::OperandTruncated { location, opcode })?;
            cur += 1;
            operand = ((operand & 0x7F) << 8) | low as i32;
        }
    }

    if opcode.is_jump() {
        let target = cur as i64 + operand as i64 - width as i64;
        if target < 0 {
            return Err(Error::NegativeBranchTarget { location, target });
        }
        operand = target as i32;
    }

    log::trace!("0x{:08X}: {:8} {}", location, opcode.mnemonic(), operand);
    Ok((Instruction::new(location, opcode, operand), cur))
}

/// Decode one scene's script, starting at the beginning of `data`.
///
/// Scripts carry no explicit length: decoding stops at the first
/// return-class instruction that lies past every branch target seen so far.
pub fn decode_script(data: &[u8], dialect: Dialect) -> Result<Vec<Instruction>> {
    let mut insts = Vec::new();
    let mut pc = 0usize;
    let mut furthest_jump = 0u32;

    while pc < data.len() {
        let (inst, next_pc) = decode_instruction(data, pc, dialect)?;
        pc = next_pc;

        if inst.opcode.is_jump() {
            furthest_jump = furthest_jump.max(inst.target());
        }

        let ended = inst.opcode.is_end() && pc as u32 > furthest_jump;
        insts.push(inst);

        if ended {
            return Ok(insts);
        }
    }

    Err(Error::UnreachableEnd { len: data.len() })
}
