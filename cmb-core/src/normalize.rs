use crate::error::{Error, Result};
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// Rewrite every branch-and-keep in `insts` into a synthetic logical
/// operator placed right before its target:
///
/// ```text
/// 0 val 0          0 val 0
/// 2 bkn 7    =>    5 val 1
/// 5 val 1          2 land
/// 7 bn ...         7 bn ...
/// ```
///
/// The target must be an instruction of the same slice.
pub fn fold_short_circuits(insts: &mut [Instruction]) -> Result<()> {
    let mut i = 0;
    while i < insts.len() {
        let inst = insts[i];
        let synthetic = match inst.opcode {
            Opcode::Bkn => Opcode::LogicalAnd,
            Opcode::Bky => Opcode::LogicalOr,
            _ => {
                i += 1;
                continue;
            }
        };

        let target = inst.target();
        let j = insts[i + 1..]
            .iter()
            .position(|other| other.location == target)
            .map(|offset| i + 1 + offset)
            .ok_or(Error::CrossSliceShortCircuit {
                location: inst.location,
                target,
            })?;

        // swap forward until it sits right before the target
        insts[i..j].rotate_left(1);
        insts[j - 1].opcode = synthetic;
        insts[j - 1].operand = 0;

        log::trace!(
            "folded {} at 0x{:X} into {} before 0x{:X}",
            inst.opcode,
            inst.location,
            synthetic,
            target
        );
        // position i now holds the instruction that followed the branch
    }
    Ok(())
}

/// Normalized copy of a slice's instructions.
pub fn normalized(insts: &[Instruction]) -> Result<Vec<Instruction>> {
    let mut out = insts.to_vec();
    fold_short_circuits(&mut out)?;
    Ok(out)
}
