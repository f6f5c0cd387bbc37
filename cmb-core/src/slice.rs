use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::instruction::Instruction;

/// A basic block: a straight-line run of instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub start: u32,
    pub instructions: Vec<Instruction>,
}

/// Slices keyed and ordered by start offset.
pub type SliceMap = BTreeMap<u32, Slice>;

/// Label names keyed by the offset they mark.
pub type LabelMap = BTreeMap<u32, String>;

pub fn label_name(offset: u32) -> String {
    format!("label_{}", offset)
}

/// Offsets that start a new slice: after every plain branch and at its
/// target, and after every return. Branch-and-keep instructions are skipped,
/// their targets stay inside the block until the normalizer folds them.
fn slice_points(insts: &[Instruction]) -> BTreeSet<u32> {
    let mut points = BTreeSet::new();
    for inst in insts {
        if inst.opcode.is_jump_keep() {
            continue;
        }
        if inst.opcode.is_jump() {
            points.insert(inst.next_location());
            points.insert(inst.target());
        }
        if inst.opcode.is_end() {
            points.insert(inst.next_location());
        }
    }
    points
}

/// Partition a scene's instructions into slices.
///
/// Every instruction lands in exactly one slice. A slice point that falls
/// inside an instruction splits before the next instruction boundary.
pub fn slice_script(insts: &[Instruction]) -> SliceMap {
    let points = slice_points(insts);
    let mut slices = SliceMap::new();

    let mut current: Option<Slice> = None;
    let mut prev_location: Option<u32> = None;

    for inst in insts {
        let starts_new = match prev_location {
            None => true,
            Some(prev) => points.range(prev + 1..=inst.location).next().is_some(),
        };
        if starts_new {
            if let Some(done) = current.take() {
                slices.insert(done.start, done);
            }
            current = Some(Slice {
                start: inst.location,
                instructions: Vec::new(),
            });
        }
        if let Some(slice) = current.as_mut() {
            slice.instructions.push(*inst);
        }
        prev_location = Some(inst.location);
    }

    if let Some(done) = current.take() {
        slices.insert(done.start, done);
    }
    slices
}

/// One label per distinct plain-branch target.
pub fn collect_labels(insts: &[Instruction]) -> LabelMap {
    insts
        .iter()
        .filter(|inst| inst.opcode.is_jump() && !inst.opcode.is_jump_keep())
        .map(|inst| (inst.target(), label_name(inst.target())))
        .collect()
}

/// Every branch must land on the first byte of an instruction.
pub fn check_branch_targets(insts: &[Instruction]) -> Result<()> {
    let boundaries: BTreeSet<u32> = insts.iter().map(|inst| inst.location).collect();
    match insts
        .iter()
        .find(|inst| inst.opcode.is_jump() && !boundaries.contains(&inst.target()))
    {
        Some(inst) => Err(Error::MisalignedBranchTarget {
            location: inst.location,
            target: inst.target(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::instruction::decode_script;
    use crate::opcode::{Dialect, Opcode};
    use pretty_assertions::assert_eq;

    fn starts(slices: &SliceMap) -> Vec<u32> {
        slices.keys().copied().collect()
    }

    fn concat(slices: &SliceMap) -> Vec<Instruction> {
        slices
            .values()
            .flat_map(|s| s.instructions.iter().copied())
            .collect()
    }

    #[test]
    fn loop_with_conditional_exit() {
        let insts = decode_script(
            &[
                0x01, 0x00, // 0: val 0
                0x3D, 0x00, 0x07, // 2: bn -> 10
                0x19, 0x01, // 5: number 1
                0x3A, 0xFF, 0xF8, // 7: b -> 0
                0x45, // 10: retn
            ],
            Dialect::Extended,
        )
        .unwrap();
        assert_eq!(insts[1].target(), 10);
        assert_eq!(insts[3].target(), 0);

        let slices = slice_script(&insts);
        assert_eq!(starts(&slices), vec![0, 5, 10]);
        assert_eq!(concat(&slices), insts);

        let labels = collect_labels(&insts);
        assert_eq!(
            labels.into_iter().collect::<Vec<_>>(),
            vec![(0, "label_0".to_string()), (10, "label_10".to_string())]
        );
    }

    #[test]
    fn keep_branches_do_not_split() {
        let insts = vec![
            Instruction::new(0, Opcode::Val8, 0),
            Instruction::new(2, Opcode::Bkn, 7),
            Instruction::new(5, Opcode::Val8, 1),
            Instruction::new(7, Opcode::Bn, 12),
            Instruction::new(10, Opcode::Number8, 0),
            Instruction::new(12, Opcode::RetY, 0),
        ];
        let slices = slice_script(&insts);
        assert_eq!(starts(&slices), vec![0, 10, 12]);
        assert_eq!(slices[&0].instructions.len(), 4);

        let labels = collect_labels(&insts);
        assert!(!labels.contains_key(&7));
        assert!(labels.contains_key(&12));
    }

    #[test]
    fn target_inside_an_instruction_splits_at_next_boundary() {
        let insts = vec![
            Instruction::new(0, Opcode::Number16, 300),
            Instruction::new(3, Opcode::B, 1),
            Instruction::new(6, Opcode::Return, 0),
        ];
        let slices = slice_script(&insts);
        assert_eq!(starts(&slices), vec![0, 3, 6]);
        assert_eq!(concat(&slices), insts);
    }

    #[test]
    fn branch_into_an_instruction_is_rejected() {
        // number 0x100; b -> 1; retn
        let insts = decode_script(&[0x1A, 0x01, 0x00, 0x3A, 0xFF, 0xFD, 0x45], Dialect::Extended).unwrap();
        assert_eq!(insts[1].target(), 1);

        let err = check_branch_targets(&insts).unwrap_err();
        assert!(matches!(
            err,
            Error::MisalignedBranchTarget {
                location: 3,
                target: 1
            }
        ));
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    }

    #[test]
    fn aligned_branches_pass() {
        let insts = vec![
            Instruction::new(0, Opcode::Val8, 0),
            Instruction::new(2, Opcode::Bkn, 5),
            Instruction::new(5, Opcode::By, 0),
            Instruction::new(8, Opcode::RetN, 0),
        ];
        assert!(check_branch_targets(&insts).is_ok());
        assert!(check_branch_targets(&[]).is_ok());
    }

    #[test]
    fn every_instruction_in_exactly_one_slice() {
        let insts = vec![
            Instruction::new(0, Opcode::Yield, 0),
            Instruction::new(1, Opcode::B, 9),
            Instruction::new(4, Opcode::RetN, 0),
            Instruction::new(5, Opcode::Number8, 2),
            Instruction::new(7, Opcode::Return, 0),
            Instruction::new(8, Opcode::Nop, 0),
            Instruction::new(9, Opcode::RetY, 0),
        ];
        let slices = slice_script(&insts);
        assert_eq!(concat(&slices), insts);
        assert_eq!(starts(&slices), vec![0, 4, 5, 8, 9]);
        assert!(slices.values().all(|s| !s.instructions.is_empty()));
        assert!(slice_script(&[]).is_empty());
    }
}
