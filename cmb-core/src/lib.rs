//! CMB event-script decompiler core.
//!
//! Pipeline per scene: the container decoder yields a [`Module`] whose
//! scenes carry decoded instructions; [`slice_script`] splits them into
//! basic blocks, [`normalized`] folds short-circuit branches, and
//! [`reconstruct_slice`] rebuilds statements. [`decompile_scene`] runs the
//! whole chain and [`render`] turns the result into pseudo-source.

pub mod ast;
pub mod container;
pub mod error;
pub mod instruction;
pub mod normalize;
pub mod opcode;
pub mod reconstruct;
pub mod render;
pub mod slice;

use std::collections::BTreeMap;

pub use ast::{BinaryOp, Expr, Stmt, UnaryOp};
pub use container::{decode_module, DecodeOptions, Module, SanityLimits, Scene, SceneKind};
pub use error::{Error, ErrorKind, Result};
pub use instruction::{decode_instruction, decode_script, Instruction};
pub use normalize::{fold_short_circuits, normalized};
pub use opcode::{Dialect, Opcode, OpcodeInfo, StackDelta};
pub use reconstruct::reconstruct_slice;
pub use render::{render_module, write_module, write_scene};
pub use slice::{check_branch_targets, collect_labels, slice_script, LabelMap, Slice, SliceMap};

/// Everything the renderer needs for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompiledScene {
    pub index: u32,
    pub name: String,
    pub parameters: Vec<String>,
    pub is_global: bool,
    /// Statements of each slice, keyed by slice start.
    pub slices: BTreeMap<u32, Vec<Stmt>>,
    pub labels: LabelMap,
}

/// Slice, normalize and reconstruct one scene.
///
/// Faults are wrapped with the slice start and the scene index.
pub fn decompile_scene(module: &Module, scene: &Scene) -> Result<DecompiledScene> {
    check_branch_targets(&scene.raw_instructions).map_err(|e| e.in_scene(scene.index))?;
    let labels = collect_labels(&scene.raw_instructions);
    let mut slices = BTreeMap::new();

    for (start, slice) in slice_script(&scene.raw_instructions) {
        let stmts = normalized(&slice.instructions)
            .and_then(|insts| reconstruct_slice(module, scene, &insts))
            .map_err(|e| e.in_slice(start).in_scene(scene.index))?;
        slices.insert(start, stmts);
    }

    log::debug!(
        "scene {} '{}': {} slices, {} labels",
        scene.index,
        scene.name,
        slices.len(),
        labels.len()
    );

    Ok(DecompiledScene {
        index: scene.index,
        name: scene.name.clone(),
        parameters: scene.argument_names().to_vec(),
        is_global: scene.is_global,
        slices,
        labels,
    })
}

/// Decompile every scene, stopping at the first fault.
pub fn decompile_module(module: &Module) -> Result<Vec<DecompiledScene>> {
    module
        .scenes
        .iter()
        .map(|scene| decompile_scene(module, scene))
        .collect()
}
