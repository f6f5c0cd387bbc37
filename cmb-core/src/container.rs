//! CMB container parsing.
//!
//! Layout (multi-byte header fields little-endian):
//! - 0x22: u16 global variable count
//! - 0x24: u32 string pool offset
//! - 0x28: u32 scene table offset, an array of u32 scene header offsets
//!   terminated by a zero entry
//!
//! Scene header (0x14 bytes, followed by `param_count` u16 values):
//! - 0x00: u32 name offset (0 = unnamed)
//! - 0x04: u32 script offset
//! - 0x0C: u8  kind
//! - 0x0D: u8  argument count
//! - 0x0E: u8  parameter count
//! - 0x10: u16 declared index
//! - 0x12: u16 local variable count (arguments included)

use byteorder::{ByteOrder, LittleEndian};
use cmb_nls::{Decoder, Encoding, TextDecoder};

use crate::error::{Error, Result};
use crate::instruction::{decode_script, Instruction};
use crate::opcode::Dialect;

pub const HEADER_SIZE: usize = 0x2C;
const GLOBAL_COUNT_OFFSET: usize = 0x22;
const STRING_POOL_OFFSET: usize = 0x24;
const SCENE_TABLE_OFFSET: usize = 0x28;
pub const SCENE_HEADER_SIZE: usize = 0x14;

/// Ceilings that turn obviously corrupt headers into early, clear failures.
/// They are not format limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanityLimits {
    pub max_globals: u32,
    pub max_locals: u32,
    pub max_params: u32,
}

impl Default for SanityLimits {
    fn default() -> Self {
        Self {
            max_globals: 1000,
            max_locals: 1000,
            max_params: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub dialect: Dialect,
    /// Code page of scene names and string literals.
    pub encoding: Encoding,
    pub limits: SanityLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    Function,
    Kind3,
    AreaUnspecified,
    Kind6,
    Unknown(u8),
}

impl From<u8> for SceneKind {
    fn from(v: u8) -> Self {
        match v {
            0 => SceneKind::Function,
            3 => SceneKind::Kind3,
            4 => SceneKind::AreaUnspecified,
            6 => SceneKind::Kind6,
            other => SceneKind::Unknown(other),
        }
    }
}

impl From<SceneKind> for u8 {
    fn from(kind: SceneKind) -> Self {
        match kind {
            SceneKind::Function => 0,
            SceneKind::Kind3 => 3,
            SceneKind::AreaUnspecified => 4,
            SceneKind::Kind6 => 6,
            SceneKind::Unknown(other) => other,
        }
    }
}

/// One callable unit of the module.
#[derive(Debug, Clone)]
pub struct Scene {
    pub index: u32,
    pub kind: SceneKind,
    pub name: String,
    pub arg_count: u32,
    pub parameters: Vec<i32>,
    /// `arg_N` for the first `arg_count` slots, `var_N` for the rest.
    pub variable_names: Vec<String>,
    /// File offset of the script; instruction locations are relative to it.
    pub script_offset: u32,
    pub raw_instructions: Vec<Instruction>,
    pub is_global: bool,
}

impl Scene {
    pub fn local_count(&self) -> usize {
        self.variable_names.len()
    }

    pub fn argument_names(&self) -> &[String] {
        &self.variable_names[..self.arg_count as usize]
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub scenes: Vec<Scene>,
    /// Verbatim copy of the pool; strings are NUL-terminated runs addressed by offset.
    pub string_pool: Vec<u8>,
    pub global_names: Vec<String>,
    pub encoding: Encoding,
}

impl Module {
    pub fn decode(data: &[u8], options: &DecodeOptions) -> Result<Self> {
        decode_module(data, options)
    }

    /// The pool string at `offset`. A string running into the end of the
    /// pool is cut there.
    pub fn pool_string(&self, offset: u32) -> Option<String> {
        let rest = self.string_pool.get(offset as usize..)?;
        if rest.is_empty() {
            return None;
        }
        Some(Decoder::new(self.encoding).decode_cstr(rest).into_owned())
    }

    pub fn scene(&self, index: usize) -> Option<&Scene> {
        self.scenes.get(index)
    }
}

fn read_u16(data: &[u8], off: usize) -> u16 {
    LittleEndian::read_u16(&data[off..off + 2])
}

fn read_u32(data: &[u8], off: usize) -> u32 {
    LittleEndian::read_u32(&data[off..off + 4])
}

fn synthesize_variable_names(arg_count: u32, local_count: u32) -> Vec<String> {
    (0..local_count)
        .map(|i| {
            if i < arg_count {
                format!("arg_{}", i)
            } else {
                format!("var_{}", i)
            }
        })
        .collect()
}

fn read_scene_name(data: &[u8], position: u32, offset: u32, decoder: &Decoder) -> Result<String> {
    match data.get(offset as usize..) {
        Some(rest) if rest.contains(&0) => Ok(decoder.decode_cstr(rest).into_owned()),
        _ => Err(Error::SceneNameUnterminated { position, offset }),
    }
}

fn decode_scene(
    data: &[u8],
    position: u32,
    header_offset: u32,
    options: &DecodeOptions,
) -> Result<Scene> {
    let base = header_offset as usize;
    if base + SCENE_HEADER_SIZE > data.len() {
        return Err(Error::SceneHeaderTruncated {
            position,
            offset: header_offset,
        });
    }

    let name_offset = read_u32(data, base);
    let script_offset = read_u32(data, base + 0x04);
    let kind = SceneKind::from(data[base + 0x0C]);
    let arg_count = data[base + 0x0D] as u32;
    let param_count = data[base + 0x0E] as u32;
    let declared = read_u16(data, base + 0x10) as u32;
    let local_count = read_u16(data, base + 0x12) as u32;

    let limits = &options.limits;
    if param_count > limits.max_params {
        return Err(Error::TooManyParams {
            position,
            count: param_count,
            limit: limits.max_params,
        });
    }
    if local_count > limits.max_locals {
        return Err(Error::TooManyLocals {
            position,
            count: local_count,
            limit: limits.max_locals,
        });
    }
    if arg_count > local_count {
        return Err(Error::ArgsExceedLocals {
            position,
            args: arg_count,
            locals: local_count,
        });
    }

    let params_offset = base + SCENE_HEADER_SIZE;
    if params_offset + 2 * param_count as usize > data.len() {
        return Err(Error::SceneParamsTruncated {
            position,
            offset: params_offset as u32,
            count: param_count,
        });
    }
    if declared != position {
        return Err(Error::SceneIndexMismatch { position, declared });
    }

    let decoder = Decoder::new(options.encoding);
    let is_global = name_offset == 0;
    let name = if is_global {
        format!("Unknown_{}", declared)
    } else {
        read_scene_name(data, position, name_offset, &decoder)?
    };

    let parameters = (0..param_count as usize)
        .map(|i| read_u16(data, params_offset + 2 * i) as i32)
        .collect();

    if script_offset as usize >= data.len() {
        return Err(Error::ScriptOffsetOutOfRange {
            position,
            offset: script_offset,
            len: data.len(),
        });
    }
    let raw_instructions = decode_script(&data[script_offset as usize..], options.dialect)
        .map_err(|e| e.in_scene(declared))?;

    log::debug!(
        "scene {} '{}' kind={:?} args={} locals={} script=0x{:X} ({} instructions)",
        declared,
        name,
        kind,
        arg_count,
        local_count,
        script_offset,
        raw_instructions.len()
    );

    Ok(Scene {
        index: declared,
        kind,
        name,
        arg_count,
        parameters,
        variable_names: synthesize_variable_names(arg_count, local_count),
        script_offset,
        raw_instructions,
        is_global,
    })
}

/// Parse a whole CMB file. Any fault aborts the decode; no partial module
/// is returned.
pub fn decode_module(data: &[u8], options: &DecodeOptions) -> Result<Module> {
    if data.len() < HEADER_SIZE {
        return Err(Error::FileTooSmall {
            len: data.len(),
            min: HEADER_SIZE,
        });
    }

    let global_count = read_u16(data, GLOBAL_COUNT_OFFSET) as u32;
    let pool_offset = read_u32(data, STRING_POOL_OFFSET);
    let table_offset = read_u32(data, SCENE_TABLE_OFFSET);

    if pool_offset as usize >= data.len() {
        return Err(Error::StringPoolOutOfRange {
            offset: pool_offset,
            len: data.len(),
        });
    }
    if table_offset as usize >= data.len() {
        return Err(Error::SceneTableOutOfRange {
            offset: table_offset,
            len: data.len(),
        });
    }
    if global_count > options.limits.max_globals {
        return Err(Error::TooManyGlobals {
            count: global_count,
            limit: options.limits.max_globals,
        });
    }

    // the pool runs up to the scene table, or to the end of the file when
    // the table comes first
    let pool_end = if pool_offset > table_offset {
        data.len()
    } else {
        table_offset as usize
    };
    let string_pool = data[pool_offset as usize..pool_end].to_vec();

    let global_names = (0..global_count).map(|i| format!("gvar_{}", i)).collect();

    let mut scenes = Vec::new();
    for position in 0u32.. {
        let entry = table_offset as usize + 4 * position as usize;
        if entry + 4 > data.len() {
            return Err(Error::SceneTableUnterminated { offset: entry });
        }
        let header_offset = read_u32(data, entry);
        if header_offset == 0 {
            break;
        }
        scenes.push(decode_scene(data, position, header_offset, options)?);
    }

    log::debug!(
        "decoded {} scenes, {} globals, string pool 0x{:X} bytes",
        scenes.len(),
        global_count,
        string_pool.len()
    );

    Ok(Module {
        scenes,
        string_pool,
        global_names,
        encoding: options.encoding,
    })
}
