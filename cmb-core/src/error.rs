use crate::opcode::Opcode;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedContainer,
    TruncatedStream,
    InvalidOpcode,
    UnreachableEnd,
    ReconstructionFault,
    ResolutionFault,
}

/// Offsets in container errors are file offsets; offsets in script and
/// reconstruction errors are relative to the start of the scene's script.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("file too small for a CMB header: len=0x{len:X}, need at least 0x{min:X}")]
    FileTooSmall { len: usize, min: usize },

    #[error("string pool offset past the end of the file: offset=0x{offset:X}, len=0x{len:X}")]
    StringPoolOutOfRange { offset: u32, len: usize },

    #[error("scene table offset past the end of the file: offset=0x{offset:X}, len=0x{len:X}")]
    SceneTableOutOfRange { offset: u32, len: usize },

    #[error("global variable count over the sanity limit: count={count}, limit={limit}")]
    TooManyGlobals { count: u32, limit: u32 },

    #[error("scene #{position}: parameter count over the sanity limit: count={count}, limit={limit}")]
    TooManyParams { position: u32, count: u32, limit: u32 },

    #[error("scene #{position}: local variable count over the sanity limit: count={count}, limit={limit}")]
    TooManyLocals { position: u32, count: u32, limit: u32 },

    #[error("scene #{position}: argument count {args} exceeds variable count {locals}")]
    ArgsExceedLocals { position: u32, args: u32, locals: u32 },

    #[error("scene #{position}: declared index {declared} does not match its table position")]
    SceneIndexMismatch { position: u32, declared: u32 },

    #[error("scene #{position}: script offset past the end of the file: offset=0x{offset:X}, len=0x{len:X}")]
    ScriptOffsetOutOfRange { position: u32, offset: u32, len: usize },

    #[error("scene table unterminated at offset 0x{offset:X}")]
    SceneTableUnterminated { offset: usize },

    #[error("scene #{position}: header at 0x{offset:X} runs past the end of the file")]
    SceneHeaderTruncated { position: u32, offset: u32 },

    #[error("scene #{position}: {count} parameters at 0x{offset:X} run past the end of the file")]
    SceneParamsTruncated { position: u32, offset: u32, count: u32 },

    #[error("scene #{position}: name at 0x{offset:X} is not NUL-terminated")]
    SceneNameUnterminated { position: u32, offset: u32 },

    #[error("operand of {opcode} at 0x{location:X} runs past the end of the script")]
    OperandTruncated { location: u32, opcode: Opcode },

    #[error("invalid opcode 0x{byte:02X} at 0x{location:X}")]
    InvalidOpcode { location: u32, byte: u8 },

    #[error("branch at 0x{location:X} targets a negative offset ({target})")]
    NegativeBranchTarget { location: u32, target: i64 },

    #[error("branch at 0x{location:X} targets 0x{target:X}, which is not an instruction boundary")]
    MisalignedBranchTarget { location: u32, target: u32 },

    #[error("reached the end of the file (0x{len:X} bytes) without reaching the end of the script")]
    UnreachableEnd { len: usize },

    #[error("{opcode} at 0x{location:X} expects {required} pushed value(s), found {available}")]
    StackUnderflow {
        location: u32,
        opcode: Opcode,
        required: usize,
        available: usize,
    },

    #[error("unsupported opcode {opcode} at 0x{location:X}")]
    UnsupportedOpcode { location: u32, opcode: Opcode },

    #[error("short-circuit branch at 0x{location:X} targets 0x{target:X} outside of its slice")]
    CrossSliceShortCircuit { location: u32, target: u32 },

    #[error("string pool offset 0x{offset:X} at 0x{location:X} is out of range (pool size 0x{pool_len:X})")]
    StringOffsetOutOfRange {
        location: u32,
        offset: i64,
        pool_len: usize,
    },

    #[error("call at 0x{location:X} targets scene {index}, but there are only {count}")]
    SceneIndexOutOfRange { location: u32, index: i32, count: usize },

    #[error("variable {index} at 0x{location:X} is out of range ({count} variables)")]
    VariableOutOfRange { location: u32, index: i32, count: usize },

    #[error("global {index} at 0x{location:X} is out of range ({count} globals)")]
    GlobalOutOfRange { location: u32, index: i32, count: usize },

    #[error("in scene {index}: {source}")]
    Scene {
        index: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("in slice 0x{start:X}: {source}")]
    Slice {
        start: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileTooSmall { .. }
            | Error::StringPoolOutOfRange { .. }
            | Error::SceneTableOutOfRange { .. }
            | Error::TooManyGlobals { .. }
            | Error::TooManyParams { .. }
            | Error::TooManyLocals { .. }
            | Error::ArgsExceedLocals { .. }
            | Error::SceneIndexMismatch { .. }
            | Error::ScriptOffsetOutOfRange { .. }
            | Error::NegativeBranchTarget { .. }
            | Error::MisalignedBranchTarget { .. } => ErrorKind::MalformedContainer,

            Error::SceneTableUnterminated { .. }
            | Error::SceneHeaderTruncated { .. }
            | Error::SceneParamsTruncated { .. }
            | Error::SceneNameUnterminated { .. }
            | Error::OperandTruncated { .. } => ErrorKind::TruncatedStream,

            Error::InvalidOpcode { .. } => ErrorKind::InvalidOpcode,
            Error::UnreachableEnd { .. } => ErrorKind::UnreachableEnd,

            Error::StackUnderflow { .. }
            | Error::UnsupportedOpcode { .. }
            | Error::CrossSliceShortCircuit { .. } => ErrorKind::ReconstructionFault,

            Error::StringOffsetOutOfRange { .. }
            | Error::SceneIndexOutOfRange { .. }
            | Error::VariableOutOfRange { .. }
            | Error::GlobalOutOfRange { .. } => ErrorKind::ResolutionFault,

            Error::Scene { source, .. } | Error::Slice { source, .. } => source.kind(),
        }
    }

    pub(crate) fn in_scene(self, index: u32) -> Self {
        Error::Scene {
            index,
            source: Box::new(self),
        }
    }

    pub(crate) fn in_slice(self, start: u32) -> Self {
        Error::Slice {
            start,
            source: Box::new(self),
        }
    }
}
