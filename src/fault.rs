//! Runtime faults
//!
//! A fault is fatal to the current game: the engine halts and the host
//! prints the diagnostic. Conditions the Z-machine standard recovers from
//! locally (missing properties, dictionary misses, calls to address 0)
//! never surface here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("story version {0} is not supported (this interpreter runs version 3 only)")]
    UnsupportedVersion(u8),

    #[error("unsupported opcode {raw:#04x} at {addr:#07x}")]
    UnsupportedOpcode { addr: u32, raw: u8 },

    #[error("instruction at {addr:#07x} is missing operands")]
    BadOperands { addr: u32 },

    #[error("memory access out of bounds at {addr:#07x}")]
    OutOfBounds { addr: usize },

    #[error("write to read-only memory at {addr:#07x}")]
    ReadOnly { addr: usize },

    #[error("{op} on the null object")]
    NullObject { op: &'static str },

    #[error("invalid object number {obj}")]
    BadObject { obj: u16 },

    #[error("invalid attribute number {attr}")]
    BadAttribute { attr: u16 },

    #[error("invalid property number {prop}")]
    BadProperty { prop: u8 },

    #[error("object {obj} has no property {prop}")]
    NoProp { obj: u16, prop: u8 },

    #[error("property {prop} of object {obj} has size {size}, cannot write a word")]
    PropSize { obj: u16, prop: u8, size: usize },

    #[error("division by zero")]
    DivZero,

    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("invalid variable number {var:#04x}")]
    BadVariable { var: u8 },

    #[error("local variable {index} not present in the current routine")]
    BadLocal { index: u8 },

    #[error("invalid routine header at {addr:#07x}")]
    BadRoutine { addr: u32 },

    #[error("malformed text at {addr:#07x}")]
    BadText { addr: usize },

    #[error("invalid story file: {0}")]
    BadStory(String),

    #[error("invalid save data: {0}")]
    BadSave(String),

    #[error("output stream selection nested too deeply")]
    StreamNesting,
}
