//! Bytecode representation for the stack machine (component F).
//!
//! - `op` — opcode tags and inline-operand auxiliary types.
//! - `code` — the compiled, immutable byte stream.
//! - `builder` — emits bytecode, handling forward-jump patching.
//! - `reader` — a sequential cursor for decoding operands during execution.

pub use builder::{CodeBuilder, JumpLabel};
pub use code::Code;
pub use op::{FormatKind, Opcode, ParamTag};
pub use reader::Reader;

mod builder;
mod code;
mod op;
mod reader;
