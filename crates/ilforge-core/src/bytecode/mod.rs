//! Instruction set, method bodies and the tooling around them.
//!
//! `opcode` holds the instruction table, `body` the sink that collects
//! instructions and labels, `sealed` the encoded form. `disasm`, `asm` and
//! `helpers` are the text and validation layers on top.

/// Instruction table and generated `OpCode` enum.
pub mod opcode;
/// Instruction sink: labels, locals, deferred defects, sealing.
pub mod body;
/// Encoded bodies and decoding.
pub mod sealed;
pub mod helpers;
pub mod disasm;
pub mod asm;

pub use body::{BodyId, EmitError, Instr, Label, Local, LocalSlot, MethodBody, Operand};
pub use opcode::{OpCode, OperandKind};
pub use sealed::{decode, Decoded, MetaEntry, RawOperand, SealedBody, TokenKind};
