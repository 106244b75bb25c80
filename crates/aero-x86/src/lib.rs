//! The decoded-instruction data model: a plain sum type the decoder
//! constructs and the executor matches on, with no polymorphic operand
//! interface in between.

mod condition;
mod instruction;
mod operand;

pub use condition::ConditionCode;
pub use instruction::{Instruction, Opcode};
pub use operand::{BaseRegister, IndirectOperand, Operand};
