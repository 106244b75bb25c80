//! Hand-rolled x86-64 instruction decoder: legacy prefixes, REX, ModR/M and
//! SIB, producing the plain [`aero_x86::Instruction`] sum type the executor
//! consumes. Deliberately does not wrap a third-party decoder backend — see
//! the crate's `iced-x86` dev-dependency, which exists purely as a golden
//! oracle for this crate's own tests.

mod cursor;
mod decoder;
mod error;
mod mode;
mod modrm;
mod prefixes;

pub use decoder::decode_one;
pub use error::DecodeError;
pub use mode::{DecodeMode, MAX_INSTRUCTION_LEN};
