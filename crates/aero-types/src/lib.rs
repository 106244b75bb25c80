//! Architectural value types shared by the decoder, register file and
//! executor: register identities, operand widths, and the RFLAGS bit model.
//!
//! This crate is deliberately leaf-level: no I/O, no fallible operations,
//! just the sum types the rest of the workspace builds on.

mod flags;
mod registers;
mod width;

pub use flags::{Flag, RFlags};
pub use registers::{GpRegister, RegisterView, SegmentRegister};
pub use width::Width;
