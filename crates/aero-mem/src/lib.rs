//! The Memory Controller: byte-addressable, permission-checked, 64-bit
//! emulated memory with an initialization bitmap, backed by the
//! [`IntervalArray`] segment-tree-style interval set.

mod controller;
mod error;
mod initializer;
mod interval;

pub use controller::MemoryController;
pub use error::{AccessKind, MemoryError};
pub use initializer::{MemoryInitializer, Random, Zero};
pub use interval::IntervalArray;
