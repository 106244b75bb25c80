use aero_cpu_decoder::DecodeError;
use aero_mem::MemoryError;
use aero_x86::Instruction;
use thiserror::Error;

/// Failures from `execute_one`/`execute`. Every variant is
/// fatal to the current run — there is no instruction-level recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("memory access failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// A syntactically decoded instruction this executor has no semantics
    /// for.
    #[error("unsupported instruction: {0:?}")]
    UnsupportedInstruction(Instruction),
}
