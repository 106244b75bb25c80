use aero_cpu_core::ExecError;
use aero_cpu_decoder::DecodeError;
use aero_mem::MemoryError;
use thiserror::Error;

/// Failures from `load`/`unload`. All are fatal and reported before (or
/// during) setup — there's no partial-load recovery.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("section {name:?} ({lo:#x}..{hi:#x}) falls outside every PT_LOAD segment")]
    SectionOutsideSegment { name: String, lo: u64, hi: u64 },

    #[error("memory error during load: {0}")]
    Memory(#[from] MemoryError),

    #[error("execution error while running an initializer/finalizer: {0}")]
    Exec(#[from] ExecError),

    #[error("instruction check failed at {addr:#x}: {source}")]
    InvalidInstruction {
        addr: u64,
        #[source]
        source: DecodeError,
    },
}

/// Non-fatal loader conditions: e.g. a `.init`/`.fini` section exists but
/// there's no symbol table to find its `STT_FUNC` entries, so it's skipped
/// with a warning instead of failing the load. Returned alongside a
/// successful `load`/`unload` rather than logged, so callers can assert on
/// them in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderWarning {
    /// A named section (`.init`/`.fini`) exists but there is no symbol
    /// table to find `STT_FUNC` entries within it, so it was skipped.
    MissingInit { section: String },
}
