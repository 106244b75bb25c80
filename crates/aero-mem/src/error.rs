use thiserror::Error;

/// The kind of access a permission check failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("permission denied: {kind:?} access to {addr:#x}")]
    PermissionDenied { kind: AccessKind, addr: u64 },

    #[error("invalid range: lo {lo:#x} > hi {hi:#x}")]
    InvalidRange { lo: u64, hi: u64 },
}
