use thiserror::Error;

/// Failures `decode_one` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty input")]
    EmptyInput,

    /// Ran out of bytes mid-instruction: a prefix, opcode, ModR/M, SIB,
    /// displacement, or immediate needed a byte that wasn't in the window.
    #[error("truncated instruction")]
    TruncatedInstruction,

    #[error("unknown opcode byte {0:#04x}")]
    UnknownOpcode(u8),

    #[error("unknown two-byte opcode 0F {0:#04x}")]
    UnknownTwoByteOpcode(u8),

    /// A syntactically valid opcode the decoder recognizes but this core
    /// does not execute (e.g. a reserved/undefined encoding within a group).
    #[error("reserved opcode (group {group} /{digit})")]
    ReservedOpcode { group: u8, digit: u8 },

    /// A recognized escape/prefix form this core doesn't decode further,
    /// e.g. a VEX/EVEX lead-in byte.
    #[error("unrecognized prefix byte {0:#04x}")]
    UnrecognizedPrefix(u8),
}
