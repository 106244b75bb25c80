/// The decoding mode. This core only ever runs userspace 64-bit code, so
/// there is exactly one variant — kept as an explicit argument (rather than
/// assumed) so `decode_one`'s signature reads the same as a decoder that
/// supports more modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecodeMode {
    #[default]
    Bits64,
}

/// No x86 instruction, with any combination of legacy prefixes, REX, and
/// trailing immediate/displacement bytes, exceeds this length.
pub const MAX_INSTRUCTION_LEN: usize = 15;
