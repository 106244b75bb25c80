use crate::Width;

/// One of the 16 general-purpose register slots, in Intel encoding order.
///
/// The slot index (0..=15) is the storage index in `RegisterFile`'s GPR
/// bank; it is also the raw ModR/M/SIB register-field encoding once
/// extended by REX.R/X/B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GpRegister {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl GpRegister {
    pub const ALL: [GpRegister; 16] = [
        GpRegister::Rax,
        GpRegister::Rcx,
        GpRegister::Rdx,
        GpRegister::Rbx,
        GpRegister::Rsp,
        GpRegister::Rbp,
        GpRegister::Rsi,
        GpRegister::Rdi,
        GpRegister::R8,
        GpRegister::R9,
        GpRegister::R10,
        GpRegister::R11,
        GpRegister::R12,
        GpRegister::R13,
        GpRegister::R14,
        GpRegister::R15,
    ];

    /// Builds a `GpRegister` from a raw 4-bit encoding (ModR/M reg/rm field
    /// already extended by the relevant REX bit).
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index & 0x0F) as usize]
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// The six segment selectors. Index order matches the x86 `sreg`
/// encoding (the 3-bit field used by e.g. `MOV Sreg, r/m16`), which is
/// also the order segment-override prefixes are most naturally tabulated
/// in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegmentRegister {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl SegmentRegister {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A polymorphic view onto one of the 16 GPR slots: which bits of the
/// 64-bit slot this operand reads/writes.
///
/// `High8` is only ever constructed over `Rax`/`Rcx`/`Rdx`/`Rbx` (AH/CH/DH/BH
/// alias bits [15:8] of slots 0..3); the decoder is the sole producer of
/// `RegisterView` values and enforces that invariant when it maps a ModR/M
/// 8-bit register field without a REX prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterView {
    Low8(GpRegister),
    High8(GpRegister),
    Word16(GpRegister),
    Dword32(GpRegister),
    Qword64(GpRegister),
}

impl RegisterView {
    pub fn gpr(self) -> GpRegister {
        match self {
            RegisterView::Low8(r)
            | RegisterView::High8(r)
            | RegisterView::Word16(r)
            | RegisterView::Dword32(r)
            | RegisterView::Qword64(r) => r,
        }
    }

    pub fn width(self) -> Width {
        match self {
            RegisterView::Low8(_) | RegisterView::High8(_) => Width::W8,
            RegisterView::Word16(_) => Width::W16,
            RegisterView::Dword32(_) => Width::W32,
            RegisterView::Qword64(_) => Width::W64,
        }
    }

    pub fn is_high_byte(self) -> bool {
        matches!(self, RegisterView::High8(_))
    }

    /// The Intel mnemonic for this view (e.g. `rax`, `eax`, `ax`, `al`,
    /// `ah`), used only for `Display`/diagnostic output — never consulted
    /// by the decoder or executor, which operate on the typed variants.
    pub fn name(self) -> &'static str {
        const LOW8: [&str; 16] = [
            "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b",
            "r12b", "r13b", "r14b", "r15b",
        ];
        const HIGH8: [&str; 4] = ["ah", "ch", "dh", "bh"];
        const WORD16: [&str; 16] = [
            "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w",
            "r13w", "r14w", "r15w",
        ];
        const DWORD32: [&str; 16] = [
            "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
            "r12d", "r13d", "r14d", "r15d",
        ];
        const QWORD64: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        let idx = self.gpr().index() as usize;
        match self {
            RegisterView::Low8(_) => LOW8[idx],
            RegisterView::High8(_) => HIGH8[idx],
            RegisterView::Word16(_) => WORD16[idx],
            RegisterView::Dword32(_) => DWORD32[idx],
            RegisterView::Qword64(_) => QWORD64[idx],
        }
    }
}

impl std::fmt::Display for RegisterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
