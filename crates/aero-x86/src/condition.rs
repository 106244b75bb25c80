use aero_types::{Flag, RFlags};

/// The 16 condition-code predicates used by `Jcc`/`CMOVcc`/`SETcc`, keyed
/// by their 4-bit encoding (the low nibble of the opcode byte, e.g. `0x74`
/// = JE = condition 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConditionCode {
    O = 0,
    No = 1,
    B = 2,
    Nb = 3,
    E = 4,
    Ne = 5,
    Be = 6,
    Nbe = 7,
    S = 8,
    Ns = 9,
    P = 10,
    Np = 11,
    L = 12,
    Nl = 13,
    Le = 14,
    Nle = 15,
}

impl ConditionCode {
    pub fn from_nibble(n: u8) -> Self {
        use ConditionCode::*;
        match n & 0x0F {
            0 => O,
            1 => No,
            2 => B,
            3 => Nb,
            4 => E,
            5 => Ne,
            6 => Be,
            7 => Nbe,
            8 => S,
            9 => Ns,
            10 => P,
            11 => Np,
            12 => L,
            13 => Nl,
            14 => Le,
            _ => Nle,
        }
    }

    /// The Intel mnemonic suffix this condition contributes to `Jcc`/`CMOVcc`
    /// (e.g. `E` renders as `"e"`, giving `"je"`/`"cmove"`).
    pub fn mnemonic_suffix(self) -> &'static str {
        match self {
            ConditionCode::O => "o",
            ConditionCode::No => "no",
            ConditionCode::B => "b",
            ConditionCode::Nb => "nb",
            ConditionCode::E => "e",
            ConditionCode::Ne => "ne",
            ConditionCode::Be => "be",
            ConditionCode::Nbe => "nbe",
            ConditionCode::S => "s",
            ConditionCode::Ns => "ns",
            ConditionCode::P => "p",
            ConditionCode::Np => "np",
            ConditionCode::L => "l",
            ConditionCode::Nl => "nl",
            ConditionCode::Le => "le",
            ConditionCode::Nle => "nle",
        }
    }

    /// Evaluates this condition against the given RFLAGS.
    pub fn evaluate(self, flags: RFlags) -> bool {
        let cf = flags.is_set(Flag::Cf);
        let zf = flags.is_set(Flag::Zf);
        let sf = flags.is_set(Flag::Sf);
        let of = flags.is_set(Flag::Of);
        let pf = flags.is_set(Flag::Pf);
        match self {
            ConditionCode::O => of,
            ConditionCode::No => !of,
            ConditionCode::B => cf,
            ConditionCode::Nb => !cf,
            ConditionCode::E => zf,
            ConditionCode::Ne => !zf,
            ConditionCode::Be => cf || zf,
            ConditionCode::Nbe => !cf && !zf,
            ConditionCode::S => sf,
            ConditionCode::Ns => !sf,
            ConditionCode::P => pf,
            ConditionCode::Np => !pf,
            ConditionCode::L => sf != of,
            ConditionCode::Nl => sf == of,
            ConditionCode::Le => zf || (sf != of),
            ConditionCode::Nle => !zf && (sf == of),
        }
    }
}
