use bitflags::bitflags;

/// Named single-bit RFLAGS positions this core reads/writes. `Iopl` is a
/// two-bit field (12:13) and is handled separately via
/// [`RFlags::iopl`]/[`RFlags::set_iopl`] rather than as a `Flag` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    Cf = 0,
    Pf = 2,
    Af = 4,
    Zf = 6,
    Sf = 7,
    Tf = 8,
    If = 9,
    Df = 10,
    Of = 11,
    Nt = 14,
    Rf = 16,
    Vm = 17,
    Ac = 18,
    Vif = 19,
    Vip = 20,
    Id = 21,
}

impl Flag {
    pub fn bit(self) -> u64 {
        1u64 << (self as u32)
    }
}

bitflags! {
    /// RFLAGS, stored as a plain 64-bit word. Spec §3 explicitly leaves
    /// reserved bits unenforced, so this wraps `from_bits_retain`-style
    /// arbitrary-bit storage rather than rejecting unknown bits: any bit
    /// not named below round-trips through `bits()`/`set`/`get` untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RFlags: u64 {
        const CF = 1 << 0;
        const PF = 1 << 2;
        const AF = 1 << 4;
        const ZF = 1 << 6;
        const SF = 1 << 7;
        const TF = 1 << 8;
        const IF = 1 << 9;
        const DF = 1 << 10;
        const OF = 1 << 11;
        const IOPL0 = 1 << 12;
        const IOPL1 = 1 << 13;
        const NT = 1 << 14;
        const RF = 1 << 16;
        const VM = 1 << 17;
        const AC = 1 << 18;
        const VIF = 1 << 19;
        const VIP = 1 << 20;
        const ID = 1 << 21;
    }
}

impl RFlags {
    /// Wraps a raw 64-bit value, preserving bits this type doesn't name.
    /// RFLAGS has no reserved-bit enforcement here.
    pub fn from_raw(bits: u64) -> Self {
        Self::from_bits_retain(bits)
    }

    pub fn is_set(self, flag: Flag) -> bool {
        self.bits() & flag.bit() != 0
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        let bits = if value {
            self.bits() | flag.bit()
        } else {
            self.bits() & !flag.bit()
        };
        *self = Self::from_raw(bits);
    }

    pub fn iopl(self) -> u8 {
        ((self.bits() >> 12) & 0b11) as u8
    }

    pub fn set_iopl(&mut self, level: u8) {
        let bits = (self.bits() & !(0b11 << 12)) | (((level & 0b11) as u64) << 12);
        *self = Self::from_raw(bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_read_named_flags() {
        let mut f = RFlags::empty();
        f.set_flag(Flag::Zf, true);
        assert!(f.is_set(Flag::Zf));
        assert!(!f.is_set(Flag::Cf));
        f.set_flag(Flag::Zf, false);
        assert!(!f.is_set(Flag::Zf));
    }

    #[test]
    fn unnamed_bits_round_trip() {
        // Bit 22 is unnamed/reserved; spec requires it survive untouched.
        let f = RFlags::from_raw(1 << 22);
        assert_eq!(f.bits(), 1 << 22);
    }

    #[test]
    fn iopl_is_a_two_bit_field() {
        let mut f = RFlags::empty();
        f.set_iopl(3);
        assert_eq!(f.iopl(), 3);
        f.set_flag(Flag::Zf, true);
        assert_eq!(f.iopl(), 3, "setting an unrelated flag must not disturb IOPL");
    }
}
