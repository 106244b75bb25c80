use std::fmt;

use aero_types::{GpRegister, RegisterView, SegmentRegister, Width};

/// The base register of an effective-address computation: either an
/// ordinary GPR or the RIP-relative pseudo-base (RIP-relative addressing
/// is encoded as base=RIP during decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseRegister {
    Gpr(GpRegister),
    Rip,
}

/// An effective-address computation: `base + index * scale + displacement`,
/// resolved against `base == Rip` using the address of the instruction
/// *following* the one this operand belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndirectOperand {
    pub base: Option<BaseRegister>,
    pub index: Option<GpRegister>,
    pub scale: u8,
    pub displacement: i64,
    pub segment: SegmentRegister,
    pub operand_size: Width,
}

impl IndirectOperand {
    /// Resolves the effective address, given the address of the byte
    /// immediately following the instruction this operand belongs to (used
    /// only when `base == Some(Rip)`) and a lookup for GPR values.
    ///
    /// All arithmetic is modulo 2^64.
    pub fn effective_address(&self, ip_of_next: u64, gpr: impl Fn(GpRegister) -> u64) -> u64 {
        let base_value = match self.base {
            Some(BaseRegister::Rip) => ip_of_next,
            Some(BaseRegister::Gpr(r)) => gpr(r),
            None => 0,
        };
        let index_value = self
            .index
            .map(|r| gpr(r).wrapping_mul(self.scale as u64))
            .unwrap_or(0);
        base_value
            .wrapping_add(index_value)
            .wrapping_add(self.displacement as u64)
    }
}

impl fmt::Display for IndirectOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut wrote_term = false;
        match self.base {
            Some(BaseRegister::Rip) => {
                write!(f, "rip")?;
                wrote_term = true;
            }
            Some(BaseRegister::Gpr(r)) => {
                write!(f, "{}", RegisterView::Qword64(r))?;
                wrote_term = true;
            }
            None => {}
        }
        if let Some(index) = self.index {
            if wrote_term {
                write!(f, "+")?;
            }
            write!(f, "{}*{}", RegisterView::Qword64(index), self.scale)?;
            wrote_term = true;
        }
        if self.displacement != 0 || !wrote_term {
            if self.displacement < 0 {
                write!(f, "-{:#x}", -self.displacement)?;
            } else if wrote_term {
                write!(f, "+{:#x}", self.displacement)?;
            } else {
                write!(f, "{:#x}", self.displacement)?;
            }
        }
        write!(f, "]")
    }
}

/// An operand of a decoded instruction. There is no polymorphic operand
/// interface: the executor matches on this directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Register(RegisterView),
    Immediate { width: Width, value: u64 },
    Memory(IndirectOperand),
    RelOffset(i32),
}

impl Operand {
    /// Builds an immediate operand. `value` must already be the fully
    /// sign/zero-extended 64-bit value the executor should use — the
    /// decoder is responsible for extension since it alone knows the
    /// immediate's *encoded* width, which can differ from the operand's
    /// width (e.g. `ADD r/m64, imm32` sign-extends the 32-bit immediate to
    /// 64 bits; `MOV r32, imm32` does not extend at all).
    pub fn immediate(width: Width, value: u64) -> Self {
        Operand::Immediate { width, value }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(view) => write!(f, "{view}"),
            Operand::Immediate { value, .. } => write!(f, "{value:#x}"),
            Operand::Memory(m) => write!(f, "{m}"),
            Operand::RelOffset(rel) => write!(f, "{rel:+#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aero_types::GpRegister as R;

    #[test]
    fn rip_relative_effective_address_uses_next_instruction_address() {
        let mem = IndirectOperand {
            base: Some(BaseRegister::Rip),
            index: None,
            scale: 1,
            displacement: 0x12345678,
            segment: SegmentRegister::Ds,
            operand_size: Width::W64,
        };
        let ea = mem.effective_address(0x1007, |_| 0);
        assert_eq!(ea, 0x1007u64.wrapping_add(0x12345678));
    }

    #[test]
    fn base_plus_scaled_index_plus_displacement() {
        let mem = IndirectOperand {
            base: Some(BaseRegister::Gpr(R::Rbx)),
            index: Some(R::Rcx),
            scale: 4,
            displacement: 0x12345678,
            segment: SegmentRegister::Ds,
            operand_size: Width::W64,
        };
        let ea = mem.effective_address(0, |r| match r {
            R::Rbx => 0x1000,
            R::Rcx => 0x10,
            _ => 0,
        });
        assert_eq!(ea, 0x1000 + 0x10 * 4 + 0x12345678);
    }

    #[test]
    fn display_renders_intel_style_memory_operand() {
        let mem = IndirectOperand {
            base: Some(BaseRegister::Gpr(R::Rbx)),
            index: Some(R::Rcx),
            scale: 4,
            displacement: 0x10,
            segment: SegmentRegister::Ds,
            operand_size: Width::W64,
        };
        assert_eq!(mem.to_string(), "[rbx+rcx*4+0x10]");
    }

    #[test]
    fn display_renders_rip_relative_memory_operand() {
        let mem = IndirectOperand {
            base: Some(BaseRegister::Rip),
            index: None,
            scale: 1,
            displacement: -0x8,
            segment: SegmentRegister::Ds,
            operand_size: Width::W32,
        };
        assert_eq!(mem.to_string(), "[rip-0x8]");
    }
}
