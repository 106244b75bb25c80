use crate::cursor::Cursor;
use crate::error::DecodeError;
use crate::prefixes::Prefixes;
use aero_types::{GpRegister, RegisterView, SegmentRegister, Width};
use aero_x86::{BaseRegister, IndirectOperand, Operand};

/// A decoded ModR/M (and, if present, SIB) byte group: a destination/source
/// register selected by the `reg` field, and an r/m operand that is either a
/// register or a fully-resolved memory addressing mode (covering
/// RIP-relative, SIB-with-no-base, and SIB-with-no-index).
pub(crate) struct ModRm {
    pub(crate) reg_index: u8,
    pub(crate) rm: RmOperand,
}

pub(crate) enum RmOperand {
    Register(u8),
    Memory(IndirectOperand),
}

/// Maps a 4-bit extended register index to the register view used for an
/// 8-bit operand, reproducing the AH/CH/DH/BH-vs-SPL/BPL/SIL/DIL split:
/// indices 4..=7 select the legacy high-byte aliases unless any REX prefix
/// was present, in which case they select the low byte of the corresponding
/// extended-addressing register.
pub(crate) fn reg8_view(full_index: u8, rex_present: bool) -> RegisterView {
    if full_index >= 8 || full_index < 4 || rex_present {
        RegisterView::Low8(GpRegister::from_index(full_index))
    } else {
        RegisterView::High8(GpRegister::from_index(full_index - 4))
    }
}

/// Builds the register view for a given operand width, honoring the
/// `reg8_view` high-byte rule only when `width == W8`.
pub(crate) fn register_view(full_index: u8, width: Width, rex_present: bool) -> RegisterView {
    match width {
        Width::W8 => reg8_view(full_index, rex_present),
        Width::W16 => RegisterView::Word16(GpRegister::from_index(full_index)),
        Width::W32 => RegisterView::Dword32(GpRegister::from_index(full_index)),
        Width::W64 => RegisterView::Qword64(GpRegister::from_index(full_index)),
    }
}

fn default_segment(base: Option<BaseRegister>, explicit: Option<SegmentRegister>) -> SegmentRegister {
    if let Some(seg) = explicit {
        return seg;
    }
    match base {
        Some(BaseRegister::Gpr(GpRegister::Rbp)) | Some(BaseRegister::Gpr(GpRegister::Rsp)) => {
            SegmentRegister::Ss
        }
        _ => SegmentRegister::Ds,
    }
}

/// Reads the ModR/M byte (and SIB/displacement bytes it implies) from the
/// cursor. `operand_size` is the r/m operand's width when it turns out to be
/// memory (used to tag the resulting `IndirectOperand`, not to size the
/// address computation itself, which is always 64-bit).
pub(crate) fn read_modrm(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    operand_size: Width,
) -> Result<ModRm, DecodeError> {
    let byte = cursor.read_u8()?;
    let md = byte >> 6;
    let reg = (byte >> 3) & 0b111;
    let rm = byte & 0b111;
    let reg_index = reg | (prefixes.rex_r() << 3);

    if md == 0b11 {
        let rm_index = rm | (prefixes.rex_b() << 3);
        return Ok(ModRm {
            reg_index,
            rm: RmOperand::Register(rm_index),
        });
    }

    let (base, index, scale): (Option<BaseRegister>, Option<GpRegister>, u8) = if rm == 0b100 {
        let sib = cursor.read_u8()?;
        let scale = 1u8 << (sib >> 6);
        let sib_index = (sib >> 3) & 0b111;
        let sib_base = sib & 0b111;
        let index = if sib_index == 0b100 {
            None
        } else {
            Some(GpRegister::from_index(sib_index | (prefixes.rex_x() << 3)))
        };
        let base = if md == 0b00 && sib_base == 0b101 {
            None
        } else {
            Some(BaseRegister::Gpr(GpRegister::from_index(
                sib_base | (prefixes.rex_b() << 3),
            )))
        };
        (base, index, scale)
    } else if md == 0b00 && rm == 0b101 {
        (Some(BaseRegister::Rip), None, 1)
    } else {
        (
            Some(BaseRegister::Gpr(GpRegister::from_index(
                rm | (prefixes.rex_b() << 3),
            ))),
            None,
            1,
        )
    };

    let mandatory_disp32 = matches!(base, Some(BaseRegister::Rip))
        || (rm == 0b100 && base.is_none());
    let displacement: i64 = if mandatory_disp32 || md == 0b10 {
        cursor.read_i32()? as i64
    } else if md == 0b01 {
        cursor.read_i8()? as i64
    } else {
        0
    };

    let segment = default_segment(base, prefixes.segment);
    let mem = IndirectOperand {
        base,
        index,
        scale,
        displacement,
        segment,
        operand_size,
    };
    Ok(ModRm {
        reg_index,
        rm: RmOperand::Memory(mem),
    })
}

impl ModRm {
    pub(crate) fn rm_as_operand(&self, width: Width, rex_present: bool) -> Operand {
        match self.rm {
            RmOperand::Register(idx) => Operand::Register(register_view(idx, width, rex_present)),
            RmOperand::Memory(mem) => Operand::Memory(mem),
        }
    }

    pub(crate) fn reg_as_operand(&self, width: Width, rex_present: bool) -> Operand {
        Operand::Register(register_view(self.reg_index, width, rex_present))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg8_view_maps_high_byte_aliases_without_rex() {
        assert_eq!(
            reg8_view(4, false),
            RegisterView::High8(GpRegister::Rax)
        );
        assert_eq!(reg8_view(7, false), RegisterView::High8(GpRegister::Rbx));
    }

    #[test]
    fn reg8_view_maps_low_byte_with_rex_present() {
        assert_eq!(reg8_view(4, true), RegisterView::Low8(GpRegister::Rsp));
        assert_eq!(reg8_view(12, true), RegisterView::Low8(GpRegister::R12));
    }
}
