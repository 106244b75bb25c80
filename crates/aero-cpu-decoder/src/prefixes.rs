use crate::cursor::Cursor;
use crate::error::DecodeError;
use aero_types::SegmentRegister;

/// Legacy prefixes plus REX, accumulated while scanning the byte stream
/// before the opcode. Segment overrides follow "last one wins";
/// `CS`/`SS`/`DS`/`ES` overrides are accepted but ignored in 64-bit mode
/// (flat segmentation), matching real hardware — only `FS`/`GS` ever change
/// address translation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Prefixes {
    pub(crate) operand_size_override: bool,
    pub(crate) address_size_override: bool,
    pub(crate) lock: bool,
    pub(crate) rep: bool,
    pub(crate) repne: bool,
    pub(crate) segment: Option<SegmentRegister>,
    pub(crate) rex: Option<u8>,
}

impl Prefixes {
    pub(crate) fn rex_present(&self) -> bool {
        self.rex.is_some()
    }

    pub(crate) fn rex_w(&self) -> bool {
        self.rex.map(|r| r & 0b1000 != 0).unwrap_or(false)
    }

    pub(crate) fn rex_r(&self) -> u8 {
        self.rex.map(|r| (r >> 2) & 1).unwrap_or(0)
    }

    pub(crate) fn rex_x(&self) -> u8 {
        self.rex.map(|r| (r >> 1) & 1).unwrap_or(0)
    }

    pub(crate) fn rex_b(&self) -> u8 {
        self.rex.map(|r| r & 1).unwrap_or(0)
    }
}

/// Scans legacy prefixes and (if present) the trailing REX byte, leaving the
/// cursor positioned at the first opcode byte.
pub(crate) fn scan(cursor: &mut Cursor) -> Result<Prefixes, DecodeError> {
    let mut p = Prefixes::default();
    loop {
        match cursor.peek() {
            Some(0x66) => {
                p.operand_size_override = true;
            }
            Some(0x67) => {
                p.address_size_override = true;
            }
            Some(0xF0) => {
                p.lock = true;
                p.rep = false;
                p.repne = false;
            }
            Some(0xF2) => {
                p.repne = true;
                p.rep = false;
                p.lock = false;
            }
            Some(0xF3) => {
                p.rep = true;
                p.repne = false;
                p.lock = false;
            }
            Some(0x2E) => p.segment = Some(SegmentRegister::Cs),
            Some(0x36) => p.segment = Some(SegmentRegister::Ss),
            Some(0x3E) => p.segment = Some(SegmentRegister::Ds),
            Some(0x26) => p.segment = Some(SegmentRegister::Es),
            Some(0x64) => p.segment = Some(SegmentRegister::Fs),
            Some(0x65) => p.segment = Some(SegmentRegister::Gs),
            _ => break,
        }
        cursor.read_u8()?;
    }
    if let Some(b) = cursor.peek() {
        if (0x40..=0x4F).contains(&b) {
            p.rex = Some(b);
            cursor.read_u8()?;
        }
    }
    Ok(p)
}
