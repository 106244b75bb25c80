use crate::cursor::Cursor;
use crate::error::DecodeError;
use crate::mode::{DecodeMode, MAX_INSTRUCTION_LEN};
use crate::modrm::{read_modrm, register_view, ModRm};
use crate::prefixes::{self, Prefixes};
use aero_types::{GpRegister, RegisterView, Width};
use aero_x86::{ConditionCode, Instruction, Opcode, Operand};

fn operand_size(prefixes: &Prefixes) -> Width {
    if prefixes.rex_w() {
        Width::W64
    } else if prefixes.operand_size_override {
        Width::W16
    } else {
        Width::W32
    }
}

/// Sign-extends an immediate encoded in `encoded_width` out to 64 bits
/// raw-value form, suitable for `Operand::immediate`'s `value` field
/// regardless of the destination operand's own width (`ADD r/m64, imm32`
/// sign-extends; `MOV r32, imm32` truncates/zero-extends via the general
/// 32-bit-write rule instead, which the executor applies, not the
/// decoder).
fn read_imm_sign_extended(cursor: &mut Cursor, encoded_width: Width) -> Result<u64, DecodeError> {
    let raw = match encoded_width {
        Width::W8 => cursor.read_i8()? as i64 as u64,
        Width::W16 => {
            let v = cursor.read_u16()?;
            Width::W16.sign_extend(v as u64)
        }
        Width::W32 => {
            let v = cursor.read_u32()?;
            Width::W32.sign_extend(v as u64)
        }
        Width::W64 => cursor.read_u64()?,
    };
    Ok(raw)
}

/// The width of an immediate that is sign-extended to the destination's
/// operand width rather than matching it exactly: imm8 for byte ops, imm32
/// for wider ones (imm16 when the 0x66 override narrows the operand to 16
/// bits) — x86-64 never encodes a full imm64 for these "immediate group"
/// forms.
fn group_immediate_encoded_width(operand_width: Width) -> Width {
    match operand_width {
        Width::W8 => Width::W8,
        Width::W16 => Width::W16,
        Width::W32 | Width::W64 => Width::W32,
    }
}

struct RegRm {
    reg: Operand,
    rm: Operand,
    modrm_len: usize,
}

fn decode_reg_rm(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
) -> Result<RegRm, DecodeError> {
    let start = cursor.position();
    let modrm = read_modrm(cursor, prefixes, width)?;
    let reg = modrm.reg_as_operand(width, prefixes.rex_present());
    let rm = modrm.rm_as_operand(width, prefixes.rex_present());
    Ok(RegRm {
        reg,
        rm,
        modrm_len: cursor.position() - start,
    })
}

/// Decodes a single instruction starting at `start_addr` from `bytes`.
///
/// `bytes` need not contain exactly one instruction's worth of data — only
/// a prefix of it is consumed, and `Instruction::length` reports how much.
/// Callers fetching from memory should supply up to [`MAX_INSTRUCTION_LEN`]
/// bytes (fewer is fine if fewer are mapped/readable) and treat a
/// `DecodeError::TruncatedInstruction` as ambiguous between "truncated buffer" and
/// "genuinely truncated instruction" the same way real fetch units do.
pub fn decode_one(_mode: DecodeMode, start_addr: u64, bytes: &[u8]) -> Result<Instruction, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyInput);
    }
    let window = if bytes.len() > MAX_INSTRUCTION_LEN {
        &bytes[..MAX_INSTRUCTION_LEN]
    } else {
        bytes
    };
    let mut cursor = Cursor::new(window);
    let prefixes = prefixes::scan(&mut cursor)?;
    let width = operand_size(&prefixes);
    let rex_present = prefixes.rex_present();

    let op1 = cursor.read_u8()?;

    let (opcode, operands): (Opcode, Vec<Operand>) = match op1 {
        0x90 => (Opcode::Nop, vec![]),
        0xF4 => (Opcode::Hlt, vec![]),

        // MOV r/m8, r8 / MOV r/m, r
        0x88 | 0x89 => {
            let w = if op1 == 0x88 { Width::W8 } else { width };
            let rr = decode_reg_rm(&mut cursor, &prefixes, w)?;
            (Opcode::Mov, vec![rr.rm, rr.reg])
        }
        // MOV r8, r/m8 / MOV r, r/m
        0x8A | 0x8B => {
            let w = if op1 == 0x8A { Width::W8 } else { width };
            let rr = decode_reg_rm(&mut cursor, &prefixes, w)?;
            (Opcode::Mov, vec![rr.reg, rr.rm])
        }
        0x8D => {
            let rr = decode_reg_rm(&mut cursor, &prefixes, width)?;
            (Opcode::Lea, vec![rr.reg, rr.rm])
        }
        // MOV r8, imm8
        0xB0..=0xB7 => {
            let reg = (op1 - 0xB0) | (prefixes.rex_b() << 3);
            let dst = Operand::Register(register_view(reg, Width::W8, rex_present));
            let imm = cursor.read_u8()? as u64;
            (Opcode::Mov, vec![dst, Operand::immediate(Width::W8, imm)])
        }
        // MOV r(16/32), imm(16/32) or MOVABS r64, imm64 when REX.W
        0xB8..=0xBF => {
            let reg = (op1 - 0xB8) | (prefixes.rex_b() << 3);
            let dst = Operand::Register(register_view(reg, width, rex_present));
            if width == Width::W64 {
                let imm = cursor.read_u64()?;
                (Opcode::Movabs, vec![dst, Operand::immediate(Width::W64, imm)])
            } else if width == Width::W16 {
                let imm = cursor.read_u16()? as u64;
                (Opcode::Mov, vec![dst, Operand::immediate(Width::W16, imm)])
            } else {
                let imm = cursor.read_u32()? as u64;
                (Opcode::Mov, vec![dst, Operand::immediate(Width::W32, imm)])
            }
        }
        // MOV r/m8, imm8 (group 11, single supported digit 0)
        0xC6 => {
            let modrm = read_modrm(&mut cursor, &prefixes, Width::W8)?;
            reject_unless_digit_zero(&modrm, 11)?;
            let rm = modrm.rm_as_operand(Width::W8, rex_present);
            let imm = cursor.read_u8()? as u64;
            (Opcode::Mov, vec![rm, Operand::immediate(Width::W8, imm)])
        }
        // MOV r/m, imm32 (group 11)
        0xC7 => {
            let modrm = read_modrm(&mut cursor, &prefixes, width)?;
            reject_unless_digit_zero(&modrm, 11)?;
            let rm = modrm.rm_as_operand(width, rex_present);
            let enc_width = group_immediate_encoded_width(width);
            let imm = read_imm_sign_extended(&mut cursor, enc_width)?;
            (Opcode::Mov, vec![rm, Operand::immediate(width, imm)])
        }

        // ADD/OR/ADC/SBB/AND/SUB/XOR/CMP, r/m8,r8 and r/m,r forms
        0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
            decode_group1_rm_reg(&mut cursor, &prefixes, Width::W8, op1)?
        }
        0x01 | 0x09 | 0x11 | 0x19 | 0x21 | 0x29 | 0x31 | 0x39 => {
            decode_group1_rm_reg(&mut cursor, &prefixes, width, op1)?
        }
        // ... r8, r/m8 and r, r/m forms
        0x02 | 0x0A | 0x12 | 0x1A | 0x22 | 0x2A | 0x32 | 0x3A => {
            decode_group1_reg_rm(&mut cursor, &prefixes, Width::W8, op1)?
        }
        0x03 | 0x0B | 0x13 | 0x1B | 0x23 | 0x2B | 0x33 | 0x3B => {
            decode_group1_reg_rm(&mut cursor, &prefixes, width, op1)?
        }

        // Group 1 immediate forms: 80 /r ib (8-bit), 81 /r iz, 83 /r ib (sign-extended)
        0x80 => decode_group1_imm(&mut cursor, &prefixes, Width::W8, Width::W8)?,
        0x81 => {
            let enc = group_immediate_encoded_width(width);
            decode_group1_imm(&mut cursor, &prefixes, width, enc)?
        }
        0x83 => decode_group1_imm(&mut cursor, &prefixes, width, Width::W8)?,

        // TEST r/m8,r8 / r/m,r
        0x84 => {
            let rr = decode_reg_rm(&mut cursor, &prefixes, Width::W8)?;
            (Opcode::Test, vec![rr.rm, rr.reg])
        }
        0x85 => {
            let rr = decode_reg_rm(&mut cursor, &prefixes, width)?;
            (Opcode::Test, vec![rr.rm, rr.reg])
        }

        // Group 2 shifts: C1 /r ib, D1 /r (by 1), D3 /r (by CL)
        0xC1 => decode_group2_imm(&mut cursor, &prefixes, width)?,
        0xD1 => decode_group2_by_one(&mut cursor, &prefixes, width)?,
        0xD3 => decode_group2_by_cl(&mut cursor, &prefixes, width)?,

        // PUSH/POP r64 (opcode + reg)
        0x50..=0x57 => {
            let reg = (op1 - 0x50) | (prefixes.rex_b() << 3);
            let src = Operand::Register(register_view(reg, Width::W64, rex_present));
            (Opcode::Push, vec![src])
        }
        0x58..=0x5F => {
            let reg = (op1 - 0x58) | (prefixes.rex_b() << 3);
            let dst = Operand::Register(register_view(reg, Width::W64, rex_present));
            (Opcode::Pop, vec![dst])
        }
        0x68 => {
            let imm = read_imm_sign_extended(&mut cursor, Width::W32)?;
            (Opcode::Push, vec![Operand::immediate(Width::W64, imm)])
        }
        0x6A => {
            let imm = read_imm_sign_extended(&mut cursor, Width::W8)?;
            (Opcode::Push, vec![Operand::immediate(Width::W64, imm)])
        }
        // Group 5: FF /0 INC, /1 DEC, /2 CALL r/m, /4 JMP r/m, /6 PUSH r/m
        0xFF => decode_group5(&mut cursor, &prefixes, width, rex_present)?,
        // Group 1A: 8F /0 POP r/m
        0x8F => {
            let modrm = read_modrm(&mut cursor, &prefixes, Width::W64)?;
            reject_unless_digit_zero(&modrm, 0x1A)?;
            (Opcode::Pop, vec![modrm.rm_as_operand(Width::W64, rex_present)])
        }

        0xE8 => {
            let rel = cursor.read_i32()?;
            (Opcode::Call, vec![Operand::RelOffset(rel)])
        }
        0xC3 => (Opcode::Ret, vec![]),
        0xE9 => {
            let rel = cursor.read_i32()?;
            (Opcode::Jmp, vec![Operand::RelOffset(rel)])
        }
        0xEB => {
            let rel = cursor.read_i8()? as i32;
            (Opcode::Jmp, vec![Operand::RelOffset(rel)])
        }
        0x70..=0x7F => {
            let cc = ConditionCode::from_nibble(op1 - 0x70);
            let rel = cursor.read_i8()? as i32;
            (Opcode::Jcc(cc), vec![Operand::RelOffset(rel)])
        }

        0x0F => return decode_two_byte(&mut cursor, &prefixes, width),

        // VEX/EVEX escape lead-in bytes. This core doesn't decode the
        // vector encoding that follows, but they're recognized prefix
        // bytes, not unknown opcodes.
        0xC4 | 0xC5 | 0x62 => return Err(DecodeError::UnrecognizedPrefix(op1)),

        other => return Err(DecodeError::UnknownOpcode(other)),
    };

    let length = cursor.position();
    let _ = start_addr; // RIP-relative resolution happens at execution time.
    Ok(Instruction::new(opcode, &operands, length as u8))
}

fn decode_two_byte(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
) -> Result<Instruction, DecodeError> {
    let op2 = cursor.read_u8()?;
    let (opcode, operands): (Opcode, Vec<Operand>) = match op2 {
        0x1E if prefixes.rep => {
            let modrm_byte = cursor.read_u8()?;
            if modrm_byte != 0xFA {
                return Err(DecodeError::UnknownTwoByteOpcode(op2));
            }
            (Opcode::Endbr64, vec![])
        }
        0x40..=0x4F => {
            let cc = ConditionCode::from_nibble(op2 - 0x40);
            let rr = decode_reg_rm(cursor, prefixes, width)?;
            (Opcode::Cmovcc(cc), vec![rr.reg, rr.rm])
        }
        0x80..=0x8F => {
            let cc = ConditionCode::from_nibble(op2 - 0x80);
            let rel = cursor.read_i32()?;
            (Opcode::Jcc(cc), vec![Operand::RelOffset(rel)])
        }
        other => return Err(DecodeError::UnknownTwoByteOpcode(other)),
    };
    let length = cursor.position();
    Ok(Instruction::new(opcode, &operands, length as u8))
}

fn group1_opcode(digit: u8) -> Result<Opcode, DecodeError> {
    match digit {
        0 => Ok(Opcode::Add),
        4 => Ok(Opcode::And),
        5 => Ok(Opcode::Sub),
        6 => Ok(Opcode::Xor),
        7 => Ok(Opcode::Cmp),
        other => Err(DecodeError::ReservedOpcode { group: 1, digit: other }),
    }
}

/// `op /r` where the opcode's low 3 bits select ADD(0)/OR(1)/ADC(2)/SBB(3)/
/// AND(4)/SUB(5)/XOR(6)/CMP(7) and the direction bit (bit 1) is 0:
/// `op r/m, r`.
fn decode_group1_rm_reg(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
    op1: u8,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let digit = (op1 >> 3) & 0b111;
    let opcode = group1_opcode(digit)?;
    let rr = decode_reg_rm(cursor, prefixes, width)?;
    Ok((opcode, vec![rr.rm, rr.reg]))
}

/// Same opcode family with the direction bit set: `op r, r/m`.
fn decode_group1_reg_rm(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
    op1: u8,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let digit = (op1 >> 3) & 0b111;
    let opcode = group1_opcode(digit)?;
    let rr = decode_reg_rm(cursor, prefixes, width)?;
    Ok((opcode, vec![rr.reg, rr.rm]))
}

/// `80`/`81`/`83` /digit: `op r/m, imm`. The ModR/M `reg` field selects the
/// operation instead of a register.
fn decode_group1_imm(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    operand_width: Width,
    imm_encoded_width: Width,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let modrm = read_modrm(cursor, prefixes, operand_width)?;
    let opcode = group1_opcode(modrm.reg_index & 0b111)?;
    let rm = modrm.rm_as_operand(operand_width, prefixes.rex_present());
    let imm = read_imm_sign_extended(cursor, imm_encoded_width)?;
    Ok((opcode, vec![rm, Operand::immediate(operand_width, imm)]))
}

fn group2_opcode(digit: u8) -> Result<Opcode, DecodeError> {
    match digit {
        4 => Ok(Opcode::Shl),
        5 => Ok(Opcode::Shr),
        7 => Ok(Opcode::Sar),
        other => Err(DecodeError::ReservedOpcode { group: 2, digit: other }),
    }
}

fn decode_group2_imm(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let modrm = read_modrm(cursor, prefixes, width)?;
    let opcode = group2_opcode(modrm.reg_index & 0b111)?;
    let rm = modrm.rm_as_operand(width, prefixes.rex_present());
    let count = cursor.read_u8()? as u64;
    Ok((opcode, vec![rm, Operand::immediate(Width::W8, count)]))
}

fn decode_group2_by_one(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let modrm = read_modrm(cursor, prefixes, width)?;
    let opcode = group2_opcode(modrm.reg_index & 0b111)?;
    let rm = modrm.rm_as_operand(width, prefixes.rex_present());
    Ok((opcode, vec![rm, Operand::immediate(Width::W8, 1)]))
}

fn decode_group2_by_cl(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let modrm = read_modrm(cursor, prefixes, width)?;
    let opcode = group2_opcode(modrm.reg_index & 0b111)?;
    let rm = modrm.rm_as_operand(width, prefixes.rex_present());
    let cl = Operand::Register(RegisterView::Low8(GpRegister::Rcx));
    Ok((opcode, vec![rm, cl]))
}

fn decode_group5(
    cursor: &mut Cursor,
    prefixes: &Prefixes,
    width: Width,
    rex_present: bool,
) -> Result<(Opcode, Vec<Operand>), DecodeError> {
    let modrm = read_modrm(cursor, prefixes, width)?;
    let rm_width = match modrm.reg_index & 0b111 {
        2 | 4 => Width::W64, // CALL/JMP r/m are always 64-bit (near, indirect)
        6 => Width::W64,     // PUSH r/m64
        _ => width,
    };
    let rm = modrm.rm_as_operand(rm_width, rex_present);
    match modrm.reg_index & 0b111 {
        2 => Ok((Opcode::Call, vec![rm])),
        4 => Ok((Opcode::Jmp, vec![rm])),
        6 => Ok((Opcode::Push, vec![rm])),
        other => Err(DecodeError::ReservedOpcode { group: 5, digit: other }),
    }
}

fn reject_unless_digit_zero(modrm: &ModRm, group: u8) -> Result<(), DecodeError> {
    let digit = modrm.reg_index & 0b111;
    if digit != 0 {
        return Err(DecodeError::ReservedOpcode { group, digit });
    }
    Ok(())
}
