use std::fmt;

use crate::{ConditionCode, Operand};

/// The opcodes this core decodes and/or executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Mov,
    Movabs,
    Lea,
    Add,
    Sub,
    Shr,
    Sar,
    Shl,
    Xor,
    And,
    Test,
    Cmp,
    Push,
    Pop,
    Call,
    Ret,
    Jmp,
    Jcc(ConditionCode),
    Cmovcc(ConditionCode),
    Endbr64,
    Hlt,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Nop => write!(f, "nop"),
            Opcode::Mov => write!(f, "mov"),
            Opcode::Movabs => write!(f, "movabs"),
            Opcode::Lea => write!(f, "lea"),
            Opcode::Add => write!(f, "add"),
            Opcode::Sub => write!(f, "sub"),
            Opcode::Shr => write!(f, "shr"),
            Opcode::Sar => write!(f, "sar"),
            Opcode::Shl => write!(f, "shl"),
            Opcode::Xor => write!(f, "xor"),
            Opcode::And => write!(f, "and"),
            Opcode::Test => write!(f, "test"),
            Opcode::Cmp => write!(f, "cmp"),
            Opcode::Push => write!(f, "push"),
            Opcode::Pop => write!(f, "pop"),
            Opcode::Call => write!(f, "call"),
            Opcode::Ret => write!(f, "ret"),
            Opcode::Jmp => write!(f, "jmp"),
            Opcode::Jcc(cc) => write!(f, "j{}", cc.mnemonic_suffix()),
            Opcode::Cmovcc(cc) => write!(f, "cmov{}", cc.mnemonic_suffix()),
            Opcode::Endbr64 => write!(f, "endbr64"),
            Opcode::Hlt => write!(f, "hlt"),
        }
    }
}

/// A fully decoded instruction: opcode, up to four operands, and the
/// number of bytes consumed from the stream.
///
/// The byte length is carried on every instruction because RIP-relative
/// addressing and relative branches are both defined in terms of the
/// address of the *following* instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: [Option<Operand>; 4],
    pub length: u8,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: &[Operand], length: u8) -> Self {
        let mut slots: [Option<Operand>; 4] = [None; 4];
        for (slot, op) in slots.iter_mut().zip(operands.iter()) {
            *slot = Some(*op);
        }
        Self {
            opcode,
            operands: slots,
            length,
        }
    }

    pub fn op_count(&self) -> usize {
        self.operands.iter().take_while(|o| o.is_some()).count()
    }

    pub fn operand(&self, index: usize) -> Option<Operand> {
        self.operands.get(index).copied().flatten()
    }
}

/// Minimal disassembly-adjacent text form (e.g. `mov rax, rbx`), useful in
/// test failure output. Not the out-of-scope `readelf`-style pretty
/// printer — just `Display` ergonomics on the core decoded-instruction type.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let ops: Vec<String> = self.operands[..self.op_count()]
            .iter()
            .map(|o| o.unwrap().to_string())
            .collect();
        if !ops.is_empty() {
            write!(f, " {}", ops.join(", "))?;
        }
        Ok(())
    }
}
