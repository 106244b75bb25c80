use aero_cpu_decoder::{decode_one, DecodeError, DecodeMode, MAX_INSTRUCTION_LEN};
use aero_mem::{MemoryController, MemoryError};
use aero_types::{Flag, GpRegister, RegisterView, Width};
use aero_x86::{Instruction, Opcode, Operand};

use crate::config::EmulatorConfig;
use crate::error::ExecError;
use crate::fetcher::Fetcher;
use crate::registers::RegisterFile;

/// Run state of an [`Executor`]: a simple on/off latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Halted,
}

/// Owns the one register file and drives the fetch-decode-execute loop
/// against a borrowed [`MemoryController`]: one executor owns one register
/// file, one memory controller, one decoder.
pub struct Executor<'m> {
    registers: RegisterFile,
    memory: &'m mut MemoryController,
    state: State,
    step_count: u64,
    config: EmulatorConfig,
}

impl<'m> Executor<'m> {
    /// `config` is threaded through (per spec §9 "global emulator
    /// configuration") rather than assumed: `Ret`'s halt check compares
    /// against `config.stack_bottom_sentinel` instead of a literal zero, so
    /// a caller that configures a non-default sentinel still observes a
    /// terminal `RET` as a halt rather than a jump into garbage memory.
    pub fn new(memory: &'m mut MemoryController, config: EmulatorConfig) -> Self {
        Self {
            registers: RegisterFile::new(),
            memory,
            state: State::Running,
            step_count: 0,
            config,
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable access for callers that set up initial state (the loader)
    /// before the first `execute_one`/`execute`.
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn memory(&self) -> &MemoryController {
        self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryController {
        self.memory
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Forces the run state, bypassing `Hlt`/`Ret`-sentinel transitions.
    ///
    /// Symmetric counterpart to the host breaking a run by observing
    /// `Halted`: the ELF loader uses this to resume `Running`
    /// between successive `.init_array`/`.preinit_array`/`.init` entries,
    /// each of which runs to its own halt before the next begins.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn set_entry_point(&mut self, addr: u64) {
        self.registers.set_rip(addr);
    }

    /// Fetches the instruction at the current RIP, decodes it, and executes
    /// it, returning the decoded instruction for callers that want to trace
    /// execution.
    pub fn execute_one(&mut self) -> Result<Instruction, ExecError> {
        let mut fetcher = Fetcher::new(self.memory, self.registers.rip());
        let start = fetcher.get_position();
        let mut window = [0u8; MAX_INSTRUCTION_LEN];
        let mut len = 0usize;
        // The window is filled speculatively past the instruction's real
        // length (it isn't known until decoded), so a fetch failure past
        // the first byte is usually just the window running off the end of
        // this instruction's mapped bytes. But it can also be the
        // instruction itself crossing into unmapped/non-executable memory,
        // in which case `decode_one` runs out of window and the *real*
        // cause is this stashed memory error, not a truncated encoding.
        let mut fetch_err: Option<MemoryError> = None;
        for slot in window.iter_mut() {
            match fetcher.read_u8() {
                Ok(b) => {
                    *slot = b;
                    len += 1;
                }
                Err(e) => {
                    fetch_err = Some(e);
                    break;
                }
            }
        }
        if len == 0 {
            return Err(fetch_err
                .expect("the loop only exits with len == 0 after recording an error")
                .into());
        }
        let inst = match decode_one(DecodeMode::default(), start, &window[..len]) {
            Ok(inst) => inst,
            Err(DecodeError::TruncatedInstruction) if fetch_err.is_some() => {
                return Err(fetch_err.unwrap().into());
            }
            Err(e) => return Err(e.into()),
        };
        self.registers.set_rip(start.wrapping_add(inst.length as u64));
        self.execute_one_decoded(inst)?;
        self.step_count += 1;
        Ok(inst)
    }

    /// Interprets an already-decoded instruction. RIP is assumed to already
    /// point at the instruction *following* `inst` (the decoder advances it
    /// for non-branch instructions); branch opcodes overwrite it here.
    pub fn execute_one_decoded(&mut self, inst: Instruction) -> Result<(), ExecError> {
        let ip_of_next = self.registers.rip();
        match inst.opcode {
            Opcode::Nop | Opcode::Endbr64 => {}
            Opcode::Hlt => self.state = State::Halted,

            Opcode::Mov => {
                let src = self.read_operand(inst.operand(1).unwrap(), ip_of_next)?;
                self.write_operand(inst.operand(0).unwrap(), ip_of_next, src)?;
            }
            Opcode::Movabs => {
                let src = self.read_operand(inst.operand(1).unwrap(), ip_of_next)?;
                self.write_operand(inst.operand(0).unwrap(), ip_of_next, src)?;
            }
            Opcode::Lea => {
                let ea = self.memory_operand_address(inst.operand(1).unwrap(), ip_of_next);
                self.write_operand(inst.operand(0).unwrap(), ip_of_next, ea)?;
            }

            Opcode::Add => self.binary_op(inst, ip_of_next, BinOp::Add)?,
            Opcode::Sub => self.binary_op(inst, ip_of_next, BinOp::Sub)?,
            Opcode::Cmp => self.binary_op(inst, ip_of_next, BinOp::Cmp)?,
            Opcode::Xor => self.binary_op(inst, ip_of_next, BinOp::Xor)?,
            Opcode::And => self.binary_op(inst, ip_of_next, BinOp::And)?,
            Opcode::Test => self.binary_op(inst, ip_of_next, BinOp::Test)?,

            Opcode::Shl => self.shift_op(inst, ip_of_next, ShiftOp::Shl)?,
            Opcode::Shr => self.shift_op(inst, ip_of_next, ShiftOp::Shr)?,
            Opcode::Sar => self.shift_op(inst, ip_of_next, ShiftOp::Sar)?,

            Opcode::Push => {
                let value = self.read_operand(inst.operand(0).unwrap(), ip_of_next)?;
                self.push_u64(value)?;
            }
            Opcode::Pop => {
                let value = self.pop_u64()?;
                self.write_operand(inst.operand(0).unwrap(), ip_of_next, value)?;
            }

            Opcode::Call => {
                let target = self.branch_target(inst.operand(0).unwrap(), ip_of_next);
                self.push_u64(ip_of_next)?;
                self.registers.set_rip(target);
            }
            Opcode::Ret => {
                let return_addr = self.memory.read_u64(self.registers.gpr(GpRegister::Rsp))?;
                self.registers.set_rip(return_addr);
                if return_addr == self.config.stack_bottom_sentinel {
                    self.state = State::Halted;
                } else {
                    self.registers
                        .set_gpr(GpRegister::Rsp, self.registers.gpr(GpRegister::Rsp).wrapping_add(8));
                }
            }
            Opcode::Jmp => {
                let target = self.branch_target(inst.operand(0).unwrap(), ip_of_next);
                self.registers.set_rip(target);
            }
            Opcode::Jcc(cc) => {
                if cc.evaluate(self.registers.flags()) {
                    let target = self.branch_target(inst.operand(0).unwrap(), ip_of_next);
                    self.registers.set_rip(target);
                }
            }
            Opcode::Cmovcc(cc) => {
                if cc.evaluate(self.registers.flags()) {
                    let src = self.read_operand(inst.operand(1).unwrap(), ip_of_next)?;
                    self.write_operand(inst.operand(0).unwrap(), ip_of_next, src)?;
                }
            }
        }
        Ok(())
    }

    /// Runs `execute_one` until [`State::Halted`] or a fatal error (spec
    /// §4.5, §5: "the only may-suspend call").
    pub fn execute(&mut self) -> Result<(), ExecError> {
        while self.state == State::Running {
            self.execute_one()?;
        }
        Ok(())
    }

    fn push_u64(&mut self, value: u64) -> Result<(), ExecError> {
        let rsp = self.registers.gpr(GpRegister::Rsp).wrapping_sub(8);
        self.registers.set_gpr(GpRegister::Rsp, rsp);
        self.memory.write_u64(rsp, value)?;
        Ok(())
    }

    fn pop_u64(&mut self) -> Result<u64, ExecError> {
        let rsp = self.registers.gpr(GpRegister::Rsp);
        let value = self.memory.read_u64(rsp)?;
        self.registers.set_gpr(GpRegister::Rsp, rsp.wrapping_add(8));
        Ok(value)
    }

    /// Resolves a `Call`/`Jmp`/`Jcc` target operand: a register/memory
    /// operand is an absolute address, a `RelOffset` is relative to the
    /// address of the instruction following the branch (RIP-of-next plus
    /// offset).
    fn branch_target(&self, operand: Operand, ip_of_next: u64) -> u64 {
        match operand {
            Operand::RelOffset(rel) => ip_of_next.wrapping_add(rel as i64 as u64),
            other => self
                .read_operand(other, ip_of_next)
                .expect("branch target operand must be a register or already-mapped memory"),
        }
    }

    fn memory_operand_address(&self, operand: Operand, ip_of_next: u64) -> u64 {
        match operand {
            Operand::Memory(m) => m.effective_address(ip_of_next, |r| self.registers.gpr(r)),
            other => panic!("expected a memory operand, got {other:?}"),
        }
    }

    fn read_operand(&self, operand: Operand, ip_of_next: u64) -> Result<u64, ExecError> {
        match operand {
            Operand::Register(view) => Ok(self.registers.get(view)),
            Operand::Immediate { value, .. } => Ok(value),
            Operand::Memory(m) => {
                let ea = m.effective_address(ip_of_next, |r| self.registers.gpr(r));
                Ok(self.read_memory(ea, m.operand_size)?)
            }
            Operand::RelOffset(rel) => Ok(ip_of_next.wrapping_add(rel as i64 as u64)),
        }
    }

    fn write_operand(&mut self, operand: Operand, ip_of_next: u64, value: u64) -> Result<(), ExecError> {
        match operand {
            Operand::Register(view) => {
                self.registers.set(view, value);
                Ok(())
            }
            Operand::Memory(m) => {
                let ea = m.effective_address(ip_of_next, |r| self.registers.gpr(r));
                self.write_memory(ea, m.operand_size, value)?;
                Ok(())
            }
            Operand::Immediate { .. } | Operand::RelOffset(_) => {
                panic!("immediate/rel-offset operands are never write destinations")
            }
        }
    }

    fn read_memory(&self, addr: u64, width: Width) -> Result<u64, ExecError> {
        let value = match width {
            Width::W8 => self.memory.read(addr)? as u64,
            Width::W16 => self.memory.read_u16(addr)? as u64,
            Width::W32 => self.memory.read_u32(addr)? as u64,
            Width::W64 => self.memory.read_u64(addr)?,
        };
        Ok(value)
    }

    fn write_memory(&mut self, addr: u64, width: Width, value: u64) -> Result<(), ExecError> {
        match width {
            Width::W8 => self.memory.write(addr, value as u8)?,
            Width::W16 => self.memory.write_u16(addr, value as u16)?,
            Width::W32 => self.memory.write_u32(addr, value as u32)?,
            Width::W64 => self.memory.write_u64(addr, value)?,
        }
        Ok(())
    }

    fn binary_op(&mut self, inst: Instruction, ip_of_next: u64, op: BinOp) -> Result<(), ExecError> {
        let dst_operand = inst.operand(0).unwrap();
        let src_operand = inst.operand(1).unwrap();
        let width = operand_width(dst_operand);
        let a = self.read_operand(dst_operand, ip_of_next)?;
        let b = self.read_operand(src_operand, ip_of_next)?;
        let (result, flags) = op.apply(width, a, b);
        self.registers.rflags_mut_apply(flags);
        if op.writes_back() {
            self.write_operand(dst_operand, ip_of_next, result)?;
        }
        Ok(())
    }

    fn shift_op(&mut self, inst: Instruction, ip_of_next: u64, op: ShiftOp) -> Result<(), ExecError> {
        let dst_operand = inst.operand(0).unwrap();
        let count_operand = inst.operand(1).unwrap();
        let width = operand_width(dst_operand);
        let value = self.read_operand(dst_operand, ip_of_next)?;
        let raw_count = self.read_operand(count_operand, ip_of_next)?;
        let mask = if width == Width::W64 { 63 } else { 31 };
        let count = (raw_count as u32) & mask;
        let (result, flags) = op.apply(width, value, count);
        if count != 0 {
            self.registers.rflags_mut_apply(flags);
        }
        self.write_operand(dst_operand, ip_of_next, result)?;
        Ok(())
    }
}

fn operand_width(operand: Operand) -> Width {
    match operand {
        Operand::Register(view) => view.width(),
        Operand::Immediate { width, .. } => width,
        Operand::Memory(m) => m.operand_size,
        Operand::RelOffset(_) => Width::W32,
    }
}

/// The flag deltas a single ALU op computes, applied wholesale so binary_op
/// and shift_op don't each re-derive RFlags bit positions.
#[derive(Debug, Clone, Copy, Default)]
struct FlagsDelta {
    cf: Option<bool>,
    pf: Option<bool>,
    af: Option<bool>,
    zf: Option<bool>,
    sf: Option<bool>,
    of: Option<bool>,
}

impl RegisterFile {
    fn rflags_mut_apply(&mut self, delta: FlagsDelta) {
        if let Some(v) = delta.cf {
            self.set_flag(Flag::Cf, v);
        }
        if let Some(v) = delta.pf {
            self.set_flag(Flag::Pf, v);
        }
        if let Some(v) = delta.af {
            self.set_flag(Flag::Af, v);
        }
        if let Some(v) = delta.zf {
            self.set_flag(Flag::Zf, v);
        }
        if let Some(v) = delta.sf {
            self.set_flag(Flag::Sf, v);
        }
        if let Some(v) = delta.of {
            self.set_flag(Flag::Of, v);
        }
    }
}

fn parity_even(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

fn common_flags(width: Width, result: u64) -> (bool, bool, bool) {
    let result = result & width.mask();
    let zf = result == 0;
    let sf = (result >> (width.bits() - 1)) & 1 != 0;
    let pf = parity_even(result as u8);
    (zf, sf, pf)
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Cmp,
    Xor,
    And,
    Test,
}

impl BinOp {
    fn writes_back(self) -> bool {
        !matches!(self, BinOp::Cmp | BinOp::Test)
    }

    /// Computes the result (pre-truncation bookkeeping included) and the
    /// flags for one ALU op.
    fn apply(self, width: Width, a: u64, b: u64) -> (u64, FlagsDelta) {
        let mask = width.mask();
        let a = a & mask;
        let b = b & mask;
        match self {
            BinOp::Add => {
                let wide = (a as u128) + (b as u128);
                let result = (wide as u64) & mask;
                let (zf, sf, pf) = common_flags(width, result);
                let cf = wide & !(mask as u128) != 0;
                let af = (a & 0xF) + (b & 0xF) > 0xF;
                let of = add_overflow(width, a, b, result);
                (result, FlagsDelta { cf: Some(cf), pf: Some(pf), af: Some(af), zf: Some(zf), sf: Some(sf), of: Some(of) })
            }
            BinOp::Sub | BinOp::Cmp => {
                let result = a.wrapping_sub(b) & mask;
                let (zf, sf, pf) = common_flags(width, result);
                let cf = a < b;
                let af = (a & 0xF) < (b & 0xF);
                let of = sub_overflow(width, a, b, result);
                (result, FlagsDelta { cf: Some(cf), pf: Some(pf), af: Some(af), zf: Some(zf), sf: Some(sf), of: Some(of) })
            }
            BinOp::Xor => {
                let result = (a ^ b) & mask;
                let (zf, sf, pf) = common_flags(width, result);
                (result, FlagsDelta { cf: Some(false), pf: Some(pf), af: Some(false), zf: Some(zf), sf: Some(sf), of: Some(false) })
            }
            BinOp::And | BinOp::Test => {
                let result = (a & b) & mask;
                let (zf, sf, pf) = common_flags(width, result);
                (result, FlagsDelta { cf: Some(false), pf: Some(pf), af: Some(false), zf: Some(zf), sf: Some(sf), of: Some(false) })
            }
        }
    }
}

fn add_overflow(width: Width, a: u64, b: u64, result: u64) -> bool {
    let sign_bit = 1u64 << (width.bits() - 1);
    ((a ^ result) & (b ^ result) & sign_bit) != 0
}

fn sub_overflow(width: Width, a: u64, b: u64, result: u64) -> bool {
    let sign_bit = 1u64 << (width.bits() - 1);
    ((a ^ b) & (a ^ result) & sign_bit) != 0
}

#[derive(Debug, Clone, Copy)]
enum ShiftOp {
    Shl,
    Shr,
    Sar,
}

impl ShiftOp {
    /// `count` is already masked to `width`'s shift-count range. Per spec
    /// §4.5, `OF` is only meaningfully defined for single-bit shifts; this
    /// leaves it untouched (via `None`) for any other count, matching real
    /// hardware's "undefined for count != 1" behavior as "don't modify".
    fn apply(self, width: Width, value: u64, count: u32) -> (u64, FlagsDelta) {
        if count == 0 {
            return (value & width.mask(), FlagsDelta::default());
        }
        let bits = width.bits();
        let mask = width.mask();
        let value = value & mask;
        let (result, cf, of) = match self {
            ShiftOp::Shl => {
                let shifted = if count >= bits { 0 } else { value << count };
                let result = shifted & mask;
                let cf = if count > bits {
                    false
                } else {
                    (value >> (bits - count)) & 1 != 0
                };
                let of = (result >> (bits - 1)) & 1 != cf as u64;
                (result, cf, of)
            }
            ShiftOp::Shr => {
                let result = if count >= bits { 0 } else { value >> count };
                let cf = if count > bits {
                    false
                } else {
                    (value >> (count - 1)) & 1 != 0
                };
                let of = (value >> (bits - 1)) & 1 != 0;
                (result, cf, of)
            }
            ShiftOp::Sar => {
                let sign_extended = width.sign_extend(value);
                let result = (((sign_extended as i64) >> count.min(63)) as u64) & mask;
                let cf = if count > bits {
                    (sign_extended >> 63) & 1 != 0
                } else {
                    (value >> (count - 1)) & 1 != 0
                };
                (result, cf, false)
            }
        };
        let (zf, sf, pf) = common_flags(width, result);
        // OF is only architecturally defined for single-bit shifts; wider
        // counts clear it rather than leaving a stale value behind.
        let of = if count == 1 { of } else { false };
        (
            result,
            FlagsDelta {
                cf: Some(cf),
                pf: Some(pf),
                af: None,
                zf: Some(zf),
                sf: Some(sf),
                of: Some(of),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aero_mem::Zero;
    use aero_x86::Opcode as Op;

    fn executor(mem: &mut MemoryController) -> Executor<'_> {
        mem.set_permissions(0, 0xFFFF, true, true, true).unwrap();
        Executor::new(mem, EmulatorConfig::default())
    }

    #[test]
    fn nop_advances_rip_only() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.initialize(0x1000, &[0x90]);
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        let inst = exec.execute_one().unwrap();
        assert_eq!(inst.opcode, Op::Nop);
        assert_eq!(exec.registers().rip(), 0x1001);
    }

    #[test]
    fn hlt_halts() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.initialize(0x1000, &[0xF4]);
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        exec.execute().unwrap();
        assert_eq!(exec.state(), State::Halted);
    }

    #[test]
    fn mov_reg_reg_copies_value() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 48 89 d8 = mov rax, rbx
        mem.initialize(0x1000, &[0x48, 0x89, 0xD8]);
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rbx, 0x42);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rax), 0x42);
    }

    #[test]
    fn movabs_loads_full_64_bit_immediate() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 48 b8 11 22 33 44 55 66 77 88 = movabs rax, 0x8877665544332211
        mem.initialize(
            0x1000,
            &[0x48, 0xB8, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88],
        );
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rax), 0x8877_6655_4433_2211);
    }

    #[test]
    fn xor_self_zeroes_and_sets_zf() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 48 31 c0 = xor rax, rax
        mem.initialize(0x1000, &[0x48, 0x31, 0xC0]);
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rax, 0xDEAD);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rax), 0);
        assert!(exec.registers().is_set(Flag::Zf));
        assert!(!exec.registers().is_set(Flag::Cf));
        assert!(!exec.registers().is_set(Flag::Of));
    }

    #[test]
    fn add_sets_carry_on_overflow() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // b0 ff = mov al, 0xff ; 04 01 = add al, 1
        mem.initialize(0x1000, &[0xB0, 0xFF, 0x04, 0x01]);
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().get(RegisterView::Low8(GpRegister::Rax)), 0);
        assert!(exec.registers().is_set(Flag::Cf));
        assert!(exec.registers().is_set(Flag::Zf));
    }

    #[test]
    fn push_then_pop_round_trips_through_memory() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 50 = push rax ; 5b = pop rbx
        mem.initialize(0x1000, &[0x50, 0x5B]);
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rax, 0x1234_5678);
        exec.registers_mut().set_gpr(GpRegister::Rsp, 0x2000);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rsp), 0x1FF8);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rbx), 0x1234_5678);
        assert_eq!(exec.registers().gpr(GpRegister::Rsp), 0x2000);
    }

    #[test]
    fn ret_with_zero_sentinel_halts() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.initialize(0x1000, &[0xC3]); // ret
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rsp, 0x2000);
        mem.write_u64(0x2000, 0).unwrap();
        exec.set_entry_point(0x1000);
        exec.execute().unwrap();
        assert_eq!(exec.state(), State::Halted);
    }

    #[test]
    fn ret_with_nonzero_return_address_jumps_there() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.initialize(0x1000, &[0xC3]); // ret
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rsp, 0x2000);
        mem.write_u64(0x2000, 0x4000).unwrap();
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.state(), State::Running);
        assert_eq!(exec.registers().rip(), 0x4000);
        assert_eq!(exec.registers().gpr(GpRegister::Rsp), 0x2008);
    }

    #[test]
    fn ret_halts_against_a_configured_non_default_sentinel() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.set_permissions(0, 0xFFFF, true, true, true).unwrap();
        mem.initialize(0x1000, &[0xC3]); // ret
        let config = EmulatorConfig {
            stack_bottom_sentinel: 0xDEAD_BEEF,
            ..EmulatorConfig::default()
        };
        let mut exec = Executor::new(&mut mem, config);
        exec.registers_mut().set_gpr(GpRegister::Rsp, 0x2000);
        exec.memory_mut().write_u64(0x2000, 0xDEAD_BEEF).unwrap();
        exec.set_entry_point(0x1000);
        exec.execute().unwrap();
        assert_eq!(exec.state(), State::Halted);
        assert_eq!(exec.registers().rip(), 0xDEAD_BEEF);
    }

    #[test]
    fn ret_does_not_halt_when_return_address_merely_happens_to_be_zero_under_a_different_sentinel() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.set_permissions(0, 0xFFFF, true, true, true).unwrap();
        mem.initialize(0x1000, &[0xC3]); // ret
        let config = EmulatorConfig {
            stack_bottom_sentinel: 0xFFFF,
            ..EmulatorConfig::default()
        };
        let mut exec = Executor::new(&mut mem, config);
        exec.registers_mut().set_gpr(GpRegister::Rsp, 0x2000);
        exec.memory_mut().write_u64(0x2000, 0).unwrap();
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.state(), State::Running);
    }

    #[test]
    fn fetch_permission_failure_mid_instruction_propagates_as_memory_error_not_decode_error() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 48 b8 ... is a 10-byte movabs; only grant execute permission for
        // its first 2 bytes so the decoder's speculative window read runs
        // into a non-executable byte partway through this real instruction.
        mem.set_permissions(0x1000, 0x1001, false, false, true).unwrap();
        mem.initialize(0x1000, &[0x48, 0xB8, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        let mut exec = Executor::new(&mut mem, EmulatorConfig::default());
        exec.set_entry_point(0x1000);
        let err = exec.execute_one().unwrap_err();
        assert!(
            matches!(
                err,
                ExecError::Memory(aero_mem::MemoryError::PermissionDenied {
                    kind: aero_mem::AccessKind::Execute,
                    addr: 0x1002,
                })
            ),
            "expected a propagated execute-permission failure, got {err:?}"
        );
    }

    #[test]
    fn call_pushes_return_address_and_jumps() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // e8 05 00 00 00 = call +5 (to 0x1010)
        mem.initialize(0x1000, &[0xE8, 0x05, 0x00, 0x00, 0x00]);
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rsp, 0x2000);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().rip(), 0x1010);
        assert_eq!(exec.registers().gpr(GpRegister::Rsp), 0x1FF8);
        assert_eq!(mem.read_u64(0x1FF8).unwrap(), 0x1005);
    }

    #[test]
    fn jcc_taken_when_zero_flag_set() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 74 05 = je +5
        mem.initialize(0x1000, &[0x74, 0x05]);
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_flag(Flag::Zf, true);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().rip(), 0x1007);
    }

    #[test]
    fn jcc_not_taken_falls_through() {
        let mut mem = MemoryController::new(Box::new(Zero));
        mem.initialize(0x1000, &[0x74, 0x05]);
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().rip(), 0x1002);
    }

    #[test]
    fn cmovcc_moves_only_when_condition_holds() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 48 0f 44 d9 = cmove rbx, rcx
        mem.initialize(0x1000, &[0x48, 0x0F, 0x44, 0xD9]);
        let mut exec = executor(&mut mem);
        exec.registers_mut().set_gpr(GpRegister::Rbx, 0xAAAA);
        exec.registers_mut().set_gpr(GpRegister::Rcx, 0xBBBB);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rbx), 0xAAAA, "ZF clear, move must not happen");

        mem.initialize(0x1000, &[0x48, 0x0F, 0x44, 0xD9]);
        exec.registers_mut().set_flag(Flag::Zf, true);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rbx), 0xBBBB, "ZF set, move must happen");
    }

    #[test]
    fn lea_computes_address_without_memory_access() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // 48 8d 05 10 00 00 00 = lea rax, [rip + 0x10]
        mem.initialize(0x1000, &[0x48, 0x8D, 0x05, 0x10, 0x00, 0x00, 0x00]);
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().gpr(GpRegister::Rax), 0x1007 + 0x10);
    }

    #[test]
    fn shl_reports_carry_from_top_bit() {
        let mut mem = MemoryController::new(Box::new(Zero));
        // b0 80 = mov al, 0x80 ; c0 e0 01 = shl al, 1
        mem.initialize(0x1000, &[0xB0, 0x80, 0xC0, 0xE0, 0x01]);
        let mut exec = executor(&mut mem);
        exec.set_entry_point(0x1000);
        exec.execute_one().unwrap();
        exec.execute_one().unwrap();
        assert_eq!(exec.registers().get(RegisterView::Low8(GpRegister::Rax)), 0);
        assert!(exec.registers().is_set(Flag::Cf));
        assert!(exec.registers().is_set(Flag::Zf));
    }
}
