use aero_cpu_core::{EmulatorConfig, Executor, State};
use aero_cpu_decoder::{decode_one, DecodeMode, MAX_INSTRUCTION_LEN};
use aero_elf_model::{ElfImage, SectionContent, SegmentFlags, SymbolType};
use aero_mem::MemoryController;
use aero_types::GpRegister;

use crate::error::{LoaderError, LoaderWarning};

/// Highest address of the stack region when [`EmulatorConfig::base_stack_address`]
/// is `None`. 16-byte-aligned, and chosen well clear of the default
/// `base_address` so a default-configured run never has the two regions
/// collide.
const DEFAULT_STACK_TOP: u64 = 0x0000_7fff_ffff_f000;

fn align_up_16(addr: u64) -> u64 {
    (addr + 15) & !15
}

/// Loads `elf` into `cpu`'s memory and initial register state per the
/// System V AMD64 ABI, then runs `.preinit_array`, `.init_array`
/// and `.init` to completion.
///
/// Does not itself set `RIP` to the program's real entry point or call
/// `cpu.execute()` for it — that's the caller's job
/// once `load` returns. `cpu`'s state after `load` reflects wherever the
/// last initializer's terminal `RET` left it (typically `Halted`, having
/// popped the sentinel this function pushes for it).
pub fn load(
    elf: &ElfImage,
    cpu: &mut Executor,
    config: &EmulatorConfig,
    argv: &[&str],
    envp: &[&str],
) -> Result<Vec<LoaderWarning>, LoaderError> {
    let base = config.base_address;
    let mut warnings = Vec::new();

    load_segments(elf, cpu.memory_mut(), base)?;
    load_sections(elf, cpu.memory_mut(), base)?;

    if config.check_instructions {
        check_instructions(elf, cpu, base)?;
    }

    let stack_top = setup_stack(cpu.memory_mut(), config)?;
    let layout = write_stack_image(cpu.memory_mut(), stack_top, config.stack_bottom_sentinel, argv, envp)?;
    cpu.registers_mut().set_gpr(GpRegister::Rsp, layout.rsp);
    cpu.registers_mut().set_gpr(GpRegister::Rdi, argv.len() as u64);
    cpu.registers_mut().set_gpr(GpRegister::Rsi, layout.argv_ptr);
    cpu.registers_mut().set_gpr(GpRegister::Rdx, layout.envp_ptr);

    let word_size = elf.word_size();
    if let Some(section) = elf.section(".preinit_array") {
        run_pointer_array(cpu, section, word_size, base, config.stack_bottom_sentinel, false)?;
    }
    if let Some(section) = elf.section(".init_array") {
        run_pointer_array(cpu, section, word_size, base, config.stack_bottom_sentinel, false)?;
    }
    if let Some(init) = elf.section(".init") {
        if elf.symbols.is_empty() {
            warnings.push(LoaderWarning::MissingInit { section: ".init".to_string() });
        } else {
            run_functions_in_section(cpu, elf, init, base, config.stack_bottom_sentinel)?;
        }
    }

    Ok(warnings)
}

/// Mirrors `load`'s initializer walk in reverse for teardown:
/// `.fini_array` in reverse order, then `.fini` by `STT_FUNC`, then
/// `.dtors`. Does not release any memory.
pub fn unload(
    elf: &ElfImage,
    cpu: &mut Executor,
    config: &EmulatorConfig,
) -> Result<Vec<LoaderWarning>, LoaderError> {
    let base = config.base_address;
    let word_size = elf.word_size();
    let mut warnings = Vec::new();

    if let Some(section) = elf.section(".fini_array") {
        run_pointer_array(cpu, section, word_size, base, config.stack_bottom_sentinel, true)?;
    }
    if let Some(fini) = elf.section(".fini") {
        if elf.symbols.is_empty() {
            warnings.push(LoaderWarning::MissingInit { section: ".fini".to_string() });
        } else {
            run_functions_in_section(cpu, elf, fini, base, config.stack_bottom_sentinel)?;
        }
    }
    if let Some(section) = elf.section(".dtors") {
        run_pointer_array(cpu, section, word_size, base, config.stack_bottom_sentinel, true)?;
    }

    Ok(warnings)
}

fn load_segments(elf: &ElfImage, mem: &mut MemoryController, base: u64) -> Result<(), LoaderError> {
    for ph in &elf.program_headers {
        if !ph.is_loadable() || ph.memsz == 0 {
            continue;
        }
        let lo = base.wrapping_add(ph.vaddr);
        let hi = lo.wrapping_add(ph.memsz - 1);
        mem.set_permissions(
            lo,
            hi,
            ph.flags.contains(SegmentFlags::READ),
            ph.flags.contains(SegmentFlags::WRITE),
            ph.flags.contains(SegmentFlags::EXECUTE),
        )?;
    }
    Ok(())
}

fn load_sections(elf: &ElfImage, mem: &mut MemoryController, base: u64) -> Result<(), LoaderError> {
    for section in &elf.sections {
        if !section.is_alloc() || section.header.size == 0 {
            continue;
        }
        let vaddr = section.header.vaddr;
        let size = section.header.size;
        let inside_a_segment = elf.program_headers.iter().any(|ph| {
            ph.is_loadable() && vaddr >= ph.vaddr && vaddr.wrapping_add(size) <= ph.vaddr.wrapping_add(ph.memsz)
        });
        if !inside_a_segment {
            return Err(LoaderError::SectionOutsideSegment {
                name: section.name.clone(),
                lo: vaddr,
                hi: vaddr.wrapping_add(size) - 1,
            });
        }
        let addr = base.wrapping_add(vaddr);
        match &section.content {
            SectionContent::NoBits => {
                mem.initialize_fill(addr, size, 0);
            }
            SectionContent::LoadableBytes(bytes) => {
                mem.initialize(addr, bytes);
            }
        }
    }
    Ok(())
}

/// Optional pre-execution validation pass (`check_instructions`):
/// decodes every executable `PT_LOAD` segment start-to-end, failing fast on
/// the first byte sequence that doesn't decode.
fn check_instructions(elf: &ElfImage, cpu: &Executor, base: u64) -> Result<(), LoaderError> {
    for ph in &elf.program_headers {
        if !ph.is_loadable() || !ph.flags.contains(SegmentFlags::EXECUTE) || ph.memsz == 0 {
            continue;
        }
        let lo = base.wrapping_add(ph.vaddr);
        let hi = lo.wrapping_add(ph.memsz - 1);
        let mut addr = lo;
        while addr <= hi {
            let mut window = [0u8; MAX_INSTRUCTION_LEN];
            let mut len = 0usize;
            while len < window.len() {
                let a = addr.wrapping_add(len as u64);
                if a > hi {
                    break;
                }
                match cpu.memory().read_code(a) {
                    Ok(b) => {
                        window[len] = b;
                        len += 1;
                    }
                    Err(_) => break,
                }
            }
            if len == 0 {
                break;
            }
            let inst = decode_one(DecodeMode::default(), addr, &window[..len])
                .map_err(|source| LoaderError::InvalidInstruction { addr, source })?;
            addr = addr.wrapping_add(inst.length as u64);
        }
    }
    Ok(())
}

fn setup_stack(mem: &mut MemoryController, config: &EmulatorConfig) -> Result<u64, LoaderError> {
    let top = align_up_16(config.base_stack_address.unwrap_or(DEFAULT_STACK_TOP));
    let lo = top.wrapping_sub(config.stack_size);
    mem.set_permissions(lo, top - 1, true, true, false)?;
    mem.initialize_fill(lo, config.stack_size, 0);
    Ok(top)
}

struct StackLayout {
    rsp: u64,
    argv_ptr: u64,
    envp_ptr: u64,
}

/// Lays out argc/argv/envp and the two stack-bottom sentinel words below
/// `top`.
///
/// Byte order from high to low address: the two sentinel words, then
/// (descending) `argc`, the `argv` pointer array, a `NULL`, the `envp`
/// pointer array, a `NULL`; the string bytes those pointers reference are
/// packed contiguously just below that pointer block. This core carries no
/// auxv.
fn write_stack_image(
    mem: &mut MemoryController,
    top: u64,
    sentinel: u64,
    argv: &[&str],
    envp: &[&str],
) -> Result<StackLayout, LoaderError> {
    mem.write_u64(top - 8, sentinel)?;
    mem.write_u64(top - 16, sentinel)?;

    let mut blob = Vec::new();
    let mut argv_offsets = Vec::with_capacity(argv.len());
    for s in argv {
        argv_offsets.push(blob.len() as u64);
        blob.extend_from_slice(s.as_bytes());
        blob.push(0);
    }
    let mut envp_offsets = Vec::with_capacity(envp.len());
    for s in envp {
        envp_offsets.push(blob.len() as u64);
        blob.extend_from_slice(s.as_bytes());
        blob.push(0);
    }

    let ptr_count = 1 + argv.len() as u64 + 1 + envp.len() as u64 + 1;
    let ptr_region_top = top - 16;
    let string_region_top = ptr_region_top - ptr_count * 8;
    let string_region_start = string_region_top - blob.len() as u64;

    for (i, &b) in blob.iter().enumerate() {
        mem.write(string_region_start + i as u64, b)?;
    }

    let word_addr = |index: u64| ptr_region_top - (index + 1) * 8;

    mem.write_u64(word_addr(0), argv.len() as u64)?;
    for (i, &off) in argv_offsets.iter().enumerate() {
        mem.write_u64(word_addr(1 + i as u64), string_region_start + off)?;
    }
    mem.write_u64(word_addr(1 + argv.len() as u64), 0)?;

    let envp_base_index = 2 + argv.len() as u64;
    for (i, &off) in envp_offsets.iter().enumerate() {
        mem.write_u64(word_addr(envp_base_index + i as u64), string_region_start + off)?;
    }
    mem.write_u64(word_addr(envp_base_index + envp.len() as u64), 0)?;

    Ok(StackLayout {
        rsp: word_addr(0),
        argv_ptr: word_addr(1),
        envp_ptr: word_addr(envp_base_index),
    })
}

/// Pushes `sentinel` as a synthetic return address, jumps to `target`, and
/// runs to halt — the loader's stand-in for "issue a CALL": a real `CALL`
/// would push the address of the following instruction, which is never
/// the sentinel, so the terminal `RET` wouldn't see zero.
fn call_and_run(cpu: &mut Executor, target: u64, sentinel: u64) -> Result<(), LoaderError> {
    let rsp = cpu.registers().gpr(GpRegister::Rsp).wrapping_sub(8);
    cpu.registers_mut().set_gpr(GpRegister::Rsp, rsp);
    cpu.memory_mut().write_u64(rsp, sentinel)?;
    cpu.registers_mut().set_rip(target);
    cpu.set_state(State::Running);
    cpu.execute()?;
    Ok(())
}

fn read_pointer_array(bytes: &[u8], word_size: u64) -> Vec<u64> {
    let step = word_size as usize;
    if step == 0 {
        return Vec::new();
    }
    bytes
        .chunks_exact(step)
        .map(|c| {
            if step == 8 {
                u64::from_le_bytes(c.try_into().unwrap())
            } else {
                u32::from_le_bytes(c.try_into().unwrap()) as u64
            }
        })
        .collect()
}

fn run_pointer_array(
    cpu: &mut Executor,
    section: &aero_elf_model::Section,
    word_size: u64,
    base: u64,
    sentinel: u64,
    reverse: bool,
) -> Result<(), LoaderError> {
    let SectionContent::LoadableBytes(bytes) = &section.content else {
        return Ok(());
    };
    let mut entries = read_pointer_array(bytes, word_size);
    if reverse {
        entries.reverse();
    }
    for ptr in entries {
        call_and_run(cpu, base.wrapping_add(ptr), sentinel)?;
    }
    Ok(())
}

fn run_functions_in_section(
    cpu: &mut Executor,
    elf: &ElfImage,
    section: &aero_elf_model::Section,
    base: u64,
    sentinel: u64,
) -> Result<(), LoaderError> {
    let lo = section.header.vaddr;
    let hi = lo.wrapping_add(section.header.size);
    let mut targets: Vec<u64> = elf
        .symbols
        .iter()
        .filter(|s| matches!(s.symbol_type, SymbolType::Func) && s.value >= lo && s.value < hi)
        .map(|s| s.value)
        .collect();
    targets.sort_unstable();
    for value in targets {
        call_and_run(cpu, base.wrapping_add(value), sentinel)?;
    }
    Ok(())
}
