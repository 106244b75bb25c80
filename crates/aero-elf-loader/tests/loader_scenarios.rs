//! End-to-end loader scenarios exercising segment/stack setup and
//! constructor/destructor table walking.

use aero_cpu_core::{EmulatorConfig, Executor, State};
use aero_elf_loader::load;
use aero_elf_model::{
    ElfImage, FileHeader, ProgramHeader, ProgramHeaderType, Section, SectionContent, SectionFlags,
    SectionHeader, SectionType, SegmentFlags,
};
use aero_mem::{MemoryController, Zero};
use pretty_assertions::assert_eq;

fn config() -> EmulatorConfig {
    EmulatorConfig {
        base_address: 0x1_0000_0000,
        ..EmulatorConfig::default()
    }
}

#[test]
fn single_rx_segment_is_loaded_with_correct_permissions_and_bytes() {
    let elf = ElfImage {
        header: FileHeader { is_32bit: false, little_endian: true, entry_vaddr: 0x400000 },
        program_headers: vec![ProgramHeader {
            program_type: ProgramHeaderType::Load,
            flags: SegmentFlags::READ | SegmentFlags::EXECUTE,
            offset: 0,
            vaddr: 0x400000,
            filesz: 16,
            memsz: 16,
            align: 0x1000,
        }],
        sections: vec![Section {
            header: SectionHeader {
                section_type: SectionType::ProgBits,
                flags: SectionFlags::ALLOC | SectionFlags::EXECINSTR,
                vaddr: 0x400000,
                file_offset: 0,
                size: 16,
                entry_size: 0,
            },
            name: ".text".to_string(),
            content: SectionContent::LoadableBytes(vec![0x90; 16]),
        }],
        symbols: vec![],
        strtab: vec![],
    };

    let mut mem = MemoryController::new(Box::new(Zero));
    let cfg = config();
    let mut cpu = Executor::new(&mut mem, cfg);
    let warnings = load(&elf, &mut cpu, &cfg, &[], &[]).unwrap();
    assert_eq!(warnings, vec![]);

    let base = cfg.base_address + 0x400000;
    assert!(cpu.memory().range_is(base, base + 15, true, false, true));
    for i in 0..16 {
        assert_eq!(cpu.memory().read_code(base + i).unwrap(), 0x90);
    }
    assert_eq!(cpu.memory().read(base + 16), Err(aero_mem::MemoryError::PermissionDenied {
        kind: aero_mem::AccessKind::Read,
        addr: base + 16,
    }));
}

#[test]
fn section_outside_every_segment_is_a_loader_error() {
    let elf = ElfImage {
        header: FileHeader { is_32bit: false, little_endian: true, entry_vaddr: 0 },
        program_headers: vec![ProgramHeader {
            program_type: ProgramHeaderType::Load,
            flags: SegmentFlags::READ,
            offset: 0,
            vaddr: 0x1000,
            filesz: 16,
            memsz: 16,
            align: 0x1000,
        }],
        sections: vec![Section {
            header: SectionHeader {
                section_type: SectionType::ProgBits,
                flags: SectionFlags::ALLOC,
                vaddr: 0x9000,
                file_offset: 0,
                size: 8,
                entry_size: 0,
            },
            name: ".rodata".to_string(),
            content: SectionContent::LoadableBytes(vec![0; 8]),
        }],
        symbols: vec![],
        strtab: vec![],
    };

    let mut mem = MemoryController::new(Box::new(Zero));
    let cfg = config();
    let mut cpu = Executor::new(&mut mem, cfg);
    let err = load(&elf, &mut cpu, &cfg, &[], &[]).unwrap_err();
    assert!(matches!(err, aero_elf_loader::LoaderError::SectionOutsideSegment { .. }));
}

#[test]
fn init_array_entry_that_immediately_rets_halts_after_one_call() {
    let code_vaddr = 0x400000u64;
    let init_array_vaddr = 0x401000u64;

    let elf = ElfImage {
        header: FileHeader { is_32bit: false, little_endian: true, entry_vaddr: code_vaddr },
        program_headers: vec![
            ProgramHeader {
                program_type: ProgramHeaderType::Load,
                flags: SegmentFlags::READ | SegmentFlags::EXECUTE,
                offset: 0,
                vaddr: code_vaddr,
                filesz: 1,
                memsz: 1,
                align: 0x1000,
            },
            ProgramHeader {
                program_type: ProgramHeaderType::Load,
                flags: SegmentFlags::READ,
                offset: 0,
                vaddr: init_array_vaddr,
                filesz: 8,
                memsz: 8,
                align: 0x1000,
            },
        ],
        sections: vec![
            Section {
                header: SectionHeader {
                    section_type: SectionType::ProgBits,
                    flags: SectionFlags::ALLOC | SectionFlags::EXECINSTR,
                    vaddr: code_vaddr,
                    file_offset: 0,
                    size: 1,
                    entry_size: 0,
                },
                name: ".text".to_string(),
                content: SectionContent::LoadableBytes(vec![0xC3]), // ret
            },
            Section {
                header: SectionHeader {
                    section_type: SectionType::InitArray,
                    flags: SectionFlags::ALLOC,
                    vaddr: init_array_vaddr,
                    file_offset: 0,
                    size: 8,
                    entry_size: 8,
                },
                name: ".init_array".to_string(),
                content: SectionContent::LoadableBytes(code_vaddr.to_le_bytes().to_vec()),
            },
        ],
        symbols: vec![],
        strtab: vec![],
    };

    let mut mem = MemoryController::new(Box::new(Zero));
    let cfg = config();
    let mut cpu = Executor::new(&mut mem, cfg);
    load(&elf, &mut cpu, &cfg, &[], &[]).unwrap();

    assert_eq!(cpu.state(), State::Halted);
    assert_eq!(cpu.registers().rip(), cfg.stack_bottom_sentinel);
}

#[test]
fn argv_and_envp_are_visible_through_rdi_rsi_rdx() {
    let elf = ElfImage {
        header: FileHeader { is_32bit: false, little_endian: true, entry_vaddr: 0 },
        program_headers: vec![],
        sections: vec![],
        symbols: vec![],
        strtab: vec![],
    };

    let mut mem = MemoryController::new(Box::new(Zero));
    let cfg = config();
    let mut cpu = Executor::new(&mut mem, cfg);
    load(&elf, &mut cpu, &cfg, &["prog", "arg1"], &["HOME=/root"]).unwrap();

    assert_eq!(cpu.registers().gpr(aero_types::GpRegister::Rdi), 2);
    let argv_ptr = cpu.registers().gpr(aero_types::GpRegister::Rsi);
    let envp_ptr = cpu.registers().gpr(aero_types::GpRegister::Rdx);

    let argv0_addr = cpu.memory().read_u64(argv_ptr).unwrap();
    let mut s = Vec::new();
    let mut a = argv0_addr;
    loop {
        let b = cpu.memory().read(a).unwrap();
        if b == 0 {
            break;
        }
        s.push(b);
        a += 1;
    }
    assert_eq!(String::from_utf8(s).unwrap(), "prog");

    let envp0_addr = cpu.memory().read_u64(envp_ptr).unwrap();
    let mut s = Vec::new();
    let mut a = envp0_addr;
    loop {
        let b = cpu.memory().read(a).unwrap();
        if b == 0 {
            break;
        }
        s.push(b);
        a += 1;
    }
    assert_eq!(String::from_utf8(s).unwrap(), "HOME=/root");
}
