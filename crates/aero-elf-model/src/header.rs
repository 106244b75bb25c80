use bitflags::bitflags;

/// The ELF file header fields the loader actually needs: class,
/// endianness, and the entry point. Everything else (ABI, machine type,
/// object type) is assumed already validated by whatever produced this
/// model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub is_32bit: bool,
    pub little_endian: bool,
    pub entry_vaddr: u64,
}

/// `p_type` of a program header. Only `Load` segments drive the loader;
/// everything else (`PT_DYNAMIC`, `PT_INTERP`, `PT_NOTE`, …) is carried
/// through as `Other` since this core statically links and ignores
/// `.dynamic`: it does not resolve relocations, and assumes a statically
/// linked image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramHeaderType {
    Load,
    Other(u32),
}

bitflags! {
    /// `p_flags`: segment permissions, mapped 1:1 onto the memory
    /// controller's R/W/X bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        const EXECUTE = 1 << 0;
        const WRITE = 1 << 1;
        const READ = 1 << 2;
    }
}

/// One `PT_*` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub program_type: ProgramHeaderType,
    pub flags: SegmentFlags,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    pub fn is_loadable(&self) -> bool {
        matches!(self.program_type, ProgramHeaderType::Load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_segments_are_loadable() {
        let load = ProgramHeader {
            program_type: ProgramHeaderType::Load,
            flags: SegmentFlags::READ | SegmentFlags::EXECUTE,
            offset: 0,
            vaddr: 0x1000,
            filesz: 0x10,
            memsz: 0x10,
            align: 0x1000,
        };
        assert!(load.is_loadable());
        assert!(load.flags.contains(SegmentFlags::READ));
        assert!(!load.flags.contains(SegmentFlags::WRITE));

        let dynamic = ProgramHeader { program_type: ProgramHeaderType::Other(2), ..load };
        assert!(!dynamic.is_loadable());
    }
}
