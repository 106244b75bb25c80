use bitflags::bitflags;

/// `sh_type`. Only the variants the loader or its constructor-table walk
/// names are broken out; every other legal ELF section type is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    ProgBits,
    NoBits,
    SymTab,
    StrTab,
    InitArray,
    FiniArray,
    PreinitArray,
    Other(u32),
}

bitflags! {
    /// `sh_flags` bits the loader consults.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u64 {
        const ALLOC = 1 << 1;
        const WRITE = 1 << 0;
        const EXECINSTR = 1 << 2;
    }
}

/// One `Shdr` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub section_type: SectionType,
    pub flags: SectionFlags,
    pub vaddr: u64,
    pub file_offset: u64,
    pub size: u64,
    pub entry_size: u64,
}

/// Either the section's bytes as stored in the file, or `NoBits` for a
/// `SHT_NOBITS` section (`.bss` and similar: occupies `size` bytes of
/// address space but nothing in the file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionContent {
    LoadableBytes(Vec<u8>),
    NoBits,
}

/// A named section: header plus contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header: SectionHeader,
    pub name: String,
    pub content: SectionContent,
}

impl Section {
    pub fn is_alloc(&self) -> bool {
        self.header.flags.contains(SectionFlags::ALLOC)
    }
}
