use crate::{FileHeader, ProgramHeader, Section, SymbolTableEntry};

/// The full parsed-ELF model the loader consumes: file header,
/// program/section tables, symbol table, and the raw `.strtab` bytes
/// symbol names are resolved against.
///
/// This is still pure data — no byte-level ELF parsing lives here. The
/// (out-of-scope) parser is assumed to have already produced this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfImage {
    pub header: FileHeader,
    pub program_headers: Vec<ProgramHeader>,
    pub sections: Vec<Section>,
    pub symbols: Vec<SymbolTableEntry>,
    pub strtab: Vec<u8>,
}

impl ElfImage {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Resolves a symbol's name out of `.strtab`. Returns `""` if the
    /// offset is out of range or the bytes aren't valid UTF-8 (symbol
    /// names are conventionally ASCII; this core doesn't reject malformed
    /// input, it just can't display it usefully).
    pub fn symbol_name(&self, sym: &SymbolTableEntry) -> &str {
        let start = sym.name_offset as usize;
        let Some(rest) = self.strtab.get(start..) else {
            return "";
        };
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        std::str::from_utf8(&rest[..end]).unwrap_or("")
    }

    /// `4` for ELF32, `8` for ELF64 — the width of a pointer slot in the
    /// initial stack image.
    pub fn word_size(&self) -> u64 {
        if self.header.is_32bit {
            4
        } else {
            8
        }
    }
}
