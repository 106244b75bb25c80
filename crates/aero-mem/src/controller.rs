use std::collections::HashMap;

use crate::error::{AccessKind, MemoryError};
use crate::initializer::MemoryInitializer;
use crate::interval::IntervalArray;

const PAGE_SIZE: u64 = 4096;
const PAGE_MASK: u64 = PAGE_SIZE - 1;

type Page = Box<[u8; PAGE_SIZE as usize]>;

fn page_of(addr: u64) -> u64 {
    addr >> 12
}

fn offset_of(addr: u64) -> usize {
    (addr & PAGE_MASK) as usize
}

/// Sparse, byte-addressable, 64-bit emulated memory with independent
/// read/write/execute permission bits and an initialization bitmap per
/// byte.
///
/// Storage is page-backed (4 KiB pages, allocated on first touch);
/// permission and initialization state are each a global [`IntervalArray`]
/// rather than per-page bitmaps, since `set_permissions`/`initialize`
/// calls naturally operate over large contiguous ranges.
pub struct MemoryController {
    pages: HashMap<u64, Page>,
    readable: IntervalArray,
    writable: IntervalArray,
    executable: IntervalArray,
    initialized: IntervalArray,
    initializer: Box<dyn MemoryInitializer>,
}

impl MemoryController {
    pub fn new(initializer: Box<dyn MemoryInitializer>) -> Self {
        Self {
            pages: HashMap::new(),
            readable: IntervalArray::new(),
            writable: IntervalArray::new(),
            executable: IntervalArray::new(),
            initialized: IntervalArray::new(),
            initializer,
        }
    }

    /// Grants/revokes R/W/X over `[lo, hi]` (inclusive). Earlier permissions
    /// on the same byte are replaced, not merged.
    pub fn set_permissions(
        &mut self,
        lo: u64,
        hi: u64,
        r: bool,
        w: bool,
        x: bool,
    ) -> Result<(), MemoryError> {
        if lo > hi {
            return Err(MemoryError::InvalidRange { lo, hi });
        }
        Self::apply_flag(&mut self.readable, lo, hi, r);
        Self::apply_flag(&mut self.writable, lo, hi, w);
        Self::apply_flag(&mut self.executable, lo, hi, x);
        Ok(())
    }

    fn apply_flag(array: &mut IntervalArray, lo: u64, hi: u64, value: bool) {
        if value {
            array.set(lo, hi);
        } else {
            array.reset(lo, hi);
        }
    }

    pub fn is_readable(&self, addr: u64) -> bool {
        self.readable.get(addr)
    }

    pub fn is_writable(&self, addr: u64) -> bool {
        self.writable.get(addr)
    }

    pub fn is_executable(&self, addr: u64) -> bool {
        self.executable.get(addr)
    }

    /// `true` iff every byte in `[lo, hi]` matches the given R/W/X flags.
    pub fn range_is(&self, lo: u64, hi: u64, r: bool, w: bool, x: bool) -> bool {
        (lo..=hi).all(|a| {
            self.is_readable(a) == r && self.is_writable(a) == w && self.is_executable(a) == x
        })
    }

    pub fn is_initialized(&self, addr: u64) -> bool {
        self.initialized.get(addr)
    }

    fn raw_read(&self, addr: u64) -> u8 {
        self.pages
            .get(&page_of(addr))
            .map(|p| p[offset_of(addr)])
            .unwrap_or(0)
    }

    fn raw_write(&mut self, addr: u64, byte: u8) {
        let page = self
            .pages
            .entry(page_of(addr))
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE as usize]));
        page[offset_of(addr)] = byte;
    }

    /// Writes `bytes` sequentially starting at `addr`, marking each byte
    /// initialized. Does not check W permission (used by the loader to
    /// populate segments before any permissions are even readable).
    /// Returns the number of bytes written.
    pub fn initialize(&mut self, addr: u64, bytes: &[u8]) -> usize {
        for (i, &b) in bytes.iter().enumerate() {
            self.raw_write(addr.wrapping_add(i as u64), b);
        }
        if !bytes.is_empty() {
            let hi = addr.wrapping_add(bytes.len() as u64 - 1);
            self.initialized.set(addr, hi);
        }
        bytes.len()
    }

    /// Bulk-fills `size` bytes starting at `addr` with `fill`, marking them
    /// initialized.
    pub fn initialize_fill(&mut self, addr: u64, size: u64, fill: u8) -> u64 {
        for i in 0..size {
            self.raw_write(addr.wrapping_add(i), fill);
        }
        if size > 0 {
            self.initialized.set(addr, addr.wrapping_add(size - 1));
        }
        size
    }

    /// Reads one byte, failing if R is unset. Uninitialized-but-readable
    /// bytes are sampled from the configured [`MemoryInitializer`].
    pub fn read(&self, addr: u64) -> Result<u8, MemoryError> {
        if !self.is_readable(addr) {
            return Err(MemoryError::PermissionDenied {
                kind: AccessKind::Read,
                addr,
            });
        }
        Ok(self.sampled_or_stored(addr))
    }

    /// Reads one byte for instruction fetch, failing if X is unset.
    pub fn read_code(&self, addr: u64) -> Result<u8, MemoryError> {
        if !self.is_executable(addr) {
            return Err(MemoryError::PermissionDenied {
                kind: AccessKind::Execute,
                addr,
            });
        }
        Ok(self.sampled_or_stored(addr))
    }

    fn sampled_or_stored(&self, addr: u64) -> u8 {
        if self.is_initialized(addr) {
            self.raw_read(addr)
        } else {
            self.initializer.sample(addr)
        }
    }

    /// Writes one byte, failing if W is unset. Marks the byte initialized.
    pub fn write(&mut self, addr: u64, value: u8) -> Result<(), MemoryError> {
        if !self.is_writable(addr) {
            return Err(MemoryError::PermissionDenied {
                kind: AccessKind::Write,
                addr,
            });
        }
        self.raw_write(addr, value);
        self.initialized.set(addr, addr);
        Ok(())
    }

    fn check_range_readable(&self, addr: u64, len: u64) -> Result<(), MemoryError> {
        for i in 0..len {
            let a = addr.wrapping_add(i);
            if !self.is_readable(a) {
                return Err(MemoryError::PermissionDenied {
                    kind: AccessKind::Read,
                    addr: a,
                });
            }
        }
        Ok(())
    }

    fn check_range_writable(&self, addr: u64, len: u64) -> Result<(), MemoryError> {
        for i in 0..len {
            let a = addr.wrapping_add(i);
            if !self.is_writable(a) {
                return Err(MemoryError::PermissionDenied {
                    kind: AccessKind::Write,
                    addr: a,
                });
            }
        }
        Ok(())
    }

    /// Composed little-endian read. The whole byte range is permission
    /// checked before any byte is sampled, so a failing access leaves no
    /// partial side effect.
    pub fn read_u16(&self, addr: u64) -> Result<u16, MemoryError> {
        self.check_range_readable(addr, 2)?;
        let mut buf = [0u8; 2];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.sampled_or_stored(addr.wrapping_add(i as u64));
        }
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, MemoryError> {
        self.check_range_readable(addr, 4)?;
        let mut buf = [0u8; 4];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.sampled_or_stored(addr.wrapping_add(i as u64));
        }
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, MemoryError> {
        self.check_range_readable(addr, 8)?;
        let mut buf = [0u8; 8];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.sampled_or_stored(addr.wrapping_add(i as u64));
        }
        Ok(u64::from_le_bytes(buf))
    }

    /// Composed little-endian write. The whole byte range is permission
    /// checked before any byte is written (no partial writes on failure).
    pub fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), MemoryError> {
        self.check_range_writable(addr, 2)?;
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.raw_write(addr.wrapping_add(i as u64), *b);
        }
        self.initialized.set(addr, addr.wrapping_add(1));
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), MemoryError> {
        self.check_range_writable(addr, 4)?;
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.raw_write(addr.wrapping_add(i as u64), *b);
        }
        self.initialized.set(addr, addr.wrapping_add(3));
        Ok(())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), MemoryError> {
        self.check_range_writable(addr, 8)?;
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.raw_write(addr.wrapping_add(i as u64), *b);
        }
        self.initialized.set(addr, addr.wrapping_add(7));
        Ok(())
    }
}
