/// Options fixed for the lifetime of one emulator run. Threaded through
/// [`crate::Executor::new`] and the ELF
/// loader rather than held as process-wide mutable state, matching
/// `aero-mem`'s own options-struct constructors.
///
/// `memory_initializer` is not a field here: it is consumed directly by
/// `MemoryController::new` (a `Box<dyn MemoryInitializer>`), since storing a
/// trait object in this otherwise `Copy` struct would force every caller to
/// clone/box it again. Construct the `MemoryController` with the desired
/// initializer first, then build this config for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Where PT_LOAD `vaddr == 0` maps.
    pub base_address: u64,
    /// Bytes of R/W stack reserved below `base_stack_address`.
    pub stack_size: u64,
    /// Highest address of the stack region. `None` lets the loader pick
    /// (and 16-byte-align) an implementation-chosen address.
    pub base_stack_address: Option<u64>,
    /// Optional pre-execution validation pass; unused by
    /// `execute`/`execute_one` themselves, left for a caller-driven
    /// decode-the-whole-image check before running.
    pub check_instructions: bool,
    /// 64-bit value pushed below `argc` so a terminal `RET` halts.
    pub stack_bottom_sentinel: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            base_address: 0x5a5a_0000_0000_0000,
            stack_size: 8 * 1024 * 1024,
            base_stack_address: None,
            check_instructions: false,
            stack_bottom_sentinel: 0,
        }
    }
}
