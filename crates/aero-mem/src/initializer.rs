use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::fmt;

/// Produces the byte an uninitialized read observes. Fixed once at
/// emulator start.
pub trait MemoryInitializer: fmt::Debug {
    fn sample(&self, addr: u64) -> u8;
}

/// Uninitialized reads always observe zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zero;

impl MemoryInitializer for Zero {
    fn sample(&self, _addr: u64) -> u8 {
        0
    }
}

/// Uninitialized reads observe a deterministic pseudo-random byte stream,
/// seeded once per emulator run. Sampling advances the stream regardless of
/// `addr` (re-reading the same uninitialized byte twice yields two
/// different values, matching "uninitialized memory" semantics rather than
/// a hash of the address).
pub struct Random {
    rng: RefCell<ChaCha8Rng>,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Random").finish_non_exhaustive()
    }
}

impl MemoryInitializer for Random {
    fn sample(&self, _addr: u64) -> u8 {
        (self.rng.borrow_mut().next_u32() & 0xFF) as u8
    }
}
