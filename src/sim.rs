//! Reference `BaseVm`/`PlatformClock` implementations used by this
//! crate's own tests and available to downstream integration tests.
//!
//! `SimVm` owns a single shared data/return stack and a small set of
//! registered word indices, matching the minimal "dummy word" VM the
//! original test suite this crate is grounded on builds by hand for
//! each test case. `ManualClock` is driven entirely by `advance`, never
//! by wall-clock time, so scheduling tests are deterministic.

use alloc::vec::Vec;
use core::cell::Cell;

use crate::clock::PlatformClock;
use crate::vm::BaseVm;

/// A minimal in-memory VM exercising only the stack operations
/// `BaseVm` requires.
pub struct SimVm {
    ds: Vec<i32>,
    rs: Vec<i32>,
    registered_words: Vec<u16>,
}

impl SimVm {
    /// A VM with no words registered yet.
    pub fn new() -> Self {
        Self {
            ds: Vec::new(),
            rs: Vec::new(),
            registered_words: Vec::new(),
        }
    }

    /// Registers `word_idx` as a valid spawn target.
    pub fn register_word(&mut self, word_idx: u16) {
        self.registered_words.push(word_idx);
    }

    /// Pushes directly onto the simulated return stack, for tests that
    /// need to exercise `rs_depth`/`rs_copy_to_array` diagnostics.
    pub fn rs_push_for_test(&mut self, cell: i32) {
        self.rs.push(cell);
    }
}

impl Default for SimVm {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseVm for SimVm {
    fn ds_depth(&self) -> usize {
        self.ds.len()
    }

    fn ds_copy_to_array(&self, out: &mut [i32]) {
        let n = out.len().min(self.ds.len());
        out[..n].copy_from_slice(&self.ds[..n]);
    }

    fn ds_clear(&mut self) {
        self.ds.clear();
    }

    fn ds_push(&mut self, cell: i32) {
        self.ds.push(cell);
    }

    fn rs_depth(&self) -> usize {
        self.rs.len()
    }

    fn rs_copy_to_array(&self, out: &mut [i32]) {
        let n = out.len().min(self.rs.len());
        out[..n].copy_from_slice(&self.rs[..n]);
    }

    fn word_is_registered(&self, word_idx: u16) -> bool {
        self.registered_words.contains(&word_idx)
    }
}

/// A `PlatformClock` whose time only moves when `advance` is called,
/// so tests control scheduling deadlines exactly.
pub struct ManualClock {
    ms: Cell<u32>,
}

impl ManualClock {
    /// A clock starting at tick 0.
    pub fn new() -> Self {
        Self { ms: Cell::new(0) }
    }

    /// Starts the clock at `start_ms`.
    pub fn starting_at(start_ms: u32) -> Self {
        Self {
            ms: Cell::new(start_ms),
        }
    }

    /// Advances the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u32) {
        self.ms.set(self.ms.get().wrapping_add(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformClock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.ms.get()
    }

    fn now_us(&self) -> u32 {
        self.ms.get().wrapping_mul(1000)
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(ms);
    }

    fn delay_us(&self, us: u32) {
        self.advance(us / 1000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_vm_round_trips_stack_contents() {
        let mut vm = SimVm::new();
        vm.ds_push(1);
        vm.ds_push(2);
        let mut out = [0i32; 2];
        vm.ds_copy_to_array(&mut out);
        assert_eq!(out, [1, 2]);
        vm.ds_clear();
        assert_eq!(vm.ds_depth(), 0);
    }

    #[test]
    fn manual_clock_advances_only_when_told() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(42);
        assert_eq!(clock.now_ms(), 42);
        clock.delay_ms(8);
        assert_eq!(clock.now_ms(), 50);
    }
}
