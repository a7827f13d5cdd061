//! Base VM contract consumed during context switches.
//!
//! The bytecode interpreter itself — its instruction set, word registry,
//! and memory map — lives outside this crate. `BaseVm` names only the
//! sliver of that interpreter the scheduler needs to touch: the live
//! data/return stacks, so a task's stack contents can be saved and
//! restored across a dispatch, and word-index validity, so `spawn`
//! can reject a request to start a task at an unregistered word.

/// Stack-manipulation surface of a base bytecode VM.
///
/// All methods operate on the VM's *currently live* stacks — the ones
/// belonging to whichever task is presently `Running`. The scheduler is
/// the only caller permitted to invoke these across a task boundary.
pub trait BaseVm {
    /// Number of live cells on the data stack.
    fn ds_depth(&self) -> usize;

    /// Copies the live data stack, bottom-first, into `out`. Copies
    /// `min(self.ds_depth(), out.len())` cells.
    fn ds_copy_to_array(&self, out: &mut [i32]);

    /// Empties the live data stack.
    fn ds_clear(&mut self);

    /// Pushes one cell onto the live data stack.
    fn ds_push(&mut self, cell: i32);

    /// Number of live cells on the return stack.
    fn rs_depth(&self) -> usize;

    /// Copies the live return stack, bottom-first, into `out`. Copies
    /// `min(self.rs_depth(), out.len())` cells. Used for diagnostics
    /// only: this crate never restores return-stack contents (see
    /// `Scheduler::restore_context`), so no `rs_push` is exposed here.
    fn rs_copy_to_array(&self, out: &mut [i32]);

    /// Whether `word_idx` names a word registered with the VM. `spawn`
    /// rejects an unregistered word index with `InvalidArg`.
    fn word_is_registered(&self, word_idx: u16) -> bool;
}
