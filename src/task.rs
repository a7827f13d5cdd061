//! # Task control block
//!
//! Defines the per-task record the scheduler dispatches: its lifecycle
//! state, priority, the word it executes, saved stack contents, and the
//! bookkeeping needed to wake it from a sleep or a blocking receive.

use alloc::vec::Vec;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────┐    schedule()    ┌─────────┐
///   │ Ready│ ───────────────► │ Running │
///   └──────┘                  └─────────┘
///      ▲                          │  │
///      │     wake (deadline/msg)  │  │ exit()
///      │   ┌──────────────────────┘  ▼
///      │   │                     ┌──────┐
///      └───┴──── sleep/receive ──│ Dead │◄── spawn() allocates a Dead slot
///          ┌─────────┐           └──────┘
///          │ Blocked │
///          └─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Slot is unallocated and available to a future `spawn`.
    Dead,
    /// Task is runnable and waiting to be dispatched.
    Ready,
    /// Task currently owns the VM's live stacks.
    Running,
    /// Task is waiting on a sleep deadline or a message; see
    /// [`WaitReason`].
    Blocked,
}

/// Why a `Blocked` task is blocked, carrying exactly the data needed to
/// decide when it should wake. Keeping this as a tagged union (rather
/// than a bare "sleep deadline" field that might also be read for a
/// receive wait) makes "blocked for exactly one reason" a type-level
/// fact instead of a convention callers have to uphold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Waiting for `sleep_until_tick` to be reached.
    Sleeping,
    /// Waiting for a message matching `type_filter`, optionally expiring
    /// at `timeout_tick` (`None` means wait forever).
    Receiving {
        type_filter: u8,
        timeout_tick: Option<u32>,
    },
}

// ---------------------------------------------------------------------------
// Task control block
// ---------------------------------------------------------------------------

/// Per-task record held in the scheduler's task table.
///
/// `ds_base`/`rs_base` hold the task's saved data/return stack contents
/// while it is not `Running`; they are sized once at `spawn` and freed
/// at `exit`, the one dynamic allocation this crate performs after
/// startup.
pub struct TaskControlBlock {
    /// Current lifecycle state.
    pub state: TaskState,
    /// Static priority; higher numeric value dispatches first.
    pub priority: u8,
    /// Bytecode word this task executes, resolved against the base VM.
    pub word_idx: u16,
    /// Saved data-stack contents, bottom-first.
    pub ds_base: Vec<i32>,
    /// Live depth of `ds_base` (may be less than its capacity).
    pub ds_depth: usize,
    /// Saved return-stack contents, bottom-first. Never restored onto
    /// the live VM (see `Scheduler::restore_context`); kept only so its
    /// depth can be asserted empty and for diagnostics.
    pub rs_base: Vec<i32>,
    /// Live depth of `rs_base`.
    pub rs_depth: usize,
    /// Absolute tick at which a `Sleeping` task becomes `Ready`. Only
    /// meaningful while `wait_reason == Some(WaitReason::Sleeping)`.
    pub sleep_until_tick: u32,
    /// Set while `state == Blocked`; `None` otherwise.
    pub wait_reason: Option<WaitReason>,
    /// Number of times this task has been dispatched.
    pub exec_count: u32,
}

impl TaskControlBlock {
    /// An unallocated (`Dead`) slot, used to fill the task table.
    pub const fn dead() -> Self {
        Self {
            state: TaskState::Dead,
            priority: 0,
            word_idx: 0,
            ds_base: Vec::new(),
            ds_depth: 0,
            rs_base: Vec::new(),
            rs_depth: 0,
            sleep_until_tick: 0,
            wait_reason: None,
            exec_count: 0,
        }
    }

    /// Initializes a `Dead` slot into a fresh `Ready` task.
    pub fn spawn_into(&mut self, priority: u8, word_idx: u16, ds_size: usize, rs_size: usize) {
        self.state = TaskState::Ready;
        self.priority = priority;
        self.word_idx = word_idx;
        self.ds_base = alloc::vec![0i32; ds_size];
        self.ds_depth = 0;
        self.rs_base = alloc::vec![0i32; rs_size];
        self.rs_depth = 0;
        self.sleep_until_tick = 0;
        self.wait_reason = None;
        self.exec_count = 0;
    }

    /// Tears the slot back down to `Dead`, releasing its stack buffers.
    pub fn retire(&mut self) {
        *self = Self::dead();
    }

    /// A task is selectable by the scheduler while `Ready` or already
    /// `Running`.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.state, TaskState::Dead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_slot_is_not_runnable() {
        let t = TaskControlBlock::dead();
        assert!(t.is_dead());
        assert!(!t.is_runnable());
    }

    #[test]
    fn spawn_into_allocates_requested_stack_sizes() {
        let mut t = TaskControlBlock::dead();
        t.spawn_into(5, 12, 4, 2);
        assert_eq!(t.state, TaskState::Ready);
        assert_eq!(t.priority, 5);
        assert_eq!(t.word_idx, 12);
        assert_eq!(t.ds_base.len(), 4);
        assert_eq!(t.rs_base.len(), 2);
        assert_eq!(t.ds_depth, 0);
        assert!(t.is_runnable());
    }

    #[test]
    fn retire_returns_slot_to_dead() {
        let mut t = TaskControlBlock::dead();
        t.spawn_into(1, 0, 4, 4);
        t.exec_count = 7;
        t.retire();
        assert!(t.is_dead());
        assert_eq!(t.exec_count, 0);
        assert_eq!(t.ds_base.len(), 0);
    }
}
