//! # Configuration
//!
//! Compile-time constants governing the scheduler and message queue.
//! All limits are fixed at compile time; the only runtime allocation is
//! each task's own data/return stack buffers, sized individually at spawn.

/// Maximum number of tasks the system can manage simultaneously.
/// This bounds the static task-table array. Increase with care: each
/// live slot costs a `TaskControlBlock` plus two `Vec<i32>` buffers.
pub const MAX_TASKS: usize = 8;

/// Default time slice in milliseconds. A `Running` task is preempted
/// once this much time has elapsed since it was dispatched, provided
/// `critical_nesting` is zero.
pub const DEFAULT_TIME_SLICE_MS: u32 = 10;

/// Destination value reserved to mean "deliver to whichever task
/// receives it first". Ordinary task slots never reach this value
/// because `MAX_TASKS` is far below it.
pub const BROADCAST_DST: u8 = 0xFF;

/// Message-type filter value that matches any `msg_type` in
/// [`MessageQueue::receive`](crate::queue::MessageQueue::receive).
pub const ANY_MSG_TYPE: u8 = 0;

/// Capacity of the message queue ring buffer, in messages.
pub const QUEUE_CAPACITY: usize = 16;

/// Largest data/return stack a single task may request at spawn time,
/// in 32-bit cells. Bounds the per-task allocation so a misbehaving
/// spawn request can't exhaust memory on its own.
pub const STACK_CELLS_MAX: usize = 256;
