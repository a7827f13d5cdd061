//! # v4-rtos
//!
//! Preemptive task scheduler and message queue built on top of a
//! stack-based bytecode VM.
//!
//! ## Overview
//!
//! This crate does not execute bytecode itself. It multiplexes a single
//! VM execution context — one live data stack, one live return stack —
//! across many logical tasks, saving and restoring those stacks on each
//! dispatch, and provides the IPC primitive (a bounded message queue)
//! tasks use to coordinate.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  Bytecode tasks (external)                 │
//! ├───────────────────────────────────────────────────────────┤
//! │                   RtosVm<V, C>  (rtos.rs)                   │
//! │   task_spawn · task_yield · task_sleep · task_exit          │
//! │   task_send · task_receive · critical_enter/exit · schedule │
//! ├──────────────┬────────────────────────┬────────────────────┤
//! │  Scheduler   │     MessageQueue        │   Task table       │
//! │  scheduler.rs│     queue.rs            │   task.rs          │
//! │  ─ select_next()  ─ send()/receive()   │   ─ TaskControlBlock│
//! │  ─ tick()/schedule()                   │   ─ WaitReason      │
//! ├──────────────┴────────────────────────┴────────────────────┤
//! │        BaseVm (vm.rs)         │    PlatformClock (clock.rs)  │
//! │   ds/rs depth, copy, push     │    now_ms/us, delay_ms/us     │
//! ├────────────────────────────────┴──────────────────────────┤
//! │     Base VM + board support package (out of scope)          │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling model
//!
//! Two-level: strict priority between levels, round-robin within a
//! level. A task is dispatched, runs until it yields, sleeps, exits,
//! blocks on a receive, or its time slice elapses; the algorithm is
//! documented in full on [`scheduler`].
//!
//! ## Memory model
//!
//! Everything but a task's own data/return stacks is allocated once, at
//! `RtosVm` construction, in a fixed-size task table
//! (`[TaskControlBlock; MAX_TASKS]`) and a fixed-capacity message ring
//! (`[Message; QUEUE_CAPACITY]`). A task's stacks are sized individually
//! at `task_spawn` and released at `task_exit` — the one allocation this
//! crate performs after startup, since a single compile-time constant
//! cannot size every task's stacks at once.
//!
//! ## No global state
//!
//! [`rtos::RtosVm`] is a plain owned struct; nothing in this crate is
//! reached through a `static`. Tests substitute fakes for both generic
//! parameters (see [`sim`]) with no feature-flag plumbing.

#![no_std]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod rtos;
pub mod scheduler;
pub mod sim;
pub mod task;
pub mod vm;

pub use clock::PlatformClock;
pub use error::{RtosError, RtosResult};
pub use queue::{Message, MessageQueue};
pub use rtos::{ReceiveOutcome, RtosVm, TaskId};
pub use task::{TaskControlBlock, TaskState, WaitReason};
pub use vm::BaseVm;
