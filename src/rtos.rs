//! # RTOS VM
//!
//! Owns a base VM, a scheduler, and a message queue, and exposes the
//! public task/messaging operation table over them. This replaces the
//! teacher's `static mut SCHEDULER` / `SCHEDULER_PTR` pair with a plain
//! owned struct: every method below takes `&mut self`, so there is
//! nothing reached through a global, and nothing to wrap in an
//! interrupt-masking critical section for memory safety. `critical_enter`
//! / `critical_exit` remain, but purely as the scheduling-policy knob
//! described in [`crate::scheduler`].

use log::{debug, trace, warn};

use crate::clock::PlatformClock;
use crate::config::{BROADCAST_DST, STACK_CELLS_MAX};
use crate::error::{RtosError, RtosResult};
use crate::queue::MessageQueue;
use crate::scheduler::Scheduler;
use crate::task::{TaskState, WaitReason};
use crate::vm::BaseVm;

/// Slot index of a task, as returned by [`RtosVm::task_spawn`].
pub type TaskId = usize;

/// Result of a [`RtosVm::task_receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOutcome {
    /// Sender's slot index.
    pub src_task: u8,
    /// Message payload.
    pub data: i32,
}

/// Couples a base VM, a scheduler, and a message queue into one owned
/// value. `V` and `C` are injected generically rather than reached
/// through globals, so tests can substitute fakes (`sim::SimVm`,
/// `sim::ManualClock`) with no `cfg` plumbing.
pub struct RtosVm<V: BaseVm, C: PlatformClock> {
    vm: V,
    clock: C,
    scheduler: Scheduler,
    queue: MessageQueue,
}

impl<V: BaseVm, C: PlatformClock> RtosVm<V, C> {
    /// Wraps an already-constructed base VM and clock. Base-VM creation
    /// (word registry, memory map, MMIO) is the caller's concern; this
    /// constructor only wires the scheduler and queue around it, so
    /// unlike the C constructor it has no failure mode of its own.
    pub fn new(vm: V, clock: C) -> Self {
        Self {
            vm,
            clock,
            scheduler: Scheduler::new(),
            queue: MessageQueue::new(),
        }
    }

    /// Read-only access to the wrapped base VM.
    pub fn vm(&self) -> &V {
        &self.vm
    }

    /// Read-only access to the wrapped clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of non-dead task slots.
    pub fn task_count(&self) -> usize {
        self.scheduler.task_count
    }

    /// Slot index of the currently running task.
    pub fn task_self(&self) -> TaskId {
        self.scheduler.current_task
    }

    /// `(state, priority)` for a task slot, or `NotFound` if the slot is
    /// out of range or `Dead`.
    pub fn task_get_info(&self, id: TaskId) -> RtosResult<(TaskState, u8)> {
        let task = self.scheduler.task(id).ok_or(RtosError::NotFound)?;
        if task.is_dead() {
            return Err(RtosError::NotFound);
        }
        Ok((task.state, task.priority))
    }

    /// Creates a `Ready` task executing `word_idx` at `priority`, with
    /// `ds_size`/`rs_size` cells of data/return stack.
    pub fn task_spawn(
        &mut self,
        word_idx: u16,
        priority: u8,
        ds_size: usize,
        rs_size: usize,
    ) -> RtosResult<TaskId> {
        if ds_size == 0
            || rs_size == 0
            || ds_size > STACK_CELLS_MAX
            || rs_size > STACK_CELLS_MAX
            || !self.vm.word_is_registered(word_idx)
        {
            return Err(RtosError::InvalidArg);
        }
        let id = self.scheduler.spawn(word_idx, priority, ds_size, rs_size)?;
        debug!("task {id} spawned: word_idx={word_idx} priority={priority}");
        Ok(id)
    }

    /// Voluntarily yields the CPU.
    pub fn task_yield(&mut self) {
        let now = self.clock.now_ms();
        trace!("task {} yields", self.scheduler.current_task);
        self.scheduler.yield_current(&mut self.vm, now);
    }

    /// Blocks the current task for at least `ms` milliseconds.
    pub fn task_sleep(&mut self, ms: u32) {
        let now = self.clock.now_ms();
        trace!("task {} sleeps {ms}ms", self.scheduler.current_task);
        self.scheduler.sleep_current(&mut self.vm, now, ms);
    }

    /// Terminates the current task.
    pub fn task_exit(&mut self) {
        let now = self.clock.now_ms();
        debug!("task {} exits", self.scheduler.current_task);
        self.scheduler.exit_current(&mut self.vm, now);
    }

    /// Increments the critical-section nesting counter, suppressing
    /// preemption until a matching number of `critical_exit` calls.
    pub fn critical_enter(&mut self) {
        self.scheduler.critical_enter();
    }

    /// Decrements the nesting counter. `Underflow` if it was already
    /// zero; any preemption deferred while nested runs as soon as
    /// nesting reaches zero.
    pub fn critical_exit(&mut self) -> RtosResult<()> {
        let now = self.clock.now_ms();
        let result = self.scheduler.critical_exit(&mut self.vm, now);
        if result.is_err() {
            warn!("critical_exit called with nesting already at zero");
        }
        result
    }

    /// Enqueues a message. `dst = BROADCAST_DST` is delivered to
    /// whichever task's `task_receive` claims it first.
    ///
    /// If this unblocks a receiver of strictly higher priority than the
    /// currently running task, `send` is itself a preemption point (per
    /// §5's list of voluntary scheduling triggers) and reschedules
    /// immediately rather than waiting for the next timer tick.
    pub fn task_send(&mut self, dst: u8, msg_type: u8, data: i32) -> RtosResult<()> {
        let src = self.scheduler.current_task as u8;
        self.queue.send(src, dst, msg_type, data)?;
        trace!("task {src} sent type={msg_type} to dst={dst}");

        let current_priority = self
            .scheduler
            .task(self.scheduler.current_task)
            .map(|t| t.priority)
            .unwrap_or(0);
        let mut woke_higher_priority = false;

        if dst == BROADCAST_DST {
            for id in 0..crate::config::MAX_TASKS {
                if self.is_waiting_on(id, msg_type) {
                    self.scheduler.wake_for_message(id);
                    woke_higher_priority |= self.woke_task_outranks(id, current_priority);
                }
            }
        } else if self.is_waiting_on(dst as usize, msg_type) {
            self.scheduler.wake_for_message(dst as usize);
            woke_higher_priority |= self.woke_task_outranks(dst as usize, current_priority);
        }

        if woke_higher_priority {
            let now = self.clock.now_ms();
            self.scheduler.schedule(&mut self.vm, now);
        }
        Ok(())
    }

    fn woke_task_outranks(&self, id: usize, current_priority: u8) -> bool {
        self.scheduler
            .task(id)
            .map(|t| t.priority > current_priority)
            .unwrap_or(false)
    }

    fn is_waiting_on(&self, id: usize, msg_type: u8) -> bool {
        matches!(
            self.scheduler.task(id),
            Some(task)
                if matches!(
                    task.wait_reason,
                    Some(WaitReason::Receiving { type_filter, .. })
                        if type_filter == crate::config::ANY_MSG_TYPE || type_filter == msg_type
                )
        )
    }

    /// Receives a message matching `type_filter` (`ANY_MSG_TYPE` matches
    /// any type). Non-blocking calls return `NotFound` immediately when
    /// nothing matches.
    ///
    /// Blocking calls are a single poll-and-possibly-park step, not a
    /// call that suspends the Rust stack until a message arrives: the
    /// actual bytecode dispatch loop lives in the out-of-scope base VM,
    /// and it is that loop's responsibility to re-invoke `task_receive`
    /// once this task is dispatched again. Concretely: if nothing
    /// matches, the caller is parked `Blocked` and the scheduler hands
    /// off to another task (`NotFound` is returned to signal "call me
    /// again once I run"); a later call on the same task either finds a
    /// match (another task's `task_send` woke it), or — if the park's
    /// `timeout_ms` deadline has since elapsed — returns `Timeout` and
    /// clears the wait. A blocking call with `timeout_ms == 0` never
    /// parks at all: it returns `NotFound` immediately, the same as a
    /// non-blocking call, per the "zero timeout on blocking receive is
    /// equivalent to non-blocking" rule.
    pub fn task_receive(
        &mut self,
        type_filter: u8,
        blocking: bool,
        timeout_ms: u32,
    ) -> RtosResult<ReceiveOutcome> {
        let receiver = self.scheduler.current_task;
        if let Some(message) = self.queue.receive(receiver as u8, type_filter) {
            self.scheduler.clear_wait(receiver);
            return Ok(ReceiveOutcome {
                src_task: message.src_task,
                data: message.data,
            });
        }
        if !blocking || timeout_ms == 0 {
            return Err(RtosError::NotFound);
        }

        let now = self.clock.now_ms();
        if let Some(deadline) = self.scheduler.receive_deadline(receiver) {
            if crate::clock::deadline_elapsed(now, deadline) {
                self.scheduler.clear_wait(receiver);
                return Err(RtosError::Timeout);
            }
        }

        let deadline = Some(now.wrapping_add(timeout_ms));
        self.scheduler
            .block_on_receive(receiver, type_filter, deadline);
        self.scheduler.schedule(&mut self.vm, now);
        Err(RtosError::NotFound)
    }

    /// Runs one scheduling tick. Called by the firmware's timer
    /// interrupt handler; internal voluntary calls (`task_yield`,
    /// `task_sleep`, `task_exit`, blocking `task_receive`) reschedule on
    /// their own and do not need this called around them.
    pub fn schedule(&mut self) {
        let now = self.clock.now_ms();
        self.scheduler.tick(&mut self.vm, now);
    }

    /// Read-only access to scheduler counters, for observability and
    /// tests.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
