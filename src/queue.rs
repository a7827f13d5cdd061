//! Fixed-capacity message queue for inter-task communication.
//!
//! ```text
//!        write_idx                 read_idx
//!            │                         │
//!            ▼                         ▼
//!   ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!   │   │   │   │ M │ M │ M │   │   │   slots, `count` of them live
//!   └───┴───┴───┴───┴───┴───┴───┴───┘
//! ```
//!
//! A single ring of [`Message`] buffers every in-flight send; `count`
//! plus the two indices fully describe its state, so unlike the
//! lock-free ring buffers elsewhere in this codebase this one carries
//! no atomics — it is only ever touched with the scheduler's `&mut`
//! borrow, which already serializes access.

use crate::config::{ANY_MSG_TYPE, BROADCAST_DST, QUEUE_CAPACITY};
use crate::error::{RtosError, RtosResult};

/// One entry in the message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Slot index of the sender.
    pub src_task: u8,
    /// Slot index of the intended receiver, or [`BROADCAST_DST`].
    pub dst_task: u8,
    /// Application-defined message kind.
    pub msg_type: u8,
    /// Opaque payload.
    pub data: i32,
}

impl Message {
    const EMPTY: Message = Message {
        src_task: 0,
        dst_task: 0,
        msg_type: 0,
        data: 0,
    };

    fn matches(&self, receiver: u8, type_filter: u8) -> bool {
        let dst_matches = self.dst_task == receiver || self.dst_task == BROADCAST_DST;
        let type_matches = type_filter == ANY_MSG_TYPE || self.msg_type == type_filter;
        dst_matches && type_matches
    }
}

/// Bounded FIFO ring of [`Message`] with unicast and broadcast delivery.
///
/// Messages addressed to the same `(dst_task, msg_type)` pair are always
/// received in send order; a broadcast entry (`dst_task == BROADCAST_DST`)
/// is held as a single slot and claimed by whichever matching `receive`
/// call scans it first, then removed — it is not fanned out to every
/// task.
pub struct MessageQueue {
    slots: [Message; QUEUE_CAPACITY],
    read_idx: usize,
    count: usize,
}

impl MessageQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            slots: [Message::EMPTY; QUEUE_CAPACITY],
            read_idx: 0,
            count: 0,
        }
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the queue holds no messages.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Enqueues a message. Fails with [`RtosError::QueueFull`] once
    /// [`QUEUE_CAPACITY`] messages are already queued.
    pub fn send(&mut self, src_task: u8, dst_task: u8, msg_type: u8, data: i32) -> RtosResult<()> {
        if self.count == QUEUE_CAPACITY {
            return Err(RtosError::QueueFull);
        }
        let write_idx = (self.read_idx + self.count) % QUEUE_CAPACITY;
        self.slots[write_idx] = Message {
            src_task,
            dst_task,
            msg_type,
            data,
        };
        self.count += 1;
        Ok(())
    }

    /// Scans from the oldest entry forward for the first message
    /// addressed to `receiver` (directly, or via broadcast) whose type
    /// matches `type_filter` (`ANY_MSG_TYPE` matches anything), removes
    /// it, and returns it. `None` if nothing matches.
    pub fn receive(&mut self, receiver: u8, type_filter: u8) -> Option<Message> {
        for offset in 0..self.count {
            let idx = (self.read_idx + offset) % QUEUE_CAPACITY;
            if self.slots[idx].matches(receiver, type_filter) {
                let message = self.slots[idx];
                self.remove_at_offset(offset);
                return Some(message);
            }
        }
        None
    }

    /// `true` if some queued message would currently satisfy a
    /// `receive(receiver, type_filter)` call. Used by the scheduler to
    /// decide whether a blocked receiver should be woken on `send`.
    pub fn has_match(&self, receiver: u8, type_filter: u8) -> bool {
        (0..self.count).any(|offset| {
            let idx = (self.read_idx + offset) % QUEUE_CAPACITY;
            self.slots[idx].matches(receiver, type_filter)
        })
    }

    /// Removes the entry at logical position `offset` from the oldest
    /// entry, shifting everything after it back by one slot so FIFO
    /// order within any `(dst, type)` pair is preserved.
    fn remove_at_offset(&mut self, offset: usize) {
        for step in offset..self.count - 1 {
            let from = (self.read_idx + step + 1) % QUEUE_CAPACITY;
            let to = (self.read_idx + step) % QUEUE_CAPACITY;
            self.slots[to] = self.slots[from];
        }
        self.count -= 1;
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_receive_round_trips() {
        let mut q = MessageQueue::new();
        q.send(1, 2, 7, 42).unwrap();
        let m = q.receive(2, 7).unwrap();
        assert_eq!(m.src_task, 1);
        assert_eq!(m.data, 42);
        assert!(q.is_empty());
    }

    #[test]
    fn fifo_order_preserved_per_dst_type() {
        let mut q = MessageQueue::new();
        q.send(0, 3, 1, 100).unwrap();
        q.send(0, 3, 1, 200).unwrap();
        q.send(0, 3, 1, 300).unwrap();
        assert_eq!(q.receive(3, 1).unwrap().data, 100);
        assert_eq!(q.receive(3, 1).unwrap().data, 200);
        assert_eq!(q.receive(3, 1).unwrap().data, 300);
    }

    #[test]
    fn type_filter_skips_non_matching_earlier_entries() {
        let mut q = MessageQueue::new();
        q.send(0, 3, 1, 100).unwrap();
        q.send(0, 3, 2, 200).unwrap();
        let m = q.receive(3, 2).unwrap();
        assert_eq!(m.data, 200);
        // the type-1 message is still queued
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn any_type_filter_matches_first_entry() {
        let mut q = MessageQueue::new();
        q.send(0, 3, 9, 5).unwrap();
        assert_eq!(q.receive(3, ANY_MSG_TYPE).unwrap().data, 5);
    }

    #[test]
    fn queue_full_rejects_further_sends() {
        let mut q = MessageQueue::new();
        for i in 0..QUEUE_CAPACITY {
            q.send(0, 1, 0, i as i32).unwrap();
        }
        assert_eq!(q.send(0, 1, 0, 999), Err(RtosError::QueueFull));
        assert_eq!(q.len(), QUEUE_CAPACITY);
    }

    #[test]
    fn broadcast_is_claimed_by_first_matching_receiver() {
        let mut q = MessageQueue::new();
        q.send(0, BROADCAST_DST, 99, 777).unwrap();
        assert!(q.has_match(3, 99));
        assert!(q.has_match(5, 99));
        let m = q.receive(3, 99).unwrap();
        assert_eq!(m.data, 777);
        // claimed: a second task no longer finds it
        assert!(!q.has_match(5, 99));
        assert_eq!(q.receive(5, 99), None);
    }

    #[test]
    fn receive_on_empty_queue_returns_none() {
        let mut q = MessageQueue::new();
        assert_eq!(q.receive(1, 0), None);
    }
}
