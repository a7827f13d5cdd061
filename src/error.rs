//! Error taxonomy shared by the scheduler, message queue, and RTOS VM.

use core::fmt;

/// Failure modes returned by the public RTOS operations.
///
/// There is no `Ok` variant here: success is represented by
/// [`Result::Ok`] in [`RtosResult`], per the usual Rust convention
/// rather than a literal zero-valued success variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtosError {
    /// An argument was out of range or otherwise malformed: a zero or
    /// oversized stack request, an unregistered word index, an
    /// out-of-range task id, or a `critical_exit` with no matching
    /// `critical_enter`.
    InvalidArg,
    /// No free task slot or no free buffer memory was available.
    ResourceExhausted,
    /// A `send` found the message queue already at capacity.
    QueueFull,
    /// A non-blocking `receive` found no matching message.
    NotFound,
    /// A blocking `receive` reached its deadline with no match.
    Timeout,
    /// A `critical_exit` was attempted while nesting was already zero.
    Underflow,
}

impl fmt::Display for RtosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => f.write_str("invalid argument"),
            Self::ResourceExhausted => f.write_str("no free task slot or buffer"),
            Self::QueueFull => f.write_str("message queue is full"),
            Self::NotFound => f.write_str("no matching message available"),
            Self::Timeout => f.write_str("receive timed out waiting for a message"),
            Self::Underflow => f.write_str("critical section exit without matching enter"),
        }
    }
}

/// Crate-wide result alias for fallible RTOS operations.
pub type RtosResult<T> = Result<T, RtosError>;
