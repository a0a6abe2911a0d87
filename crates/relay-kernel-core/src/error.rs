//! Kernel error kinds and their status codes
//!
//! Every operation exposed to user-level code returns a discriminated status.
//! Inside the kernel that status is a `KernelError`; at the trap boundary it
//! is flattened with [`KernelError::code`], where `0` is success and each
//! failure kind has its own negative code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code reported for a successful operation.
pub const STATUS_OK: i32 = 0;

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

/// Failure kinds reported by mailbox and device operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum KernelError {
    /// Unknown, stale, or already-released mailbox or device id
    #[error("invalid handle")]
    InvalidHandle,
    /// Out-of-range unit, track, sector, size, or negative sleep duration
    #[error("invalid argument")]
    InvalidArgument,
    /// Message or line exceeds the size the other side can hold
    #[error("message too large")]
    MessageTooLarge,
    /// No free mailbox handle or slot storage
    #[error("resource exhausted")]
    ResourceExhausted,
    /// Mailbox was released before or during the call
    #[error("mailbox released")]
    MailboxReleased,
    /// A hardware step reported an error status
    #[error("device failure (status {status})")]
    DeviceFailure {
        /// Raw status reported by the device
        status: i32,
    },
    /// Blocked operation was aborted externally (shutdown)
    #[error("interrupted")]
    Interrupted,
    /// Conditional operation could not complete without blocking
    #[error("operation would block")]
    WouldBlock,
}

impl KernelError {
    /// Status code seen by user-level code.
    pub fn code(&self) -> i32 {
        match self {
            KernelError::InvalidHandle => -1,
            KernelError::InvalidArgument => -2,
            KernelError::MessageTooLarge => -3,
            KernelError::ResourceExhausted => -4,
            KernelError::MailboxReleased => -5,
            KernelError::DeviceFailure { .. } => -6,
            KernelError::Interrupted => -7,
            KernelError::WouldBlock => -8,
        }
    }

    /// Device status carried by a `DeviceFailure`, if any.
    pub fn device_status(&self) -> Option<i32> {
        match self {
            KernelError::DeviceFailure { status } => Some(*status),
            _ => None,
        }
    }
}

/// Flatten a result into the status code returned across the trap boundary.
pub fn status_of<T>(result: &KernelResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_negative() {
        let all = [
            KernelError::InvalidHandle,
            KernelError::InvalidArgument,
            KernelError::MessageTooLarge,
            KernelError::ResourceExhausted,
            KernelError::MailboxReleased,
            KernelError::DeviceFailure { status: 3 },
            KernelError::Interrupted,
            KernelError::WouldBlock,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(a.code() < STATUS_OK);
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&Ok::<u8, KernelError>(1)), STATUS_OK);
        assert_eq!(status_of::<()>(&Err(KernelError::Interrupted)), -7);
    }

    #[test]
    fn test_device_status() {
        let err = KernelError::DeviceFailure { status: 2 };
        assert_eq!(err.device_status(), Some(2));
        assert_eq!(KernelError::InvalidHandle.device_status(), None);
    }
}
