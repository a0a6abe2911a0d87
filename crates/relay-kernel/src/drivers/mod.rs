//! Device driver processes
//!
//! Each driver is an ordinary process that spends its life blocked either
//! on its request queue (a mailbox) or on the HAL's device wait. Requests
//! carry a private one-slot reply mailbox; the driver answers through it
//! with a `Completion`, which wakes exactly the requester.
//!
//! - `clock` - tick counter and sleep queue
//! - `disk` - one FIFO request queue and step sequencer per unit
//! - `terminal` - input (line discipline) and output (transmitter) per unit

pub(crate) mod clock;
pub(crate) mod disk;
pub(crate) mod terminal;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use relay_hal::{Hal, HalError};
use relay_kernel_core::{DriverState, InvariantViolation, KernelError, KernelResult, Payload};

use crate::mailbox::Mailbox;

/// Result of one device request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// `Ok` or the failure that ended the request
    pub result: KernelResult<()>,
    /// Bytes moved
    pub bytes: usize,
    /// Data read (disk reads only)
    pub data: Vec<u8>,
    /// Per-driver completion sequence number, starting at 1
    pub seq: u64,
}

impl Completion {
    pub(crate) fn failed(error: KernelError) -> Self {
        Self {
            result: Err(error),
            bytes: 0,
            data: Vec::new(),
            seq: 0,
        }
    }

    pub(crate) fn ok(bytes: usize, seq: u64) -> Self {
        Self {
            result: Ok(()),
            bytes,
            data: Vec::new(),
            seq,
        }
    }
}

impl Payload for Completion {
    fn size(&self) -> usize {
        self.data.len()
    }
}

/// Private reply mailbox carried by every request
pub(crate) type Reply = Arc<Mailbox<Completion>>;

pub(crate) fn reply_box() -> Reply {
    Arc::new(Mailbox::new(1, usize::MAX))
}

/// Deliver a completion without ever blocking the driver.
pub(crate) fn answer(reply: &Reply, completion: Completion) {
    if let Err(e) = reply.try_send(completion) {
        log::warn!("reply dropped: {}", e);
    }
}

/// Wait on a reply mailbox.
pub(crate) fn await_reply(reply: &Reply) -> Completion {
    reply.receive(usize::MAX).unwrap_or_else(Completion::failed)
}

/// HAL failures as seen by requesters
pub(crate) fn from_hal(error: HalError) -> KernelError {
    match error {
        HalError::Aborted => KernelError::Interrupted,
        _ => KernelError::DeviceFailure { status: -1 },
    }
}

/// Report a fatal driver condition on the log and the debug console.
pub(crate) fn halt<H: Hal>(hal: &H, driver: &str, violation: &InvariantViolation) {
    log::error!("{}: halted: {}", driver, violation);
    hal.debug_write(&format!("{}: halted: {}", driver, violation));
}

/// Driver state published for observers.
pub(crate) struct DriverStatus {
    name: String,
    state: AtomicU8,
}

impl DriverStatus {
    pub(crate) fn new(name: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: AtomicU8::new(DriverState::Idle as u8),
        })
    }

    pub(crate) fn get(&self) -> DriverState {
        DriverState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(DriverState::Stopped)
    }

    /// Move `from -> to` if the driver is still in `from`.
    pub(crate) fn advance(&self, from: DriverState, to: DriverState) -> bool {
        debug_assert!(from.can_transition_to(to));
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Draining` from `Idle` or `Busy`.
    pub(crate) fn begin_drain(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                match DriverState::from_u8(s) {
                    Some(DriverState::Idle) | Some(DriverState::Busy) => {
                        Some(DriverState::Draining as u8)
                    }
                    _ => None,
                }
            });
    }

    pub(crate) fn stop(&self) {
        self.state.store(DriverState::Stopped as u8, Ordering::Release);
        log::info!("{}: stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_status_transitions() {
        let s = DriverStatus::new("disk0".into());
        assert_eq!(s.get(), DriverState::Idle);
        assert!(s.advance(DriverState::Idle, DriverState::Busy));
        assert!(!s.advance(DriverState::Idle, DriverState::Busy));
        s.begin_drain();
        assert_eq!(s.get(), DriverState::Draining);
        assert!(!s.advance(DriverState::Busy, DriverState::Idle));
        s.stop();
        s.begin_drain();
        assert_eq!(s.get(), DriverState::Stopped);
    }

    #[test]
    fn test_from_hal() {
        assert_eq!(from_hal(HalError::Aborted), KernelError::Interrupted);
        assert!(matches!(
            from_hal(HalError::IoError),
            KernelError::DeviceFailure { .. }
        ));
    }

    #[test]
    fn test_reply_roundtrip() {
        let reply = reply_box();
        answer(&reply, Completion::ok(3, 1));
        let c = await_reply(&reply);
        assert_eq!(c.result, Ok(()));
        assert_eq!(c.bytes, 3);
        assert_eq!(c.seq, 1);
    }
}
