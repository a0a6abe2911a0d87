//! Per-device interrupt line
//!
//! Interrupts raised while nobody waits are latched in FIFO order. Once the
//! line is aborted, waiters first drain whatever is latched and then get
//! `HalError::Aborted`.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use relay_hal::{DeviceStatus, HalError};

#[derive(Default)]
struct LineState {
    pending: VecDeque<DeviceStatus>,
    aborted: bool,
}

/// One device's interrupt line.
#[derive(Default)]
pub(crate) struct InterruptLine {
    state: Mutex<LineState>,
    cv: Condvar,
}

impl InterruptLine {
    /// Latch an interrupt and wake one waiter.
    pub(crate) fn raise(&self, status: DeviceStatus) {
        let mut state = self.state.lock();
        state.pending.push_back(status);
        self.cv.notify_one();
    }

    /// Block until an interrupt is latched or the line is aborted.
    pub(crate) fn wait(&self) -> Result<DeviceStatus, HalError> {
        let mut state = self.state.lock();
        loop {
            if let Some(status) = state.pending.pop_front() {
                return Ok(status);
            }
            if state.aborted {
                return Err(HalError::Aborted);
            }
            self.cv.wait(&mut state);
        }
    }

    /// Abort the line, waking every waiter.
    pub(crate) fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.cv.notify_all();
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Interrupts latched but not yet consumed
    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}
