//! Clock driver
//!
//! Waits for clock interrupts, advances the tick counter and releases every
//! sleeper whose deadline has arrived. The tick counter and the sleep queue
//! change together under one lock, so a sleeper can never register against
//! a tick that has already been processed.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relay_hal::{Device, DeviceStatus, Hal, HalError};
use relay_kernel_core::{ClockState, KernelError, KernelResult, SleepQueue, Tick};

use super::{answer, await_reply, reply_box, Completion, Reply};
use crate::process::Semaphore;

struct Sleepers {
    now: Tick,
    queue: SleepQueue<Reply>,
    closed: bool,
}

/// State shared between the clock driver and sleepers
pub(crate) struct ClockShared {
    sleepers: Mutex<Sleepers>,
    state: AtomicU8,
}

impl ClockShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sleepers: Mutex::new(Sleepers {
                now: 0,
                queue: SleepQueue::new(),
                closed: false,
            }),
            state: AtomicU8::new(ClockState::Starting as u8),
        })
    }

    pub(crate) fn now(&self) -> Tick {
        self.sleepers.lock().now
    }

    pub(crate) fn sleeper_count(&self) -> usize {
        self.sleepers.lock().queue.len()
    }

    pub(crate) fn state(&self) -> ClockState {
        ClockState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ClockState::Stopped)
    }

    fn set_state(&self, state: ClockState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Block the caller for `ticks` clock ticks.
    pub(crate) fn sleep(&self, ticks: i64) -> KernelResult<()> {
        if ticks < 0 {
            return Err(KernelError::InvalidArgument);
        }
        if ticks == 0 {
            return Ok(());
        }

        let reply = reply_box();
        {
            let mut sleepers = self.sleepers.lock();
            if sleepers.closed {
                return Err(KernelError::Interrupted);
            }
            let wake_at = sleepers.now.saturating_add(ticks as Tick);
            sleepers.queue.insert(wake_at, Arc::clone(&reply));
        }
        await_reply(&reply).result
    }

    /// Advance one tick and wake everyone now due.
    fn tick(&self) {
        let (now, due) = {
            let mut sleepers = self.sleepers.lock();
            sleepers.now += 1;
            let now = sleepers.now;
            (now, sleepers.queue.pop_due(now))
        };
        if !due.is_empty() {
            log::debug!("clock: tick {} wakes {}", now, due.len());
        }
        for reply in due {
            answer(&reply, Completion::ok(0, now));
        }
    }

    /// Refuse new sleepers and fail the ones still queued.
    fn close(&self) {
        let rest = {
            let mut sleepers = self.sleepers.lock();
            sleepers.closed = true;
            sleepers.queue.drain_all()
        };
        if !rest.is_empty() {
            log::info!("clock: interrupting {} sleepers", rest.len());
        }
        for reply in rest {
            answer(&reply, Completion::failed(KernelError::Interrupted));
        }
    }
}

/// Clock driver process body.
pub(crate) fn run<H: Hal>(hal: Arc<H>, shared: Arc<ClockShared>, ready: Arc<Semaphore>) -> i32 {
    shared.set_state(ClockState::Running);
    ready.v();
    log::info!("clock: running");

    let status = loop {
        match hal.wait_device(Device::Clock) {
            Ok(DeviceStatus::Clock) => shared.tick(),
            Ok(other) => log::warn!("clock: ignoring unexpected status {:?}", other),
            Err(HalError::Aborted) => break 0,
            Err(e) => {
                log::error!("clock: device wait failed: {}", e);
                break -1;
            }
        }
    };

    shared.set_state(ClockState::Stopping);
    shared.close();
    shared.set_state(ClockState::Stopped);
    log::info!("clock: stopped at tick {}", shared.now());
    status
}
