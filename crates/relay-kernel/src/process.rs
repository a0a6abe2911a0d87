//! Process layer
//!
//! Host rendition of the primitives the drivers are built on:
//! - `spawn()` - create a named process with a stack size and priority
//! - `ProcessHandle::join()` - wait for a process and collect its exit status
//! - `Semaphore` - counting semaphore used for startup handshakes
//!
//! Processes are OS threads. Priority is recorded for diagnostics only; no
//! scheduling policy is applied. Masking interrupts around a shared queue is
//! rendered as holding that queue's lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use relay_kernel_core::{KernelError, KernelResult, ProcessId};

/// Exit status of a process that panicked
pub const EXIT_PANIC: i32 = -1;

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

/// Handle to a spawned process
pub struct ProcessHandle {
    pid: ProcessId,
    name: String,
    priority: u8,
    handle: JoinHandle<i32>,
}

impl ProcessHandle {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Wait for the process to exit and return its status.
    pub fn join(self) -> i32 {
        match self.handle.join() {
            Ok(status) => status,
            Err(_) => {
                log::error!("process {} ({}) panicked", self.name, self.pid.0);
                EXIT_PANIC
            }
        }
    }
}

/// Create a process running `entry`.
///
/// Fails with `ResourceExhausted` if the host refuses to create the thread.
pub fn spawn<F>(name: &str, stack_size: usize, priority: u8, entry: F) -> KernelResult<ProcessHandle>
where
    F: FnOnce() -> i32 + Send + 'static,
{
    let pid = ProcessId(NEXT_PID.fetch_add(1, Ordering::Relaxed));

    let handle = thread::Builder::new()
        .name(name.to_string())
        .stack_size(stack_size)
        .spawn(entry)
        .map_err(|e| {
            log::error!("spawn {} failed: {}", name, e);
            KernelError::ResourceExhausted
        })?;

    log::debug!("spawned {} (pid {}, priority {})", name, pid.0, priority);

    Ok(ProcessHandle {
        pid,
        name: name.to_string(),
        priority,
        handle,
    })
}

/// Counting semaphore
pub struct Semaphore {
    count: Mutex<u32>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    /// Wait until the count is positive, then decrement it.
    pub fn p(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cv.wait(&mut count);
        }
        *count -= 1;
    }

    /// Increment the count and wake one waiter.
    pub fn v(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cv.notify_one();
    }

    /// Current count
    pub fn value(&self) -> u32 {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_spawn_and_join_status() {
        let p = spawn("worker", 64 * 1024, 3, || 42).unwrap();
        assert_eq!(p.name(), "worker");
        assert_eq!(p.priority(), 3);
        assert_eq!(p.join(), 42);
    }

    #[test]
    fn test_pids_are_unique() {
        let a = spawn("a", 64 * 1024, 1, || 0).unwrap();
        let b = spawn("b", 64 * 1024, 1, || 0).unwrap();
        assert_ne!(a.pid(), b.pid());
        a.join();
        b.join();
    }

    #[test]
    fn test_panicking_process_reports_panic_status() {
        let p = spawn("boom", 64 * 1024, 1, || panic!("boom")).unwrap();
        assert_eq!(p.join(), EXIT_PANIC);
    }

    #[test]
    fn test_semaphore_handshake() {
        let ready = Arc::new(Semaphore::new(0));
        let p = {
            let ready = Arc::clone(&ready);
            spawn("driver", 64 * 1024, 2, move || {
                ready.v();
                0
            })
            .unwrap()
        };
        ready.p();
        assert_eq!(ready.value(), 0);
        assert_eq!(p.join(), 0);
    }
}
