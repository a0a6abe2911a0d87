//! Relay Kernel Runtime
//!
//! This crate turns the pure state machines of `relay-kernel-core` into a
//! running kernel on top of any `Hal`:
//! - Process layer (processes, semaphores)
//! - Blocking mailboxes and the mailbox handle table
//! - Clock, disk and terminal driver processes
//! - The `Kernel` facade with startup, shutdown and every user operation
//!
//! Every operation returns `KernelResult`; `status_of` flattens a result into
//! the status code seen across the trap boundary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_hal_sim::SimHal;
//! use relay_kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::start(Arc::new(SimHal::default()), KernelConfig::default()).unwrap();
//! kernel.disk_write(0, 0, 0, 1, &[7u8; 512]).unwrap();
//! assert_eq!(kernel.disk_read(0, 0, 0, 1).unwrap(), vec![7u8; 512]);
//! kernel.shutdown();
//! ```

mod config;
mod drivers;
mod kernel;
mod mailbox;
mod process;

pub use config::{ConfigError, KernelConfig};
pub use drivers::Completion;
pub use kernel::{DriverExit, DriverId, Kernel, PendingIo};
pub use mailbox::{Mailbox, MailboxTable};
pub use process::{spawn, ProcessHandle, Semaphore, EXIT_PANIC};

// Re-export core types
pub use relay_kernel_core::{
    status_of, ClockState, DiskGeometry, DriverState, KernelError, KernelResult, MailboxId,
    MailboxInfo, Tick, STATUS_OK,
};

// Re-export HAL types
pub use relay_hal::{Device, Hal, HalError};
