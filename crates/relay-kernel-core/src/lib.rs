//! Relay Kernel Core - Pure State Machines for the IPC and Device Layer
//!
//! This crate contains the **pure, HAL-free** state machines behind the Relay
//! kernel's mailboxes and device drivers. Nothing in here blocks, spawns, or
//! touches hardware: every operation takes the current state plus an input and
//! returns the new state together with a description of who must be woken.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    relay-kernel-core                        │
//! │                 (Pure State Machines)                       │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                   │
//! │   │ MailboxState  │    │  SleepQueue   │                   │
//! │   │  - buffered   │    │  wake-tick    │                   │
//! │   │  - senders    │    │  ordered      │                   │
//! │   │  - receivers  │    └───────────────┘                   │
//! │   └───────────────┘                                         │
//! │   ┌───────────────┐    ┌───────────────┐                   │
//! │   │ DiskTransfer  │    │LineDiscipline │                   │
//! │   │ seek/sector   │    │ char -> line  │                   │
//! │   │ step planner  │    │               │                   │
//! │   └───────────────┘    └───────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              │ used by
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      relay-kernel                           │
//! │                  (Runtime Wrapper)                          │
//! │                                                             │
//! │   - process layer, blocking and wakeup                      │
//! │   - clock, disk and terminal driver processes               │
//! │   - HAL integration                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `error` - `KernelError` and the status-code mapping
//! - `types` - Identifiers, limits, driver state enums, disk geometry
//! - `arena` - Generation-checked handle table
//! - `mailbox` - Bounded/rendezvous mailbox queue logic
//! - `sleep` - Deadline-ordered sleep queue
//! - `disk` - Disk request validation and multi-step transfer planning
//! - `terminal` - Terminal input line discipline
//! - `invariants` - Runtime-checkable invariant assertions

#![no_std]
extern crate alloc;

pub mod arena;
pub mod disk;
pub mod error;
pub mod invariants;
pub mod mailbox;
pub mod sleep;
pub mod terminal;
pub mod types;

// Re-export all public types for convenient access
pub use arena::{Handle, HandleTable};
pub use disk::{DiskCompletion, DiskOp, DiskRequest, DiskStep, DiskTransfer, StepKind};
pub use error::{status_of, KernelError, KernelResult, STATUS_OK};
pub use invariants::{assert_mailbox, check_mailbox, check_sleep_queue, InvariantViolation};
pub use mailbox::{MailboxInfo, MailboxState, Payload, Progress, Wake};
pub use sleep::{SleepEntry, SleepQueue};
pub use terminal::{LineDiscipline, LineEvent};
pub use types::{
    ClockState, DiskGeometry, DriverState, MailboxId, ProcessId, Tick, DEFAULT_MAX_LINE,
    DEFAULT_MAX_MAILBOXES, DEFAULT_MAX_PENDING_LINES, DEFAULT_MAX_SLOTS, MAX_MESSAGE_SIZE,
};
