//! Mailbox queue logic
//!
//! `MailboxState` is the pure heart of a mailbox: the buffered-message FIFO,
//! the FIFO of blocked senders (each still holding its message) and the FIFO
//! of blocked receivers (each with the capacity of its receive buffer).
//!
//! Operations never block. They either complete, or enqueue the caller's
//! waiter token and report `Progress::Blocked`; in both cases they also
//! return the list of *other* waiters whose operation finished as a side
//! effect. The runtime turns those `Wake`s into actual wakeups.
//!
//! Waiter tokens (`W`) are opaque to this module.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Anything that can travel through a mailbox.
pub trait Payload {
    /// Size in bytes counted against the mailbox's maximum message size
    fn size(&self) -> usize;
}

impl Payload for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }
}

/// Outcome for the calling party
#[derive(Debug, PartialEq, Eq)]
pub enum Progress<T> {
    /// Operation finished without suspending
    Complete(T),
    /// Caller's waiter token was queued; it will appear in a later `Wake`
    Blocked,
}

/// Completion of a previously blocked party
#[derive(Debug, PartialEq, Eq)]
pub enum Wake<M, W> {
    /// A blocked receiver gets its message
    Deliver { waiter: W, message: M },
    /// A blocked sender's message was taken
    Sent { waiter: W },
    /// A blocked party fails
    Fail { waiter: W, error: KernelError },
}

/// Snapshot of a mailbox for diagnostics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxInfo {
    /// Buffer capacity (0 = rendezvous)
    pub slots: usize,
    /// Maximum message size in bytes
    pub max_size: usize,
    /// Messages currently buffered
    pub buffered: usize,
    /// Senders currently blocked
    pub blocked_senders: usize,
    /// Receivers currently blocked
    pub blocked_receivers: usize,
    /// Total messages handed to receivers
    pub delivered: u64,
    /// High water mark of `buffered`
    pub high_water: usize,
    /// Whether the mailbox has been released
    pub released: bool,
}

/// Pure mailbox state.
pub struct MailboxState<M, W> {
    slots: usize,
    max_size: usize,
    buffered: VecDeque<M>,
    senders: VecDeque<(W, M)>,
    receivers: VecDeque<(W, usize)>,
    released: bool,
    delivered: u64,
    high_water: usize,
}

type Step<T, M, W> = (Result<Progress<T>, KernelError>, Vec<Wake<M, W>>);

impl<M: Payload, W> MailboxState<M, W> {
    /// Create a mailbox with `slots` buffer slots and a `max_size` byte limit.
    pub fn new(slots: usize, max_size: usize) -> Self {
        Self {
            slots,
            max_size,
            buffered: VecDeque::with_capacity(slots),
            senders: VecDeque::new(),
            receivers: VecDeque::new(),
            released: false,
            delivered: 0,
            high_water: 0,
        }
    }

    /// Buffer capacity
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Maximum message size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether `release` has run
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Number of buffered messages
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Number of blocked senders
    pub fn blocked_senders(&self) -> usize {
        self.senders.len()
    }

    /// Number of blocked receivers
    pub fn blocked_receivers(&self) -> usize {
        self.receivers.len()
    }

    /// Diagnostic snapshot
    pub fn info(&self) -> MailboxInfo {
        MailboxInfo {
            slots: self.slots,
            max_size: self.max_size,
            buffered: self.buffered.len(),
            blocked_senders: self.senders.len(),
            blocked_receivers: self.receivers.len(),
            delivered: self.delivered,
            high_water: self.high_water,
            released: self.released,
        }
    }

    // ========================================================================
    // Send
    // ========================================================================

    /// Send, queueing `waiter` as a blocked sender if nobody can take the
    /// message right now.
    pub fn send(&mut self, message: M, waiter: W) -> Step<(), M, W> {
        let mut wakes = Vec::new();
        match self.offer(message, &mut wakes) {
            Ok(None) => (Ok(Progress::Complete(())), wakes),
            Ok(Some(message)) => {
                self.senders.push_back((waiter, message));
                (Ok(Progress::Blocked), wakes)
            }
            Err(e) => (Err(e), wakes),
        }
    }

    /// Conditional send: fails with `WouldBlock` instead of queueing.
    ///
    /// On `WouldBlock` the mailbox is unchanged and the message is handed
    /// back to the caller.
    pub fn try_send(&mut self, message: M) -> (Result<(), (KernelError, Option<M>)>, Vec<Wake<M, W>>) {
        let mut wakes = Vec::new();
        match self.offer(message, &mut wakes) {
            Ok(None) => (Ok(()), wakes),
            Ok(Some(message)) => (Err((KernelError::WouldBlock, Some(message))), wakes),
            Err(e) => (Err((e, None)), wakes),
        }
    }

    /// Hand `message` to the first fitting blocked receiver or into a free
    /// slot. Returns the message back if neither is available.
    fn offer(&mut self, message: M, wakes: &mut Vec<Wake<M, W>>) -> Result<Option<M>, KernelError> {
        if self.released {
            return Err(KernelError::MailboxReleased);
        }
        if message.size() > self.max_size {
            return Err(KernelError::MessageTooLarge);
        }

        // Receivers whose buffer is too small fail; the message stays pending
        while let Some((waiter, capacity)) = self.receivers.pop_front() {
            if message.size() > capacity {
                wakes.push(Wake::Fail {
                    waiter,
                    error: KernelError::MessageTooLarge,
                });
                continue;
            }
            self.delivered += 1;
            wakes.push(Wake::Deliver { waiter, message });
            return Ok(None);
        }

        if self.buffered.len() < self.slots {
            self.buffered.push_back(message);
            self.high_water = self.high_water.max(self.buffered.len());
            return Ok(None);
        }

        Ok(Some(message))
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// Receive into a buffer of `capacity` bytes, queueing `waiter` as a
    /// blocked receiver if nothing is available.
    pub fn receive(&mut self, capacity: usize, waiter: W) -> Step<M, M, W> {
        let mut wakes = Vec::new();
        match self.take(capacity, &mut wakes) {
            Ok(Some(message)) => (Ok(Progress::Complete(message)), wakes),
            Ok(None) => {
                self.receivers.push_back((waiter, capacity));
                (Ok(Progress::Blocked), wakes)
            }
            Err(e) => (Err(e), wakes),
        }
    }

    /// Conditional receive: fails with `WouldBlock` instead of queueing.
    pub fn try_receive(&mut self, capacity: usize) -> (Result<M, KernelError>, Vec<Wake<M, W>>) {
        let mut wakes = Vec::new();
        match self.take(capacity, &mut wakes) {
            Ok(Some(message)) => (Ok(message), wakes),
            Ok(None) => (Err(KernelError::WouldBlock), wakes),
            Err(e) => (Err(e), wakes),
        }
    }

    /// Take the oldest pending message, buffered first, then from the
    /// first blocked sender. A message larger than `capacity` is left in
    /// place.
    fn take(&mut self, capacity: usize, wakes: &mut Vec<Wake<M, W>>) -> Result<Option<M>, KernelError> {
        if self.released {
            return Err(KernelError::MailboxReleased);
        }

        if let Some(front) = self.buffered.front() {
            if front.size() > capacity {
                return Err(KernelError::MessageTooLarge);
            }
            let message = self.buffered.pop_front();

            // A freed slot goes to the longest-waiting sender
            if let Some((waiter, pending)) = self.senders.pop_front() {
                self.buffered.push_back(pending);
                wakes.push(Wake::Sent { waiter });
            }
            self.delivered += 1;
            return Ok(message);
        }

        if let Some((_, pending)) = self.senders.front() {
            if pending.size() > capacity {
                return Err(KernelError::MessageTooLarge);
            }
            if let Some((waiter, message)) = self.senders.pop_front() {
                wakes.push(Wake::Sent { waiter });
                self.delivered += 1;
                return Ok(Some(message));
            }
        }

        Ok(None)
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Mark released and fail every blocked party with `MailboxReleased`.
    ///
    /// Returns the wakes plus any messages that were still buffered, so
    /// the owner can dispose of them.
    pub fn release(&mut self) -> (Vec<Wake<M, W>>, Vec<M>) {
        self.close(KernelError::MailboxReleased)
    }

    /// Like `release`, but blocked parties fail with `error`.
    pub fn close(&mut self, error: KernelError) -> (Vec<Wake<M, W>>, Vec<M>) {
        self.released = true;

        let mut wakes = Vec::with_capacity(self.senders.len() + self.receivers.len());
        for (waiter, _) in self.senders.drain(..) {
            wakes.push(Wake::Fail { waiter, error });
        }
        for (waiter, _) in self.receivers.drain(..) {
            wakes.push(Wake::Fail { waiter, error });
        }

        let leftover = self.buffered.drain(..).collect();
        (wakes, leftover)
    }
}
