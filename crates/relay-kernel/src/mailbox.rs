//! Blocking mailboxes and the mailbox handle table
//!
//! `Mailbox<M>` wraps the pure `MailboxState` from `relay-kernel-core` in a
//! lock. A caller that has to wait parks on its own `Parker`; whoever
//! completes the operation later (a receiver, a sender, or a release)
//! unparks it with the outcome. Parking is the only suspension point.
//!
//! `MailboxTable` is the user-visible registry: generation-checked handles,
//! a live-mailbox limit and a total buffered-slot budget.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use relay_kernel_core::{
    HandleTable, KernelError, KernelResult, MailboxId, MailboxInfo, MailboxState, Payload,
    Progress, Wake,
};

// ============================================================================
// Parker
// ============================================================================

/// Outcome delivered to a parked party
enum Wakeup<M> {
    Delivered(M),
    Sent,
    Failed(KernelError),
}

/// One-shot wakeup slot for a blocked caller
struct Parker<M> {
    slot: Mutex<Option<Wakeup<M>>>,
    cv: Condvar,
}

impl<M> Parker<M> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        })
    }

    fn unpark(&self, wakeup: Wakeup<M>) {
        let mut slot = self.slot.lock();
        *slot = Some(wakeup);
        self.cv.notify_one();
    }

    fn park(&self) -> Wakeup<M> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(wakeup) = slot.take() {
                return wakeup;
            }
            self.cv.wait(&mut slot);
        }
    }
}

type Waiter<M> = Arc<Parker<M>>;

fn dispatch<M>(wakes: Vec<Wake<M, Waiter<M>>>) {
    for wake in wakes {
        match wake {
            Wake::Deliver { waiter, message } => waiter.unpark(Wakeup::Delivered(message)),
            Wake::Sent { waiter } => waiter.unpark(Wakeup::Sent),
            Wake::Fail { waiter, error } => waiter.unpark(Wakeup::Failed(error)),
        }
    }
}

// ============================================================================
// Mailbox
// ============================================================================

/// Bounded (or rendezvous) blocking mailbox.
pub struct Mailbox<M> {
    state: Mutex<MailboxState<M, Waiter<M>>>,
}

impl<M: Payload> Mailbox<M> {
    /// Create a mailbox with `slots` buffer slots (0 = rendezvous).
    pub fn new(slots: usize, max_size: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState::new(slots, max_size)),
        }
    }

    /// Buffer capacity
    pub fn slots(&self) -> usize {
        self.state.lock().slots()
    }

    /// Send, blocking until the message is buffered or taken.
    pub fn send(&self, message: M) -> KernelResult<()> {
        let parker = Parker::new();
        let (result, wakes) = self.state.lock().send(message, Arc::clone(&parker));
        dispatch(wakes);

        match result? {
            Progress::Complete(()) => Ok(()),
            Progress::Blocked => match parker.park() {
                Wakeup::Sent => Ok(()),
                Wakeup::Failed(e) => Err(e),
                Wakeup::Delivered(_) => Err(KernelError::Interrupted),
            },
        }
    }

    /// Receive a message of at most `capacity` bytes, blocking until one
    /// is available.
    pub fn receive(&self, capacity: usize) -> KernelResult<M> {
        let parker = Parker::new();
        let (result, wakes) = self.state.lock().receive(capacity, Arc::clone(&parker));
        dispatch(wakes);

        match result? {
            Progress::Complete(message) => Ok(message),
            Progress::Blocked => match parker.park() {
                Wakeup::Delivered(message) => Ok(message),
                Wakeup::Failed(e) => Err(e),
                Wakeup::Sent => Err(KernelError::Interrupted),
            },
        }
    }

    /// Send without blocking; `WouldBlock` if nobody can take the message.
    pub fn try_send(&self, message: M) -> KernelResult<()> {
        let (result, wakes) = self.state.lock().try_send(message);
        dispatch(wakes);
        result.map_err(|(e, _)| e)
    }

    /// Receive without blocking; `WouldBlock` if nothing is pending.
    pub fn try_receive(&self, capacity: usize) -> KernelResult<M> {
        let (result, wakes) = self.state.lock().try_receive(capacity);
        dispatch(wakes);
        result
    }

    /// Release: every blocked party fails with `MailboxReleased`.
    ///
    /// Returns the messages that were still buffered.
    pub fn release(&self) -> Vec<M> {
        self.close(KernelError::MailboxReleased)
    }

    /// Close: every blocked party fails with `error`.
    ///
    /// Returns the messages that were still buffered.
    pub fn close(&self, error: KernelError) -> Vec<M> {
        let (wakes, leftover) = self.state.lock().close(error);
        dispatch(wakes);
        leftover
    }

    /// Diagnostic snapshot
    pub fn info(&self) -> MailboxInfo {
        self.state.lock().info()
    }
}

// ============================================================================
// MailboxTable
// ============================================================================

/// User-visible mailbox payload
pub type UserMailbox = Mailbox<Vec<u8>>;

struct TableInner {
    boxes: HandleTable<Arc<UserMailbox>>,
    slots_in_use: usize,
}

/// Registry of user mailboxes.
pub struct MailboxTable {
    inner: Mutex<TableInner>,
    max_slots: usize,
    max_message_size: usize,
}

impl MailboxTable {
    /// Table for at most `max_mailboxes` live mailboxes sharing a budget of
    /// `max_slots` buffered slots.
    pub fn new(max_mailboxes: usize, max_slots: usize, max_message_size: usize) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                boxes: HandleTable::new(max_mailboxes),
                slots_in_use: 0,
            }),
            max_slots,
            max_message_size,
        }
    }

    /// Create a mailbox.
    ///
    /// Fails with `InvalidArgument` if `max_size` exceeds the system maximum,
    /// or `ResourceExhausted` if the table or slot budget is used up.
    pub fn create(&self, slots: usize, max_size: usize) -> KernelResult<MailboxId> {
        if max_size > self.max_message_size {
            return Err(KernelError::InvalidArgument);
        }

        let mut inner = self.inner.lock();
        let reserved = inner
            .slots_in_use
            .checked_add(slots)
            .filter(|&n| n <= self.max_slots)
            .ok_or(KernelError::ResourceExhausted)?;
        let handle = inner.boxes.insert(Arc::new(Mailbox::new(slots, max_size)))?;
        inner.slots_in_use = reserved;

        Ok(MailboxId(handle))
    }

    /// Resolve a handle.
    pub fn get(&self, id: MailboxId) -> KernelResult<Arc<UserMailbox>> {
        self.inner
            .lock()
            .boxes
            .get(id.0)
            .cloned()
            .ok_or(KernelError::InvalidHandle)
    }

    /// Release a mailbox, failing every blocked party with `MailboxReleased`.
    ///
    /// The handle is invalid from here on; a second release fails with
    /// `InvalidHandle`.
    pub fn release(&self, id: MailboxId) -> KernelResult<()> {
        let mailbox = {
            let mut inner = self.inner.lock();
            let mailbox = inner.boxes.remove(id.0).ok_or(KernelError::InvalidHandle)?;
            inner.slots_in_use -= mailbox.slots();
            mailbox
        };
        let dropped = mailbox.release();
        log::debug!(
            "mailbox {:#x} released ({} buffered messages dropped)",
            id.to_raw(),
            dropped.len()
        );
        Ok(())
    }

    /// Fail every blocked party on every live mailbox with `error` and
    /// empty the table.
    pub fn close_all(&self, error: KernelError) {
        let boxes: Vec<_> = {
            let mut inner = self.inner.lock();
            let handles: Vec<_> = inner.boxes.iter().map(|(h, _)| h).collect();
            inner.slots_in_use = 0;
            handles
                .into_iter()
                .filter_map(|h| inner.boxes.remove(h))
                .collect()
        };
        for mailbox in boxes {
            mailbox.close(error);
        }
    }

    /// Number of live mailboxes
    pub fn len(&self) -> usize {
        self.inner.lock().boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered slots currently reserved
    pub fn slots_in_use(&self) -> usize {
        self.inner.lock().slots_in_use
    }
}
