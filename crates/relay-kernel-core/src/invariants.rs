//! Runtime-checkable invariants
//!
//! Used for assertion checking in tests and property-based testing, and by
//! the disk transfer planner to report fatal driver conditions.
//!
//! # Invariants
//!
//! 1. **Mailbox Capacity**: buffered messages never exceed the slot count
//! 2. **Mailbox Waiters**: receivers only wait when nothing is pending;
//!    senders only wait when every slot is taken
//! 3. **Mailbox Release**: a released mailbox holds no waiters and no messages
//! 4. **Sleep Order**: the sleep queue is sorted by `(wake_at, seq)`

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::mailbox::{MailboxState, Payload};
use crate::sleep::SleepQueue;

/// An invariant violation with details
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

impl InvariantViolation {
    pub fn new(invariant: &'static str, description: String) -> Self {
        Self {
            invariant,
            description,
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.description)
    }
}

/// Check invariants 1-3 for one mailbox.
pub fn check_mailbox<M: Payload, W>(mailbox: &MailboxState<M, W>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let buffered = mailbox.buffered_len();
    let senders = mailbox.blocked_senders();
    let receivers = mailbox.blocked_receivers();

    if buffered > mailbox.slots() {
        violations.push(InvariantViolation::new(
            "mailbox_capacity",
            alloc::format!("{} messages buffered in {} slots", buffered, mailbox.slots()),
        ));
    }

    if receivers > 0 && (buffered > 0 || senders > 0) {
        violations.push(InvariantViolation::new(
            "mailbox_waiters",
            alloc::format!(
                "{} receivers waiting while {} buffered and {} senders blocked",
                receivers,
                buffered,
                senders
            ),
        ));
    }

    if senders > 0 && buffered < mailbox.slots() {
        violations.push(InvariantViolation::new(
            "mailbox_waiters",
            alloc::format!(
                "{} senders blocked with {} of {} slots free",
                senders,
                mailbox.slots() - buffered,
                mailbox.slots()
            ),
        ));
    }

    if mailbox.is_released() && (buffered + senders + receivers) > 0 {
        violations.push(InvariantViolation::new(
            "mailbox_release",
            alloc::format!(
                "released mailbox still holds {} messages and {} waiters",
                buffered,
                senders + receivers
            ),
        ));
    }

    violations
}

/// Check invariant 4.
pub fn check_sleep_queue<W>(queue: &SleepQueue<W>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for pair in queue.entries().windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if (a.wake_at, a.seq) > (b.wake_at, b.seq) {
            violations.push(InvariantViolation::new(
                "sleep_order",
                alloc::format!(
                    "entry (tick {}, seq {}) queued before (tick {}, seq {})",
                    a.wake_at,
                    a.seq,
                    b.wake_at,
                    b.seq
                ),
            ));
        }
    }

    violations
}

/// Assert a mailbox is consistent (panic if not)
pub fn assert_mailbox<M: Payload, W>(mailbox: &MailboxState<M, W>) {
    if let Some(v) = check_mailbox(mailbox).first() {
        panic!("Invariant violated: {}", v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    type Mb = MailboxState<Vec<u8>, u32>;

    #[test]
    fn test_invariants_hold_for_new_mailbox() {
        assert!(check_mailbox(&Mb::new(3, 8)).is_empty());
        assert!(check_mailbox(&Mb::new(0, 8)).is_empty());
    }

    #[test]
    fn test_invariants_hold_through_traffic() {
        let mut mb = Mb::new(2, 8);
        mb.receive(8, 1);
        assert!(check_mailbox(&mb).is_empty());
        mb.send(vec![1], 2);
        mb.send(vec![2], 3);
        mb.send(vec![3], 4);
        mb.send(vec![4], 5);
        assert_eq!(mb.blocked_senders(), 1);
        assert!(check_mailbox(&mb).is_empty());
        mb.receive(8, 6);
        assert!(check_mailbox(&mb).is_empty());
        mb.release();
        assert!(check_mailbox(&mb).is_empty());
    }

    #[test]
    fn test_invariants_hold_for_rendezvous() {
        let mut mb = Mb::new(0, 8);
        mb.send(vec![1], 1);
        mb.send(vec![2], 2);
        assert!(check_mailbox(&mb).is_empty());
        mb.receive(8, 3);
        mb.receive(8, 4);
        mb.receive(8, 5);
        assert_eq!(mb.blocked_receivers(), 1);
        assert!(check_mailbox(&mb).is_empty());
    }

    #[test]
    fn test_sleep_queue_sorted() {
        let mut q = SleepQueue::new();
        for t in [9, 1, 5, 1, 3] {
            q.insert(t, ());
        }
        assert!(check_sleep_queue(&q).is_empty());
    }

    #[test]
    fn test_violation_display() {
        let v = InvariantViolation::new("sleep_order", alloc::string::String::from("bad"));
        assert_eq!(alloc::format!("{}", v), "sleep_order: bad");
    }
}
