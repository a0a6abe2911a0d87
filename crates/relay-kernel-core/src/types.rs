//! Core kernel types
//!
//! This module contains the fundamental types used throughout the kernel core.
//! All types here are pure data - no behavior that depends on HAL.

use serde::{Deserialize, Serialize};

use crate::arena::Handle;

/// Hard ceiling on the message size any mailbox may be created with
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Default maximum number of live user mailboxes
pub const DEFAULT_MAX_MAILBOXES: usize = 2000;

/// Default total number of buffered slots across all live user mailboxes
pub const DEFAULT_MAX_SLOTS: usize = 2500;

/// Default maximum terminal line length (bytes, newline included)
pub const DEFAULT_MAX_LINE: usize = 80;

/// Default number of completed terminal lines held while no reader waits
pub const DEFAULT_MAX_PENDING_LINES: usize = 10;

/// Kernel time in clock ticks since boot
pub type Tick = u64;

/// Process identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

/// User-visible mailbox handle.
///
/// Wraps a generation-checked arena handle so a released and reused slot is
/// never mistaken for the mailbox that used to live there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxId(pub Handle);

impl MailboxId {
    /// Integer form passed across the trap boundary
    pub fn to_raw(self) -> u64 {
        self.0.to_raw()
    }

    /// Rebuild a handle from its integer form
    pub fn from_raw(raw: u64) -> Self {
        Self(Handle::from_raw(raw))
    }
}

/// Per-device driver state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DriverState {
    /// No outstanding hardware operation
    Idle = 0,
    /// Hardware operation in flight for the current request
    Busy = 1,
    /// Shutdown requested; finishing the current request
    Draining = 2,
    /// Driver process has terminated
    Stopped = 3,
}

impl DriverState {
    /// Decode from the byte representation
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::Busy),
            2 => Some(Self::Draining),
            3 => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Whether the transition `self -> next` is allowed
    pub fn can_transition_to(self, next: DriverState) -> bool {
        use DriverState::*;
        matches!(
            (self, next),
            (Idle, Busy)
                | (Busy, Idle)
                | (Idle, Draining)
                | (Busy, Draining)
                | (Draining, Stopped)
                | (Idle, Stopped)
                | (Busy, Stopped)
        )
    }
}

/// Clock driver lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClockState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ClockState {
    /// Decode from the byte representation
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Starting),
            1 => Some(Self::Running),
            2 => Some(Self::Stopping),
            3 => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// Disk geometry as reported by the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    /// Bytes per sector
    pub sector_size: usize,
    /// Sectors on each track
    pub sectors_per_track: usize,
    /// Number of tracks on the unit
    pub track_count: usize,
}

impl DiskGeometry {
    /// Total addressable sectors
    pub fn total_sectors(&self) -> usize {
        self.sectors_per_track * self.track_count
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.total_sectors() * self.sector_size
    }

    /// Split a linear sector number into (track, sector)
    pub fn locate(&self, linear: usize) -> (usize, usize) {
        (linear / self.sectors_per_track, linear % self.sectors_per_track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_state_roundtrip_byte() {
        for s in [
            DriverState::Idle,
            DriverState::Busy,
            DriverState::Draining,
            DriverState::Stopped,
        ] {
            assert_eq!(DriverState::from_u8(s as u8), Some(s));
        }
        assert_eq!(DriverState::from_u8(9), None);
    }

    #[test]
    fn test_driver_state_transitions() {
        assert!(DriverState::Idle.can_transition_to(DriverState::Busy));
        assert!(DriverState::Busy.can_transition_to(DriverState::Draining));
        assert!(DriverState::Draining.can_transition_to(DriverState::Stopped));
        assert!(!DriverState::Stopped.can_transition_to(DriverState::Idle));
        assert!(!DriverState::Draining.can_transition_to(DriverState::Busy));
    }

    #[test]
    fn test_geometry_locate() {
        let g = DiskGeometry {
            sector_size: 512,
            sectors_per_track: 4,
            track_count: 2,
        };
        assert_eq!(g.total_sectors(), 8);
        assert_eq!(g.capacity(), 4096);
        assert_eq!(g.locate(7), (1, 3));
        assert_eq!(g.locate(4), (1, 0));
    }
}
