//! Hardware Abstraction Layer trait for the Relay kernel
//!
//! This crate defines the `Hal` trait the kernel's driver processes are
//! written against. A HAL exposes three device classes:
//!
//! - **Clock**: one periodic tick interrupt
//! - **Disk units**: a controller that accepts one step at a time (seek,
//!   read sector, write sector) and interrupts when the step completes
//! - **Terminal units**: one interrupt per received character and per
//!   "transmit ready" condition
//!
//! # Platform Implementations
//!
//! - **Host simulation**: `relay-hal-sim`, in-memory devices driven by
//!   threads, with fault injection for tests

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

/// Hardware Abstraction Layer trait
///
/// Implementations provide:
/// - Blocking per-device interrupt waits
/// - Device control-register writes
/// - Disk geometry queries
/// - Time measurement
/// - Debug output
pub trait Hal: Send + Sync + 'static {
    // === Interrupts ===

    /// Block until `device` raises its next interrupt.
    ///
    /// Interrupts raised while nobody waits are kept and returned in order.
    ///
    /// # Returns
    /// * `Ok(DeviceStatus)` - Status latched by the interrupt
    /// * `Err(HalError::Aborted)` - `abort_device` was called and no
    ///   interrupt is pending
    /// * `Err(HalError::NoSuchDevice)` - Unit does not exist
    fn wait_device(&self, device: Device) -> Result<DeviceStatus, HalError>;

    /// Abort `device`: every current and future `wait_device` on it returns
    /// `HalError::Aborted` once pending interrupts are consumed.
    fn abort_device(&self, device: Device);

    // === Control registers ===

    /// Start a device operation.
    ///
    /// Completion is reported through a later interrupt on the same device.
    ///
    /// # Returns
    /// * `Err(HalError::InvalidArgument)` - Command does not fit the device
    /// * `Err(HalError::NoSuchDevice)` - Unit does not exist
    fn device_output(&self, device: Device, command: DeviceCommand) -> Result<(), HalError>;

    // === Geometry ===

    /// Number of disk units
    fn disk_units(&self) -> u32;

    /// Number of terminal units
    fn terminal_units(&self) -> u32;

    /// Geometry of a disk unit
    fn disk_info(&self, unit: u32) -> Result<DiskInfo, HalError>;

    // === Time ===

    /// Current time in nanoseconds (monotonic)
    fn now_nanos(&self) -> u64;

    // === Debug ===

    /// Write a message to the platform's debug console
    fn debug_write(&self, msg: &str);
}

/// A device interrupt source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Clock,
    Disk(u32),
    Terminal(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Clock => write!(f, "clock"),
            Device::Disk(unit) => write!(f, "disk{}", unit),
            Device::Terminal(unit) => write!(f, "term{}", unit),
        }
    }
}

/// Disk controller step kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskOpKind {
    Seek,
    Read,
    Write,
}

/// Status latched by an interrupt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Periodic clock tick
    Clock,
    /// A disk step finished
    Disk {
        /// Step that completed
        kind: DiskOpKind,
        /// 0 on success, controller error code otherwise
        status: i32,
        /// Sector contents for a successful read
        data: Option<Vec<u8>>,
    },
    /// Terminal receive and/or transmit condition
    Terminal {
        /// Character received, if any
        received: Option<u8>,
        /// Transmitter ready for the next character
        xmit_ready: bool,
    },
}

/// Disk control-register commands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiskCommand {
    Seek { track: u32 },
    Read { sector: u32 },
    Write { sector: u32, data: Vec<u8> },
}

/// Terminal control-register commands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermCommand {
    /// Enable receive interrupts
    EnableReceive,
    /// Transmit one character
    Transmit(u8),
}

/// Command written to a device's control register
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    Disk(DiskCommand),
    Terminal(TermCommand),
}

/// Disk geometry as reported by the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskInfo {
    pub sector_size: u32,
    pub sectors_per_track: u32,
    pub track_count: u32,
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Device was aborted
    Aborted,
    /// Unit does not exist
    NoSuchDevice,
    /// Invalid argument
    InvalidArgument,
    /// Operation not supported on this platform
    NotSupported,
    /// I/O error
    IoError,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HalError::Aborted => "device aborted",
            HalError::NoSuchDevice => "no such device",
            HalError::InvalidArgument => "invalid argument",
            HalError::NotSupported => "not supported",
            HalError::IoError => "i/o error",
        };
        f.write_str(s)
    }
}
