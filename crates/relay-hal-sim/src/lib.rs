//! Host-simulated hardware for the Relay kernel
//!
//! `SimHal` implements the `Hal` trait with in-memory devices so the kernel
//! and its drivers run unmodified on a host, in plain threads.
//!
//! # Devices
//!
//! - **Clock**: a ticker thread raising one interrupt per period, or a
//!   manual clock advanced with [`SimHal::tick`]
//! - **Disks**: a controller holding sectors in memory; each accepted step
//!   completes immediately by latching an interrupt that echoes the step
//! - **Terminals**: input injected with [`SimHal::feed_terminal`] (held until
//!   the driver enables receive interrupts), output captured per unit
//!
//! # Test Hooks
//!
//! - [`SimHal::fail_next_disk_op`] makes the next disk step report an error
//! - [`SimHal::pause_disk`] / [`SimHal::resume_disk`] hold a disk's step
//!   completions so a request stays in flight
//! - [`SimHal::raise_spurious`] latches an arbitrary interrupt
//! - [`SimHal::get_debug_log`] / [`SimHal::has_log_containing`] inspect the
//!   debug console

mod config;
mod line;

pub use config::{DiskSpec, SimConfig};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_hal::{
    Device, DeviceCommand, DeviceStatus, DiskCommand, DiskInfo, DiskOpKind, Hal, HalError,
    TermCommand,
};

use line::InterruptLine;

/// Status a disk step reports when it fails
pub const DISK_STATUS_ERROR: i32 = 2;

// ============================================================================
// Devices
// ============================================================================

struct DiskState {
    head: u32,
    /// Sector contents, `track * sectors_per_track + sector`
    sectors: Vec<Vec<u8>>,
    /// Error status to report for the next step
    fail_next: Option<i32>,
    /// Completions held back while the controller is paused
    held: Option<Vec<DeviceStatus>>,
    steps: u64,
}

struct SimDisk {
    spec: DiskSpec,
    line: InterruptLine,
    state: Mutex<DiskState>,
}

impl SimDisk {
    fn new(spec: DiskSpec) -> Self {
        let total = spec.tracks as usize * spec.sectors_per_track as usize;
        Self {
            spec,
            line: InterruptLine::default(),
            state: Mutex::new(DiskState {
                head: 0,
                sectors: vec![vec![0; spec.sector_size as usize]; total],
                fail_next: None,
                held: None,
                steps: 0,
            }),
        }
    }

    fn index(&self, track: u32, sector: u32) -> usize {
        track as usize * self.spec.sectors_per_track as usize + sector as usize
    }

    /// Latch a step completion, or hold it while paused.
    fn complete(&self, state: &mut DiskState, status: DeviceStatus) {
        match state.held.as_mut() {
            Some(held) => held.push(status),
            None => self.line.raise(status),
        }
    }

    /// Execute one step and latch its completion.
    fn execute(&self, command: DiskCommand) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.steps += 1;

        let kind = match &command {
            DiskCommand::Seek { .. } => DiskOpKind::Seek,
            DiskCommand::Read { .. } => DiskOpKind::Read,
            DiskCommand::Write { .. } => DiskOpKind::Write,
        };

        if let Some(status) = state.fail_next.take() {
            log::debug!("sim disk: injected failure {} on {:?}", status, kind);
            self.complete(
                &mut state,
                DeviceStatus::Disk {
                    kind,
                    status,
                    data: None,
                },
            );
            return Ok(());
        }

        let (status, data) = match command {
            DiskCommand::Seek { track } if track < self.spec.tracks => {
                state.head = track;
                (0, None)
            }
            DiskCommand::Read { sector } if sector < self.spec.sectors_per_track => {
                let idx = self.index(state.head, sector);
                (0, Some(state.sectors[idx].clone()))
            }
            DiskCommand::Write { sector, data } if sector < self.spec.sectors_per_track => {
                if data.len() != self.spec.sector_size as usize {
                    return Err(HalError::InvalidArgument);
                }
                let idx = self.index(state.head, sector);
                state.sectors[idx] = data;
                (0, None)
            }
            _ => (DISK_STATUS_ERROR, None),
        };

        self.complete(&mut state, DeviceStatus::Disk { kind, status, data });
        Ok(())
    }
}

#[derive(Default)]
struct TermState {
    receive_enabled: bool,
    /// Characters fed before receive interrupts were enabled
    held: VecDeque<u8>,
    output: Vec<u8>,
}

#[derive(Default)]
struct SimTerminal {
    line: InterruptLine,
    state: Mutex<TermState>,
}

impl SimTerminal {
    fn receive(&self, byte: u8) {
        self.line.raise(DeviceStatus::Terminal {
            received: Some(byte),
            xmit_ready: false,
        });
    }

    fn execute(&self, command: TermCommand) {
        let mut state = self.state.lock();
        match command {
            TermCommand::EnableReceive => {
                state.receive_enabled = true;
                while let Some(byte) = state.held.pop_front() {
                    self.receive(byte);
                }
            }
            TermCommand::Transmit(byte) => {
                state.output.push(byte);
                self.line.raise(DeviceStatus::Terminal {
                    received: None,
                    xmit_ready: true,
                });
            }
        }
    }
}

struct Ticker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

// ============================================================================
// SimHal
// ============================================================================

/// Simulated hardware
pub struct SimHal {
    start: Instant,
    clock: Arc<InterruptLine>,
    ticker: Mutex<Option<Ticker>>,
    disks: Vec<SimDisk>,
    terminals: Vec<SimTerminal>,
    /// Captured debug messages
    debug_log: Mutex<Vec<String>>,
}

impl SimHal {
    /// Build the simulated machine described by `config`.
    pub fn new(config: SimConfig) -> Self {
        let clock = Arc::new(InterruptLine::default());

        let ticker = config.clock_period_ms.map(|ms| {
            let stop = Arc::new(AtomicBool::new(false));
            let period = Duration::from_millis(ms.max(1));
            let handle = {
                let clock = Arc::clone(&clock);
                let stop = Arc::clone(&stop);
                thread::Builder::new()
                    .name("sim-clock".into())
                    .spawn(move || {
                        while !stop.load(Ordering::Acquire) {
                            thread::sleep(period);
                            if clock.is_aborted() {
                                break;
                            }
                            clock.raise(DeviceStatus::Clock);
                        }
                    })
                    .ok()
            };
            handle.map(|handle| Ticker { stop, handle })
        });

        Self {
            start: Instant::now(),
            clock,
            ticker: Mutex::new(ticker.flatten()),
            disks: config.disks.into_iter().map(SimDisk::new).collect(),
            terminals: (0..config.terminals).map(|_| SimTerminal::default()).collect(),
            debug_log: Mutex::new(Vec::new()),
        }
    }

    /// Default machine with a manual clock
    pub fn manual() -> Self {
        Self::new(SimConfig::manual())
    }

    fn disk(&self, unit: u32) -> Result<&SimDisk, HalError> {
        self.disks.get(unit as usize).ok_or(HalError::NoSuchDevice)
    }

    fn terminal(&self, unit: u32) -> Result<&SimTerminal, HalError> {
        self.terminals.get(unit as usize).ok_or(HalError::NoSuchDevice)
    }

    fn line(&self, device: Device) -> Result<&InterruptLine, HalError> {
        match device {
            Device::Clock => Ok(&self.clock),
            Device::Disk(unit) => Ok(&self.disk(unit)?.line),
            Device::Terminal(unit) => Ok(&self.terminal(unit)?.line),
        }
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop.store(true, Ordering::Release);
            let _ = ticker.handle.join();
        }
    }

    // === Clock ===

    /// Raise one clock interrupt
    pub fn tick(&self) {
        self.clock.raise(DeviceStatus::Clock);
    }

    /// Raise `n` clock interrupts
    pub fn tick_n(&self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    // === Disks ===

    /// Make the next step on `unit` report `DISK_STATUS_ERROR`
    pub fn fail_next_disk_op(&self, unit: u32) {
        self.fail_next_disk_op_with(unit, DISK_STATUS_ERROR);
    }

    /// Make the next step on `unit` report `status`
    pub fn fail_next_disk_op_with(&self, unit: u32, status: i32) {
        if let Ok(disk) = self.disk(unit) {
            disk.state.lock().fail_next = Some(status);
        }
    }

    /// Contents of one sector
    pub fn sector(&self, unit: u32, track: u32, sector: u32) -> Option<Vec<u8>> {
        let disk = self.disk(unit).ok()?;
        if track >= disk.spec.tracks || sector >= disk.spec.sectors_per_track {
            return None;
        }
        let idx = disk.index(track, sector);
        Some(disk.state.lock().sectors[idx].clone())
    }

    /// Hold back step completions on `unit` until `resume_disk`
    pub fn pause_disk(&self, unit: u32) {
        if let Ok(disk) = self.disk(unit) {
            disk.state.lock().held.get_or_insert_with(Vec::new);
        }
    }

    /// Deliver held completions on `unit` and stop holding new ones
    pub fn resume_disk(&self, unit: u32) {
        if let Ok(disk) = self.disk(unit) {
            let held = disk.state.lock().held.take().unwrap_or_default();
            for status in held {
                disk.line.raise(status);
            }
        }
    }

    /// Number of steps the controller of `unit` has accepted
    pub fn disk_steps(&self, unit: u32) -> u64 {
        self.disk(unit).map(|d| d.state.lock().steps).unwrap_or(0)
    }

    // === Terminals ===

    /// Inject received characters on `unit`.
    ///
    /// Characters fed before the driver enables receive interrupts are held
    /// and delivered in order once it does.
    pub fn feed_terminal(&self, unit: u32, bytes: &[u8]) {
        let Ok(term) = self.terminal(unit) else {
            return;
        };
        let mut state = term.state.lock();
        if state.receive_enabled {
            for &byte in bytes {
                term.receive(byte);
            }
        } else {
            state.held.extend(bytes.iter().copied());
        }
    }

    /// Everything transmitted on `unit` so far
    pub fn terminal_output(&self, unit: u32) -> Vec<u8> {
        self.terminal(unit)
            .map(|t| t.state.lock().output.clone())
            .unwrap_or_default()
    }

    // === Faults ===

    /// Latch an arbitrary interrupt on `device`
    pub fn raise_spurious(&self, device: Device, status: DeviceStatus) {
        if let Ok(line) = self.line(device) {
            line.raise(status);
        }
    }

    // === Debug log ===

    /// Get all captured debug messages
    pub fn get_debug_log(&self) -> Vec<String> {
        self.debug_log.lock().clone()
    }

    /// Check if a specific message was logged
    pub fn has_log_containing(&self, substr: &str) -> bool {
        self.debug_log.lock().iter().any(|msg| msg.contains(substr))
    }

    /// Clear the debug log
    pub fn clear_debug_log(&self) {
        self.debug_log.lock().clear();
    }
}

impl Default for SimHal {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Drop for SimHal {
    fn drop(&mut self) {
        self.clock.abort();
        self.stop_ticker();
    }
}

impl Hal for SimHal {
    fn wait_device(&self, device: Device) -> Result<DeviceStatus, HalError> {
        self.line(device)?.wait()
    }

    fn abort_device(&self, device: Device) {
        if let Ok(line) = self.line(device) {
            log::debug!("sim: abort {}", device);
            line.abort();
        }
        if device == Device::Clock {
            self.stop_ticker();
        }
    }

    fn device_output(&self, device: Device, command: DeviceCommand) -> Result<(), HalError> {
        match (device, command) {
            (Device::Disk(unit), DeviceCommand::Disk(cmd)) => self.disk(unit)?.execute(cmd),
            (Device::Terminal(unit), DeviceCommand::Terminal(cmd)) => {
                self.terminal(unit)?.execute(cmd);
                Ok(())
            }
            _ => Err(HalError::InvalidArgument),
        }
    }

    fn disk_units(&self) -> u32 {
        self.disks.len() as u32
    }

    fn terminal_units(&self) -> u32 {
        self.terminals.len() as u32
    }

    fn disk_info(&self, unit: u32) -> Result<DiskInfo, HalError> {
        let spec = self.disk(unit)?.spec;
        Ok(DiskInfo {
            sector_size: spec.sector_size,
            sectors_per_track: spec.sectors_per_track,
            track_count: spec.tracks,
        })
    }

    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.lock().push(msg.to_string());
    }
}
