//! Kernel facade
//!
//! `Kernel` owns the mailbox table and every driver, and exposes the
//! operations user processes reach through the trap boundary:
//!
//! - mailboxes: create / send / receive / conditional variants / release
//! - disks: read / write / size, plus asynchronous submission
//! - terminals: read / write
//! - sleep
//!
//! # Lifecycle
//!
//! ```text
//! start():    clock driver ──handshake──► disk drivers ──► terminal in/out
//! shutdown(): close disk + output queues (Draining) ─► join
//!             abort terminals ─► join input ─► abort clock ─► join
//!             interrupt every blocked mailbox party
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relay_hal::{Device, Hal};
use relay_kernel_core::{
    ClockState, DiskGeometry, DiskOp, DiskRequest, DriverState, KernelError, KernelResult,
    MailboxId, MailboxInfo, Tick,
};
use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::drivers::clock::{self, ClockShared};
use crate::drivers::disk::{self, DiskUnit};
use crate::drivers::terminal::{self, TerminalUnit};
use crate::drivers::{await_reply, from_hal, Completion, Reply};
use crate::mailbox::MailboxTable;
use crate::process::{spawn, ProcessHandle, Semaphore};

/// Identifies one driver process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverId {
    Disk(u32),
    TerminalInput(u32),
    TerminalOutput(u32),
}

/// Exit report for one driver process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverExit {
    pub name: String,
    pub status: i32,
}

/// Disk request in flight; `wait` blocks for its completion.
pub struct PendingIo {
    reply: Reply,
}

impl PendingIo {
    /// Block until the driver answers.
    pub fn wait(self) -> Completion {
        await_reply(&self.reply)
    }
}

#[derive(Default)]
struct Drivers {
    clock: Option<ProcessHandle>,
    disks: Vec<ProcessHandle>,
    term_out: Vec<ProcessHandle>,
    term_in: Vec<ProcessHandle>,
}

/// The running kernel.
pub struct Kernel<H: Hal> {
    hal: Arc<H>,
    config: KernelConfig,
    mailboxes: MailboxTable,
    clock: Arc<ClockShared>,
    disks: Vec<DiskUnit>,
    terminals: Vec<Arc<TerminalUnit>>,
    drivers: Mutex<Drivers>,
    running: AtomicBool,
}

impl<H: Hal> Kernel<H> {
    /// Start every driver and wait for each to report ready.
    pub fn start(hal: Arc<H>, config: KernelConfig) -> KernelResult<Self> {
        config.validate().map_err(|e| {
            log::error!("{}", e);
            KernelError::InvalidArgument
        })?;

        let geometries = (0..hal.disk_units())
            .map(|unit| hal.disk_info(unit).map(disk::geometry_of))
            .collect::<Result<Vec<_>, _>>()
            .map_err(from_hal)?;

        let stack = config.driver_stack_size;
        let priority = config.driver_priority;
        let mut drivers = Drivers::default();

        // TODO: stop the drivers already started when a later spawn fails

        // Clock first, so sleepers always have a running tick source
        let ticks = ClockShared::new();
        {
            let ready = Arc::new(Semaphore::new(0));
            let (h, c, r) = (Arc::clone(&hal), Arc::clone(&ticks), Arc::clone(&ready));
            drivers.clock = Some(spawn("clock", stack, priority, move || clock::run(h, c, r))?);
            ready.p();
        }

        let mut disks = Vec::new();
        for (unit, geometry) in (0u32..).zip(geometries) {
            let d = DiskUnit::new(unit, geometry, config.disk_queue_depth);

            let ready = Arc::new(Semaphore::new(0));
            let (h, q, s, r) = (
                Arc::clone(&hal),
                Arc::clone(&d.queue),
                Arc::clone(&d.status),
                Arc::clone(&ready),
            );
            let name = format!("disk{}", unit);
            drivers
                .disks
                .push(spawn(&name, stack, priority, move || disk::run(h, unit, geometry, q, s, r))?);
            ready.p();
            disks.push(d);
        }

        let mut terminals = Vec::new();
        for unit in 0..hal.terminal_units() {
            let t = TerminalUnit::new(unit, &config);

            let ready = Arc::new(Semaphore::new(0));
            let (h, tt, r) = (Arc::clone(&hal), Arc::clone(&t), Arc::clone(&ready));
            let name = format!("term{}-in", unit);
            drivers
                .term_in
                .push(spawn(&name, stack, priority, move || terminal::run_input(h, tt, r))?);
            let (h, tt, r) = (Arc::clone(&hal), Arc::clone(&t), Arc::clone(&ready));
            let name = format!("term{}-out", unit);
            drivers
                .term_out
                .push(spawn(&name, stack, priority, move || terminal::run_output(h, tt, r))?);
            ready.p();
            ready.p();
            terminals.push(t);
        }

        log::info!(
            "kernel started: {} disks, {} terminals",
            disks.len(),
            terminals.len()
        );

        Ok(Self {
            mailboxes: MailboxTable::new(config.max_mailboxes, config.max_slots, config.max_message_size),
            hal,
            config,
            clock: ticks,
            disks,
            terminals,
            drivers: Mutex::new(drivers),
            running: AtomicBool::new(true),
        })
    }

    /// The HAL the kernel runs on
    pub fn hal(&self) -> &Arc<H> {
        &self.hal
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn check_running(&self) -> KernelResult<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(KernelError::Interrupted)
        }
    }

    fn disk(&self, unit: u32) -> KernelResult<&DiskUnit> {
        self.disks.get(unit as usize).ok_or(KernelError::InvalidArgument)
    }

    fn terminal(&self, unit: u32) -> KernelResult<&TerminalUnit> {
        self.terminals
            .get(unit as usize)
            .map(|t| &**t)
            .ok_or(KernelError::InvalidArgument)
    }

    // ========================================================================
    // Mailboxes
    // ========================================================================

    /// Create a mailbox with `slots` buffer slots (0 = rendezvous) and a
    /// `max_size` byte message limit.
    pub fn mailbox_create(&self, slots: usize, max_size: usize) -> KernelResult<MailboxId> {
        self.check_running()?;
        self.mailboxes.create(slots, max_size)
    }

    /// Send `bytes`, blocking until buffered or taken by a receiver.
    pub fn mailbox_send(&self, id: MailboxId, bytes: &[u8]) -> KernelResult<()> {
        self.check_running()?;
        self.mailboxes.get(id)?.send(bytes.to_vec())
    }

    /// Receive a message of at most `capacity` bytes, blocking until one
    /// arrives.
    pub fn mailbox_receive(&self, id: MailboxId, capacity: usize) -> KernelResult<Vec<u8>> {
        self.check_running()?;
        self.mailboxes.get(id)?.receive(capacity)
    }

    /// Send without blocking (`WouldBlock` instead).
    pub fn mailbox_cond_send(&self, id: MailboxId, bytes: &[u8]) -> KernelResult<()> {
        self.check_running()?;
        self.mailboxes.get(id)?.try_send(bytes.to_vec())
    }

    /// Receive without blocking (`WouldBlock` instead).
    pub fn mailbox_cond_receive(&self, id: MailboxId, capacity: usize) -> KernelResult<Vec<u8>> {
        self.check_running()?;
        self.mailboxes.get(id)?.try_receive(capacity)
    }

    /// Release a mailbox, failing every blocked party with `MailboxReleased`.
    pub fn mailbox_release(&self, id: MailboxId) -> KernelResult<()> {
        self.check_running()?;
        self.mailboxes.release(id)
    }

    pub fn mailbox_info(&self, id: MailboxId) -> KernelResult<MailboxInfo> {
        Ok(self.mailboxes.get(id)?.info())
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Block the caller for `ticks` clock ticks.
    ///
    /// `InvalidArgument` if negative; returns at once for zero.
    pub fn sleep(&self, ticks: i64) -> KernelResult<()> {
        self.check_running()?;
        self.clock.sleep(ticks)
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.now()
    }

    /// Processes currently sleeping
    pub fn sleeper_count(&self) -> usize {
        self.clock.sleeper_count()
    }

    pub fn clock_state(&self) -> ClockState {
        self.clock.state()
    }

    // ========================================================================
    // Disks
    // ========================================================================

    /// Geometry of `unit`
    pub fn disk_size(&self, unit: u32) -> KernelResult<DiskGeometry> {
        self.check_running()?;
        Ok(self.disk(unit)?.geometry)
    }

    /// Queue a read; out-of-range requests fail here without being queued.
    pub fn submit_read(
        &self,
        unit: u32,
        track: usize,
        first_sector: usize,
        sector_count: usize,
    ) -> KernelResult<PendingIo> {
        self.check_running()?;
        let request = DiskRequest {
            op: DiskOp::Read,
            track,
            first_sector,
            sector_count,
        };
        let reply = self.disk(unit)?.submit(request, Vec::new())?;
        Ok(PendingIo { reply })
    }

    /// Queue a write of the first `sector_count` sectors of `data`.
    pub fn submit_write(
        &self,
        unit: u32,
        track: usize,
        first_sector: usize,
        sector_count: usize,
        data: Vec<u8>,
    ) -> KernelResult<PendingIo> {
        self.check_running()?;
        let request = DiskRequest {
            op: DiskOp::Write,
            track,
            first_sector,
            sector_count,
        };
        let reply = self.disk(unit)?.submit(request, data)?;
        Ok(PendingIo { reply })
    }

    /// Read `sector_count` sectors; returns exactly that many sectors' bytes.
    pub fn disk_read(
        &self,
        unit: u32,
        track: usize,
        first_sector: usize,
        sector_count: usize,
    ) -> KernelResult<Vec<u8>> {
        let done = self.submit_read(unit, track, first_sector, sector_count)?.wait();
        done.result?;
        Ok(done.data)
    }

    /// Write `sector_count` sectors from `data`; returns bytes written.
    pub fn disk_write(
        &self,
        unit: u32,
        track: usize,
        first_sector: usize,
        sector_count: usize,
        data: &[u8],
    ) -> KernelResult<usize> {
        let done = self
            .submit_write(unit, track, first_sector, sector_count, data.to_vec())?
            .wait();
        done.result?;
        Ok(done.bytes)
    }

    // ========================================================================
    // Terminals
    // ========================================================================

    /// Block until a line arrives on `unit` and copy it into `buf`.
    ///
    /// `buf` must hold at least `max_line` bytes.
    pub fn term_read(&self, unit: u32, buf: &mut [u8]) -> KernelResult<usize> {
        self.check_running()?;
        self.terminal(unit)?.read(buf)
    }

    /// Transmit `bytes` on `unit`; returns once every byte is sent.
    pub fn term_write(&self, unit: u32, bytes: &[u8]) -> KernelResult<usize> {
        self.check_running()?;
        self.terminal(unit)?.write(bytes)
    }

    /// Input lines dropped on `unit` because nobody read them in time
    pub fn term_overruns(&self, unit: u32) -> KernelResult<u64> {
        Ok(self.terminal(unit)?.overruns())
    }

    // ========================================================================
    // Observability
    // ========================================================================

    pub fn driver_state(&self, id: DriverId) -> KernelResult<DriverState> {
        match id {
            DriverId::Disk(unit) => Ok(self.disk(unit)?.status.get()),
            DriverId::TerminalInput(unit) => Ok(self.terminal(unit)?.input.get()),
            DriverId::TerminalOutput(unit) => Ok(self.terminal(unit)?.output.get()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop every driver and interrupt everything still blocked.
    ///
    /// Requests already in service finish; queued ones fail with
    /// `Interrupted`. Returns each driver's exit status. A second call
    /// returns an empty list.
    pub fn shutdown(&self) -> Vec<DriverExit> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Vec::new();
        }
        log::info!("kernel shutting down");

        let drivers = std::mem::take(&mut *self.drivers.lock());
        let mut exits = Vec::new();

        for d in &self.disks {
            d.close();
        }
        for t in &self.terminals {
            t.close_output();
        }
        for p in drivers.disks.into_iter().chain(drivers.term_out) {
            reap(p, &mut exits);
        }

        for t in &self.terminals {
            t.input.begin_drain();
            self.hal.abort_device(Device::Terminal(t.unit));
        }
        for p in drivers.term_in {
            reap(p, &mut exits);
        }

        self.hal.abort_device(Device::Clock);
        if let Some(p) = drivers.clock {
            reap(p, &mut exits);
        }

        self.mailboxes.close_all(KernelError::Interrupted);
        exits
    }
}

fn reap(process: ProcessHandle, exits: &mut Vec<DriverExit>) {
    let name = process.name().to_string();
    let status = process.join();
    log::info!("{} exited with {}", name, status);
    exits.push(DriverExit { name, status });
}

impl<H: Hal> Drop for Kernel<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
