//! Terminal driver
//!
//! Two processes per unit:
//!
//! - **input** is the only waiter on the terminal's interrupt line. It feeds
//!   received characters through a `LineDiscipline` and offers each completed
//!   line to the unit's line mailbox without blocking; a line that finds the
//!   mailbox full is dropped and counted as an overrun. "Transmit ready"
//!   conditions are forwarded to the output process through a one-slot
//!   mailbox. A transmit-ready with no character outstanding halts both
//!   processes of the unit.
//! - **output** takes write requests from a FIFO queue and transmits each one
//!   completely, one character per transmit-ready, before starting the next,
//!   so concurrent writers never interleave.
//!
//! Readers take lines straight from the line mailbox, so the earliest blocked
//! reader gets the next line.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use relay_hal::{Device, DeviceCommand, DeviceStatus, Hal, HalError, TermCommand};
use relay_kernel_core::{
    DriverState, InvariantViolation, KernelError, KernelResult, LineDiscipline, LineEvent, Payload,
};

use super::{answer, await_reply, from_hal, halt, reply_box, Completion, DriverStatus, Reply};
use crate::config::KernelConfig;
use crate::mailbox::Mailbox;
use crate::process::Semaphore;

/// Transmit-ready notification
pub(crate) struct XmitReady;

impl Payload for XmitReady {
    fn size(&self) -> usize {
        0
    }
}

/// Queued write request
pub(crate) struct TermJob {
    bytes: Vec<u8>,
    reply: Reply,
}

impl Payload for TermJob {
    fn size(&self) -> usize {
        0
    }
}

/// One terminal unit, shared by its two driver processes and requesters
pub(crate) struct TerminalUnit {
    pub(crate) unit: u32,
    max_line: usize,
    /// Completed input lines
    lines: Mailbox<Vec<u8>>,
    /// Pending write requests
    writes: Mailbox<TermJob>,
    /// Transmit-ready hand-off from input to output
    xmit: Mailbox<XmitReady>,
    pub(crate) input: Arc<DriverStatus>,
    pub(crate) output: Arc<DriverStatus>,
    /// A transmitted character awaits its transmit-ready
    transmitting: AtomicBool,
    overruns: AtomicU64,
}

impl TerminalUnit {
    pub(crate) fn new(unit: u32, config: &KernelConfig) -> Arc<Self> {
        Arc::new(Self {
            unit,
            max_line: config.max_line,
            lines: Mailbox::new(config.max_pending_lines, config.max_line),
            writes: Mailbox::new(config.terminal_queue_depth, 0),
            xmit: Mailbox::new(1, 0),
            input: DriverStatus::new(format!("term{}-in", unit)),
            output: DriverStatus::new(format!("term{}-out", unit)),
            transmitting: AtomicBool::new(false),
            overruns: AtomicU64::new(0),
        })
    }

    fn device(&self) -> Device {
        Device::Terminal(self.unit)
    }

    /// Lines dropped because the pending-line queue was full
    pub(crate) fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Block until a line is available and copy it into `buf`.
    ///
    /// `buf` must hold a full line (`max_line` bytes).
    pub(crate) fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        if buf.len() < self.max_line {
            return Err(KernelError::InvalidArgument);
        }
        let line = self.lines.receive(buf.len()).map_err(|e| match e {
            KernelError::MailboxReleased => KernelError::Interrupted,
            e => e,
        })?;
        buf[..line.len()].copy_from_slice(&line);
        Ok(line.len())
    }

    /// Queue `bytes` for transmission and block until all are sent.
    pub(crate) fn write(&self, bytes: &[u8]) -> KernelResult<usize> {
        let reply = reply_box();
        let job = TermJob {
            bytes: bytes.to_vec(),
            reply: Arc::clone(&reply),
        };
        self.writes
            .send(job)
            .map_err(|_| KernelError::Interrupted)?;

        let done = await_reply(&reply);
        done.result?;
        Ok(done.bytes)
    }

    /// Stop accepting writes; queued ones fail with `Interrupted`.
    pub(crate) fn close_output(&self) {
        self.output.begin_drain();
        for job in self.writes.close(KernelError::Interrupted) {
            answer(&job.reply, Completion::failed(KernelError::Interrupted));
        }
    }

    /// Pass a transmit-ready on to the output process.
    ///
    /// Fails if no transmitted character was waiting for it.
    fn acknowledge(&self) -> Result<(), InvariantViolation> {
        if !self.transmitting.swap(false, Ordering::AcqRel) {
            return Err(InvariantViolation::new(
                "terminal_xmit_outstanding",
                format!("term{}: transmit-ready with no character outstanding", self.unit),
            ));
        }
        if self.xmit.try_send(XmitReady).is_err() {
            log::warn!("term{}: transmit-ready dropped", self.unit);
        }
        Ok(())
    }

    fn deliver(&self, discipline: &mut LineDiscipline, byte: u8) {
        let line = match discipline.push(byte) {
            LineEvent::Pending => {
                self.input.advance(DriverState::Idle, DriverState::Busy);
                return;
            }
            LineEvent::Line(line) | LineEvent::Full(line) => line,
        };
        self.input.advance(DriverState::Busy, DriverState::Idle);

        match self.lines.try_send(line) {
            Ok(()) => {}
            Err(KernelError::WouldBlock) => {
                let n = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("term{}: pending lines full, line dropped ({} overruns)", self.unit, n);
            }
            Err(e) => log::warn!("term{}: line dropped: {}", self.unit, e),
        }
    }
}

/// Terminal input process body.
pub(crate) fn run_input<H: Hal>(hal: Arc<H>, term: Arc<TerminalUnit>, ready: Arc<Semaphore>) -> i32 {
    let device = term.device();
    let enabled = hal.device_output(device, DeviceCommand::Terminal(TermCommand::EnableReceive));
    ready.v();
    if let Err(e) = enabled {
        log::error!("term{}: cannot enable receive: {}", term.unit, e);
        shutdown_input(&term);
        return -1;
    }
    log::info!("term{}: input running", term.unit);

    let mut discipline = LineDiscipline::new(term.max_line);
    let status = loop {
        match hal.wait_device(device) {
            Ok(DeviceStatus::Terminal {
                received,
                xmit_ready,
            }) => {
                if let Some(byte) = received {
                    term.deliver(&mut discipline, byte);
                }
                if xmit_ready {
                    if let Err(v) = term.acknowledge() {
                        halt(&*hal, &format!("term{}-in", term.unit), &v);
                        term.close_output();
                        break -1;
                    }
                }
            }
            Ok(other) => {
                let v = InvariantViolation::new("terminal_status", format!("non-terminal status {:?}", other));
                halt(&*hal, &format!("term{}-in", term.unit), &v);
                term.close_output();
                break -1;
            }
            Err(HalError::Aborted) => break 0,
            Err(e) => {
                log::error!("term{}: device wait failed: {}", term.unit, e);
                break -1;
            }
        }
    };

    if discipline.pending() > 0 {
        log::debug!("term{}: discarding {} bytes of partial line", term.unit, discipline.pending());
    }
    shutdown_input(&term);
    status
}

fn shutdown_input(term: &TerminalUnit) {
    term.xmit.close(KernelError::Interrupted);
    term.lines.close(KernelError::Interrupted);
    term.input.stop();
}

/// Send every byte of one request, one transmit-ready at a time.
fn transmit<H: Hal>(hal: &H, term: &TerminalUnit, bytes: &[u8]) -> (usize, KernelResult<()>) {
    for (sent, &byte) in bytes.iter().enumerate() {
        let command = DeviceCommand::Terminal(TermCommand::Transmit(byte));
        term.transmitting.store(true, Ordering::Release);
        if let Err(e) = hal.device_output(term.device(), command) {
            term.transmitting.store(false, Ordering::Release);
            return (sent, Err(from_hal(e)));
        }
        if term.xmit.receive(0).is_err() {
            return (sent, Err(KernelError::Interrupted));
        }
    }
    (bytes.len(), Ok(()))
}

/// Terminal output process body.
pub(crate) fn run_output<H: Hal>(hal: Arc<H>, term: Arc<TerminalUnit>, ready: Arc<Semaphore>) -> i32 {
    ready.v();
    log::info!("term{}: output running", term.unit);

    let mut seq = 0u64;
    let mut status = 0;
    while let Ok(job) = term.writes.receive(0) {
        term.output.advance(DriverState::Idle, DriverState::Busy);
        seq += 1;

        let (sent, result) = transmit(&*hal, &term, &job.bytes);
        log::debug!("term{}: write {} sent {} of {} bytes", term.unit, seq, sent, job.bytes.len());
        let lost_transmitter = result == Err(KernelError::Interrupted);
        answer(
            &job.reply,
            Completion {
                result,
                bytes: sent,
                data: Vec::new(),
                seq,
            },
        );

        if lost_transmitter {
            // Input side is gone; nothing queued can be sent
            term.close_output();
            status = -1;
            break;
        }
        term.output.advance(DriverState::Busy, DriverState::Idle);
    }

    term.output.stop();
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_line: usize, pending: usize) -> KernelConfig {
        KernelConfig {
            max_line,
            max_pending_lines: pending,
            ..KernelConfig::default()
        }
    }

    #[test]
    fn test_read_requires_full_line_buffer() {
        let term = TerminalUnit::new(0, &config(8, 2));
        let mut small = [0u8; 7];
        assert_eq!(term.read(&mut small), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn test_deliver_queues_lines_and_counts_overruns() {
        let term = TerminalUnit::new(0, &config(8, 1));
        let mut ld = LineDiscipline::new(8);
        for &b in b"a\nb\n" {
            term.deliver(&mut ld, b);
        }
        assert_eq!(term.overruns(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(term.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"a\n");
    }

    #[test]
    fn test_input_status_tracks_partial_line() {
        let term = TerminalUnit::new(0, &config(8, 2));
        let mut ld = LineDiscipline::new(8);
        term.deliver(&mut ld, b'x');
        assert_eq!(term.input.get(), DriverState::Busy);
        term.deliver(&mut ld, b'\n');
        assert_eq!(term.input.get(), DriverState::Idle);
    }

    #[test]
    fn test_unmatched_transmit_ready_is_a_violation() {
        let term = TerminalUnit::new(0, &config(8, 2));
        let v = term.acknowledge().unwrap_err();
        assert_eq!(v.invariant, "terminal_xmit_outstanding");
        assert_eq!(term.xmit.info().buffered, 0);

        term.transmitting.store(true, Ordering::Release);
        assert!(term.acknowledge().is_ok());
        assert_eq!(term.xmit.info().buffered, 1);
        assert!(term.acknowledge().is_err());
    }

    #[test]
    fn test_shutdown_input_interrupts_readers() {
        let term = TerminalUnit::new(0, &config(8, 2));
        shutdown_input(&term);
        let mut buf = [0u8; 8];
        assert_eq!(term.read(&mut buf), Err(KernelError::Interrupted));
        assert_eq!(term.input.get(), DriverState::Stopped);
    }
}
