//! Disk driver
//!
//! One driver process per unit. Requests arrive on a FIFO queue mailbox and
//! are served strictly in arrival order, one at a time: the request is
//! planned into controller steps by `DiskTransfer`, each step is written to
//! the controller, and the driver waits for the matching interrupt before
//! issuing the next.
//!
//! A failed step ends its request with `DeviceFailure`; the driver moves on.
//! An interrupt that does not match the step in flight is fatal for the
//! driver: the request in flight and everything queued get `Interrupted`.

use std::sync::Arc;

use relay_hal::{Device, DeviceCommand, DeviceStatus, DiskCommand, DiskInfo, DiskOpKind, Hal};
use relay_kernel_core::{
    DiskCompletion, DiskGeometry, DiskRequest, DiskStep, DiskTransfer, DriverState,
    InvariantViolation, KernelError, KernelResult, Payload, StepKind,
};

use super::{answer, from_hal, halt, reply_box, Completion, DriverStatus, Reply};
use crate::mailbox::Mailbox;
use crate::process::Semaphore;

/// Queued disk request
pub(crate) struct DiskJob {
    request: DiskRequest,
    buffer: Vec<u8>,
    reply: Reply,
}

impl Payload for DiskJob {
    fn size(&self) -> usize {
        0
    }
}

pub(crate) type DiskQueue = Arc<Mailbox<DiskJob>>;

/// Requester-side view of one disk unit
pub(crate) struct DiskUnit {
    pub(crate) unit: u32,
    pub(crate) geometry: DiskGeometry,
    pub(crate) queue: DiskQueue,
    pub(crate) status: Arc<DriverStatus>,
}

impl DiskUnit {
    pub(crate) fn new(unit: u32, geometry: DiskGeometry, depth: usize) -> Self {
        Self {
            unit,
            geometry,
            queue: Arc::new(Mailbox::new(depth, 0)),
            status: DriverStatus::new(format!("disk{}", unit)),
        }
    }

    /// Validate and enqueue a request, returning its reply mailbox.
    ///
    /// Blocks while the queue is full.
    pub(crate) fn submit(&self, request: DiskRequest, buffer: Vec<u8>) -> KernelResult<Reply> {
        request.validate(&self.geometry, buffer.len())?;

        let reply = reply_box();
        let job = DiskJob {
            request,
            buffer,
            reply: Arc::clone(&reply),
        };
        log::debug!(
            "disk{}: queue {:?} track {} sector {} count {}",
            self.unit,
            request.op,
            request.track,
            request.first_sector,
            request.sector_count
        );
        self.queue.send(job).map_err(|_| KernelError::Interrupted)?;
        Ok(reply)
    }

    /// Stop accepting requests; queued ones fail with `Interrupted`.
    pub(crate) fn close(&self) {
        self.status.begin_drain();
        for job in self.queue.close(KernelError::Interrupted) {
            answer(&job.reply, Completion::failed(KernelError::Interrupted));
        }
    }
}

/// Controller geometry in the core's units
pub(crate) fn geometry_of(info: DiskInfo) -> DiskGeometry {
    DiskGeometry {
        sector_size: info.sector_size as usize,
        sectors_per_track: info.sectors_per_track as usize,
        track_count: info.track_count as usize,
    }
}

fn step_kind(kind: DiskOpKind) -> StepKind {
    match kind {
        DiskOpKind::Seek => StepKind::Seek,
        DiskOpKind::Read => StepKind::Read,
        DiskOpKind::Write => StepKind::Write,
    }
}

fn command(step: DiskStep) -> DiskCommand {
    match step {
        DiskStep::Seek { track } => DiskCommand::Seek {
            track: track as u32,
        },
        DiskStep::Read { sector } => DiskCommand::Read {
            sector: sector as u32,
        },
        DiskStep::Write { sector, data } => DiskCommand::Write {
            sector: sector as u32,
            data,
        },
    }
}

/// Run one transfer to completion.
///
/// `Err` means the controller reported something inconsistent with the
/// step in flight; the transfer is returned so it can be failed.
fn serve<H: Hal>(
    hal: &H,
    unit: u32,
    mut transfer: DiskTransfer,
) -> Result<DiskCompletion, (DiskTransfer, InvariantViolation)> {
    let device = Device::Disk(unit);

    while let Some(step) = transfer.next_step() {
        if let Err(e) = hal.device_output(device, DeviceCommand::Disk(command(step))) {
            log::warn!("disk{}: step rejected: {}", unit, e);
            return Ok(transfer.abort(from_hal(e)));
        }

        match hal.wait_device(device) {
            Ok(DeviceStatus::Disk { kind, status, data }) => {
                if status != 0 {
                    log::warn!("disk{}: {:?} failed with status {}", unit, kind, status);
                }
                if let Err(v) = transfer.complete_step(step_kind(kind), status, data.as_deref()) {
                    return Err((transfer, v));
                }
            }
            Ok(other) => {
                let v = InvariantViolation::new(
                    "disk_status",
                    format!("non-disk status {:?}", other),
                );
                return Err((transfer, v));
            }
            Err(e) => return Ok(transfer.abort(from_hal(e))),
        }
    }

    Ok(transfer.finish())
}

/// Disk driver process body.
pub(crate) fn run<H: Hal>(
    hal: Arc<H>,
    unit: u32,
    geometry: DiskGeometry,
    queue: DiskQueue,
    status: Arc<DriverStatus>,
    ready: Arc<Semaphore>,
) -> i32 {
    ready.v();
    log::info!(
        "disk{}: running ({} tracks x {} sectors x {} bytes)",
        unit,
        geometry.track_count,
        geometry.sectors_per_track,
        geometry.sector_size
    );

    let mut seq = 0u64;
    while let Ok(job) = queue.receive(0) {
        status.advance(DriverState::Idle, DriverState::Busy);
        seq += 1;

        let DiskJob {
            request,
            buffer,
            reply,
        } = job;
        let transfer = DiskTransfer::new(request, geometry, buffer);

        match serve(&*hal, unit, transfer) {
            Ok(done) => {
                log::debug!("disk{}: request {} done ({} bytes)", unit, seq, done.bytes);
                answer(
                    &reply,
                    Completion {
                        result: done.result,
                        bytes: done.bytes,
                        data: done.data,
                        seq,
                    },
                );
                status.advance(DriverState::Busy, DriverState::Idle);
            }
            Err((transfer, violation)) => {
                halt(&*hal, &format!("disk{}", unit), &violation);
                let failed = transfer.abort(KernelError::Interrupted);
                answer(
                    &reply,
                    Completion {
                        result: failed.result,
                        bytes: failed.bytes,
                        data: Vec::new(),
                        seq,
                    },
                );
                for job in queue.close(KernelError::Interrupted) {
                    answer(&job.reply, Completion::failed(KernelError::Interrupted));
                }
                status.stop();
                return -1;
            }
        }
    }

    status.stop();
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::await_reply;
    use relay_kernel_core::DiskOp;

    fn unit() -> DiskUnit {
        DiskUnit::new(
            0,
            DiskGeometry {
                sector_size: 4,
                sectors_per_track: 4,
                track_count: 2,
            },
            2,
        )
    }

    #[test]
    fn test_submit_rejects_invalid_synchronously() {
        let u = unit();
        let bad = DiskRequest {
            op: DiskOp::Read,
            track: 5,
            first_sector: 0,
            sector_count: 1,
        };
        assert!(matches!(
            u.submit(bad, Vec::new()),
            Err(KernelError::InvalidArgument)
        ));
        assert_eq!(u.queue.info().buffered, 0);
    }

    #[test]
    fn test_close_fails_queued_jobs() {
        let u = unit();
        let req = DiskRequest {
            op: DiskOp::Read,
            track: 0,
            first_sector: 0,
            sector_count: 1,
        };
        let reply = u.submit(req, Vec::new()).unwrap();
        u.close();
        let c = await_reply(&reply);
        assert_eq!(c.result, Err(KernelError::Interrupted));
        assert!(matches!(
            u.submit(req, Vec::new()),
            Err(KernelError::Interrupted)
        ));
        assert_eq!(u.status.get(), DriverState::Draining);
    }

    #[test]
    fn test_geometry_from_info() {
        let g = geometry_of(DiskInfo {
            sector_size: 512,
            sectors_per_track: 16,
            track_count: 10,
        });
        assert_eq!(g.capacity(), 512 * 16 * 10);
    }
}
