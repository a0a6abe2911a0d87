//! Disk request validation and transfer planning
//!
//! The controller accepts one step at a time: a seek to a track, or a
//! single-sector read or write on the current track. `DiskTransfer` turns a
//! request into that step sequence and folds each completion back in.
//!
//! # Step Sequence
//!
//! ```text
//! Seek(t0) -> Sector(s0) -> Sector(s0+1) -> ... -> Seek(t1) -> Sector(0) -> ...
//! ```
//!
//! A new seek is issued whenever the next sector lies on a different track,
//! so requests may span track boundaries.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::invariants::InvariantViolation;
use crate::types::DiskGeometry;

/// Direction of a disk request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskOp {
    Read,
    Write,
}

/// One user-level disk request, without its buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRequest {
    pub op: DiskOp,
    pub track: usize,
    pub first_sector: usize,
    pub sector_count: usize,
}

impl DiskRequest {
    /// Check the request against the unit geometry.
    ///
    /// `buf_len` is the caller's buffer length; writes must supply at least
    /// `sector_count * sector_size` bytes.
    pub fn validate(&self, geometry: &DiskGeometry, buf_len: usize) -> KernelResult<()> {
        if self.sector_count == 0
            || self.track >= geometry.track_count
            || self.first_sector >= geometry.sectors_per_track
        {
            return Err(KernelError::InvalidArgument);
        }

        let start = self.track * geometry.sectors_per_track + self.first_sector;
        let end = start
            .checked_add(self.sector_count)
            .ok_or(KernelError::InvalidArgument)?;
        if end > geometry.total_sectors() {
            return Err(KernelError::InvalidArgument);
        }

        if self.op == DiskOp::Write && buf_len < self.byte_len(geometry) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }

    /// Bytes moved by the whole request
    pub fn byte_len(&self, geometry: &DiskGeometry) -> usize {
        self.sector_count * geometry.sector_size
    }
}

/// Kind of a single controller step, echoed back on completion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Seek,
    Read,
    Write,
}

/// A single controller step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiskStep {
    Seek { track: usize },
    Read { sector: usize },
    Write { sector: usize, data: Vec<u8> },
}

impl DiskStep {
    /// Kind the controller will report when this step completes
    pub fn kind(&self) -> StepKind {
        match self {
            DiskStep::Seek { .. } => StepKind::Seek,
            DiskStep::Read { .. } => StepKind::Read,
            DiskStep::Write { .. } => StepKind::Write,
        }
    }
}

/// Outcome of a finished (or abandoned) transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskCompletion {
    /// `Ok` or the failure that ended the transfer
    pub result: KernelResult<()>,
    /// Bytes moved before the transfer ended
    pub bytes: usize,
    /// Sector contents for reads; empty for writes
    pub data: Vec<u8>,
}

/// In-progress multi-step transfer.
pub struct DiskTransfer {
    request: DiskRequest,
    geometry: DiskGeometry,
    /// Write source, or read destination being filled
    buffer: Vec<u8>,
    /// Sectors completed so far
    done: usize,
    /// Track the head is known to be on
    head: Option<usize>,
    in_flight: Option<StepKind>,
    failure: Option<KernelError>,
}

impl DiskTransfer {
    /// Start a transfer for an already validated request.
    ///
    /// For writes `buffer` holds the source bytes (extra bytes are
    /// ignored); for reads it is ignored and replaced by the sector data.
    pub fn new(request: DiskRequest, geometry: DiskGeometry, mut buffer: Vec<u8>) -> Self {
        match request.op {
            DiskOp::Write => buffer.truncate(request.byte_len(&geometry)),
            DiskOp::Read => {
                buffer.clear();
                buffer.reserve(request.byte_len(&geometry));
            }
        }
        Self {
            request,
            geometry,
            buffer,
            done: 0,
            head: None,
            in_flight: None,
            failure: None,
        }
    }

    /// The request being served
    pub fn request(&self) -> &DiskRequest {
        &self.request
    }

    /// Kind of the step awaiting completion, if any
    pub fn in_flight(&self) -> Option<StepKind> {
        self.in_flight
    }

    /// Plan the next step and mark it in flight. `None` once finished.
    pub fn next_step(&mut self) -> Option<DiskStep> {
        if self.failure.is_some() || self.done >= self.request.sector_count {
            self.in_flight = None;
            return None;
        }

        let base = self.request.track * self.geometry.sectors_per_track + self.request.first_sector;
        let (track, sector) = self.geometry.locate(base + self.done);

        let step = if self.head != Some(track) {
            DiskStep::Seek { track }
        } else {
            match self.request.op {
                DiskOp::Read => DiskStep::Read { sector },
                DiskOp::Write => {
                    let size = self.geometry.sector_size;
                    let offset = self.done * size;
                    DiskStep::Write {
                        sector,
                        data: self.buffer[offset..offset + size].to_vec(),
                    }
                }
            }
        };

        self.in_flight = Some(step.kind());
        Some(step)
    }

    /// Fold a step completion into the transfer.
    ///
    /// A non-zero `status` aborts the remaining steps. A completion whose
    /// kind differs from the step in flight, or a read completion without a
    /// full sector of data, is an invariant violation.
    pub fn complete_step(
        &mut self,
        kind: StepKind,
        status: i32,
        sector: Option<&[u8]>,
    ) -> Result<(), InvariantViolation> {
        let expected = self.in_flight.take().ok_or_else(|| {
            InvariantViolation::new("disk_step_outstanding", alloc::format!("{kind:?} completion with no step in flight"))
        })?;
        if expected != kind {
            return Err(InvariantViolation::new(
                "disk_step_kind",
                alloc::format!("expected {expected:?} completion, got {kind:?}"),
            ));
        }

        if status != 0 {
            self.failure = Some(KernelError::DeviceFailure { status });
            return Ok(());
        }

        match kind {
            StepKind::Seek => {
                let base = self.request.track * self.geometry.sectors_per_track + self.request.first_sector;
                self.head = Some(self.geometry.locate(base + self.done).0);
            }
            StepKind::Read => {
                let data = sector
                    .filter(|d| d.len() == self.geometry.sector_size)
                    .ok_or_else(|| {
                        InvariantViolation::new("disk_read_data", alloc::format!("read completion without a {}-byte sector", self.geometry.sector_size))
                    })?;
                self.buffer.extend_from_slice(data);
                self.done += 1;
            }
            StepKind::Write => self.done += 1,
        }
        Ok(())
    }

    /// Consume the transfer into its completion.
    pub fn finish(self) -> DiskCompletion {
        let bytes = self.done * self.geometry.sector_size;
        let result = match self.failure {
            Some(e) => Err(e),
            None if self.done == self.request.sector_count => Ok(()),
            None => Err(KernelError::Interrupted),
        };
        let data = match self.request.op {
            DiskOp::Read => self.buffer,
            DiskOp::Write => Vec::new(),
        };
        DiskCompletion {
            result,
            bytes,
            data,
        }
    }

    /// Abandon the transfer with `error`.
    pub fn abort(mut self, error: KernelError) -> DiskCompletion {
        self.failure = Some(error);
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn geometry() -> DiskGeometry {
        DiskGeometry {
            sector_size: 4,
            sectors_per_track: 4,
            track_count: 2,
        }
    }

    fn req(op: DiskOp, track: usize, first: usize, count: usize) -> DiskRequest {
        DiskRequest {
            op,
            track,
            first_sector: first,
            sector_count: count,
        }
    }

    /// Drive a transfer to completion with every step succeeding.
    fn run(t: &mut DiskTransfer, sectors: &mut [Vec<u8>]) -> Vec<DiskStep> {
        let mut steps = Vec::new();
        let mut head = 0;
        while let Some(step) = t.next_step() {
            let read;
            let data = match &step {
                DiskStep::Seek { track } => {
                    head = *track;
                    None
                }
                DiskStep::Read { sector } => {
                    read = sectors[head * 4 + sector].clone();
                    Some(read.as_slice())
                }
                DiskStep::Write { sector, data } => {
                    sectors[head * 4 + sector] = data.clone();
                    None
                }
            };
            t.complete_step(step.kind(), 0, data).unwrap();
            steps.push(step);
        }
        steps
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let g = geometry();
        assert!(req(DiskOp::Read, 0, 0, 1).validate(&g, 0).is_ok());
        assert!(req(DiskOp::Read, 1, 3, 1).validate(&g, 0).is_ok());
        assert_eq!(req(DiskOp::Read, 2, 0, 1).validate(&g, 0), Err(KernelError::InvalidArgument));
        assert_eq!(req(DiskOp::Read, 0, 4, 1).validate(&g, 0), Err(KernelError::InvalidArgument));
        assert_eq!(req(DiskOp::Read, 1, 3, 2).validate(&g, 0), Err(KernelError::InvalidArgument));
        assert_eq!(req(DiskOp::Read, 0, 0, 0).validate(&g, 0), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn test_validate_write_buffer_length() {
        let g = geometry();
        assert_eq!(req(DiskOp::Write, 0, 0, 2).validate(&g, 7), Err(KernelError::InvalidArgument));
        assert!(req(DiskOp::Write, 0, 0, 2).validate(&g, 8).is_ok());
        assert!(req(DiskOp::Write, 0, 0, 2).validate(&g, 100).is_ok());
    }

    #[test]
    fn test_single_sector_read_plan() {
        let mut sectors = vec![vec![0u8; 4]; 8];
        sectors[7] = vec![1, 2, 3, 4];
        let mut t = DiskTransfer::new(req(DiskOp::Read, 1, 3, 1), geometry(), Vec::new());
        let steps = run(&mut t, &mut sectors);
        assert_eq!(steps, vec![DiskStep::Seek { track: 1 }, DiskStep::Read { sector: 3 }]);

        let c = t.finish();
        assert_eq!(c.result, Ok(()));
        assert_eq!(c.bytes, 4);
        assert_eq!(c.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_spanning_tracks_reseeks() {
        let mut sectors = vec![vec![0u8; 4]; 8];
        let src: Vec<u8> = (0..12).collect();
        let mut t = DiskTransfer::new(req(DiskOp::Write, 0, 2, 3), geometry(), src);
        let steps = run(&mut t, &mut sectors);
        let kinds: Vec<StepKind> = steps.iter().map(DiskStep::kind).collect();
        assert_eq!(
            kinds,
            vec![StepKind::Seek, StepKind::Write, StepKind::Write, StepKind::Seek, StepKind::Write]
        );
        assert_eq!(steps[3], DiskStep::Seek { track: 1 });
        assert_eq!(sectors[2], vec![0, 1, 2, 3]);
        assert_eq!(sectors[4], vec![8, 9, 10, 11]);

        let c = t.finish();
        assert_eq!(c.result, Ok(()));
        assert_eq!(c.bytes, 12);
        assert!(c.data.is_empty());
    }

    #[test]
    fn test_error_status_aborts_remaining_steps() {
        let mut t = DiskTransfer::new(req(DiskOp::Read, 0, 0, 3), geometry(), Vec::new());
        let seek = t.next_step().unwrap();
        t.complete_step(seek.kind(), 0, None).unwrap();
        let read = t.next_step().unwrap();
        t.complete_step(read.kind(), 0, Some(&[9, 9, 9, 9])).unwrap();
        let read = t.next_step().unwrap();
        t.complete_step(read.kind(), 5, None).unwrap();
        assert_eq!(t.next_step(), None);

        let c = t.finish();
        assert_eq!(c.result, Err(KernelError::DeviceFailure { status: 5 }));
        assert_eq!(c.bytes, 4);
    }

    #[test]
    fn test_mismatched_completion_is_violation() {
        let mut t = DiskTransfer::new(req(DiskOp::Read, 0, 0, 1), geometry(), Vec::new());
        t.next_step();
        let err = t.complete_step(StepKind::Write, 0, None).unwrap_err();
        assert_eq!(err.invariant, "disk_step_kind");
    }

    #[test]
    fn test_completion_without_step_is_violation() {
        let mut t = DiskTransfer::new(req(DiskOp::Read, 0, 0, 1), geometry(), Vec::new());
        let err = t.complete_step(StepKind::Seek, 0, None).unwrap_err();
        assert_eq!(err.invariant, "disk_step_outstanding");
    }

    #[test]
    fn test_abort_reports_error() {
        let t = DiskTransfer::new(req(DiskOp::Write, 0, 0, 1), geometry(), vec![0; 4]);
        let c = t.abort(KernelError::Interrupted);
        assert_eq!(c.result, Err(KernelError::Interrupted));
        assert_eq!(c.bytes, 0);
    }
}
