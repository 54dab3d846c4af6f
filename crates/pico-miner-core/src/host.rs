//! Vendor control requests on endpoint 0.
//!
//! The USB framework hands every vendor request here; requests that are not
//! ours, or arrive in the wrong direction, are declined with `None` and left
//! for the framework to stall.
//!
//! Host-to-device requests come in two forms. `handle_out` runs one to
//! completion, settle delays included. `begin_out` / `finish_out` split it
//! around its settle wait so a caller sharing the `Miner` under a lock can
//! wait with the lock released.

use embedded_hal::delay::DelayNs;
use pico_miner_hal::{ClockGenLines, PipelineBus, StatusIndicator};

use crate::miner::{Miner, WorkOutcome};

/// Vendor request codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VendorRequest {
    /// Host to device: work payload for the pipelines.
    PushWork = 0x80,
    /// Device to host: result slots.
    ReadResults = 0x81,
    /// Device to host: descriptor record.
    ReportDescriptor = 0x82,
    /// Host to device: multiplier - 1 in the low byte of wValue.
    SetFrequency = 0x83,
}

impl VendorRequest {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x80 => Some(Self::PushWork),
            0x81 => Some(Self::ReadResults),
            0x82 => Some(Self::ReportDescriptor),
            0x83 => Some(Self::SetFrequency),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the request carries a device-to-host data stage.
    pub fn is_device_to_host(self) -> bool {
        matches!(self, Self::ReadResults | Self::ReportDescriptor)
    }
}

/// Effect of an accepted host-to-device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutReply {
    WorkLoaded(WorkOutcome),
    FrequencySet { requested: u8, applied: u8 },
}

/// A host-to-device request whose lines are driven up to its settle wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct PendingOut {
    request: VendorRequest,
    /// Clamped multiplier - 1 of a frequency request.
    applied: u8,
    requested: u8,
    settle_ms: u32,
}

impl PendingOut {
    pub fn request(&self) -> VendorRequest {
        self.request
    }

    /// Time to wait before `finish_out`, 0 for none.
    pub fn settle_ms(&self) -> u32 {
        self.settle_ms
    }
}

impl<const P: usize, B, C, D, L> Miner<P, B, C, D, L>
where
    B: PipelineBus,
    C: ClockGenLines,
    D: DelayNs,
    L: StatusIndicator,
{
    /// Handle a host-to-device vendor request. `value` is wValue, `data` the
    /// data stage.
    pub fn handle_out(&mut self, request: u8, value: u16, data: &[u8]) -> Option<OutReply> {
        let pending = self.begin_out(request, value)?;
        self.settle(pending.settle_ms);
        Some(self.finish_out(pending, data))
    }

    /// Drive a host-to-device request up to its settle wait.
    pub fn begin_out(&mut self, request: u8, value: u16) -> Option<PendingOut> {
        let request = VendorRequest::from_code(request)?;
        let requested = (value & 0xFF) as u8;
        let (applied, settle_ms) = match request {
            VendorRequest::PushWork => (0, self.begin_push_work()),
            VendorRequest::SetFrequency => self.begin_set_frequency(requested),
            VendorRequest::ReadResults | VendorRequest::ReportDescriptor => return None,
        };
        Some(PendingOut {
            request,
            applied,
            requested,
            settle_ms,
        })
    }

    /// Complete a request started with `begin_out` once its settle time has
    /// passed. `data` is the data stage.
    pub fn finish_out(&mut self, pending: PendingOut, data: &[u8]) -> OutReply {
        match pending.request {
            VendorRequest::SetFrequency => {
                self.finish_set_frequency();
                OutReply::FrequencySet {
                    requested: pending.requested,
                    applied: pending.applied,
                }
            }
            _ => OutReply::WorkLoaded(self.finish_push_work(data)),
        }
    }

    /// Handle a device-to-host vendor request of `length` bytes (wLength).
    /// Returns the number of bytes placed in `out`.
    pub fn handle_in(&mut self, request: u8, length: u16, out: &mut [u8]) -> Option<usize> {
        let requested = usize::from(length);
        match VendorRequest::from_code(request)? {
            VendorRequest::ReadResults => Some(self.read_results(out, requested)),
            VendorRequest::ReportDescriptor => Some(self.report_descriptor(out, requested)),
            VendorRequest::PushWork | VendorRequest::SetFrequency => None,
        }
    }
}
