//! Vendor class on endpoint 0.
//!
//! Runs inside the USB interrupt. Every vendor request addressed to the
//! device is forwarded to the shared `Miner`; anything it declines is stalled.
//! Settle waits of host-to-device requests run with the `Miner` unlocked.

use defmt::*;
use embedded_hal::delay::DelayNs;
use pico_miner_core::host::{OutReply, VendorRequest};
use pico_miner_core::WorkOutcome;
use rp235x_hal::timer::{CopyableTimer0, Timer};
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};

use crate::board::CONTROL_BUF_SIZE;
use crate::MINER;

pub struct MinerClass {
    iface: InterfaceNumber,
    timer: Timer<CopyableTimer0>,
}

impl MinerClass {
    pub fn new<B: UsbBus>(alloc: &UsbBusAllocator<B>, timer: Timer<CopyableTimer0>) -> Self {
        Self {
            iface: alloc.interface(),
            timer,
        }
    }

    fn is_ours(req: &Request) -> bool {
        req.request_type == RequestType::Vendor && req.recipient == Recipient::Device
    }
}

impl<B: UsbBus> UsbClass<B> for MinerClass {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        writer.interface(self.iface, 0xFF, 0x00, 0x00)
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        if !Self::is_ours(&req) {
            return;
        }

        let pending = critical_section::with(|cs| {
            MINER
                .borrow_ref_mut(cs)
                .as_mut()
                .and_then(|miner| miner.begin_out(req.request, req.value))
        });
        let Some(pending) = pending else {
            debug!("vendor OUT 0x{:02x} rejected", req.request);
            xfer.reject().ok();
            return;
        };

        if pending.settle_ms() > 0 {
            self.timer.delay_ms(pending.settle_ms());
        }

        let reply = critical_section::with(|cs| {
            MINER
                .borrow_ref_mut(cs)
                .as_mut()
                .map(|miner| miner.finish_out(pending, xfer.data()))
        });

        match reply {
            Some(OutReply::WorkLoaded(WorkOutcome { bytes, resumed })) => {
                debug!("push work: {} bytes", bytes);
                if resumed {
                    info!("pipelines resumed");
                }
                xfer.accept().ok();
            }
            Some(OutReply::FrequencySet { requested, applied }) => {
                info!(
                    "multiplier set to {} (requested {})",
                    u16::from(applied) + 1,
                    u16::from(requested) + 1
                );
                xfer.accept().ok();
            }
            None => {
                xfer.reject().ok();
            }
        }
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        if !Self::is_ours(&req) {
            return;
        }

        let mut buf = [0u8; CONTROL_BUF_SIZE];
        let written = critical_section::with(|cs| {
            MINER
                .borrow_ref_mut(cs)
                .as_mut()
                .and_then(|miner| miner.handle_in(req.request, req.length, &mut buf))
        });

        match written {
            Some(n) => {
                if VendorRequest::from_code(req.request) == Some(VendorRequest::ReportDescriptor) {
                    debug!("descriptor: {} bytes", n);
                } else {
                    trace!("results: {} bytes", n);
                }
                xfer.accept_with(&buf[..n]).ok();
            }
            None => {
                debug!("vendor IN 0x{:02x} rejected", req.request);
                xfer.reject().ok();
            }
        }
    }
}
