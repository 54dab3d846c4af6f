//! RP2350 GPIO ports: implements PipelineBus, ClockGenLines and
//! StatusIndicator for rp235x-hal pins.

use embedded_hal::digital::{InputPin, OutputPin, PinState, StatefulOutputPin};
use pico_miner_hal::{ClockGenLines, PipelineBus, StatusIndicator};
use rp235x_hal as hal;

use hal::gpio::{DynPinId, FunctionSioInput, FunctionSioOutput, Pin, PullDown};

use crate::board::{BUS_SETTLE_CYCLES, PROGCLK_HALF_PERIOD_CYCLES};

pub type InPin = Pin<DynPinId, FunctionSioInput, PullDown>;
pub type OutPin = Pin<DynPinId, FunctionSioOutput, PullDown>;

/// SIO pin writes cannot fail.
fn drive(pin: &mut OutPin, high: bool) {
    let _ = pin.set_state(PinState::from(high));
}

fn settle() {
    cortex_m::asm::delay(BUS_SETTLE_CYCLES);
}

/// Parallel interface to the hash pipelines.
pub struct GpioBus {
    pub read_bus: [InPin; 8],
    pub write_bus: [OutPin; 8],
    pub read_strobe: OutPin,
    pub write_start: OutPin,
    pub write_strobe: OutPin,
    pub load: OutPin,
    pub hold: OutPin,
    pub latch: OutPin,
}

impl PipelineBus for GpioBus {
    fn read_data(&mut self) -> u8 {
        self.read_bus
            .iter_mut()
            .enumerate()
            .fold(0, |byte, (bit, pin)| {
                if pin.is_high().unwrap_or(false) {
                    byte | (1 << bit)
                } else {
                    byte
                }
            })
    }

    fn set_read_strobe(&mut self, high: bool) {
        drive(&mut self.read_strobe, high);
        settle();
    }

    fn set_write_start(&mut self, high: bool) {
        drive(&mut self.write_start, high);
        settle();
    }

    fn write_data(&mut self, byte: u8) {
        for (bit, pin) in self.write_bus.iter_mut().enumerate() {
            drive(pin, (byte >> bit) & 1 != 0);
        }
    }

    fn toggle_write_strobe(&mut self) {
        let _ = self.write_strobe.toggle();
        settle();
    }

    fn set_load(&mut self, high: bool) {
        drive(&mut self.load, high);
    }

    fn set_hold(&mut self, high: bool) {
        drive(&mut self.hold, high);
    }

    fn set_latch(&mut self, high: bool) {
        drive(&mut self.latch, high);
        settle();
    }
}

/// Serial programming lines of the pipeline clock generator.
pub struct GpioClockGen {
    pub enable: OutPin,
    pub clock: OutPin,
    pub data: OutPin,
}

impl ClockGenLines for GpioClockGen {
    fn set_prog_enable(&mut self, high: bool) {
        drive(&mut self.enable, high);
    }

    fn set_prog_clock(&mut self, high: bool) {
        drive(&mut self.clock, high);
        cortex_m::asm::delay(PROGCLK_HALF_PERIOD_CYCLES);
    }

    fn set_prog_data(&mut self, high: bool) {
        drive(&mut self.data, high);
    }
}

/// On-board LED, lit while the pipelines run.
pub struct Led(pub OutPin);

impl StatusIndicator for Led {
    fn show_stopped(&mut self, stopped: bool) {
        drive(&mut self.0, !stopped);
    }
}
