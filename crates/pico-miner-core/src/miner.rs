//! The device record and the control loop step.
//!
//! `Miner` owns every piece of mutable device state: the pipeline bus, the
//! clock generator, both result buffers, the watchdog and the FPGA
//! configuration flag. The firmware keeps it in a single critical-section
//! cell shared between the tick loop and the USB interrupt.

use embedded_hal::delay::DelayNs;
use pico_miner_hal::{ClockGenLines, PipelineBus, StatusIndicator};

use crate::clkgen::ClockSynth;
use crate::config::{
    Profile, ResultPath, FPGA_SETTLE_MS, FREQ_SETTLE_MS, MAX_WORK_SIZE,
    TICK_MS, UNGATE_SETTLE_MS,
};
use crate::descriptor::DeviceDescriptor;
use crate::nonce::{Harvest, NonceBuffers};
use crate::watchdog::{Watchdog, WatchdogEvent};

/// Result of a work push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkOutcome {
    /// Payload bytes streamed to the pipelines.
    pub bytes: usize,
    /// The pipelines were stopped and have been restarted.
    pub resumed: bool,
}

/// What happened during one control loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// `None` when harvesting was skipped (stopped, unconfigured or direct path).
    pub harvest: Option<Harvest>,
    pub watchdog: WatchdogEvent,
}

/// Controller for `P` hash pipelines.
pub struct Miner<const P: usize, B, C, D, L = ()>
where
    B: PipelineBus,
    C: ClockGenLines,
    D: DelayNs,
    L: StatusIndicator,
{
    profile: Profile,
    bus: B,
    clkgen: ClockSynth<C>,
    delay: D,
    indicator: L,
    buffers: NonceBuffers<P>,
    watchdog: Watchdog,
    descriptor: DeviceDescriptor,
    configured: bool,
}

impl<const P: usize, B, C, D, L> Miner<P, B, C, D, L>
where
    B: PipelineBus,
    C: ClockGenLines,
    D: DelayNs,
    L: StatusIndicator,
{
    /// Create the controller in its power-on state: FPGA not configured,
    /// watchdog stopped, buffers zeroed. Nothing is driven on the lines.
    pub fn new(profile: Profile, bus: B, clock_lines: C, delay: D, indicator: L) -> Self {
        Self {
            clkgen: ClockSynth::new(clock_lines, &profile),
            descriptor: DeviceDescriptor::new(&profile, P),
            profile,
            bus,
            delay,
            indicator,
            buffers: NonceBuffers::new(),
            watchdog: Watchdog::default(),
            configured: false,
        }
    }

    /// Replace the watchdog timeout (in ticks).
    pub fn with_watchdog_timeout(mut self, ticks: u16) -> Self {
        self.watchdog = Watchdog::new(ticks);
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn buffers(&self) -> &NonceBuffers<P> {
        &self.buffers
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn clock_lines(&self) -> &C {
        self.clkgen.lines()
    }

    /// Currently programmed multiplier - 1.
    pub fn multiplier(&self) -> Option<u8> {
        self.clkgen.applied()
    }

    pub fn is_stopped(&self) -> bool {
        self.watchdog.is_stopped()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// The FPGA is about to be reconfigured: stop harvesting and gate the clock.
    pub fn fpga_reset(&mut self) {
        self.configured = false;
        if self.profile.run_gate {
            self.bus.set_hold(true);
        }
    }

    /// The FPGA finished configuration. Pipelines stay gated and stopped
    /// until the host pushes work; the clock generator starts at its lowest
    /// multiplier. Returns the programmed value.
    pub fn fpga_configured(&mut self) -> u8 {
        if self.profile.run_gate {
            self.bus.set_hold(true);
        }
        self.watchdog.stop();
        self.delay.delay_ms(FPGA_SETTLE_MS);

        let applied = self.clkgen.set_frequency(0);
        self.configured = true;
        applied
    }

    /// Load a new job into the pipelines.
    ///
    /// Both result buffers are cleared so slots from the previous job never
    /// reach the host. At most `MAX_WORK_SIZE` bytes are streamed.
    pub fn push_work(&mut self, payload: &[u8]) -> WorkOutcome {
        let settle_ms = self.begin_push_work();
        self.settle(settle_ms);
        self.finish_push_work(payload)
    }

    /// First half of `push_work`: release the clock gate of a stopped board.
    /// Returns the time to wait before `finish_push_work`, 0 for none.
    pub fn begin_push_work(&mut self) -> u32 {
        if self.watchdog.is_stopped() && self.profile.run_gate {
            self.bus.set_hold(false);
            UNGATE_SETTLE_MS
        } else {
            0
        }
    }

    /// Second half of `push_work`: restart the watchdog and stream the job.
    pub fn finish_push_work(&mut self, payload: &[u8]) -> WorkOutcome {
        let resumed = self.watchdog.resume();
        self.watchdog.feed();

        self.buffers.clear();

        let payload = &payload[..payload.len().min(MAX_WORK_SIZE)];
        self.bus.set_load(true);
        for &byte in payload {
            self.bus.write_data(byte);
            self.bus.toggle_write_strobe();
        }
        self.bus.set_load(false);

        WorkOutcome {
            bytes: payload.len(),
            resumed,
        }
    }

    /// Copy up to `requested` result bytes into `out`.
    pub fn read_results(&mut self, out: &mut [u8], requested: usize) -> usize {
        if self.profile.run_gate {
            self.watchdog.feed();
        }

        let n = requested.min(out.len()).min(self.profile.result_region_size(P));
        match self.profile.result_path {
            ResultPath::Buffered => self.buffers.copy_out(&mut out[..n]),
            ResultPath::Direct => {
                self.bus.set_latch(true);
                let mut strobe = false;
                for byte in &mut out[..n] {
                    *byte = self.bus.read_data();
                    strobe = !strobe;
                    self.bus.set_read_strobe(strobe);
                }
                self.bus.set_latch(false);
                n
            }
        }
    }

    /// Copy up to `requested` descriptor bytes into `out`.
    pub fn report_descriptor(&self, out: &mut [u8], requested: usize) -> usize {
        self.descriptor.copy_to(out, requested)
    }

    /// Reprogram the pipeline clock. Returns the applied multiplier - 1.
    pub fn set_frequency(&mut self, requested: u8) -> u8 {
        let (applied, settle_ms) = self.begin_set_frequency(requested);
        self.settle(settle_ms);
        self.finish_set_frequency();
        applied
    }

    /// First half of `set_frequency`: hold gated pipelines in reset and
    /// program the clock generator. Returns the applied value and the time
    /// to wait before `finish_set_frequency`, 0 for none.
    pub fn begin_set_frequency(&mut self, requested: u8) -> (u8, u32) {
        if self.profile.run_gate {
            self.bus.set_hold(true);
        }
        let applied = self.clkgen.set_frequency(requested);
        let settle_ms = if self.profile.run_gate { FREQ_SETTLE_MS } else { 0 };
        (applied, settle_ms)
    }

    /// Second half of `set_frequency`: release the reset and restart.
    pub fn finish_set_frequency(&mut self) {
        if self.profile.run_gate {
            self.bus.set_hold(false);
        }
        self.watchdog.resume();
        self.watchdog.feed();
    }

    /// Wait `ms` on the miner's own delay; nothing for 0.
    pub(crate) fn settle(&mut self, ms: u32) {
        if ms > 0 {
            self.delay.delay_ms(ms);
        }
    }

    /// Harvest the pipelines' result slots if the device is running.
    ///
    /// Callers on hardware with an asynchronous host path must hold it off
    /// for the duration of this call.
    pub fn harvest(&mut self) -> Option<Harvest> {
        if !self.configured
            || self.watchdog.is_stopped()
            || self.profile.result_path == ResultPath::Direct
        {
            return None;
        }
        Some(self.buffers.harvest(&mut self.bus))
    }

    /// Advance the watchdog and halt the pipelines on expiry.
    pub fn tick_watchdog(&mut self) -> WatchdogEvent {
        let event = self.watchdog.tick();
        if event == WatchdogEvent::Expired && self.profile.run_gate {
            self.bus.set_hold(true);
        }
        self.indicator.show_stopped(self.watchdog.is_stopped());
        event
    }

    /// One tick without the leading wait.
    pub fn tick(&mut self) -> TickReport {
        let harvest = self.harvest();
        let watchdog = self.tick_watchdog();
        TickReport { harvest, watchdog }
    }

    /// One full control loop iteration: wait `TICK_MS`, then tick.
    pub fn run_once(&mut self) -> TickReport {
        self.delay.delay_ms(TICK_MS);
        self.tick()
    }
}
