//! Bit-serial programming of the pipelines' clock generator.
//!
//! The generator takes two load commands (divider, then multiplier) followed
//! by a go strobe. Each command is framed by PROGEN, carries a two-bit opcode
//! and an eight-bit value, both shifted LSB first on PROGCLK rising edges.

use pico_miner_hal::ClockGenLines;

use crate::config::Profile;

/// Opcode bits of the divider load command.
pub const LOAD_DIVIDER: [bool; 2] = [true, false];

/// Opcode bits of the multiplier load command.
pub const LOAD_MULTIPLIER: [bool; 2] = [true, true];

/// Divider register value (divider - 1), fixed for every board.
pub const DIVIDER_M1: u8 = 5;

/// Clock pulses issued with PROGEN low after each command.
pub const IDLE_PULSES: usize = 3;

/// Clamp a host request into the range the profile allows. Lower bound
/// first, then upper bound: an inverted range resolves to the upper bound.
pub fn clamp_multiplier(profile: &Profile, requested: u8) -> u8 {
    requested.max(profile.min_m1()).min(profile.max_m1())
}

/// Drives the clock generator and remembers the last applied multiplier.
pub struct ClockSynth<C: ClockGenLines> {
    lines: C,
    profile: Profile,
    applied: Option<u8>,
}

impl<C: ClockGenLines> ClockSynth<C> {
    pub fn new(lines: C, profile: &Profile) -> Self {
        Self {
            lines,
            profile: *profile,
            applied: None,
        }
    }

    /// Program the multiplier (multiplier - 1). Out-of-range requests are
    /// clamped; the applied value is returned.
    pub fn set_frequency(&mut self, requested: u8) -> u8 {
        let m1 = clamp_multiplier(&self.profile, requested);

        self.load(LOAD_DIVIDER, DIVIDER_M1);
        self.load(LOAD_MULTIPLIER, m1);
        self.go();

        self.applied = Some(m1);
        m1
    }

    /// Last programmed value, `None` until the first `set_frequency`.
    pub fn applied(&self) -> Option<u8> {
        self.applied
    }

    /// Access the underlying lines (tests and board bring-up).
    pub fn lines(&self) -> &C {
        &self.lines
    }

    fn load(&mut self, opcode: [bool; 2], value: u8) {
        self.lines.set_prog_enable(true);
        for bit in opcode {
            self.shift(bit);
        }
        for i in 0..8 {
            self.shift((value >> i) & 1 != 0);
        }
        self.lines.set_prog_enable(false);
        self.idle();
    }

    fn go(&mut self) {
        self.lines.set_prog_data(false);
        self.lines.set_prog_enable(true);
        self.pulse();
        self.lines.set_prog_enable(false);
        self.idle();
    }

    fn shift(&mut self, bit: bool) {
        self.lines.set_prog_data(bit);
        self.pulse();
    }

    fn pulse(&mut self) {
        self.lines.set_prog_clock(true);
        self.lines.set_prog_clock(false);
    }

    fn idle(&mut self) {
        for _ in 0..IDLE_PULSES {
            self.pulse();
        }
    }
}
