//! Software model of the FPGA side: hash pipelines behind the parallel bus
//! and the serially programmed clock generator, running on simulated time.
//!
//! Time only advances through the `DelayNs` handle, so a run is fully
//! deterministic for a given work payload. Golden nonces are drawn from a
//! seeded gap sequence instead of real double-SHA256 hashing.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use pico_miner_core::clkgen::{LOAD_DIVIDER, LOAD_MULTIPLIER};
use pico_miner_core::config::{Profile, MAX_WORK_SIZE, SLOT_SIZE};
use pico_miner_hal::{ClockGenLines, PipelineBus};

/// Unit of `Profile::freq_m1`.
const FREQ_UNIT_HZ: u64 = 10_000;

/// `Profile::hashes_per_clock` is given in 1/128 hash units.
const HPC_UNIT: u64 = 128;

const NS_PER_S: u128 = 1_000_000_000;

/// Knobs of the emulated hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorOptions {
    /// A golden nonce turns up every 2^bits hashes on average (1..=32).
    pub difficulty_bits: u8,
    /// Sleep for every simulated delay.
    pub realtime: bool,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            difficulty_bits: 26,
            realtime: false,
        }
    }
}

/// splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn work_seed(work: &[u8]) -> u64 {
    work.iter()
        .fold(0xCBF2_9CE4_8422_2325u64, |h, b| (h ^ u64::from(*b)).wrapping_mul(0x0100_0000_01B3))
}

#[derive(Debug, Clone, Default)]
struct Pipeline {
    /// First nonce of this pipeline's share of the nonce space.
    start: u32,
    hashed: u64,
    golden: Option<u32>,
    /// Hash count at which the next golden nonce is hit.
    next_golden: u64,
    found: u64,
}

impl Pipeline {
    fn new(index: usize, pipes: usize, seed: u64, mean: u64) -> Self {
        let share = (1u64 << 32) / pipes as u64;
        let mut pipe = Self {
            start: (share * index as u64) as u32,
            ..Self::default()
        };
        pipe.next_golden = pipe.gap(seed, index, mean);
        pipe
    }

    fn gap(&self, seed: u64, index: usize, mean: u64) -> u64 {
        1 + mix(seed ^ ((index as u64) << 48) ^ self.found) % (2 * mean)
    }

    fn nonce(&self) -> u32 {
        self.start.wrapping_add(self.hashed as u32)
    }

    fn advance(&mut self, hashes: u64, seed: u64, index: usize, mean: u64, log: &mut Vec<u32>) {
        let end = self.hashed + hashes;
        while self.next_golden < end {
            let golden = self.start.wrapping_add(self.next_golden as u32);
            self.golden = Some(golden);
            self.found += 1;
            log.push(golden);
            self.next_golden += self.gap(seed, index, mean);
        }
        self.hashed = end;
    }
}

/// Receiving end of the clock generator's serial interface.
#[derive(Debug, Default)]
struct ClockDecoder {
    enable: bool,
    clock: bool,
    data: bool,
    bits: Vec<bool>,
    divider: Option<u8>,
    pending: Option<u8>,
    applied: Option<u8>,
}

impl ClockDecoder {
    fn set_enable(&mut self, high: bool) {
        if high && !self.enable {
            self.bits.clear();
        }
        if !high && self.enable {
            self.end_frame();
        }
        self.enable = high;
    }

    fn set_clock(&mut self, high: bool) {
        if high && !self.clock && self.enable {
            self.bits.push(self.data);
        }
        self.clock = high;
    }

    fn end_frame(&mut self) {
        let bits = std::mem::take(&mut self.bits);
        if bits == [false] {
            if let Some(m1) = self.pending.take() {
                log::debug!("clock generator: multiplier {} applied", u16::from(m1) + 1);
                self.applied = Some(m1);
            }
            return;
        }
        if bits.len() != 10 {
            log::warn!("clock generator: dropped {}-bit frame", bits.len());
            return;
        }

        let value = bits[2..]
            .iter()
            .enumerate()
            .fold(0u8, |v, (i, bit)| v | (u8::from(*bit) << i));
        let opcode = [bits[0], bits[1]];
        if opcode == LOAD_DIVIDER {
            self.divider = Some(value);
        } else if opcode == LOAD_MULTIPLIER {
            self.pending = Some(value);
        } else {
            log::warn!("clock generator: unknown opcode {:?}", opcode);
        }
    }
}

struct FpgaState {
    profile: Profile,
    options: EmulatorOptions,
    clock: ClockDecoder,
    pipes: Vec<Pipeline>,
    seed: u64,
    work: Vec<u8>,
    upload: Vec<u8>,
    write_byte: u8,
    load: bool,
    hold: bool,
    latch: bool,
    write_start: bool,
    read_strobe: bool,
    output: Vec<u8>,
    cursor: usize,
    now_ns: u64,
    carry: u128,
    snapshots: u64,
    goldens: Vec<u32>,
}

impl FpgaState {
    fn mean_gap(&self) -> u64 {
        1u64 << self.options.difficulty_bits.clamp(1, 32)
    }

    fn running(&self) -> bool {
        !self.work.is_empty()
            && self.clock.applied.is_some()
            && !(self.profile.run_gate && self.hold)
    }

    /// Hashes per second of one pipeline.
    fn hash_rate(&self) -> u64 {
        let Some(m1) = self.clock.applied else {
            return 0;
        };
        let hpc = self.profile.hashes_per_clock.map_or(HPC_UNIT, u64::from);
        u64::from(self.profile.freq_m1) * FREQ_UNIT_HZ * (u64::from(m1) + 1) * hpc / HPC_UNIT
    }

    fn advance(&mut self, ns: u64) {
        self.now_ns += ns;
        if !self.running() {
            return;
        }
        self.carry += u128::from(ns) * u128::from(self.hash_rate());
        let hashes = (self.carry / NS_PER_S) as u64;
        self.carry %= NS_PER_S;

        let (seed, mean) = (self.seed, self.mean_gap());
        for (index, pipe) in self.pipes.iter_mut().enumerate() {
            pipe.advance(hashes, seed, index, mean, &mut self.goldens);
        }
    }

    fn start_work(&mut self) {
        self.work = std::mem::take(&mut self.upload);
        self.seed = work_seed(&self.work);
        self.carry = 0;
        let (pipes, seed, mean) = (self.pipes.len(), self.seed, self.mean_gap());
        for (index, pipe) in self.pipes.iter_mut().enumerate() {
            *pipe = Pipeline::new(index, pipes, seed, mean);
        }
        log::debug!("fpga: new work, {} bytes, seed {:016x}", self.work.len(), self.seed);
    }

    fn snapshot(&mut self) {
        let offset = self.profile.nonce_offset as i32 as u32;
        self.output.clear();
        for pipe in &self.pipes {
            let golden = pipe.golden.map_or(0, |g| g.wrapping_add(offset));
            let nonce = pipe.nonce();
            let hash7 = mix(self.seed ^ u64::from(nonce)) as u32;
            self.output.extend_from_slice(&golden.to_le_bytes());
            self.output.extend_from_slice(&nonce.wrapping_add(offset).to_le_bytes());
            self.output.extend_from_slice(&hash7.to_le_bytes());
        }
        debug_assert_eq!(self.output.len(), self.pipes.len() * SLOT_SIZE);
        self.cursor = 0;
        self.snapshots += 1;
    }
}

/// The emulated FPGA. Hand out line handles to the controller and inspect
/// the hardware side through the accessors.
#[derive(Clone)]
pub struct EmulatedFpga {
    state: Rc<RefCell<FpgaState>>,
}

impl EmulatedFpga {
    pub fn new(profile: Profile, pipes: usize, options: EmulatorOptions) -> Self {
        let state = FpgaState {
            profile,
            options,
            clock: ClockDecoder::default(),
            pipes: vec![Pipeline::default(); pipes],
            seed: 0,
            work: Vec::new(),
            upload: Vec::new(),
            write_byte: 0,
            load: false,
            hold: false,
            latch: false,
            write_start: false,
            read_strobe: false,
            output: vec![0; pipes * SLOT_SIZE],
            cursor: 0,
            now_ns: 0,
            carry: 0,
            snapshots: 0,
            goldens: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn bus(&self) -> EmuBus {
        EmuBus(self.state.clone())
    }

    pub fn clock_lines(&self) -> EmuClockGen {
        EmuClockGen(self.state.clone())
    }

    pub fn delay(&self) -> EmuDelay {
        EmuDelay(self.state.clone())
    }

    /// Multiplier - 1 the clock generator currently runs at.
    pub fn multiplier(&self) -> Option<u8> {
        self.state.borrow().clock.applied
    }

    pub fn divider(&self) -> Option<u8> {
        self.state.borrow().clock.divider
    }

    pub fn hold(&self) -> bool {
        self.state.borrow().hold
    }

    pub fn is_hashing(&self) -> bool {
        self.state.borrow().running()
    }

    pub fn work(&self) -> Vec<u8> {
        self.state.borrow().work.clone()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.state.borrow().now_ns)
    }

    /// Hashes computed by all pipelines on the current work.
    pub fn hashes(&self) -> u64 {
        self.state.borrow().pipes.iter().map(|p| p.hashed).sum()
    }

    /// Every golden nonce found so far, in order.
    pub fn goldens(&self) -> Vec<u32> {
        self.state.borrow().goldens.clone()
    }

    /// Result snapshots taken (write-start pulses and latches).
    pub fn snapshots(&self) -> u64 {
        self.state.borrow().snapshots
    }
}

pub struct EmuBus(Rc<RefCell<FpgaState>>);

impl PipelineBus for EmuBus {
    fn read_data(&mut self) -> u8 {
        let s = self.0.borrow();
        s.output.get(s.cursor).copied().unwrap_or(0)
    }

    fn set_read_strobe(&mut self, high: bool) {
        let mut s = self.0.borrow_mut();
        if s.read_strobe != high {
            s.read_strobe = high;
            s.cursor += 1;
        }
    }

    fn set_write_start(&mut self, high: bool) {
        let mut s = self.0.borrow_mut();
        if high && !s.write_start {
            s.snapshot();
        }
        s.write_start = high;
    }

    fn write_data(&mut self, byte: u8) {
        self.0.borrow_mut().write_byte = byte;
    }

    fn toggle_write_strobe(&mut self) {
        let mut s = self.0.borrow_mut();
        if s.load && s.upload.len() < MAX_WORK_SIZE {
            let byte = s.write_byte;
            s.upload.push(byte);
        }
    }

    fn set_load(&mut self, high: bool) {
        let mut s = self.0.borrow_mut();
        if high && !s.load {
            s.upload.clear();
        }
        if !high && s.load && !s.upload.is_empty() {
            s.start_work();
        }
        s.load = high;
    }

    fn set_hold(&mut self, high: bool) {
        self.0.borrow_mut().hold = high;
    }

    fn set_latch(&mut self, high: bool) {
        let mut s = self.0.borrow_mut();
        if high && !s.latch {
            s.snapshot();
        }
        s.latch = high;
    }
}

pub struct EmuClockGen(Rc<RefCell<FpgaState>>);

impl ClockGenLines for EmuClockGen {
    fn set_prog_enable(&mut self, high: bool) {
        self.0.borrow_mut().clock.set_enable(high);
    }

    fn set_prog_clock(&mut self, high: bool) {
        self.0.borrow_mut().clock.set_clock(high);
    }

    fn set_prog_data(&mut self, high: bool) {
        self.0.borrow_mut().clock.data = high;
    }
}

/// Advances simulated time; sleeps as well in real-time mode.
pub struct EmuDelay(Rc<RefCell<FpgaState>>);

impl DelayNs for EmuDelay {
    fn delay_ns(&mut self, ns: u32) {
        let realtime = {
            let mut s = self.0.borrow_mut();
            s.advance(u64::from(ns));
            s.options.realtime
        };
        if realtime {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }
    }
}
