//! Recording mocks of the pico-miner line traits.
//!
//! Each mock is a cheap handle around `Rc<RefCell<..>>` state so a test can
//! keep a clone for inspection after moving the original into a `Miner`.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use pico_miner_core::config::{Profile, SLOT_SIZE};
use pico_miner_core::Miner;
use pico_miner_hal::{ClockGenLines, PipelineBus, StatusIndicator};

/// Line activity on the pipeline bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    ReadStrobe(bool),
    WriteStart(bool),
    WriteData(u8),
    WriteStrobe(bool),
    Load(bool),
    Hold(bool),
    Latch(bool),
}

#[derive(Default)]
struct BusState {
    events: Vec<BusEvent>,
    /// Result sets presented after successive write-start pulses.
    frames: VecDeque<Vec<u8>>,
    current: Vec<u8>,
    cursor: usize,
    read_strobe: bool,
    write_strobe: bool,
    write_start: bool,
    latch: bool,
    load: bool,
    hold: bool,
    loaded: Vec<u8>,
    snapshots: usize,
}

impl BusState {
    fn snapshot(&mut self) {
        if let Some(frame) = self.frames.pop_front() {
            self.current = frame;
        }
        self.cursor = 0;
        self.snapshots += 1;
    }
}

/// Mock pipeline bus. Presents queued result frames byte by byte, advancing
/// on every read strobe edge, and captures uploaded work.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes presented after the next unconsumed write-start pulse.
    /// The last frame keeps being presented once the queue runs dry.
    pub fn queue_frame(&self, frame: Vec<u8>) {
        self.state.borrow_mut().frames.push_back(frame);
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn loaded_work(&self) -> Vec<u8> {
        self.state.borrow().loaded.clone()
    }

    pub fn hold(&self) -> bool {
        self.state.borrow().hold
    }

    pub fn load(&self) -> bool {
        self.state.borrow().load
    }

    pub fn latch(&self) -> bool {
        self.state.borrow().latch
    }

    /// Number of write-start pulses (or latch assertions) seen.
    pub fn snapshots(&self) -> usize {
        self.state.borrow().snapshots
    }

    pub fn count(&self, event: BusEvent) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| **e == event)
            .count()
    }
}

impl PipelineBus for MockBus {
    fn read_data(&mut self) -> u8 {
        let s = self.state.borrow();
        s.current.get(s.cursor).copied().unwrap_or(0)
    }

    fn set_read_strobe(&mut self, high: bool) {
        let mut s = self.state.borrow_mut();
        s.events.push(BusEvent::ReadStrobe(high));
        if s.read_strobe != high {
            s.read_strobe = high;
            s.cursor += 1;
        }
    }

    fn set_write_start(&mut self, high: bool) {
        let mut s = self.state.borrow_mut();
        s.events.push(BusEvent::WriteStart(high));
        if high && !s.write_start {
            s.snapshot();
        }
        s.write_start = high;
    }

    fn write_data(&mut self, byte: u8) {
        let mut s = self.state.borrow_mut();
        s.events.push(BusEvent::WriteData(byte));
        s.loaded.push(byte);
    }

    fn toggle_write_strobe(&mut self) {
        let mut s = self.state.borrow_mut();
        let level = !s.write_strobe;
        s.write_strobe = level;
        s.events.push(BusEvent::WriteStrobe(level));
    }

    fn set_load(&mut self, high: bool) {
        let mut s = self.state.borrow_mut();
        s.events.push(BusEvent::Load(high));
        if high && !s.load {
            s.loaded.clear();
        }
        s.load = high;
    }

    fn set_hold(&mut self, high: bool) {
        let mut s = self.state.borrow_mut();
        s.events.push(BusEvent::Hold(high));
        s.hold = high;
    }

    fn set_latch(&mut self, high: bool) {
        let mut s = self.state.borrow_mut();
        s.events.push(BusEvent::Latch(high));
        if high && !s.latch {
            s.snapshot();
        }
        s.latch = high;
    }
}

/// One clock-generator line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgEvent {
    Enable(bool),
    Clock(bool),
    Data(bool),
}

/// Mock clock generator lines recording every change.
#[derive(Clone, Default)]
pub struct MockClockGen {
    events: Rc<RefCell<Vec<ProgEvent>>>,
}

impl MockClockGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Replay the recorded lines and return, per PROGEN frame, the data
    /// bits sampled on PROGCLK rising edges, plus the number of rising edges
    /// seen with PROGEN low after each frame.
    pub fn frames(&self) -> Vec<(Vec<bool>, usize)> {
        let mut frames: Vec<(Vec<bool>, usize)> = Vec::new();
        let (mut en, mut clk, mut data) = (false, false, false);
        for event in self.events.borrow().iter() {
            match *event {
                ProgEvent::Enable(high) => {
                    if high && !en {
                        frames.push((Vec::new(), 0));
                    }
                    en = high;
                }
                ProgEvent::Data(high) => data = high,
                ProgEvent::Clock(high) => {
                    if high && !clk {
                        if let Some(frame) = frames.last_mut() {
                            if en {
                                frame.0.push(data);
                            } else {
                                frame.1 += 1;
                            }
                        }
                    }
                    clk = high;
                }
            }
        }
        frames
    }
}

impl ClockGenLines for MockClockGen {
    fn set_prog_enable(&mut self, high: bool) {
        self.events.borrow_mut().push(ProgEvent::Enable(high));
    }

    fn set_prog_clock(&mut self, high: bool) {
        self.events.borrow_mut().push(ProgEvent::Clock(high));
    }

    fn set_prog_data(&mut self, high: bool) {
        self.events.borrow_mut().push(ProgEvent::Data(high));
    }
}

/// Delay that only accumulates the requested time.
#[derive(Clone, Default)]
pub struct MockDelay {
    total_ns: Rc<RefCell<u64>>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_ms(&self) -> u64 {
        *self.total_ns.borrow() / 1_000_000
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.total_ns.borrow_mut() += u64::from(ns);
    }
}

/// Indicator remembering the last shown state.
#[derive(Clone, Default)]
pub struct MockIndicator {
    shown: Rc<RefCell<Option<bool>>>,
}

impl MockIndicator {
    pub fn shown(&self) -> Option<bool> {
        *self.shown.borrow()
    }
}

impl StatusIndicator for MockIndicator {
    fn show_stopped(&mut self, stopped: bool) {
        *self.shown.borrow_mut() = Some(stopped);
    }
}

pub type TestMiner<const P: usize> = Miner<P, MockBus, MockClockGen, MockDelay, MockIndicator>;

/// Handles kept by a test after the mocks moved into the miner.
pub struct Rig<const P: usize> {
    pub miner: TestMiner<P>,
    pub bus: MockBus,
    pub clock: MockClockGen,
    pub delay: MockDelay,
    pub indicator: MockIndicator,
}

pub fn rig<const P: usize>(profile: Profile) -> Rig<P> {
    let bus = MockBus::new();
    let clock = MockClockGen::new();
    let delay = MockDelay::new();
    let indicator = MockIndicator::default();
    let miner = Miner::new(
        profile,
        bus.clone(),
        clock.clone(),
        delay.clone(),
        indicator.clone(),
    );
    Rig {
        miner,
        bus,
        clock,
        delay,
        indicator,
    }
}

/// A slot with the given golden nonce and current nonce, and a hash word
/// whose last two bytes differ (a settled readout).
pub fn slot(golden: u32, nonce: u32) -> [u8; SLOT_SIZE] {
    let mut s = [0u8; SLOT_SIZE];
    s[0..4].copy_from_slice(&golden.to_le_bytes());
    s[4..8].copy_from_slice(&nonce.to_le_bytes());
    s[8..12].copy_from_slice(&0x0201_0000u32.to_le_bytes());
    s
}

/// Concatenate slots into one presented frame.
pub fn frame(slots: &[[u8; SLOT_SIZE]]) -> Vec<u8> {
    slots.iter().flat_map(|s| s.iter().copied()).collect()
}
