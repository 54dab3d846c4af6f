//! Ping-pong result buffers and the per-tick harvest protocol.
//!
//! Two buffers of one slot per pipeline are kept. Each harvest fills one of
//! them from the pipelines while the other keeps the previous tick's slots,
//! then the roles swap. The host always sees both, in memory order, so every
//! pipeline exposes two slots.

use pico_miner_hal::PipelineBus;

use crate::config::{GOLDEN_NONCE_SIZE, MAX_HARVEST_PASSES, SLOT_SIZE};

/// One pipeline's result record: golden nonce, current nonce, hash word 7.
pub type ResultSlot = [u8; SLOT_SIZE];

/// One slot per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultBuffer<const P: usize> {
    slots: [ResultSlot; P],
}

impl<const P: usize> Default for ResultBuffer<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const P: usize> ResultBuffer<P> {
    pub const fn new() -> Self {
        Self {
            slots: [[0; SLOT_SIZE]; P],
        }
    }

    pub fn slot(&self, pipe: usize) -> &ResultSlot {
        &self.slots[pipe]
    }

    pub fn slots(&self) -> &[ResultSlot; P] {
        &self.slots
    }

    /// Last two bytes of the last slot. Equal values mean the pipelines had
    /// not finished presenting the result set when it was read.
    fn trailer_matches(&self) -> bool {
        match self.slots.last() {
            Some(last) => last[SLOT_SIZE - 2] == last[SLOT_SIZE - 1],
            None => false,
        }
    }
}

/// Outcome of one harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Harvest {
    /// Readout passes performed, `1..=MAX_HARVEST_PASSES`.
    pub passes: u8,
    /// The final pass ended on differing trailer bytes.
    pub settled: bool,
    /// Golden nonces carried over into the stable buffer.
    pub preserved: u8,
}

/// The two result buffers and which one the next harvest fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceBuffers<const P: usize> {
    buffers: [ResultBuffer<P>; 2],
    filling: usize,
}

impl<const P: usize> Default for NonceBuffers<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const P: usize> NonceBuffers<P> {
    pub const fn new() -> Self {
        Self {
            buffers: [ResultBuffer::new(), ResultBuffer::new()],
            filling: 0,
        }
    }

    /// Index of the buffer the next harvest writes.
    pub fn filling(&self) -> usize {
        self.filling
    }

    /// Index of the buffer holding the previous harvest.
    pub fn stable(&self) -> usize {
        self.filling ^ 1
    }

    pub fn buffer(&self, index: usize) -> &ResultBuffer<P> {
        &self.buffers[index]
    }

    /// Exchange the roles of the two buffers. Contents are untouched.
    pub fn swap(&mut self) {
        self.filling ^= 1;
    }

    /// Zero every slot of both buffers.
    pub fn clear(&mut self) {
        self.buffers = [ResultBuffer::new(), ResultBuffer::new()];
    }

    /// Copy both buffers, buffer 0 first, into `out`. Returns the number of
    /// bytes written, bounded by `out.len()`.
    pub fn copy_out(&self, out: &mut [u8]) -> usize {
        let bytes = self
            .buffers
            .iter()
            .flat_map(|buffer| buffer.slots.iter())
            .flat_map(|slot| slot.iter());

        let mut written = 0;
        for (dst, src) in out.iter_mut().zip(bytes) {
            *dst = *src;
            written += 1;
        }
        written
    }

    /// Read a fresh result set from the pipelines and swap the buffers.
    ///
    /// Must run with the host command path masked: a work push in the middle
    /// would clear slots that are being filled.
    pub fn harvest<B: PipelineBus>(&mut self, bus: &mut B) -> Harvest {
        let mut passes = 0;
        let mut preserved: u8 = 0;

        loop {
            bus.set_read_strobe(false);
            bus.set_write_start(true);
            bus.set_write_start(false);

            preserved = preserved.saturating_add(self.read_pass(bus));
            passes += 1;

            if passes >= MAX_HARVEST_PASSES || !self.buffers[self.filling].trailer_matches() {
                break;
            }
        }

        let settled = !self.buffers[self.filling].trailer_matches();
        self.swap();

        Harvest {
            passes,
            settled,
            preserved,
        }
    }

    fn read_pass<B: PipelineBus>(&mut self, bus: &mut B) -> u8 {
        let [first, second] = &mut self.buffers;
        let (fill, other) = if self.filling == 0 {
            (first, second)
        } else {
            (second, first)
        };

        let mut preserved = 0;
        for (fill, other) in fill.slots.iter_mut().zip(other.slots.iter_mut()) {
            // A golden nonce that changed on the last tick and is still on the
            // bus would otherwise push the one before it out of both buffers.
            if fill[0] != other[0] && other[0] == bus.read_data() {
                other[..GOLDEN_NONCE_SIZE].copy_from_slice(&fill[..GOLDEN_NONCE_SIZE]);
                preserved += 1;
            }

            for pair in fill.chunks_exact_mut(2) {
                pair[0] = bus.read_data();
                bus.set_read_strobe(true);
                pair[1] = bus.read_data();
                bus.set_read_strobe(false);
            }
        }
        preserved
    }
}
