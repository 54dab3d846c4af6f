//! The vendor protocol as the mining software on the host sees it.

use std::collections::VecDeque;

use pico_miner_core::config::{NONCE_OFFSET_BIAS, SLOT_SIZE};
use pico_miner_core::descriptor::{HEADER_V2, HEADER_V3};

use crate::error::SimError;

/// Decoded device descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub version: u8,
    /// Host-visible result slots.
    pub slots: usize,
    /// Subtracted from every nonce the device reports.
    pub nonce_offset: i32,
    /// Frequency at multiplier 1, in 10 kHz units.
    pub freq_m1: u16,
    pub default_mult: u16,
    pub max_mult: u16,
    pub hashes_per_clock: Option<u16>,
    pub bitfile: String,
}

impl DescriptorInfo {
    pub fn parse(buf: &[u8]) -> Result<Self, SimError> {
        let version = *buf.first().ok_or(SimError::Descriptor("empty record"))?;
        let header = match version {
            2 => HEADER_V2,
            3 => HEADER_V3,
            _ => return Err(SimError::Descriptor("unsupported version")),
        };
        if buf.len() <= header {
            return Err(SimError::Descriptor("record too short"));
        }

        let name = &buf[header..];
        let end = name
            .iter()
            .position(|b| *b == 0)
            .ok_or(SimError::Descriptor("unterminated bitstream name"))?;
        if end == 0 {
            return Err(SimError::Descriptor("empty bitstream name"));
        }

        let word = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        Ok(Self {
            version,
            slots: usize::from(buf[1]) + 1,
            nonce_offset: i32::from(word(2)) - NONCE_OFFSET_BIAS,
            freq_m1: word(4),
            default_mult: u16::from(buf[6]) + 1,
            max_mult: u16::from(buf[7]) + 1,
            hashes_per_clock: (version >= 3).then(|| word(8).wrapping_add(1)),
            bitfile: String::from_utf8_lossy(&name[..end]).into_owned(),
        })
    }

    /// Pipeline clock at `mult`, in MHz.
    pub fn freq_mhz(&self, mult: u16) -> f64 {
        f64::from(self.freq_m1) * 0.01 * f64::from(mult)
    }

    /// Bytes of a full read-results response.
    pub fn results_len(&self) -> usize {
        self.slots * SLOT_SIZE
    }
}

/// One result slot with the nonce offset removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotReading {
    /// `None` while the pipeline has not found a golden nonce yet.
    pub golden: Option<u32>,
    pub nonce: u32,
    pub hash7: u32,
}

/// Split a read-results response into slots.
pub fn parse_results(buf: &[u8], nonce_offset: i32) -> Vec<SlotReading> {
    let offset = nonce_offset as u32;
    buf.chunks_exact(SLOT_SIZE)
        .map(|slot| {
            let word = |at: usize| {
                u32::from_le_bytes([slot[at], slot[at + 1], slot[at + 2], slot[at + 3]])
            };
            let golden = word(0);
            SlotReading {
                golden: (golden != 0).then(|| golden.wrapping_sub(offset)),
                nonce: word(4).wrapping_sub(offset),
                hash7: word(8),
            }
        })
        .collect()
}

/// Filters golden nonces already seen in recent polls.
///
/// Both result buffers are reported on every read and a golden nonce stays
/// visible for several ticks, so the same value shows up many times.
pub struct GoldenTracker {
    recent: VecDeque<u32>,
    capacity: usize,
    submitted: u64,
}

impl GoldenTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
            submitted: 0,
        }
    }

    /// Returns the golden nonces in `readings` that were not seen before.
    pub fn observe(&mut self, readings: &[SlotReading]) -> Vec<u32> {
        let mut fresh = Vec::new();
        for golden in readings.iter().filter_map(|r| r.golden) {
            if self.recent.contains(&golden) {
                continue;
            }
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(golden);
            fresh.push(golden);
        }
        self.submitted += fresh.len() as u64;
        fresh
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}
