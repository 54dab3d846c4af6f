//! Device descriptor reported to the host on request 0x82.
//!
//! Layout (multi-byte fields little-endian):
//!
//! | offset | field                                   |
//! |--------|-----------------------------------------|
//! | 0      | version (3 with hashes/clock, else 2)   |
//! | 1      | host-visible nonce slots - 1            |
//! | 2..4   | nonce offset + 10000                    |
//! | 4..6   | frequency at multiplier 1 / 10 kHz      |
//! | 6      | default multiplier - 1                  |
//! | 7      | max multiplier - 1                      |
//! | 8..10  | hashes per clock - 1 (version 3 only)   |
//! | ...    | bitstream name, NUL terminated          |

use heapless::Vec;

use crate::config::{Profile, DESCRIPTOR_SIZE, NONCE_OFFSET_BIAS};

/// Header length of a version 2 descriptor.
pub const HEADER_V2: usize = 8;

/// Header length of a version 3 descriptor.
pub const HEADER_V3: usize = 10;

/// Immutable descriptor record, built once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    bytes: Vec<u8, DESCRIPTOR_SIZE>,
}

impl DeviceDescriptor {
    pub fn new(profile: &Profile, pipes: usize) -> Self {
        let slots = (pipes * profile.slots_per_pipe()).saturating_sub(1).min(u8::MAX as usize) as u8;
        let offset = (NONCE_OFFSET_BIAS + profile.nonce_offset as i32) as u16;

        let mut header = [0u8; HEADER_V3];
        header[0] = profile.descriptor_version();
        header[1] = slots;
        header[2..4].copy_from_slice(&offset.to_le_bytes());
        header[4..6].copy_from_slice(&profile.freq_m1.to_le_bytes());
        header[6] = profile.default_m1();
        header[7] = profile.max_m1();

        let header_len = match profile.hashes_per_clock {
            Some(hpc) => {
                header[8..10].copy_from_slice(&hpc.wrapping_sub(1).to_le_bytes());
                HEADER_V3
            }
            None => HEADER_V2,
        };

        // Name is cut short rather than dropping the terminator.
        let room = DESCRIPTOR_SIZE - header_len - 1;
        let name = profile.bitfile.as_bytes();
        let name = &name[..name.len().min(room)];

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header[..header_len]).ok();
        bytes.extend_from_slice(name).ok();
        bytes.push(0).ok();

        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy the first `min(requested, len, out.len())` bytes into `out`.
    pub fn copy_to(&self, out: &mut [u8], requested: usize) -> usize {
        let n = requested.min(self.bytes.len()).min(out.len());
        out[..n].copy_from_slice(&self.bytes[..n]);
        n
    }
}
