//! Board profiles and protocol constants.

/// Control loop period.
pub const TICK_MS: u32 = 10;

/// Idle ticks before the pipelines are halted (300 s at `TICK_MS`).
pub const WATCHDOG_TIMEOUT_TICKS: u16 = 300 * 100;

/// Size of one pipeline result slot: golden nonce, current nonce, hash word 7.
pub const SLOT_SIZE: usize = 12;

/// Leading bytes of a slot holding the golden nonce.
pub const GOLDEN_NONCE_SIZE: usize = 4;

/// Host-visible slots per buffered pipeline (one in each ping-pong buffer).
pub const SLOTS_PER_PIPE: usize = 2;

/// Readout passes per harvest before an unsettled result set is accepted.
pub const MAX_HARVEST_PASSES: u8 = 5;

/// Largest work payload accepted in a single control transfer.
pub const MAX_WORK_SIZE: usize = 64;

/// Upper bound of the descriptor record, bitstream name included.
pub const DESCRIPTOR_SIZE: usize = 64;

/// Added to the nonce offset before it is reported, keeping the field positive.
pub const NONCE_OFFSET_BIAS: i32 = 10_000;

/// Settle time after releasing the clock gate on a work push.
pub const UNGATE_SETTLE_MS: u32 = 200;

/// Time the pipelines stay in reset while the clock generator relocks.
pub const FREQ_SETTLE_MS: u32 = 100;

/// Settle time after the FPGA reports configuration done.
pub const FPGA_SETTLE_MS: u32 = 100;

pub const USB_VID: u16 = 0x221A;
pub const USB_PID: u16 = 0x0100;

/// Matched by the host software to recognise the firmware.
pub const PRODUCT_STRING: &str = "btcminer for ZTEX FPGA Modules";

/// How result slots reach the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPath {
    /// Harvested every tick into the ping-pong buffers.
    Buffered,
    /// Latched and streamed from the pipelines on each read request.
    Direct,
}

/// Compile-time description of a board/bitstream combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Bitstream identifier reported after the descriptor header.
    pub bitfile: &'static str,
    /// Pipeline-specific nonce skew the host subtracts from reported nonces.
    pub nonce_offset: i16,
    /// Output frequency at multiplier 1, in 10 kHz units.
    pub freq_m1: u16,
    pub default_mult: u8,
    pub min_mult: u8,
    pub max_mult: u8,
    /// Reported in version 3 descriptors only.
    pub hashes_per_clock: Option<u16>,
    /// Board can gate the pipeline clock (hold line wired).
    pub run_gate: bool,
    pub result_path: ResultPath,
}

impl Profile {
    /// Lowest value accepted by the clock generator (multiplier - 1).
    pub const fn min_m1(&self) -> u8 {
        self.min_mult.saturating_sub(1)
    }

    /// Highest value accepted by the clock generator (multiplier - 1).
    pub const fn max_m1(&self) -> u8 {
        self.max_mult.saturating_sub(1)
    }

    pub const fn default_m1(&self) -> u8 {
        self.default_mult.saturating_sub(1)
    }

    /// Host-visible result slots per pipeline. A latch presents only the
    /// current slot, so the direct path has one.
    pub const fn slots_per_pipe(&self) -> usize {
        match self.result_path {
            ResultPath::Buffered => SLOTS_PER_PIPE,
            ResultPath::Direct => 1,
        }
    }

    /// Bytes returned by a full read-results request for `pipes` pipelines.
    pub const fn result_region_size(&self, pipes: usize) -> usize {
        pipes * self.slots_per_pipe() * SLOT_SIZE
    }

    /// Descriptor protocol version implied by the profile.
    pub const fn descriptor_version(&self) -> u8 {
        match self.hashes_per_clock {
            Some(_) => 3,
            None => 2,
        }
    }
}

/// ZTEX USB-FPGA Module 1.15d, one double-hash pipeline.
pub const UFM_1_15D3: Profile = Profile {
    bitfile: "ztex_ufm1_15d3",
    nonce_offset: 0,
    freq_m1: 600,
    default_mult: 33,
    min_mult: 17,
    max_mult: 40,
    hashes_per_clock: Some(128),
    run_gate: true,
    result_path: ResultPath::Buffered,
};

/// Two pipelines sharing one clock generator.
pub const DUAL_PIPE: Profile = Profile {
    bitfile: "ztex_ufm1_15d2x",
    nonce_offset: 0,
    freq_m1: 800,
    default_mult: 25,
    min_mult: 13,
    max_mult: 30,
    hashes_per_clock: Some(256),
    run_gate: true,
    result_path: ResultPath::Buffered,
};

/// Early single-pipeline boards: no clock gate, results streamed on demand.
pub const DIRECT_READ: Profile = Profile {
    bitfile: "ztex_ufm1_15b",
    nonce_offset: -1,
    freq_m1: 400,
    default_mult: 48,
    min_mult: 13,
    max_mult: 54,
    hashes_per_clock: None,
    run_gate: false,
    result_path: ResultPath::Direct,
};
