//! Board wiring and the build-selected profile.

use pico_miner_core::config::Profile;

#[cfg(all(feature = "dual-pipe", feature = "direct-read"))]
compile_error!("features `dual-pipe` and `direct-read` are mutually exclusive");

// =============================================================================
// Profile
// =============================================================================

#[cfg(feature = "dual-pipe")]
pub const PROFILE: Profile = pico_miner_core::config::DUAL_PIPE;
#[cfg(feature = "dual-pipe")]
pub const PIPES: usize = 2;

#[cfg(all(feature = "direct-read", not(feature = "dual-pipe")))]
pub const PROFILE: Profile = pico_miner_core::config::DIRECT_READ;
#[cfg(all(feature = "direct-read", not(feature = "dual-pipe")))]
pub const PIPES: usize = 1;

#[cfg(not(any(feature = "dual-pipe", feature = "direct-read")))]
pub const PROFILE: Profile = pico_miner_core::config::UFM_1_15D3;
#[cfg(not(any(feature = "dual-pipe", feature = "direct-read")))]
pub const PIPES: usize = 1;

// =============================================================================
// Clocks
// =============================================================================

/// External crystal frequency (Pico 2 standard).
pub const XTAL_FREQ_HZ: u32 = 12_000_000;

/// Busy cycles after a bus strobe edge before the FPGA side is sampled.
pub const BUS_SETTLE_CYCLES: u32 = 16;

/// Half period of the clock generator's PROGCLK, in CPU cycles (~1 MHz).
pub const PROGCLK_HALF_PERIOD_CYCLES: u32 = 75;

// =============================================================================
// USB
// =============================================================================

pub const USB_MANUFACTURER: &str = "ZTEX";
pub const USB_SERIAL: &str = "0000000000";
pub const USB_MAX_PACKET_SIZE_0: u8 = 64;

/// Largest vendor data stage we answer.
pub const CONTROL_BUF_SIZE: usize = 64;

// =============================================================================
// Pin map
// =============================================================================
//
//   GPIO0..7    read data bus     (FPGA -> MCU)
//   GPIO8..15   write data bus    (MCU -> FPGA)
//   GPIO16      read strobe
//   GPIO17      write start
//   GPIO18      write strobe
//   GPIO19      load
//   GPIO20      hold (clock gate)
//   GPIO21      latch (direct-read boards)
//   GPIO22      FPGA DONE         (FPGA -> MCU)
//   GPIO25      status LED        (lit while running)
//   GPIO26      PROGEN
//   GPIO27      PROGCLK
//   GPIO28      PROGDATA
