//! Platform-agnostic control logic for USB-attached FPGA hash pipelines.
//!
//! Everything here is generic over the `pico-miner-hal` line traits and
//! `embedded_hal::delay::DelayNs`, so the same code runs in the RP2350
//! firmware and in the PC emulator.

#![no_std]

pub mod clkgen;
pub mod config;
pub mod descriptor;
pub mod host;
pub mod miner;
pub mod nonce;
pub mod watchdog;

pub use miner::{Miner, TickReport, WorkOutcome};
