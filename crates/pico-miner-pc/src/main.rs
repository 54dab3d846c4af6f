//! PC simulator for the pico-miner controller.
//!
//! Runs the same `Miner` the RP2350 firmware runs, wired to an emulated
//! FPGA, and plays the host side of the vendor protocol against it: read
//! the descriptor, set the clock, push work and poll for golden nonces.

mod emulator;
mod error;
mod host;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};

use pico_miner_core::config::{Profile, DIRECT_READ, DUAL_PIPE, MAX_WORK_SIZE, UFM_1_15D3};
use pico_miner_core::host::{OutReply, VendorRequest};
use pico_miner_core::watchdog::WatchdogEvent;
use pico_miner_core::Miner;
use pico_miner_hal::StatusIndicator;

use emulator::{EmulatedFpga, EmulatorOptions};
use error::SimError;
use host::{parse_results, DescriptorInfo, GoldenTracker};

#[derive(Parser)]
#[command(name = "pico-miner-sim")]
#[command(about = "Run the pico-miner controller against an emulated FPGA", long_about = None)]
#[command(version)]
struct Cli {
    /// Board profile to emulate
    #[arg(short, long, value_enum, default_value_t = ProfileArg::Single)]
    profile: ProfileArg,

    /// Control loop ticks to run (10 ms each)
    #[arg(short, long, default_value = "1000")]
    ticks: u32,

    /// Clock multiplier to request (defaults to the descriptor's default)
    #[arg(short, long)]
    multiplier: Option<u16>,

    /// Work payload as hex (defaults to a fixed 44-byte job)
    #[arg(short, long)]
    work: Option<String>,

    /// Poll results every N ticks; 0 never polls and lets the watchdog fire
    #[arg(long, default_value = "10")]
    poll_every: u32,

    /// Override the watchdog timeout, in ticks
    #[arg(long)]
    watchdog_ticks: Option<u16>,

    /// log2 of the mean hash count between golden nonces
    #[arg(long, default_value = "26", value_parser = clap::value_parser!(u8).range(1..=32))]
    difficulty_bits: u8,

    /// Sleep for simulated delays instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Only show warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    /// One pipeline, buffered results, clock gate
    Single,
    /// Two pipelines, buffered results, clock gate
    Dual,
    /// One pipeline, results streamed on request, no clock gate
    Direct,
}

/// Logs stopped/running transitions.
#[derive(Default)]
struct LogIndicator {
    stopped: Option<bool>,
}

impl StatusIndicator for LogIndicator {
    fn show_stopped(&mut self, stopped: bool) {
        if self.stopped != Some(stopped) {
            if stopped {
                info!("pipelines stopped");
            } else {
                info!("pipelines running");
            }
            self.stopped = Some(stopped);
        }
    }
}

/// Totals reported at the end of a run.
struct Summary {
    ticks: u32,
    harvests: u32,
    unsettled: u32,
    golden_found: usize,
    golden_reported: u64,
    hashes: u64,
    elapsed_s: f64,
    stopped: bool,
}

fn default_work() -> Vec<u8> {
    (0..44u8).map(|i| i.wrapping_mul(37) ^ 0xA5).collect()
}

fn parse_work(hex_str: Option<&str>) -> Result<Vec<u8>, SimError> {
    let work = match hex_str {
        Some(s) => hex::decode(s.trim())?,
        None => default_work(),
    };
    if work.is_empty() || work.len() > MAX_WORK_SIZE {
        return Err(SimError::WorkLength { len: work.len() });
    }
    Ok(work)
}

fn run<const P: usize>(cli: &Cli, profile: Profile, work: &[u8]) -> anyhow::Result<Summary> {
    let fpga = EmulatedFpga::new(
        profile,
        P,
        EmulatorOptions {
            difficulty_bits: cli.difficulty_bits,
            realtime: cli.realtime,
        },
    );
    let mut miner = Miner::<P, _, _, _, _>::new(
        profile,
        fpga.bus(),
        fpga.clock_lines(),
        fpga.delay(),
        LogIndicator::default(),
    );
    if let Some(ticks) = cli.watchdog_ticks {
        miner = miner.with_watchdog_timeout(ticks);
    }

    let m1 = miner.fpga_configured();
    info!(
        "FPGA configured: {} pipeline(s), multiplier {}",
        P,
        u16::from(m1) + 1
    );

    // Host: identify the device.
    let mut buf = [0u8; 64];
    let n = miner
        .handle_in(VendorRequest::ReportDescriptor.code(), 64, &mut buf)
        .ok_or(SimError::Rejected(VendorRequest::ReportDescriptor.code()))?;
    let info = DescriptorInfo::parse(&buf[..n]).context("reading descriptor")?;
    info!(
        "descriptor v{}: {} slots, bitstream {}, {:.2} MHz base, default x{}, max x{}",
        info.version,
        info.slots,
        info.bitfile,
        info.freq_mhz(1),
        info.default_mult,
        info.max_mult
    );

    // Host: set the clock.
    let mult = cli.multiplier.unwrap_or(info.default_mult);
    if !(1..=256).contains(&mult) {
        return Err(SimError::Multiplier(mult).into());
    }
    let request = VendorRequest::SetFrequency.code();
    match miner.handle_out(request, mult - 1, &[]) {
        Some(OutReply::FrequencySet { applied, .. }) => {
            let applied = u16::from(applied) + 1;
            if applied != mult {
                warn!("multiplier x{} clamped to x{}", mult, applied);
            }
            info!("clock at {:.2} MHz", info.freq_mhz(applied));
        }
        _ => return Err(SimError::Rejected(request).into()),
    }
    debug_assert_eq!(fpga.multiplier(), miner.multiplier());

    // Host: push work.
    let request = VendorRequest::PushWork.code();
    match miner.handle_out(request, 0, work) {
        Some(OutReply::WorkLoaded(outcome)) => {
            info!("work pushed: {} bytes ({})", outcome.bytes, hex::encode(work));
        }
        _ => return Err(SimError::Rejected(request).into()),
    }

    let mut tracker = GoldenTracker::new(4 * info.slots);
    let mut summary = Summary {
        ticks: 0,
        harvests: 0,
        unsettled: 0,
        golden_found: 0,
        golden_reported: 0,
        hashes: 0,
        elapsed_s: 0.0,
        stopped: false,
    };

    for tick in 1..=cli.ticks {
        let report = miner.run_once();
        summary.ticks = tick;
        if let Some(harvest) = report.harvest {
            summary.harvests += 1;
            if !harvest.settled {
                summary.unsettled += 1;
                debug!("tick {}: unsettled after {} passes", tick, harvest.passes);
            }
        }
        if report.watchdog == WatchdogEvent::Expired {
            warn!(
                "tick {}: no host request for {} ticks, pipelines halted",
                tick,
                miner.watchdog().timeout()
            );
        }

        if cli.poll_every > 0 && tick % cli.poll_every == 0 {
            let len = info.results_len().min(buf.len()) as u16;
            let n = miner
                .handle_in(VendorRequest::ReadResults.code(), len, &mut buf)
                .ok_or(SimError::Rejected(VendorRequest::ReadResults.code()))?;
            let readings = parse_results(&buf[..n], info.nonce_offset);
            for golden in tracker.observe(&readings) {
                info!("tick {}: golden nonce {:08x}", tick, golden);
            }
        }
    }

    let found = fpga.goldens();
    summary.golden_found = found.len();
    summary.golden_reported = tracker.submitted();
    summary.hashes = fpga.hashes();
    summary.elapsed_s = fpga.elapsed().as_secs_f64();
    summary.stopped = miner.is_stopped();
    Ok(summary)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let work = parse_work(cli.work.as_deref())?;
    let summary = match cli.profile {
        ProfileArg::Single => run::<1>(&cli, UFM_1_15D3, &work)?,
        ProfileArg::Dual => run::<2>(&cli, DUAL_PIPE, &work)?,
        ProfileArg::Direct => run::<1>(&cli, DIRECT_READ, &work)?,
    };

    let rate = if summary.elapsed_s > 0.0 {
        summary.hashes as f64 / summary.elapsed_s / 1e6
    } else {
        0.0
    };
    info!(
        "{} ticks, {:.2} s simulated, {} harvests ({} unsettled)",
        summary.ticks, summary.elapsed_s, summary.harvests, summary.unsettled
    );
    info!(
        "{} hashes ({:.1} MH/s), {} golden nonces found, {} reported to host",
        summary.hashes, rate, summary.golden_found, summary.golden_reported
    );
    if summary.stopped {
        warn!("pipelines were stopped at the end of the run");
    }
    Ok(())
}
