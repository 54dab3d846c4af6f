//! RP2350 firmware for FPGA hash pipelines.
//!
//! The USB interrupt services vendor requests on endpoint 0. The main loop
//! runs the 10 ms control tick: follow the FPGA DONE line, harvest result
//! slots and advance the host-silence watchdog. Both sides share the
//! `Miner` through a critical-section cell.

#![no_std]
#![no_main]

mod board;
mod bus;
mod usb;

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::*;
use defmt_rtt as _;
use panic_probe as _;
use rp235x_hal as hal;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, PinState};
use hal::pac::interrupt;
use hal::timer::{CopyableTimer0, Timer};
use static_cell::StaticCell;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::device::{StringDescriptors, UsbDevice, UsbDeviceBuilder, UsbVidPid};

use pico_miner_core::config::{PRODUCT_STRING, TICK_MS, USB_PID, USB_VID};
use pico_miner_core::watchdog::WatchdogEvent;
use pico_miner_core::Miner;

use board::{PIPES, PROFILE};
use bus::{GpioBus, GpioClockGen, Led};
use usb::MinerClass;

/// Boot ROM image definition for Cortex-M33 secure mode.
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: hal::block::ImageDef = hal::block::ImageDef::secure_exe();

type DeviceMiner = Miner<PIPES, GpioBus, GpioClockGen, Timer<CopyableTimer0>, Led>;

/// Device state, shared by the tick loop and the USB interrupt.
pub static MINER: Mutex<RefCell<Option<DeviceMiner>>> = Mutex::new(RefCell::new(None));

struct UsbLink {
    device: UsbDevice<'static, hal::usb::UsbBus>,
    class: MinerClass,
}

/// Handed to the USB interrupt, which takes it on its first run.
static USB: Mutex<RefCell<Option<UsbLink>>> = Mutex::new(RefCell::new(None));

#[hal::entry]
fn main() -> ! {
    info!("pico-miner-rp2350: starting, {} pipeline(s)", PIPES);

    let mut pac = hal::pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // Initialize clocks from 12 MHz crystal.
    let clocks = hal::clocks::init_clocks_and_plls(
        board::XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    let mut timer = Timer::new_timer0(pac.TIMER0, &mut pac.RESETS, &clocks);
    let sio = hal::sio::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // --- Pipeline bus ---
    let bus = GpioBus {
        read_bus: [
            pins.gpio0.into_pull_down_input().into_dyn_pin(),
            pins.gpio1.into_pull_down_input().into_dyn_pin(),
            pins.gpio2.into_pull_down_input().into_dyn_pin(),
            pins.gpio3.into_pull_down_input().into_dyn_pin(),
            pins.gpio4.into_pull_down_input().into_dyn_pin(),
            pins.gpio5.into_pull_down_input().into_dyn_pin(),
            pins.gpio6.into_pull_down_input().into_dyn_pin(),
            pins.gpio7.into_pull_down_input().into_dyn_pin(),
        ],
        write_bus: [
            pins.gpio8.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio9.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio10.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio11.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio12.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio13.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio14.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
            pins.gpio15.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        ],
        read_strobe: pins.gpio16.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        write_start: pins.gpio17.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        write_strobe: pins.gpio18.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        load: pins.gpio19.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        // Pipelines stay gated until the host pushes work.
        hold: pins.gpio20.into_push_pull_output_in_state(PinState::High).into_dyn_pin(),
        latch: pins.gpio21.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
    };
    let mut fpga_done = pins.gpio22.into_pull_down_input();
    let led = Led(pins.gpio25.into_push_pull_output_in_state(PinState::Low).into_dyn_pin());

    // --- Clock generator ---
    let clock_lines = GpioClockGen {
        enable: pins.gpio26.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        clock: pins.gpio27.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
        data: pins.gpio28.into_push_pull_output_in_state(PinState::Low).into_dyn_pin(),
    };

    let miner = Miner::new(PROFILE, bus, clock_lines, timer, led);
    info!(
        "profile {}: descriptor v{}, {} bytes",
        PROFILE.bitfile,
        PROFILE.descriptor_version(),
        miner.descriptor().len()
    );
    critical_section::with(|cs| {
        MINER.borrow(cs).replace(Some(miner));
    });

    // --- USB ---
    static USB_BUS: StaticCell<UsbBusAllocator<hal::usb::UsbBus>> = StaticCell::new();
    let usb_bus: &'static UsbBusAllocator<_> = USB_BUS.init(UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USB,
        pac.USB_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    )));

    let class = MinerClass::new(usb_bus, timer);
    let device = UsbDeviceBuilder::new(usb_bus, UsbVidPid(USB_VID, USB_PID))
        .strings(&[StringDescriptors::default()
            .manufacturer(board::USB_MANUFACTURER)
            .product(PRODUCT_STRING)
            .serial_number(board::USB_SERIAL)])
        .unwrap()
        .max_packet_size_0(board::USB_MAX_PACKET_SIZE_0)
        .unwrap()
        .device_class(0xFF)
        .build();

    critical_section::with(|cs| {
        USB.borrow(cs).replace(Some(UsbLink { device, class }));
    });
    // Safety: the handler only touches state initialized above.
    unsafe { cortex_m::peripheral::NVIC::unmask(hal::pac::Interrupt::USBCTRL_IRQ) };

    info!("USB ready: VID:PID = {:04x}:{:04x}", USB_VID, USB_PID);

    // --- Control loop ---
    let mut configured = false;
    loop {
        timer.delay_ms(TICK_MS);

        let done = fpga_done.is_high().unwrap_or(false);
        if done != configured {
            configured = done;
            critical_section::with(|cs| {
                if let Some(miner) = MINER.borrow_ref_mut(cs).as_mut() {
                    if done {
                        let m1 = miner.fpga_configured();
                        info!(
                            "FPGA configured at {} ms, multiplier {}",
                            uptime_ms(&timer),
                            u16::from(m1) + 1
                        );
                    } else {
                        miner.fpga_reset();
                        info!("FPGA reset");
                    }
                }
            });
        }

        // Harvest and watchdog run in separate critical sections so a
        // pending host request is serviced in between.
        let harvest =
            critical_section::with(|cs| MINER.borrow_ref_mut(cs).as_mut().and_then(|m| m.harvest()));
        if let Some(harvest) = harvest {
            if !harvest.settled {
                trace!("harvest unsettled after {} passes", harvest.passes);
            }
            if harvest.preserved > 0 {
                debug!("kept {} previous golden nonce(s)", harvest.preserved);
            }
        }

        let event = critical_section::with(|cs| {
            MINER
                .borrow_ref_mut(cs)
                .as_mut()
                .map(|m| (m.tick_watchdog(), m.watchdog().timeout()))
        });
        if let Some((WatchdogEvent::Expired, timeout)) = event {
            warn!("no host request for {} ticks, pipelines halted", timeout);
        }
    }
}

fn uptime_ms(timer: &Timer<CopyableTimer0>) -> u64 {
    let now: fugit::TimerInstantU64<1_000_000> = timer.get_counter();
    now.duration_since_epoch().to_millis()
}

/// Polls the device outside any critical section, so request handlers lock
/// `MINER` only around their own bus work.
#[allow(non_snake_case)]
#[interrupt]
fn USBCTRL_IRQ() {
    static mut LINK: Option<UsbLink> = None;

    if LINK.is_none() {
        *LINK = critical_section::with(|cs| USB.borrow(cs).take());
    }
    if let Some(link) = LINK {
        link.device.poll(&mut [&mut link.class]);
    }
}

/// Program metadata for `picotool info`.
#[link_section = ".bi_entries"]
#[used]
pub static PICOTOOL_ENTRIES: [hal::binary_info::EntryAddr; 5] = [
    hal::binary_info::rp_cargo_bin_name!(),
    hal::binary_info::rp_cargo_version!(),
    hal::binary_info::rp_program_description!(c"FPGA hash pipeline controller"),
    hal::binary_info::rp_cargo_homepage_url!(),
    hal::binary_info::rp_program_build_attribute!(),
];
