#![deny(unused_must_use)]
#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;
use rp2040_hal as hal;

use hal::pio::PIOExt;
use hal::Clock;
use smart_leds::SmartLedsWrite;
use usb_device::bus::UsbBusAllocator;
use usb_device::device::{StringDescriptors, UsbDeviceBuilder, UsbVidPid};
use ws2812_pio::Ws2812;

use padbridge::bsp::{self, buttons::GpioPad};
use padbridge::event::Button;
use padbridge::hal_ext::{flash, multicore, reboot};
use padbridge::interface::{InputInterface, OutputInterface};
use padbridge::profile::ProfileEngine;
use padbridge::router::Target;
use padbridge::scheduler::App;
use padbridge::storage::SettingsService;
use padbridge::telemetry::NullTelemetry;
use padbridge::usbd::mode::DeviceMode;
use padbridge::usbd::{ActiveMode, ModeClass, UsbDeviceIo, UsbdOutput};
use padbridge::{config, MAX_PLAYERS};

#[link_section = ".boot2"]
#[used]
pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

/// Main loop watchdog period; one iteration is expected in well under 1 ms
/// and the flash save stall stays far below this
const WATCHDOG_PERIOD_MS: u32 = 500;

/// LED chain refresh period
const LED_PUSH_MS: u32 = 10;

/// Player-1 button pad wiring, dpad first
#[rustfmt::skip]
const BUTTON_MAP: [Button; 12] = [
    Button::DpadUp, Button::DpadDown, Button::DpadLeft, Button::DpadRight,
    Button::B1, Button::B2, Button::B3, Button::B4,
    Button::L1, Button::R1, Button::S1, Button::S2,
];

#[cortex_m_rt::entry]
fn main() -> ! {
    let mut pac = hal::pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    if reboot::watchdog_caused_reboot() {
        // Either a mode change or a hung loop; both re-enter here
        defmt::info!("Watchdog reset, reloading persisted mode");
    }

    let clocks = hal::clocks::init_clocks_and_plls(
        bsp::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let mut sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // Core 1 comes up first so the flash lockout is armed before the first
    // service init; its task assignment follows after enumeration
    multicore::launch(&mut pac.PSM, &mut pac.PPB, &mut sio.fifo);

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    // Board serial for string descriptor index 3
    let serial = cortex_m::singleton!(: heapless::String<12> = flash::unique_id_hex())
        .unwrap()
        .as_str();
    defmt::info!("Board serial: {}", serial);

    multicore::install_fifo(sio.fifo);
    let mut settings = SettingsService::new(flash::SettingsFlash::new(bsp::SETTINGS_SECTOR_OFFSET));

    // The whole USB identity hangs off the persisted mode selection
    let mode = ActiveMode::boot(settings.record().usb_output_mode);
    let identity = mode.identity();
    defmt::info!("Persisted USB mode: {}", mode.id().name());
    if settings.record().usb_output_mode != mode.id() as u8 {
        // Unknown persisted id fell back to the default; the next save
        // overwrites the stale value
        settings.record_mut().usb_output_mode = mode.id() as u8;
    }

    let usb_bus: &'static UsbBusAllocator<hal::usb::UsbBus> = cortex_m::singleton!(
        : UsbBusAllocator<hal::usb::UsbBus> = UsbBusAllocator::new(hal::usb::UsbBus::new(
            pac.USBCTRL_REGS,
            pac.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut pac.RESETS,
        ))
    )
    .unwrap();

    // Class driver first, device last: the mode picks its own class flavor
    let class = ModeClass::new(usb_bus, mode.class(), mode.report_descriptor());
    let dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(identity.vid, identity.pid))
        .strings(&[StringDescriptors::default()
            .manufacturer(identity.manufacturer)
            .product(identity.product)
            .serial_number(serial)])
        .unwrap()
        .device_class(identity.device_class)
        .device_sub_class(identity.device_sub_class)
        .device_protocol(identity.device_protocol)
        .device_release(identity.device_release)
        .max_power(identity.max_power_ma as usize)
        .unwrap()
        .build();

    let mut engine = ProfileEngine::new(config::CONFIG.usb_profile);
    engine.restore(
        settings.record().profiles,
        settings.record().active_profile_index,
    );
    let mut usbd = UsbdOutput::new(UsbDeviceIo { dev, class }, mode, engine);

    // Player 1 button pad, active low
    let button_pins = [
        pins.gpio2.into_pull_up_input().into_dyn_pin(),
        pins.gpio3.into_pull_up_input().into_dyn_pin(),
        pins.gpio4.into_pull_up_input().into_dyn_pin(),
        pins.gpio5.into_pull_up_input().into_dyn_pin(),
        pins.gpio6.into_pull_up_input().into_dyn_pin(),
        pins.gpio7.into_pull_up_input().into_dyn_pin(),
        pins.gpio8.into_pull_up_input().into_dyn_pin(),
        pins.gpio9.into_pull_up_input().into_dyn_pin(),
        pins.gpio10.into_pull_up_input().into_dyn_pin(),
        pins.gpio11.into_pull_up_input().into_dyn_pin(),
        pins.gpio12.into_pull_up_input().into_dyn_pin(),
        pins.gpio13.into_pull_up_input().into_dyn_pin(),
    ];
    let mut pad = GpioPad::new(button_pins, BUTTON_MAP, Target::USB_DEVICE, 0);

    // Status + player LED chain
    let (mut pio0, sm0, _, _, _) = pac.PIO0.split(&mut pac.RESETS);
    let mut led_chain = Ws2812::new(
        pins.gpio15.into_function::<hal::gpio::FunctionPio0>(),
        &mut pio0,
        sm0,
        clocks.peripheral_clock.freq(),
        timer.count_down(),
    );

    if config::CONFIG.usb_host {
        defmt::info!(
            "PIO USB host port on GPIO{}/GPIO{}",
            bsp::PIO_USB_DP_PIN,
            bsp::PIO_USB_DP_PIN + 1
        );
    }
    defmt::info!("Players supported: {}", MAX_PLAYERS as u8);

    let mut inputs: [&mut dyn InputInterface; 1] = [&mut pad];
    let mut outputs: [&mut dyn OutputInterface; 1] = [&mut usbd];
    let mut app = App::new(settings, &mut inputs, &mut outputs);
    let mut telemetry = NullTelemetry;
    app.init(&mut telemetry);

    // Exactly one output may own core 1; hand it over (or let it idle) and
    // only then enter the loop
    multicore::start(app.core1_task());

    if cfg!(feature = "watchdog") {
        watchdog.start(hal::fugit::ExtU32::millis(WATCHDOG_PERIOD_MS));
    }

    let mut next_led_push = 0u32;
    loop {
        let now_ms = (timer.get_counter().ticks() / 1000) as u32;
        app.tick(now_ms, &mut telemetry, |_cx| {
            // App hook: the CDC configuration console plugs in here
        });

        if now_ms.wrapping_sub(next_led_push) < u32::MAX / 2 {
            next_led_push = now_ms.wrapping_add(LED_PUSH_MS);
            led_chain.write(app.leds.frame().iter().copied()).ok();
        }

        if cfg!(feature = "watchdog") {
            watchdog.feed();
        }
    }
}
