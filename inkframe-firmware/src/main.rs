//! Inkframe - 7-Color E-Paper Picture Frame Firmware
//!
//! Main firmware binary for the Raspberry Pi Pico W driving a 5.65"
//! ACeP panel. Pulls a server-rendered bitmap over Wi-Fi, caches it in
//! flash and paints it page by page.
//!
//! Pin assignment (Waveshare Pico-ePaper layout):
//!
//! ```text
//! GP8  DC     GP9  CS    GP10 CLK
//! GP11 DIN    GP12 RST   GP13 BUSY
//! GP23/24/25/29  CYW43439 radio (PIO0)
//! ```

#![no_std]
#![no_main]

extern crate alloc;

use defmt::*;
use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_rp::bind_interrupts;
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use embassy_rp::spi::{Config as SpiConfig, Spi};
use embassy_time::{Delay, Instant};
use embedded_alloc::LlffHeap as Heap;
use embedded_hal_bus::spi::ExclusiveDevice;
use rand_core::RngCore;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use cyw43::PowerManagementMode;
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};

use inkframe_core::config::FrameConfig;
use inkframe_core::state::{Schedule, UpdateMachine};
use inkframe_drivers::epd::Acep565;
use inkframe_hal_rp2040::flash::{flash, image_store, Rp2040ConfigStorage};

use crate::config::{parse_embedded, ConfigPersistence};
use crate::net::{MqttSession, TcpHttpClient, Wifi};
use crate::services::FrameIo;

mod config;
mod controller;
mod net;
#[cfg(feature = "battery")]
mod power;
mod services;

// Heap for the decoder's row buffer
#[global_allocator]
static HEAP: Heap = Heap::empty();

// Heap size: 16KB
const HEAP_SIZE: usize = 16 * 1024;

/// Embedded default configuration (compiled into firmware)
/// Edit frame.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../frame.toml");

/// Panel SPI clock
const PANEL_SPI_HZ: u32 = 4_000_000;

/// MQTT socket buffer size, each direction
const MQTT_SOCKET_BUFFER: usize = 1024;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

// Static cells for state the network tasks and sessions borrow forever
static FRAME_CONFIG: StaticCell<FrameConfig> = StaticCell::new();
static RADIO_STATE: StaticCell<cyw43::State> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static MQTT_RX: StaticCell<[u8; MQTT_SOCKET_BUFFER]> = StaticCell::new();
static MQTT_TX: StaticCell<[u8; MQTT_SOCKET_BUFFER]> = StaticCell::new();

#[embassy_executor::task]
async fn radio_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Inkframe firmware starting...");

    // Initialize heap allocator
    init_heap();

    // Initialize RP2040 peripherals
    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Configuration first; the flash is then handed to the image cache
    let config_storage = Rp2040ConfigStorage::new(flash(p.FLASH, p.DMA_CH1));
    let mut persistence = ConfigPersistence::new(config_storage);
    let config: &'static FrameConfig = FRAME_CONFIG.init(load_config(&mut persistence).await);
    let store = image_store(persistence.into_storage().into_inner());

    // Panel on SPI1
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = PANEL_SPI_HZ;
    let spi = Spi::new_blocking_txonly(p.SPI1, p.PIN_10, p.PIN_11, spi_config);
    let cs = Output::new(p.PIN_9, Level::High);
    let spi_device = match ExclusiveDevice::new_no_delay(spi, cs) {
        Ok(device) => device,
        Err(never) => match never {},
    };
    let panel = Acep565::new(
        spi_device,
        Input::new(p.PIN_13, Pull::None),
        Output::new(p.PIN_8, Level::Low),
        Output::new(p.PIN_12, Level::High),
        Delay,
    );
    info!("Panel driver ready");

    // CYW43439 radio on PIO0
    let fw = include_bytes!("../cyw43-firmware/43439A0.bin");
    let clm = include_bytes!("../cyw43-firmware/43439A0_clm.bin");

    let pwr = Output::new(p.PIN_23, Level::Low);
    let radio_cs = Output::new(p.PIN_25, Level::High);
    let mut pio = Pio::new(p.PIO0, Irqs);
    let radio_spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        radio_cs,
        p.PIN_24,
        p.PIN_29,
        p.DMA_CH0,
    );

    let radio_state = RADIO_STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(radio_state, pwr, radio_spi, fw).await;
    spawner.spawn(radio_task(runner)).unwrap();

    control.init(clm).await;
    control
        .set_power_management(PowerManagementMode::PowerSave)
        .await;
    info!("Radio initialized");

    let seed = RoscRng.next_u64();
    let (stack, runner) = embassy_net::new(
        net_device,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    let wifi = Wifi::new(
        control,
        stack,
        config.wifi.ssid.as_str(),
        config.wifi.password.as_str(),
    );
    let http = TcpHttpClient::new(stack, config.http_timeout_s);
    let mqtt = config.mqtt.enabled.then(|| {
        MqttSession::new(
            stack,
            MQTT_RX.init([0; MQTT_SOCKET_BUFFER]),
            MQTT_TX.init([0; MQTT_SOCKET_BUFFER]),
            &config.mqtt,
            config.device_name.as_str(),
        )
    });
    if mqtt.is_none() {
        info!("MQTT disabled");
    }

    let mut io = FrameIo::new(wifi, http, mqtt, store, panel);
    let schedule = Schedule::from_config(config);

    #[cfg(not(feature = "battery"))]
    {
        let mut machine = UpdateMachine::new(
            schedule,
            config.image_url.clone(),
            Instant::now().as_millis(),
        );
        controller::run(&mut machine, &mut io).await
    }

    #[cfg(feature = "battery")]
    {
        use embassy_rp::watchdog::Watchdog;
        use embassy_time::Timer;
        use inkframe_core::state::DeviceState;

        let mut watchdog = Watchdog::new(p.WATCHDOG);
        let carried = power::CarriedState::restore(&mut watchdog).unwrap_or_default();
        let offset_ms = carried.clock_offset_ms();

        let now_ms = offset_ms + Instant::now().as_millis();
        let mut device = DeviceState::new(config.image_url.clone(), now_ms);
        device.last_success_ms = 0;
        device.failure_mode = carried.failure_mode;
        let mut machine = UpdateMachine::from_state(schedule, device);

        let sleep_s = config.battery_sleep_s;
        let next = controller::run_cycle(&mut machine, &mut io, offset_ms, sleep_s).await;
        next.store(&mut watchdog);

        info!("Sleeping {} s until the next cycle", config.battery_sleep_s);
        Timer::after_secs(config.battery_sleep_s as u64).await;
        watchdog.trigger_reset();
        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Initialize the heap allocator
fn init_heap() {
    use core::mem::MaybeUninit;
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    #[allow(static_mut_refs)]
    unsafe {
        HEAP.init(HEAP_MEM.as_ptr() as usize, HEAP_SIZE)
    }
}

/// Configuration saved in flash, else the embedded file, else defaults
async fn load_config(persistence: &mut ConfigPersistence<'_>) -> FrameConfig {
    match persistence.load().await {
        Ok(config) => {
            info!("Loaded configuration from flash");
            return config;
        }
        Err(e) => debug!("No stored configuration: {:?}", e),
    }

    match parse_embedded(EMBEDDED_CONFIG) {
        Ok(config) => {
            info!("Using embedded configuration");
            config
        }
        Err(e) => {
            // build.rs validates frame.toml, so this is a logic error
            error!("Embedded configuration rejected: {:?}", e);
            FrameConfig::default()
        }
    }
}
