#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use ed060xc3::Rotation;
use embassy_executor::Spawner;
use embassy_time::Timer;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Level, Output, OutputConfig},
    ledc::{
        LSGlobalClkSource, Ledc, LowSpeed,
        channel::{self, ChannelIFace},
        timer::{self, TimerIFace},
    },
    spi::master::Spi,
    time::Rate,
    timer::timg::TimerGroup,
    usb_serial_jtag::UsbSerialJtag,
};
use inkframe_core::{
    arbiter::StorageArbiter,
    frame::{CopyMode, FrameStore},
    gallery::{GalleryApp, GalleryConfig, TickResult},
    pipeline::{Clock, PipelineConfig, RenderPipeline},
};
use inkframe_hal_esp32s3::{
    decoder::{JpegWorkspace, RomJpegDecoder},
    platform::{EpdiyPanel, Frontlight, SystemClock},
    storage::{CardReaderMux, SdVolume},
};
use log::{LevelFilter, error, info};
use static_cell::StaticCell;

use console::ConsoleLine;

#[path = "main/console.rs"]
mod console;

const ROTATION: Rotation = Rotation::Landscape;
const SD_SPI_HZ: u32 = 1_000_000;
const FRONTLIGHT_PWM_KHZ: u32 = 4;
/// Duty on the 13-bit channel before the first ramp.
const FRONTLIGHT_START_DUTY: u16 = 2_096;
/// Off shows the first file once instead of looping.
const GALLERY_MODE: bool = true;
const GALLERY_WAIT_MS: u32 = 5_000;
const RAMP_FLOOR: u16 = 100;
const RAMP_CEILING: u16 = 8_000;
const RAMP_STEP: u16 = 250;
const RAMP_STEP_MS: u32 = 100;
const EMPTY_RETRY_MS: u32 = 5_000;
/// Power cycle and fully clear the panel before every image.
const GALLERY_CLEAN_MODE: bool = false;
/// Raw band copy is experimental and ignores ROTATION.
const COPY_MODE: CopyMode = CopyMode::RotationAware;
/// Longest sleep between console polls while the gallery waits.
const CONSOLE_POLL_MS: u64 = 50;

static JPEG_WORKSPACE: StaticCell<JpegWorkspace> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: inkframe starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);
    // The 4-bit frame and decode buffers only fit in PSRAM.
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let panel = EpdiyPanel::init();

    // Frontlight: LEDC low-speed timer 0, 13-bit duty at 4 kHz on GPIO11.
    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let mut fl_timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    if let Err(err) = fl_timer.configure(timer::config::Config {
        duty: timer::config::Duty::Duty13Bit,
        clock_source: timer::LSClockSource::APBClk,
        frequency: Rate::from_khz(FRONTLIGHT_PWM_KHZ),
    }) {
        error!("frontlight: timer configure failed err={:?}", err);
    }
    let mut fl_channel = ledc.channel(channel::Number::Channel0, peripherals.GPIO11);
    if let Err(err) = fl_channel.configure(channel::config::Config {
        timer: &fl_timer,
        duty_pct: 0,
        pin_config: channel::config::PinConfig::PushPull,
    }) {
        error!("frontlight: channel configure failed err={:?}", err);
    }
    let frontlight = Frontlight::new(fl_channel);
    info!("frontlight: ready max_duty={}", frontlight.max_duty());

    let store = match FrameStore::allocate(ROTATION) {
        Ok(store) => store,
        Err(_) => {
            error!("frame: framebuffer allocation failed, halting");
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    // SD SPI wiring on the v7 expansion header:
    // CS=GPIO10, SCK=GPIO12, MOSI=GPIO13, MISO=GPIO14
    let sd_cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let sd_spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(SD_SPI_HZ))
        // SD cards in SPI mode use CPOL=0, CPHA=0.
        .with_mode(esp_hal::spi::Mode::_0);
    let sd_spi = match Spi::new(peripherals.SPI3, sd_spi_config) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO12)
            .with_mosi(peripherals.GPIO13)
            .with_miso(peripherals.GPIO14),
        Err(err) => {
            error!("storage: spi configure failed err={:?}, halting", err);
            loop {
                Timer::after_secs(1).await;
            }
        }
    };
    let volume = SdVolume::new(sd_spi, sd_cs, Delay::new());

    // Mux select starts low so the card boots attached to the SPI bus.
    let mux_select = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let arbiter = StorageArbiter::new(volume, CardReaderMux::new(mux_select));

    let decoder = RomJpegDecoder::new(JPEG_WORKSPACE.init(JpegWorkspace::new()));
    let pipeline = RenderPipeline::new(
        decoder,
        panel,
        SystemClock,
        store,
        PipelineConfig::default()
            .with_copy_mode(COPY_MODE)
            .with_full_clean(GALLERY_CLEAN_MODE),
    );
    let gallery_config = GalleryConfig::default()
        .with_gallery_mode(GALLERY_MODE)
        .with_dwell_ms(GALLERY_WAIT_MS)
        .with_ramp(RAMP_FLOOR, RAMP_CEILING, RAMP_STEP, RAMP_STEP_MS)
        .with_empty_retry_ms(EMPTY_RETRY_MS)
        .with_initial_backlight(Some(FRONTLIGHT_START_DUTY));
    let mut app = GalleryApp::new(arbiter, pipeline, frontlight, gallery_config);

    let usb_serial = UsbSerialJtag::new(peripherals.USB_DEVICE);
    let (mut console_rx, _console_tx) = usb_serial.split();
    let mut console_line = ConsoleLine::new();
    esp_println::print!("{}", console::PROMPT);

    let mut panel_parked = false;

    loop {
        while let Some(byte) = console_rx.read_byte() {
            if let Some(line) = console_line.push(byte) {
                console::dispatch(&mut app, &line);
                esp_println::print!("{}", console::PROMPT);
            }
        }

        let now_ms = app.pipeline().clock().now_ms();
        match app.tick(now_ms) {
            TickResult::Continue => Timer::after_millis(1).await,
            TickResult::WaitUntil(deadline_ms) => {
                let wait_ms = deadline_ms.saturating_sub(now_ms).min(CONSOLE_POLL_MS);
                Timer::after_millis(wait_ms.max(1)).await;
            }
            TickResult::Stopped => {
                if !panel_parked {
                    app.pipeline_mut().panel_mut().power_off();
                    info!("epd: rails off");
                    panel_parked = true;
                }
                Timer::after_millis(CONSOLE_POLL_MS).await;
            }
        }
    }
}
