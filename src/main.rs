#![no_std]
#![no_main]

mod board;
mod drivers;
mod tasks;
mod usb;

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::dma::NoDma;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, Pin, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::peripherals::PC13;
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use solar_tracker::config::TrackerConfig;
use solar_tracker::hal::OutputGroup;
use solar_tracker::shutdown::TerminationChannel;
use solar_tracker::{Error, Result, Tracker};

use crate::board::Board;
use crate::drivers::ads1015::Ads1015;
use crate::drivers::adxl345::Adxl345;
use crate::drivers::outputs::{MotorDriver, StatusLamps};
use crate::tasks::console_task::console_task;
use crate::tasks::gps_task::gps_task;
use crate::tasks::shutdown_task::{shutdown_task, stop_button_task};

// ── Shared state ──────────────────────────────────────────────────────────────
pub static TRACKER: Tracker = Tracker::new(TrackerConfig::DEFAULT);

// Output groups are reachable from the shutdown task as well as their owners.
pub static MOTOR_LINES: OutputGroup<MotorDriver> = OutputGroup::new();
pub static STATUS_LEDS: OutputGroup<StatusLamps> = OutputGroup::new();

pub static TERMINATION: TerminationChannel = TerminationChannel::new();

// STOP handling and forced exit preempt thread mode, so a task stuck in a busy loop
// cannot keep the third press from halting the CPU.
static URGENT_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    URGENT_EXECUTOR.on_interrupt()
}

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    I2C1_EV  => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER  => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C1>;
    USART3   => embassy_stm32::usart::InterruptHandler<peripherals::USART3>;
});

const HEARTBEAT: Duration = Duration::from_millis(500);

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut led = match start(spawner).await {
        Ok(led) => led,
        Err(err) => {
            defmt::error!("start-up failed: {}", err);
            MOTOR_LINES.deactivate();
            STATUS_LEDS.deactivate();
            board::halt();
        }
    };

    // Heartbeat until shutdown, then dark (PC13 is active low).
    while !TRACKER.is_shutting_down() {
        led.toggle();
        Timer::after(HEARTBEAT).await;
    }
    led.set_high();
}

async fn start(spawner: Spawner) -> Result<Output<'static, PC13>> {
    // 1. Board init (84 MHz core)
    let board = Board::init();
    let p = board.p;
    defmt::info!("solar tracker starting");

    // 2. Outputs first, all inactive
    MOTOR_LINES.install(MotorDriver::new(p.PB0.degrade(), p.PB1.degrade()));
    STATUS_LEDS.install(StatusLamps::new(p.PB4.degrade(), p.PB5.degrade()));
    let led = Output::new(p.PC13, Level::High, Speed::Low);

    // 3. USB console
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawner.spawn(usb::usb_task(usb_dev)).map_err(|_| Error::TaskSpawn)?;
    spawner.spawn(console_task(usb_serial)).map_err(|_| Error::TaskSpawn)?;

    // 4. SPI1 @ 500 kHz, mode 3: ADXL345 (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PA4)
    let mut spi_config = spi::Config::default();
    spi_config.frequency = TimeHertz(500_000);
    spi_config.mode = spi::MODE_3;
    let spi = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, spi_config);
    let cs = Output::new(p.PA4.degrade(), Level::High, Speed::VeryHigh);
    let mut accel = Adxl345::new(spi, cs);
    Timer::after(Duration::from_millis(10)).await;
    if let Err(err) = accel.init().await {
        // Not fatal: the estimator reports every failed transfer to the watchdog.
        defmt::error!("adxl345 init: {}", err);
    }

    // 5. I2C1 @ 400 kHz: ADS1015 (SCL=PB8, SDA=PB9)
    let i2c = I2c::new(
        p.I2C1,
        p.PB8,
        p.PB9,
        Irqs,
        p.DMA1_CH7,
        p.DMA1_CH0,
        TimeHertz(400_000),
        Default::default(),
    );

    // 6. GPS USART3 @ 115200 (TX=PB10, RX=PB11)
    let mut gps_config = UsartConfig::default();
    gps_config.baudrate = 115_200;
    let gps_uart = Uart::new(p.USART3, p.PB11, p.PB10, Irqs, p.DMA1_CH3, p.DMA1_CH1, gps_config)
        .map_err(|_| Error::PeripheralConfig)?;

    // 7. STOP button on PC0, pressed = low
    let stop_button = ExtiInput::new(Input::new(p.PC0, Pull::Up), p.EXTI0);

    // 8. Shutdown path on the interrupt executor (UART4 is unused as a peripheral)
    interrupt::UART4.set_priority(Priority::P6);
    let urgent = URGENT_EXECUTOR.start(interrupt::UART4);
    urgent.spawn(shutdown_task()).map_err(|_| Error::TaskSpawn)?;
    urgent.spawn(stop_button_task(stop_button)).map_err(|_| Error::TaskSpawn)?;

    // 9. Control loops in thread mode
    spawner.spawn(gps_task(gps_uart)).map_err(|_| Error::TaskSpawn)?;
    spawner.spawn(tasks::sensor_task(accel)).map_err(|_| Error::TaskSpawn)?;
    spawner.spawn(tasks::scheduler_task()).map_err(|_| Error::TaskSpawn)?;
    spawner.spawn(tasks::motor_task()).map_err(|_| Error::TaskSpawn)?;
    spawner.spawn(tasks::watchdog_task(Ads1015::new(i2c))).map_err(|_| Error::TaskSpawn)?;

    Ok(led)
}
