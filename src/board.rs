//! Clock tree and pin map.
//!
//! | Function            | Peripheral / pin                      |
//! |---------------------|---------------------------------------|
//! | ADXL345 (SPI mode 3)| SPI1: SCK PA5, MISO PA6, MOSI PA7, CS PA4 |
//! | ADS1015 (I2C 400k)  | I2C1: SCL PB8, SDA PB9                |
//! | Motor lines         | left PB0, right PB1                   |
//! | Status LEDs         | ok PB4, fault PB5                     |
//! | STOP button         | PC0 (EXTI0, active low)               |
//! | GPS (115200 Bd)     | USART3: TX PB10, RX PB11              |
//! | Console             | USB OTG FS: PA11, PA12                |
//! | Heartbeat LED       | PC13                                  |

use embassy_stm32::rcc::{
    AHBPrescaler, APBPrescaler, Hse, HseMode, Pll, PllMul, PllPDiv, PllPreDiv, PllQDiv, PllSource, Sysclk,
};
use embassy_stm32::time::Hertz;
use embassy_stm32::Config;

/// On-board crystal.
const HSE_FREQ: Hertz = Hertz(8_000_000);

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    pub fn init() -> Self {
        Self {
            p: embassy_stm32::init(clocks()),
        }
    }
}

/// 84 MHz core; the control loops run at 10 Hz and need no more.
///
/// VCO: 8 MHz / 8 × 336 = 336 MHz. P /4 = 84 MHz SYSCLK, Q /7 = 48 MHz USB.
/// APB1 42 MHz (I2C1, USART3), APB2 84 MHz (SPI1).
fn clocks() -> Config {
    let mut config = Config::default();
    let rcc = &mut config.rcc;
    rcc.hse = Some(Hse {
        freq: HSE_FREQ,
        mode: HseMode::Oscillator,
    });
    rcc.pll_src = PllSource::HSE;
    rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV8,
        mul: PllMul::MUL336,
        divp: Some(PllPDiv::DIV4),
        divq: Some(PllQDiv::DIV7),
        divr: None,
    });
    rcc.sys = Sysclk::PLL1_P;
    rcc.ahb_pre = AHBPrescaler::DIV1;
    rcc.apb1_pre = APBPrescaler::DIV2;
    rcc.apb2_pre = APBPrescaler::DIV1;
    config
}

/// Stops the CPU for good: interrupts off, sleep forever.
pub fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}
