use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::{DMA1_CH1, DMA1_CH3, USART3};
use embassy_stm32::usart::Uart;
use embassy_time::{Duration, Instant, Timer};

use solar_tracker::gps::NmeaParser;

use crate::TRACKER;

/// Receivers send one burst per second; idle line marks its end.
const BURST_TIMEOUT: Duration = Duration::from_millis(1100);

/// Reads NMEA from USART3 and disciplines the wall clock and location.
#[task]
pub async fn gps_task(mut gps_uart: Uart<'static, USART3, DMA1_CH3, DMA1_CH1>) {
    let mut parser = NmeaParser::new();
    let mut buf = [0u8; 512];
    let mut checksum_errors = 0;

    while !TRACKER.is_shutting_down() {
        match select(gps_uart.read_until_idle(&mut buf), Timer::after(BURST_TIMEOUT)).await {
            Either::First(Ok(n)) => {
                parser.feed(&TRACKER, &buf[..n], Instant::now());

                let stats = parser.stats();
                if stats.checksum_errors != checksum_errors {
                    checksum_errors = stats.checksum_errors;
                    defmt::warn!("gps: {} checksum errors", checksum_errors);
                }
            }
            Either::First(Err(_)) => defmt::warn!("gps: uart error"),
            Either::Second(_) => {}
        }
    }
}
