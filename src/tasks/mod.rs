//! Executor tasks. The control loops live in the library; these bind them to
//! the board's concrete peripherals and statics.

use embassy_executor::task;
use embassy_stm32::peripherals::{DMA1_CH0, DMA1_CH7, I2C1, SPI1};

use solar_tracker::ephemeris::NoaaEphemeris;
use solar_tracker::{estimator, motor, scheduler, watchdog};

use crate::drivers::ads1015::Ads1015;
use crate::drivers::adxl345::Adxl345;
use crate::{MOTOR_LINES, STATUS_LEDS, TRACKER};

pub mod console_task;
pub mod gps_task;
pub mod shutdown_task;

/// Position estimator, 10 Hz.
#[task]
pub async fn sensor_task(mut accel: Adxl345<'static, SPI1>) {
    estimator::run(&TRACKER, &mut accel).await;
}

#[task]
pub async fn scheduler_task() {
    scheduler::run(&TRACKER, NoaaEphemeris).await;
}

/// Motor controller at 5 Hz, or at once on a watchdog stop request.
#[task]
pub async fn motor_task() {
    motor::run(&TRACKER, &MOTOR_LINES).await;
}

/// Safety watchdog, 10 Hz.
#[task]
pub async fn watchdog_task(mut load: Ads1015<'static, I2C1, DMA1_CH7, DMA1_CH0>) {
    watchdog::run(&TRACKER, &mut load, &STATUS_LEDS).await;
}
