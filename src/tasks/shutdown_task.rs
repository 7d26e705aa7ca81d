use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::peripherals::PC0;
use embassy_time::{Duration, Timer};

use solar_tracker::shutdown::{self, Termination};

use crate::{board, MOTOR_LINES, STATUS_LEDS, TERMINATION, TRACKER};

const DEBOUNCE: Duration = Duration::from_millis(50);

/// Every STOP press is one termination signal.
#[task]
pub async fn stop_button_task(mut button: ExtiInput<'static, PC0>) {
    loop {
        button.wait_for_falling_edge().await;
        defmt::info!("STOP pressed");
        TERMINATION.send(Termination::StopButton).await;
        Timer::after(DEBOUNCE).await;
        button.wait_for_high().await;
    }
}

/// Runs on the interrupt executor; never returns.
#[task]
pub async fn shutdown_task() {
    shutdown::run(&TRACKER, &MOTOR_LINES, &STATUS_LEDS, &TERMINATION, board::halt).await
}
