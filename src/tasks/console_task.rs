use embassy_executor::task;
use embassy_usb::driver::EndpointError;

use solar_tracker::console::Console;

use crate::usb::{self, UsbSerial};
use crate::{TERMINATION, TRACKER};

/// One session per USB host connection.
#[task]
pub async fn console_task(mut serial: UsbSerial<'static>) {
    let mut console = Console::new();
    loop {
        serial.wait_connection().await;
        defmt::info!("console connected");
        if let Err(EndpointError::BufferOverflow) = session(&mut serial, &mut console).await {
            defmt::warn!("console: packet larger than buffer");
        }
        defmt::info!("console disconnected");
    }
}

async fn session(serial: &mut UsbSerial<'static>, console: &mut Console) -> Result<(), EndpointError> {
    let mut buf = [0u8; 64];
    loop {
        let n = serial.read_packet(&mut buf).await?;
        for &byte in &buf[..n] {
            if let Some(reply) = console.push_byte(&TRACKER, &TERMINATION, byte) {
                usb::write_line(serial, &reply).await?;
            }
        }
    }
}
