use embassy_stm32::i2c::{I2c, Instance, RxDma, TxDma};
use embassy_time::{Duration, Timer};
use micromath::F32Ext;

use solar_tracker::hal::{LoadReading, LoadSense};
use solar_tracker::{Error, Result};

const ADDR: u8 = 0x48;
const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

// Config register fields
const OS_START: u16 = 1 << 15;
const MUX_AIN0_AIN1: u16 = 0b000 << 12;
const MUX_AIN2_AIN3: u16 = 0b011 << 12;
/// ±4.096 V full scale, 2 mV per count.
const PGA_4V096: u16 = 0b001 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const DR_1600SPS: u16 = 0b100 << 5;
const COMP_DISABLE: u16 = 0b11;

const VOLTS_PER_COUNT: f32 = 0.002;
/// One conversion at 1600 SPS is 625 µs; leave margin.
const CONVERSION_TIME: Duration = Duration::from_millis(2);

/// ADS1015 reading two differential load-sense channels (P0-P1, P2-P3).
///
/// Transfers go through the I2C DMA channels, so the bus wait yields to other tasks.
pub struct Ads1015<'d, T: Instance, Tx, Rx> {
    i2c: I2c<'d, T, Tx, Rx>,
}

impl<'d, T: Instance, Tx: TxDma<T>, Rx: RxDma<T>> Ads1015<'d, T, Tx, Rx> {
    pub fn new(i2c: I2c<'d, T, Tx, Rx>) -> Self {
        Self { i2c }
    }

    async fn convert(&mut self, mux: u16) -> Result<f32> {
        let config = OS_START | mux | PGA_4V096 | MODE_SINGLE_SHOT | DR_1600SPS | COMP_DISABLE;
        let [hi, lo] = config.to_be_bytes();
        self.i2c
            .write(ADDR, &[REG_CONFIG, hi, lo])
            .await
            .map_err(|_| Error::LoadSenseBus)?;

        Timer::after(CONVERSION_TIME).await;

        let mut buf = [0u8; 2];
        self.i2c
            .write_read(ADDR, &[REG_CONVERSION], &mut buf)
            .await
            .map_err(|_| Error::LoadSenseBus)?;
        // 12-bit result, left-aligned
        let counts = i16::from_be_bytes(buf) >> 4;
        Ok(round_hundredth(f32::from(counts) * VOLTS_PER_COUNT))
    }
}

impl<'d, T: Instance, Tx: TxDma<T>, Rx: RxDma<T>> LoadSense for Ads1015<'d, T, Tx, Rx> {
    async fn read(&mut self) -> Result<LoadReading> {
        let channel0 = self.convert(MUX_AIN0_AIN1).await?;
        let channel1 = self.convert(MUX_AIN2_AIN3).await?;
        Ok(LoadReading { channel0, channel1 })
    }
}

fn round_hundredth(volts: f32) -> f32 {
    (volts * 100.0).round() / 100.0
}
