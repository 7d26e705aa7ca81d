use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Instance, Spi};
use embassy_time::{Duration, Timer};

use solar_tracker::hal::{AccelTransport, Reply};
use solar_tracker::{Error, Result};

const REG_DEVID: u8 = 0x00;
const REG_POWER_CTL: u8 = 0x2D;
const REG_DATA_FORMAT: u8 = 0x31;

const DEVID: u8 = 0xE5;
/// Measure bit.
const POWER_CTL_MEASURE: u8 = 0x08;
/// FULL_RES, ±2 g.
const DATA_FORMAT_FULL_RES: u8 = 0x08;

/// ADXL345 on SPI mode 3, single-axis tilt.
pub struct Adxl345<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Adxl345<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        let buf = [reg & 0x3F, value];
        self.cs.set_low();
        let res = self.spi.blocking_write(&buf);
        self.cs.set_high();
        res.map_err(|_| Error::AccelBus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0x80 | (reg & 0x3F), 0x00];
        self.cs.set_low();
        let res = self.spi.blocking_transfer_in_place(&mut buf);
        self.cs.set_high();
        res.map_err(|_| Error::AccelBus)?;
        Ok(buf[1])
    }

    /// Puts the part into measurement mode at full resolution.
    pub async fn init(&mut self) -> Result<()> {
        let id = self.read_reg(REG_DEVID)?;
        if id != DEVID {
            defmt::warn!("adxl345: unexpected device id {=u8:#x}", id);
        }
        self.write_reg(REG_POWER_CTL, POWER_CTL_MEASURE)?;
        self.write_reg(REG_DATA_FORMAT, DATA_FORMAT_FULL_RES)?;
        Timer::after(Duration::from_millis(10)).await;
        Ok(())
    }
}

impl<'d, T: Instance> AccelTransport for Adxl345<'d, T> {
    async fn transfer(&mut self, request: &[u8]) -> Result<Reply> {
        let mut reply = Reply::from_slice(request).map_err(|_| Error::MalformedReply { len: request.len() })?;
        self.cs.set_low();
        let res = self.spi.blocking_transfer_in_place(reply.as_mut_slice());
        self.cs.set_high();
        res.map_err(|_| Error::AccelBus)?;
        Ok(reply)
    }
}
