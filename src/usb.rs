use embassy_stm32::usb_otg::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

bind_interrupts!(pub struct Irqs {
    OTG_FS => usb_otg::InterruptHandler<peripherals::USB_OTG_FS>;
});

pub type UsbDriver = Driver<'static, peripherals::USB_OTG_FS>;
pub type UsbSerial<'a> = CdcAcmClass<'a, UsbDriver>;

const MAX_PACKET_SIZE: u16 = 64;

/// Descriptor and endpoint buffers; must outlive the device.
struct UsbResources {
    config_desc: [u8; 256],
    bos_desc: [u8; 256],
    control_buf: [u8; 64],
    ep_out_buffer: [u8; 256],
    state: State<'static>,
}

static USB_RES: StaticCell<UsbResources> = StaticCell::new();

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// CDC-ACM console on the OTG FS port. Call once.
pub fn init(
    usb_periph: peripherals::USB_OTG_FS,
    pa12: peripherals::PA12,
    pa11: peripherals::PA11,
) -> (UsbDevice<'static, UsbDriver>, UsbSerial<'static>) {
    let UsbResources {
        config_desc,
        bos_desc,
        control_buf,
        ep_out_buffer,
        state,
    } = USB_RES.init(UsbResources {
        config_desc: [0; 256],
        bos_desc: [0; 256],
        control_buf: [0; 64],
        ep_out_buffer: [0; 256],
        state: State::new(),
    });

    let mut usb_config = usb_otg::Config::default();
    usb_config.vbus_detection = false;
    let driver = Driver::new_fs(usb_periph, Irqs, pa12, pa11, ep_out_buffer, usb_config);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("Solar Tracker");
    config.product = Some("Tracker Console");
    config.serial_number = Some("00000001");

    let mut builder = Builder::new(driver, config, config_desc, bos_desc, &mut [], control_buf);
    let class = CdcAcmClass::new(&mut builder, state, MAX_PACKET_SIZE);
    (builder.build(), class)
}

/// Writes `line` plus `\r\n`, split into endpoint-sized packets.
pub async fn write_line(class: &mut UsbSerial<'static>, line: &str) -> Result<(), EndpointError> {
    for chunk in line.as_bytes().chunks(usize::from(MAX_PACKET_SIZE)) {
        class.write_packet(chunk).await?;
    }
    class.write_packet(b"\r\n").await
}
