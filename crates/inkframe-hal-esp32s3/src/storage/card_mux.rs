//! Host link through an analog mux in front of a USB card reader bridge.
//!
//! While the select line is low the card sits on the ESP32-S3 SPI bus. While
//! it is high the card is routed to the bridge and enumerates on the host as
//! a mass storage device.

use embedded_hal::digital::OutputPin;
use inkframe_core::arbiter::HostLink;
use log::info;

pub struct CardReaderMux<SEL> {
    select: SEL,
}

impl<SEL> CardReaderMux<SEL>
where
    SEL: OutputPin,
{
    /// Takes the select line, which must already be driven low.
    pub fn new(select: SEL) -> Self {
        Self { select }
    }
}

impl<SEL> HostLink for CardReaderMux<SEL>
where
    SEL: OutputPin,
{
    type Error = SEL::Error;

    fn publish(&mut self) -> Result<(), Self::Error> {
        self.select.set_high()?;
        info!("storage: card routed to usb bridge");
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), Self::Error> {
        self.select.set_low()?;
        info!("storage: card routed to spi");
        Ok(())
    }
}
