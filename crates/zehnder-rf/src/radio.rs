//! The radio seam between the engine and the transceiver driver.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use nrf905::{Nrf905, Payload, RadioError, RadioEvent, ReplyPolicy};
use tracing::warn;

/// Transceiver operations the protocol engine relies on.
pub trait Radio {
    /// Whether the transceiver finished initializing.
    fn is_ready(&self) -> bool;

    /// Start sending `payload` `repeats` times, then follow `reply`.
    fn start_transmit(
        &mut self,
        payload: &Payload,
        repeats: u8,
        reply: ReplyPolicy,
    ) -> Result<(), RadioError>;

    /// Advance pending work.
    fn poll(&mut self, now_ms: u64) -> RadioEvent;

    /// Close an open reply window.
    fn end_receive(&mut self);

    /// Point both the receive and transmit address at `address`.
    ///
    /// On failure both addresses keep their previous value.
    fn set_network_address(&mut self, address: u32) -> Result<(), RadioError>;
}

impl<SPI, OUT, IN> Radio for Nrf905<SPI, OUT, IN>
where
    SPI: SpiDevice,
    OUT: OutputPin,
    IN: InputPin,
{
    fn is_ready(&self) -> bool {
        Nrf905::is_ready(self)
    }

    fn start_transmit(
        &mut self,
        payload: &Payload,
        repeats: u8,
        reply: ReplyPolicy,
    ) -> Result<(), RadioError> {
        Nrf905::start_transmit(self, payload, repeats, reply)
    }

    fn poll(&mut self, now_ms: u64) -> RadioEvent {
        Nrf905::poll(self, now_ms)
    }

    fn end_receive(&mut self) {
        Nrf905::end_receive(self)
    }

    fn set_network_address(&mut self, address: u32) -> Result<(), RadioError> {
        let previous = self.config().rx_address;
        self.set_rx_address(address)?;
        if let Err(e) = self.set_tx_address(address) {
            if let Err(restore) = self.set_rx_address(previous) {
                warn!("Failed to restore RX address {:08X}: {}", previous, restore);
            }
            return Err(e);
        }
        Ok(())
    }
}
