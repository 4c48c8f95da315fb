//! # nrf905
//!
//! Driver for the Nordic nRF905 sub-GHz transceiver, as used by Zehnder/BUVA
//! ventilation remotes.
//!
//! The driver owns the mode state machine (PowerDown, Standby, Idle, Receive,
//! Transmit), the register configuration and byte-level payload transfers.
//! SPI and GPIO are consumed through the `embedded-hal` 1.0 traits.
//!
//! All operations are non-blocking. A transmission is started with
//! [`Nrf905::start_transmit`] and observed through [`Nrf905::poll`], which
//! the host calls on a fixed cadence with its millisecond clock:
//!
//! ```ignore
//! let mut radio = Nrf905::new(spi, Pins::new(pwr, ce, txen).with_data_ready(dr));
//! radio.initialize(Config::default())?;
//!
//! radio.start_transmit(&payload, 4, ReplyPolicy::Await { timeout_ms: 1000 })?;
//! loop {
//!     match radio.poll(clock.millis()) {
//!         RadioEvent::FrameReceived(reply) => { /* ... */ }
//!         RadioEvent::ReceiveTimeout | RadioEvent::TransmitTimeout => break,
//!         _ => {}
//!     }
//! }
//! ```
//!
//! Enable the `sim` feature for a simulated chip that implements the same
//! traits (see [`sim`]).

mod driver;
mod error;
mod mode;
mod pins;
pub mod registers;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use driver::{Nrf905, Payload, RadioEvent, ReplyPolicy, TRANSMIT_TIMEOUT_MS};
pub use error::{InitError, RadioError};
pub use mode::{Mode, PinLevels};
pub use pins::{Pin, Pins};
pub use registers::{Band, ClkOut, Config, Crc, Crystal, RxPower, TxPower, PAYLOAD_WIDTH};
