//! Control and status signal bindings.

use std::fmt;

/// A transceiver signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// PWR_UP output (mandatory).
    Power,
    /// TRX_CE output (mandatory).
    ChipEnable,
    /// TX_EN output (mandatory).
    TxEnable,
    /// DR input: transmit finished or valid payload received.
    DataReady,
    /// AM input: address match, diagnostics only.
    AddressMatch,
    /// CD input: carrier detect, diagnostics only.
    CarrierDetect,
}

impl Pin {
    /// Whether initialization must abort when this signal is unbound.
    pub const fn is_mandatory(self) -> bool {
        matches!(self, Pin::Power | Pin::ChipEnable | Pin::TxEnable)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pin::Power => "PWR",
            Pin::ChipEnable => "CE",
            Pin::TxEnable => "TXEN",
            Pin::DataReady => "DR",
            Pin::AddressMatch => "AM",
            Pin::CarrierDetect => "CD",
        };
        f.write_str(name)
    }
}

/// GPIO bindings for one transceiver.
///
/// All outputs share one type and all inputs another, which matches the
/// type-erased pin types most HALs offer. Unbound signals are `None`.
pub struct Pins<OUT, IN> {
    /// PWR_UP output.
    pub power: Option<OUT>,
    /// TRX_CE output.
    pub chip_enable: Option<OUT>,
    /// TX_EN output.
    pub tx_enable: Option<OUT>,
    /// DR input. Without it, data-ready is read from the SPI status register.
    pub data_ready: Option<IN>,
    /// AM input.
    pub address_match: Option<IN>,
    /// CD input.
    pub carrier_detect: Option<IN>,
}

impl<OUT, IN> Default for Pins<OUT, IN> {
    fn default() -> Self {
        Pins {
            power: None,
            chip_enable: None,
            tx_enable: None,
            data_ready: None,
            address_match: None,
            carrier_detect: None,
        }
    }
}

impl<OUT, IN> Pins<OUT, IN> {
    /// Bind the three mandatory outputs.
    pub fn new(power: OUT, chip_enable: OUT, tx_enable: OUT) -> Self {
        Pins {
            power: Some(power),
            chip_enable: Some(chip_enable),
            tx_enable: Some(tx_enable),
            ..Default::default()
        }
    }

    /// Bind the data-ready input.
    pub fn with_data_ready(mut self, pin: IN) -> Self {
        self.data_ready = Some(pin);
        self
    }

    /// Bind the address-match input.
    pub fn with_address_match(mut self, pin: IN) -> Self {
        self.address_match = Some(pin);
        self
    }

    /// Bind the carrier-detect input.
    pub fn with_carrier_detect(mut self, pin: IN) -> Self {
        self.carrier_detect = Some(pin);
        self
    }

    /// Whether `pin` is bound.
    pub fn is_bound(&self, pin: Pin) -> bool {
        match pin {
            Pin::Power => self.power.is_some(),
            Pin::ChipEnable => self.chip_enable.is_some(),
            Pin::TxEnable => self.tx_enable.is_some(),
            Pin::DataReady => self.data_ready.is_some(),
            Pin::AddressMatch => self.address_match.is_some(),
            Pin::CarrierDetect => self.carrier_detect.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mandatory_pins() {
        assert!(Pin::Power.is_mandatory());
        assert!(Pin::ChipEnable.is_mandatory());
        assert!(Pin::TxEnable.is_mandatory());
        assert!(!Pin::DataReady.is_mandatory());
        assert!(!Pin::CarrierDetect.is_mandatory());
    }

    #[test]
    fn test_binding() {
        let pins: Pins<u8, u8> = Pins::new(1, 2, 3).with_data_ready(4);
        assert!(pins.is_bound(Pin::TxEnable));
        assert!(pins.is_bound(Pin::DataReady));
        assert!(!pins.is_bound(Pin::AddressMatch));

        let empty: Pins<u8, u8> = Pins::default();
        assert!(!empty.is_bound(Pin::Power));
    }
}
