//! Operating modes and their control-pin table.

use std::fmt;

/// Transceiver operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Everything off, registers retained.
    PowerDown,
    /// Powered while the crystal starts up after leaving PowerDown.
    Standby,
    /// Powered and configured, radio off.
    Idle,
    /// ShockBurst receive.
    Receive,
    /// ShockBurst transmit.
    Transmit,
}

impl Mode {
    /// All modes, in power-up order.
    pub const ALL: [Mode; 5] = [
        Mode::PowerDown,
        Mode::Standby,
        Mode::Idle,
        Mode::Receive,
        Mode::Transmit,
    ];

    /// Levels of the PWR_UP, TRX_CE and TX_EN outputs for this mode.
    pub const fn pin_levels(self) -> PinLevels {
        match self {
            Mode::PowerDown => PinLevels::new(false, false, false),
            Mode::Standby | Mode::Idle => PinLevels::new(true, false, false),
            Mode::Receive => PinLevels::new(true, true, false),
            Mode::Transmit => PinLevels::new(true, true, true),
        }
    }

    /// Whether the mode draws supply current.
    pub const fn is_powered(self) -> bool {
        !matches!(self, Mode::PowerDown)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::PowerDown => "power-down",
            Mode::Standby => "standby",
            Mode::Idle => "idle",
            Mode::Receive => "receive",
            Mode::Transmit => "transmit",
        };
        f.write_str(name)
    }
}

/// Output levels of the three mode-control signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PinLevels {
    /// PWR_UP.
    pub power: bool,
    /// TRX_CE.
    pub chip_enable: bool,
    /// TX_EN.
    pub tx_enable: bool,
}

impl PinLevels {
    /// Create a level set.
    pub const fn new(power: bool, chip_enable: bool, tx_enable: bool) -> Self {
        PinLevels {
            power,
            chip_enable,
            tx_enable,
        }
    }

    /// The mode these levels select, if any.
    ///
    /// Standby and Idle share their levels; Idle is reported.
    pub fn mode(self) -> Option<Mode> {
        match (self.power, self.chip_enable, self.tx_enable) {
            (false, false, false) => Some(Mode::PowerDown),
            (true, false, false) => Some(Mode::Idle),
            (true, true, false) => Some(Mode::Receive),
            (true, true, true) => Some(Mode::Transmit),
            _ => None,
        }
    }
}
