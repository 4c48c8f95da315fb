//! SPI instruction set and the configuration register image.
//!
//! ## Configuration register (10 bytes)
//!
//! | Byte | Bits | Field                                                  |
//! |------|------|--------------------------------------------------------|
//! | 0    | 7:0  | CH_NO[7:0]                                             |
//! | 1    | 5    | AUTO_RETRAN                                            |
//! | 1    | 4    | RX_RED_PWR                                             |
//! | 1    | 3:2  | PA_PWR                                                 |
//! | 1    | 1    | HFREQ_PLL                                              |
//! | 1    | 0    | CH_NO[8]                                               |
//! | 2    | 6:4  | TX_AFW                                                 |
//! | 2    | 2:0  | RX_AFW                                                 |
//! | 3    | 5:0  | RX_PW                                                  |
//! | 4    | 5:0  | TX_PW                                                  |
//! | 5-8  |      | RX_ADDRESS, least significant byte first               |
//! | 9    | 7    | CRC_MODE                                               |
//! | 9    | 6    | CRC_EN                                                 |
//! | 9    | 5:3  | XOF                                                    |
//! | 9    | 2    | UP_CLK_EN                                              |
//! | 9    | 1:0  | UP_CLK_FREQ                                            |

use crate::InitError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Instructions
// ============================================================================

/// Write configuration register, low nibble is the start byte.
pub const W_CONFIG: u8 = 0x00;
/// Read configuration register, low nibble is the start byte.
pub const R_CONFIG: u8 = 0x10;
/// Write TX payload.
pub const W_TX_PAYLOAD: u8 = 0x20;
/// Read TX payload.
pub const R_TX_PAYLOAD: u8 = 0x21;
/// Write TX address.
pub const W_TX_ADDRESS: u8 = 0x22;
/// Read TX address.
pub const R_TX_ADDRESS: u8 = 0x23;
/// Read RX payload.
pub const R_RX_PAYLOAD: u8 = 0x24;

/// Status register: data ready.
pub const STATUS_DR: u8 = 1 << 5;
/// Status register: address match.
pub const STATUS_AM: u8 = 1 << 7;

/// Size of the configuration register.
pub const CONFIG_REGISTER_SIZE: usize = 10;
/// Offset of RX_ADDRESS within the configuration register.
pub const RX_ADDRESS_OFFSET: usize = 5;

/// Payload width used by the fan protocol.
pub const PAYLOAD_WIDTH: usize = 16;
/// Address width used by the fan protocol.
pub const ADDRESS_WIDTH: u8 = 4;
/// Largest channel number (9 bits).
pub const MAX_CHANNEL: u16 = 0x1FF;

/// Factory TX/RX address of the fan network radios.
pub const DEFAULT_ADDRESS: u32 = 0x8981_6EA9;

// ============================================================================
// Field Types
// ============================================================================

/// Frequency band (HFREQ_PLL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    /// 433 MHz band.
    #[serde(rename = "433mhz")]
    Mhz433,
    /// 868/915 MHz band.
    #[serde(rename = "868mhz")]
    Mhz868,
}

/// CRC mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crc {
    /// No CRC.
    Disabled,
    /// 8-bit CRC.
    Bits8,
    /// 16-bit CRC.
    Bits16,
}

/// Output power (PA_PWR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPower {
    /// -10 dBm.
    Minus10dBm,
    /// -2 dBm.
    Minus2dBm,
    /// +6 dBm.
    Plus6dBm,
    /// +10 dBm.
    Plus10dBm,
}

/// Receive sensitivity mode (RX_RED_PWR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RxPower {
    /// Normal operation.
    Normal,
    /// Reduced current, lower sensitivity.
    Reduced,
}

/// Crystal oscillator frequency (XOF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crystal {
    /// 4 MHz.
    Mhz4,
    /// 8 MHz.
    Mhz8,
    /// 12 MHz.
    Mhz12,
    /// 16 MHz.
    Mhz16,
    /// 20 MHz.
    Mhz20,
}

impl Crystal {
    /// Frequency in Hz.
    pub fn hz(self) -> u32 {
        match self {
            Crystal::Mhz4 => 4_000_000,
            Crystal::Mhz8 => 8_000_000,
            Crystal::Mhz12 => 12_000_000,
            Crystal::Mhz16 => 16_000_000,
            Crystal::Mhz20 => 20_000_000,
        }
    }
}

/// Output clock frequency (UP_CLK_FREQ).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClkOut {
    /// 4 MHz.
    Mhz4,
    /// 2 MHz.
    Mhz2,
    /// 1 MHz.
    Mhz1,
    /// 500 kHz.
    Khz500,
}

// ============================================================================
// Configuration
// ============================================================================

/// Transceiver configuration.
///
/// Fixed after initialization. The defaults are the settings the fan network
/// radios use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frequency band.
    pub band: Band,
    /// Channel number, 0..=511.
    pub channel: u16,
    /// CRC mode.
    pub crc: Crc,
    /// Output power.
    pub tx_power: TxPower,
    /// Receive power mode.
    pub rx_power: RxPower,
    /// Let the chip repeat the TX payload while TRX_CE is held.
    pub auto_retransmit: bool,
    /// Own receive address.
    pub rx_address: u32,
    /// Address written to the TX address register.
    pub tx_address: u32,
    /// RX address width in bytes.
    pub rx_address_width: u8,
    /// TX address width in bytes.
    pub tx_address_width: u8,
    /// RX payload width in bytes.
    pub rx_payload_width: u8,
    /// TX payload width in bytes.
    pub tx_payload_width: u8,
    /// Crystal frequency.
    pub crystal: Crystal,
    /// Output clock frequency.
    pub clk_out: ClkOut,
    /// Output clock enable.
    pub clk_out_enable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            band: Band::Mhz868,
            channel: 118,
            crc: Crc::Bits16,
            tx_power: TxPower::Plus10dBm,
            rx_power: RxPower::Normal,
            auto_retransmit: false,
            rx_address: DEFAULT_ADDRESS,
            tx_address: DEFAULT_ADDRESS,
            rx_address_width: ADDRESS_WIDTH,
            tx_address_width: ADDRESS_WIDTH,
            rx_payload_width: PAYLOAD_WIDTH as u8,
            tx_payload_width: PAYLOAD_WIDTH as u8,
            crystal: Crystal::Mhz16,
            clk_out: ClkOut::Khz500,
            clk_out_enable: false,
        }
    }
}

impl Config {
    /// Check the configuration against the chip limits and the fixed frame
    /// geometry.
    pub fn validate(&self) -> Result<(), InitError> {
        if self.channel > MAX_CHANNEL {
            return Err(InitError::invalid_config(format!(
                "channel {} exceeds maximum {}",
                self.channel, MAX_CHANNEL
            )));
        }
        if self.rx_address_width != ADDRESS_WIDTH || self.tx_address_width != ADDRESS_WIDTH {
            return Err(InitError::invalid_config(format!(
                "address widths rx={} tx={}, protocol requires {}",
                self.rx_address_width, self.tx_address_width, ADDRESS_WIDTH
            )));
        }
        if self.rx_payload_width as usize != PAYLOAD_WIDTH
            || self.tx_payload_width as usize != PAYLOAD_WIDTH
        {
            return Err(InitError::invalid_config(format!(
                "payload widths rx={} tx={}, protocol requires {}",
                self.rx_payload_width, self.tx_payload_width, PAYLOAD_WIDTH
            )));
        }
        Ok(())
    }

    /// Carrier frequency in kHz.
    pub fn frequency_khz(&self) -> u32 {
        let base = (4224 + u32::from(self.channel)) * 100;
        match self.band {
            Band::Mhz433 => base,
            Band::Mhz868 => base * 2,
        }
    }

    /// Encode to the configuration register image.
    pub fn to_registers(&self) -> [u8; CONFIG_REGISTER_SIZE] {
        let mut regs = [0u8; CONFIG_REGISTER_SIZE];

        regs[0] = (self.channel & 0xFF) as u8;
        regs[1] = (u8::from(self.auto_retransmit) << 5)
            | (u8::from(self.rx_power == RxPower::Reduced) << 4)
            | (pa_bits(self.tx_power) << 2)
            | (u8::from(self.band == Band::Mhz868) << 1)
            | ((self.channel >> 8) & 0x01) as u8;
        regs[2] = ((self.tx_address_width & 0x07) << 4) | (self.rx_address_width & 0x07);
        regs[3] = self.rx_payload_width & 0x3F;
        regs[4] = self.tx_payload_width & 0x3F;
        regs[RX_ADDRESS_OFFSET..RX_ADDRESS_OFFSET + 4].copy_from_slice(&self.rx_address.to_le_bytes());

        let (crc_en, crc_mode) = match self.crc {
            Crc::Disabled => (0, 0),
            Crc::Bits8 => (1, 0),
            Crc::Bits16 => (1, 1),
        };
        regs[9] = (crc_mode << 7)
            | (crc_en << 6)
            | (xof_bits(self.crystal) << 3)
            | (u8::from(self.clk_out_enable) << 2)
            | clk_bits(self.clk_out);

        regs
    }

    /// Decode a configuration register image.
    ///
    /// `tx_address` is not part of the image and is passed separately.
    pub fn from_registers(regs: &[u8; CONFIG_REGISTER_SIZE], tx_address: u32) -> Result<Self, InitError> {
        let crystal = match (regs[9] >> 3) & 0x07 {
            0 => Crystal::Mhz4,
            1 => Crystal::Mhz8,
            2 => Crystal::Mhz12,
            3 => Crystal::Mhz16,
            4 => Crystal::Mhz20,
            other => return Err(InitError::invalid_config(format!("unknown XOF value {}", other))),
        };
        let crc = match (regs[9] >> 6) & 0x03 {
            0b00 | 0b10 => Crc::Disabled,
            0b01 => Crc::Bits8,
            _ => Crc::Bits16,
        };

        Ok(Config {
            band: if regs[1] & 0x02 != 0 { Band::Mhz868 } else { Band::Mhz433 },
            channel: u16::from(regs[0]) | (u16::from(regs[1] & 0x01) << 8),
            crc,
            tx_power: match (regs[1] >> 2) & 0x03 {
                0 => TxPower::Minus10dBm,
                1 => TxPower::Minus2dBm,
                2 => TxPower::Plus6dBm,
                _ => TxPower::Plus10dBm,
            },
            rx_power: if regs[1] & 0x10 != 0 { RxPower::Reduced } else { RxPower::Normal },
            auto_retransmit: regs[1] & 0x20 != 0,
            rx_address: u32::from_le_bytes([regs[5], regs[6], regs[7], regs[8]]),
            tx_address,
            rx_address_width: regs[2] & 0x07,
            tx_address_width: (regs[2] >> 4) & 0x07,
            rx_payload_width: regs[3] & 0x3F,
            tx_payload_width: regs[4] & 0x3F,
            crystal,
            clk_out: match regs[9] & 0x03 {
                0 => ClkOut::Mhz4,
                1 => ClkOut::Mhz2,
                2 => ClkOut::Mhz1,
                _ => ClkOut::Khz500,
            },
            clk_out_enable: regs[9] & 0x04 != 0,
        })
    }
}

fn pa_bits(power: TxPower) -> u8 {
    match power {
        TxPower::Minus10dBm => 0,
        TxPower::Minus2dBm => 1,
        TxPower::Plus6dBm => 2,
        TxPower::Plus10dBm => 3,
    }
}

fn xof_bits(crystal: Crystal) -> u8 {
    match crystal {
        Crystal::Mhz4 => 0,
        Crystal::Mhz8 => 1,
        Crystal::Mhz12 => 2,
        Crystal::Mhz16 => 3,
        Crystal::Mhz20 => 4,
    }
}

fn clk_bits(clk: ClkOut) -> u8 {
    match clk {
        ClkOut::Mhz4 => 0,
        ClkOut::Mhz2 => 1,
        ClkOut::Mhz1 => 2,
        ClkOut::Khz500 => 3,
    }
}
