//! # zehnder-packet
//!
//! Frame types and codec for the Zehnder/BUVA 868 MHz fan network.
//!
//! Every message on the network is a fixed 16-byte frame:
//!
//! | Offset | Size | Field     | Description                                   |
//! |--------|------|-----------|-----------------------------------------------|
//! | 0      | 1    | dst_type  | Destination device type                       |
//! | 1      | 1    | dst_id    | Destination device id                         |
//! | 2      | 1    | src_type  | Source device type                            |
//! | 3      | 1    | src_id    | Source device id                              |
//! | 4      | 1    | ttl       | Time-to-live, decremented by relaying devices |
//! | 5      | 1    | command   | Command code                                  |
//! | 6      | 10   | payload   | Command-specific parameters                   |
//!
//! ## Usage
//!
//! ```
//! use zehnder_packet::{Command, DeviceType, FanSpeed, Frame};
//!
//! let frame = Frame::new(DeviceType::MainUnit, 0x42, DeviceType::RemoteControl, 0x17, Command::SetSpeed)
//!     .with_payload(&[FanSpeed::High.to_byte()]);
//!
//! let bytes = frame.encode();
//! assert_eq!(bytes[5], 0x02);
//! assert_eq!(Frame::decode(&bytes)?, frame);
//! # Ok::<(), zehnder_packet::PacketError>(())
//! ```

pub mod codec;
mod error;

pub use codec::{decode_frame, encode_frame};
pub use error::PacketError;

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Size of every frame on air.
pub const FRAME_SIZE: usize = 16;
/// Size of the command-specific payload.
pub const PAYLOAD_SIZE: usize = 10;
/// Size of the frame header preceding the payload.
pub const HEADER_SIZE: usize = FRAME_SIZE - PAYLOAD_SIZE;

/// Default time-to-live for originated frames (0xFA).
pub const FAN_TTL: u8 = 250;
/// Number of back-to-back repeats of each transmitted frame.
pub const FAN_TX_FRAMES: u8 = 4;
/// Number of times a request is re-issued when no reply arrives.
pub const FAN_TX_RETRIES: u8 = 10;
/// Reply wait for ordinary exchanges (milliseconds).
pub const FAN_REPLY_TIMEOUT_MS: u64 = 1000;
/// Reply wait while scanning for a network to join (milliseconds).
pub const FAN_DISCOVERY_TIMEOUT_MS: u64 = 1000;
/// How long a main unit keeps its join window open (milliseconds).
pub const FAN_JOIN_DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Network address used while pairing.
pub const NETWORK_LINK_ID: u32 = 0xA55A_5AA5;
/// Factory network address of an unpaired main unit.
pub const NETWORK_DEFAULT_ID: u32 = 0xE7E7_E7E7;

// ============================================================================
// Device Types
// ============================================================================

/// Kind of device on the fan network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// Broadcast to all devices.
    Broadcast,
    /// The ventilation unit itself.
    MainUnit,
    /// Remote controls (this controller announces itself as one).
    RemoteControl,
    /// CO2 sensors.
    Co2Sensor,
    /// Any other type byte seen on air.
    ///
    /// [`from_byte`](Self::from_byte) never yields this for a byte that has a
    /// named variant, so `Unknown(0x01)` compares unequal to its decoded form
    /// [`MainUnit`](Self::MainUnit).
    Unknown(u8),
}

impl DeviceType {
    /// Parse from the wire byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => DeviceType::Broadcast,
            0x01 => DeviceType::MainUnit,
            0x03 => DeviceType::RemoteControl,
            0x18 => DeviceType::Co2Sensor,
            other => DeviceType::Unknown(other),
        }
    }

    /// Wire byte for this type.
    pub fn to_byte(self) -> u8 {
        match self {
            DeviceType::Broadcast => 0x00,
            DeviceType::MainUnit => 0x01,
            DeviceType::RemoteControl => 0x03,
            DeviceType::Co2Sensor => 0x18,
            DeviceType::Unknown(b) => b,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Command code carried in byte 5 of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Set speed as a voltage / percentage.
    SetVoltage,
    /// Set speed preset.
    SetSpeed,
    /// Set speed preset for a number of minutes.
    SetTimer,
    /// Controller asks to join a network.
    NetworkJoinRequest,
    /// Main unit acknowledges a speed change.
    SetSpeedReply,
    /// Main unit offers its network id.
    NetworkJoinOpen,
    /// Current settings, sent by the main unit after 0x01, 0x02 and 0x10.
    FanSettings,
    /// Controller confirms a reply it received.
    Confirm,
    /// Join acknowledgement, in both directions.
    NetworkJoinAck,
    /// Ask which devices are on the network.
    QueryNetwork,
    /// Ask a device for its current settings.
    QueryDevice,
    /// Main unit acknowledges a voltage change.
    SetVoltageReply,
    /// Any other command byte seen on air.
    ///
    /// As with [`DeviceType::Unknown`], a byte with a named variant always
    /// decodes to that variant.
    Unknown(u8),
}

impl Command {
    /// Parse from the wire byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Command::SetVoltage,
            0x02 => Command::SetSpeed,
            0x03 => Command::SetTimer,
            0x04 => Command::NetworkJoinRequest,
            0x05 => Command::SetSpeedReply,
            0x06 => Command::NetworkJoinOpen,
            0x07 => Command::FanSettings,
            0x0B => Command::Confirm,
            0x0C => Command::NetworkJoinAck,
            0x0D => Command::QueryNetwork,
            0x10 => Command::QueryDevice,
            0x1D => Command::SetVoltageReply,
            other => Command::Unknown(other),
        }
    }

    /// Wire byte for this command.
    pub fn to_byte(self) -> u8 {
        match self {
            Command::SetVoltage => 0x01,
            Command::SetSpeed => 0x02,
            Command::SetTimer => 0x03,
            Command::NetworkJoinRequest => 0x04,
            Command::SetSpeedReply => 0x05,
            Command::NetworkJoinOpen => 0x06,
            Command::FanSettings => 0x07,
            Command::Confirm => 0x0B,
            Command::NetworkJoinAck => 0x0C,
            Command::QueryNetwork => 0x0D,
            Command::QueryDevice => 0x10,
            Command::SetVoltageReply => 0x1D,
            Command::Unknown(b) => b,
        }
    }
}

// ============================================================================
// Speed Presets
// ============================================================================

/// Number of speed presets above Auto.
pub const SPEED_COUNT: u8 = 4;

/// Fan speed presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    /// Off / automatic: 0% or 0.0 volt.
    #[default]
    Auto,
    /// 30% or 3.0 volt.
    Low,
    /// 50% or 5.0 volt.
    Medium,
    /// 90% or 9.0 volt.
    High,
    /// 100% or 10.0 volt.
    Max,
}

impl FanSpeed {
    /// Parse from the wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, PacketError> {
        match byte {
            0x00 => Ok(FanSpeed::Auto),
            0x01 => Ok(FanSpeed::Low),
            0x02 => Ok(FanSpeed::Medium),
            0x03 => Ok(FanSpeed::High),
            0x04 => Ok(FanSpeed::Max),
            other => Err(PacketError::InvalidSpeed(other)),
        }
    }

    /// Wire byte for this preset.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Nominal output voltage percentage for this preset.
    pub fn nominal_voltage(self) -> u8 {
        match self {
            FanSpeed::Auto => 0,
            FanSpeed::Low => 30,
            FanSpeed::Medium => 50,
            FanSpeed::High => 90,
            FanSpeed::Max => 100,
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A single 16-byte fan network frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Destination device type.
    pub dst_type: DeviceType,
    /// Destination device id (0 addresses every device of `dst_type`).
    pub dst_id: u8,
    /// Source device type.
    pub src_type: DeviceType,
    /// Source device id.
    pub src_id: u8,
    /// Time-to-live hop counter.
    pub ttl: u8,
    /// Command code.
    pub command: Command,
    /// Command parameters, zero padded.
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Frame {
    /// Create a frame with the default ttl and an empty payload.
    pub fn new(
        dst_type: DeviceType,
        dst_id: u8,
        src_type: DeviceType,
        src_id: u8,
        command: Command,
    ) -> Self {
        Frame {
            dst_type,
            dst_id,
            src_type,
            src_id,
            ttl: FAN_TTL,
            command,
            payload: [0u8; PAYLOAD_SIZE],
        }
    }

    /// Copy `params` into the start of the payload. Extra bytes are dropped.
    pub fn with_payload(mut self, params: &[u8]) -> Self {
        let len = params.len().min(PAYLOAD_SIZE);
        if params.len() > PAYLOAD_SIZE {
            log::warn!(
                "Frame payload truncated from {} to {} bytes",
                params.len(),
                PAYLOAD_SIZE
            );
        }
        self.payload = [0u8; PAYLOAD_SIZE];
        self.payload[..len].copy_from_slice(&params[..len]);
        self
    }

    /// Override the ttl. An originator never sends ttl 0, so 0 falls back to
    /// [`FAN_TTL`].
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = if ttl == 0 { FAN_TTL } else { ttl };
        self
    }

    /// Read a little-endian u32 from the payload at `offset`.
    ///
    /// Returns `None` when the value would run past the payload.
    pub fn payload_u32_le(&self, offset: usize) -> Option<u32> {
        let bytes = self.payload.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Whether the frame is addressed to `device_type`/`device_id`, either
    /// directly or by broadcast.
    pub fn is_addressed_to(&self, device_type: DeviceType, device_id: u8) -> bool {
        match self.dst_type {
            DeviceType::Broadcast => true,
            t if t == device_type => self.dst_id == device_id || self.dst_id == 0,
            _ => false,
        }
    }

    /// Whether the frame was sent by `device_type`/`device_id`.
    pub fn is_from(&self, device_type: DeviceType, device_id: u8) -> bool {
        self.src_type == device_type && self.src_id == device_id
    }

    /// Encode to the 16-byte wire format.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        encode_frame(self)
    }

    /// Decode from the wire format.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        decode_frame(data)
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = PacketError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        decode_frame(data)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:02X} -> {:?}/{:02X} ttl={} cmd={:?} [{}]",
            self.src_type,
            self.src_id,
            self.dst_type,
            self.dst_id,
            self.ttl,
            self.command,
            hex::encode(self.payload)
        )
    }
}
