//! Fan status and the narrow capability interface hosts integrate against.

use crate::EngineResult;
use serde::{Deserialize, Serialize};
use zehnder_packet::{FanSpeed, PacketError, PAYLOAD_SIZE, SPEED_COUNT};

/// State reported by the main unit in a settings frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanStatus {
    /// Active speed preset.
    pub speed: FanSpeed,
    /// Output voltage in percent.
    pub voltage: u8,
    /// Remaining timer minutes, 0 when no timer runs.
    pub timer: u8,
}

impl FanStatus {
    /// Parse `[speed, voltage, timer, ..]` from a frame payload.
    pub fn from_payload(payload: &[u8; PAYLOAD_SIZE]) -> Result<Self, PacketError> {
        Ok(FanStatus {
            speed: FanSpeed::from_byte(payload[0])?,
            voltage: payload[1],
            timer: payload[2],
        })
    }

    /// Encode as `[speed, voltage, timer]`.
    pub fn to_payload(&self) -> [u8; 3] {
        [self.speed.to_byte(), self.voltage, self.timer]
    }
}

/// Minimal fan control surface.
///
/// Host integrations (UI components, home automation bridges) talk to the
/// engine only through this trait.
pub trait Fan {
    /// Number of speed levels above Auto.
    fn speed_count(&self) -> u8 {
        SPEED_COUNT
    }

    /// Last speed reported by the fan, if any.
    fn speed(&self) -> Option<FanSpeed>;

    /// Request a new speed.
    fn set_speed(&mut self, speed: FanSpeed) -> EngineResult<()>;

    /// Request a speed by level, 0 (Auto) through [`speed_count`](Self::speed_count).
    fn set_speed_level(&mut self, level: u8) -> EngineResult<()> {
        let speed = FanSpeed::from_byte(level).map_err(|_| crate::EngineError::InvalidSpeed(level))?;
        self.set_speed(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_payload() {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[..3].copy_from_slice(&[0x02, 50, 15]);

        let status = FanStatus::from_payload(&payload).unwrap();
        assert_eq!(status.speed, FanSpeed::Medium);
        assert_eq!(status.voltage, 50);
        assert_eq!(status.timer, 15);
        assert_eq!(status.to_payload(), [0x02, 50, 15]);
    }

    #[test]
    fn test_status_invalid_speed() {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[0] = 0x09;
        assert_eq!(FanStatus::from_payload(&payload), Err(PacketError::InvalidSpeed(9)));
    }
}
