//! YAML scenario files.
//!
//! A scenario describes the simulated radio and engine configuration, the
//! behaviour of the main unit, and a timed script of commands:
//!
//! ```yaml
//! name: set-speed
//! seed: 42
//! duration_ms: 20000
//! main_unit:
//!   id: 66
//!   network_id: 3735928559
//! steps:
//!   - at_ms: 0
//!     action: discover
//!   - at_ms: 5000
//!     action: set_speed
//!     speed: high
//! expect: [discovered, speed_set]
//! ```

use crate::error::{SimError, SimResult};
use nrf905::Config as RadioConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zehnder_packet::FanSpeed;
use zehnder_rf::{EngineConfig, Outcome};

// ============================================================================
// Scenario
// ============================================================================

/// A complete simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Human readable name.
    pub name: String,
    /// Seed for every random source of the run.
    pub seed: u64,
    /// Simulated time step (ms).
    pub tick_ms: u64,
    /// Total simulated time (ms).
    pub duration_ms: u64,
    /// Controller radio configuration.
    pub radio: RadioConfig,
    /// Controller engine configuration.
    pub engine: EngineConfig,
    /// Simulated fan.
    pub main_unit: MainUnitConfig,
    /// Medium between the two radios.
    pub air: AirConfig,
    /// Commands issued during the run.
    pub steps: Vec<Step>,
    /// Outcomes the run must produce, in order.
    pub expect: Vec<OutcomeKind>,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            name: "unnamed".to_string(),
            seed: 0,
            tick_ms: 1,
            duration_ms: 10_000,
            radio: RadioConfig::default(),
            engine: EngineConfig::default(),
            main_unit: MainUnitConfig::default(),
            air: AirConfig::default(),
            steps: Vec::new(),
            expect: Vec::new(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a YAML file.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse a scenario from YAML text.
    pub fn from_yaml(text: &str) -> SimResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

// ============================================================================
// Participants
// ============================================================================

/// Behaviour of the simulated main unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainUnitConfig {
    /// Device id of the main unit.
    pub id: u8,
    /// Network the main unit hands out when a device joins.
    pub network_id: u32,
    /// Whether the unit answers join requests on the link address.
    pub join_open: bool,
    /// Whether the unit answers at all.
    pub responsive: bool,
    /// Delay between hearing a request and starting the reply (ms).
    pub response_delay_ms: u64,
    /// Copies of every reply sent back-to-back.
    pub reply_copies: u8,
    /// Identical frames heard within this window count once (ms).
    pub dedup_window_ms: u64,
    /// Speed the unit starts at.
    pub initial_speed: FanSpeed,
}

impl Default for MainUnitConfig {
    fn default() -> Self {
        MainUnitConfig {
            id: 66,
            network_id: 0xDEAD_BEEF,
            join_open: true,
            responsive: true,
            response_delay_ms: 20,
            reply_copies: zehnder_packet::FAN_TX_FRAMES,
            dedup_window_ms: 100,
            initial_speed: FanSpeed::Low,
        }
    }
}

/// Medium between controller and main unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirConfig {
    /// Probability that any single copy of a frame is lost.
    pub loss_probability: f64,
}

impl Default for AirConfig {
    fn default() -> Self {
        AirConfig {
            loss_probability: 0.0,
        }
    }
}

// ============================================================================
// Script
// ============================================================================

/// A command issued at a point in simulated time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// When to issue the command (ms).
    pub at_ms: u64,
    /// The command.
    #[serde(flatten)]
    pub action: Action,
}

/// Commands a scenario can issue to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Join a network.
    Discover,
    /// Query the fan state.
    Query,
    /// Change the speed.
    SetSpeed {
        speed: FanSpeed,
        #[serde(default)]
        timer: u8,
    },
    /// Change the automatic refresh interval.
    SetUpdateInterval { interval_ms: u64 },
}

/// Outcome variants without their data, for expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Discovered,
    DiscoveryFailed,
    Status,
    SpeedSet,
    Failure,
}

impl OutcomeKind {
    /// Kind of `outcome`.
    pub fn of(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Discovered(_) => OutcomeKind::Discovered,
            Outcome::DiscoveryFailed => OutcomeKind::DiscoveryFailed,
            Outcome::Status(_) => OutcomeKind::Status,
            Outcome::SpeedSet(_) => OutcomeKind::SpeedSet,
            Outcome::Failure(_) => OutcomeKind::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrf905::Band;

    #[test]
    fn test_parse_scenario() {
        let yaml = r#"
name: speed-change
seed: 7
duration_ms: 20000
radio:
  band: 868mhz
  channel: 118
main_unit:
  id: 81
  response_delay_ms: 5
air:
  loss_probability: 0.1
steps:
  - at_ms: 0
    action: discover
  - at_ms: 4000
    action: set_speed
    speed: max
    timer: 30
  - at_ms: 9000
    action: query
expect: [discovered, speed_set, status]
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "speed-change");
        assert_eq!(scenario.tick_ms, 1);
        assert_eq!(scenario.radio.band, Band::Mhz868);
        assert_eq!(scenario.main_unit.id, 81);
        assert_eq!(scenario.main_unit.reply_copies, 4);
        assert_eq!(scenario.air.loss_probability, 0.1);
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(
            scenario.steps[1].action,
            Action::SetSpeed {
                speed: FanSpeed::Max,
                timer: 30
            }
        );
        assert_eq!(scenario.steps[2].action, Action::Query);
        assert_eq!(
            scenario.expect,
            vec![OutcomeKind::Discovered, OutcomeKind::SpeedSet, OutcomeKind::Status]
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = "steps:\n  - at_ms: 0\n    action: reboot\n";
        assert!(matches!(Scenario::from_yaml(yaml), Err(SimError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Scenario::load(Path::new("/nonexistent/scenario.yaml")).unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }

    #[test]
    fn test_outcome_kind() {
        assert_eq!(OutcomeKind::of(&Outcome::DiscoveryFailed), OutcomeKind::DiscoveryFailed);
    }
}
