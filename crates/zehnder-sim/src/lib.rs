//! Host-side simulation of a Zehnder/BUVA fan network.
//!
//! A [`Simulation`] wires a [`zehnder_rf::ZehnderRf`] engine to a simulated
//! nRF905 chip and puts a [`MainUnit`] on the other end of a lossy [`Air`]
//! channel. Everything runs on a millisecond tick clock, so runs with the
//! same scenario and seed are identical.
//!
//! Scenarios are YAML files (see [`Scenario`]); the `zehnder-sim` binary runs
//! one and prints a report.

pub mod air;
pub mod error;
pub mod main_unit;
pub mod metrics_export;
pub mod scenario;
pub mod simulation;

pub use air::{Air, AirStats};
pub use error::{SimError, SimResult};
pub use main_unit::MainUnit;
pub use metrics_export::InMemoryRecorder;
pub use scenario::{Action, AirConfig, MainUnitConfig, OutcomeKind, Scenario, Step};
pub use simulation::{SimRadio, SimReport, Simulation, TimedOutcome};
