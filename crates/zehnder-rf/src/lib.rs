//! Zehnder/BUVA fan network protocol engine.
//!
//! This crate implements the application protocol spoken by Zehnder and BUVA
//! ventilation units on 868 MHz: joining a fan network, querying the fan
//! state and changing its speed, with protocol-level retries on top of the
//! radio's own back-to-back repeats.
//!
//! # Example
//!
//! ```ignore
//! use zehnder_rf::{EngineConfig, Outcome, ZehnderRf};
//! use zehnder_packet::FanSpeed;
//!
//! let mut fan = ZehnderRf::new(radio, EngineConfig::default());
//! loop {
//!     match fan.poll(clock.millis()) {
//!         Some(Outcome::Discovered(identity)) => fan.set_speed(FanSpeed::High, 0)?,
//!         Some(outcome) => println!("{:?}", outcome),
//!         None => {}
//!     }
//! }
//! ```

mod config;
mod engine;
mod error;
mod fan;
pub mod metrics;
mod radio;
mod state;

pub use config::{EngineConfig, NetworkIdentity};
pub use engine::{Outcome, ZehnderRf};
pub use error::{EngineError, EngineResult};
pub use fan::{Fan, FanStatus};
pub use radio::Radio;
pub use state::{Exchange, ProtocolState};
