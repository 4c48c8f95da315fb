//! Engine configuration and the network identity record.

use serde::{Deserialize, Serialize};
use zehnder_packet::{
    DeviceType, FAN_DISCOVERY_TIMEOUT_MS, FAN_REPLY_TIMEOUT_MS, FAN_TX_FRAMES, FAN_TX_RETRIES,
};

/// Identity of this controller on a fan network.
///
/// Written once when discovery completes; may also be supplied up front to
/// skip discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    /// Own device type.
    pub device_type: DeviceType,
    /// Own device id.
    pub device_id: u8,
    /// Main unit device type.
    pub main_unit_type: DeviceType,
    /// Main unit device id.
    pub main_unit_id: u8,
    /// Network address shared by all devices of the network.
    pub network_id: u32,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Back-to-back repeats of every frame on air.
    pub tx_repeats: u8,
    /// Times a request is re-issued when no reply arrives.
    pub retries: u8,
    /// Reply window for query and speed exchanges (ms).
    pub reply_timeout_ms: u64,
    /// Reply window while discovering and joining a network (ms).
    pub discovery_timeout_ms: u64,
    /// Interval for automatic status queries once joined (ms, 0 disables).
    pub update_interval_ms: u64,
    /// Seed for the device id generator. Drawn from the OS when unset.
    pub rng_seed: Option<u64>,
    /// Previously learned identity.
    pub identity: Option<NetworkIdentity>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tx_repeats: FAN_TX_FRAMES,
            retries: FAN_TX_RETRIES,
            reply_timeout_ms: FAN_REPLY_TIMEOUT_MS,
            discovery_timeout_ms: FAN_DISCOVERY_TIMEOUT_MS,
            update_interval_ms: 0,
            rng_seed: None,
            identity: None,
        }
    }
}
