//! Protocol states and the exchanges they belong to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the fan protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    /// Waiting for the radio to finish initializing.
    Startup,
    /// Discovery requested; the join request goes out on the next poll.
    StartDiscovery,
    /// Join request broadcast, waiting for a main unit to open its network.
    DiscoveryWaitForLinkRequest,
    /// Join acknowledged, waiting for the main unit to confirm.
    DiscoveryWaitForJoinResponse,
    /// Joined; the identity is reported on the next poll.
    DiscoveryJoinComplete,
    /// Resting state.
    Idle,
    /// Waiting for the settings frame answering a query.
    WaitQueryResponse,
    /// Waiting for the main unit to acknowledge a speed change.
    WaitSetSpeedResponse,
    /// Sending the closing confirm of a speed change.
    WaitSetSpeedConfirm,
}

impl ProtocolState {
    /// Whether a reply window is open in this state.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            ProtocolState::DiscoveryWaitForLinkRequest
                | ProtocolState::DiscoveryWaitForJoinResponse
                | ProtocolState::WaitQueryResponse
                | ProtocolState::WaitSetSpeedResponse
        )
    }

    /// The exchange this state is part of, if any.
    pub fn exchange(self) -> Option<Exchange> {
        match self {
            ProtocolState::StartDiscovery
            | ProtocolState::DiscoveryWaitForLinkRequest
            | ProtocolState::DiscoveryWaitForJoinResponse
            | ProtocolState::DiscoveryJoinComplete => Some(Exchange::Discovery),
            ProtocolState::WaitQueryResponse => Some(Exchange::Query),
            ProtocolState::WaitSetSpeedResponse | ProtocolState::WaitSetSpeedConfirm => {
                Some(Exchange::SetSpeed)
            }
            ProtocolState::Startup | ProtocolState::Idle => None,
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A request/reply exchange with the main unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exchange {
    /// Network discovery and join.
    Discovery,
    /// Status query.
    Query,
    /// Speed or timer change.
    SetSpeed,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Exchange::Discovery => "discovery",
            Exchange::Query => "query",
            Exchange::SetSpeed => "set-speed",
        };
        f.write_str(name)
    }
}
