//! Error types for the simulation harness.

use nrf905::InitError;
use std::path::PathBuf;
use thiserror::Error;
use zehnder_rf::EngineError;

/// Errors raised while loading or running a scenario.
#[derive(Debug, Error)]
pub enum SimError {
    /// Scenario file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scenario file is not valid YAML for a scenario.
    #[error("invalid scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The simulated radio refused its configuration.
    #[error("radio initialization failed: {0}")]
    Init(#[from] InitError),

    /// A scripted command was rejected by the engine.
    #[error("command at {at_ms} ms rejected: {source}")]
    Engine {
        at_ms: u64,
        #[source]
        source: EngineError,
    },

    /// The run did not produce the outcomes the scenario expects.
    #[error("expected {expected:?}, got {actual:?}")]
    Expectation {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

/// Result type alias for the simulation harness.
pub type SimResult<T> = Result<T, SimError>;
