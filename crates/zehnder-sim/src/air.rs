//! The medium between the two simulated radios.

use crate::scenario::AirConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Traffic counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AirStats {
    /// Copies put on air by the controller.
    pub controller_frames: u64,
    /// Copies put on air by the main unit.
    pub main_unit_frames: u64,
    /// Copies dropped by the loss model.
    pub lost: u64,
    /// Copies that reached a radio not listening for them.
    pub missed: u64,
}

/// Lossy broadcast medium.
#[derive(Debug)]
pub struct Air {
    loss_probability: f64,
    rng: ChaCha8Rng,
    stats: AirStats,
}

impl Air {
    /// Create a medium with its own seeded loss model.
    pub fn new(config: &AirConfig, seed: u64) -> Self {
        Air {
            loss_probability: config.loss_probability.clamp(0.0, 1.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
            stats: AirStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> AirStats {
        self.stats
    }

    /// Account for a copy sent by the controller; `false` when it is lost.
    pub fn carry_from_controller(&mut self) -> bool {
        self.stats.controller_frames += 1;
        self.survives()
    }

    /// Account for a copy sent by the main unit; `false` when it is lost.
    pub fn carry_from_main_unit(&mut self) -> bool {
        self.stats.main_unit_frames += 1;
        self.survives()
    }

    /// Record a copy that arrived while the receiver was not listening.
    pub fn record_missed(&mut self) {
        self.stats.missed += 1;
    }

    fn survives(&mut self) -> bool {
        if self.loss_probability > 0.0 && self.rng.gen_bool(self.loss_probability) {
            self.stats.lost += 1;
            return false;
        }
        true
    }
}
