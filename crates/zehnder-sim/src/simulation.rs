//! Tick-driven simulation of a controller and a main unit sharing the air.

use crate::air::{Air, AirStats};
use crate::error::{SimError, SimResult};
use crate::main_unit::MainUnit;
use crate::scenario::{Action, OutcomeKind, Scenario, Step};
use nrf905::sim::{SharedChip, SimChip, SimInput, SimOutput, SimSpi};
use nrf905::Nrf905;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use zehnder_rf::{EngineError, FanStatus, NetworkIdentity, Outcome, ZehnderRf};

/// The controller radio as wired in the simulation.
pub type SimRadio = Nrf905<SimSpi, SimOutput, SimInput>;

/// An engine outcome and the time it was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimedOutcome {
    /// Simulated time (ms).
    pub at_ms: u64,
    /// The outcome.
    pub outcome: Outcome,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    /// Scenario name.
    pub name: String,
    /// Simulated time covered (ms).
    pub duration_ms: u64,
    /// Every outcome in order.
    pub outcomes: Vec<TimedOutcome>,
    /// Air traffic.
    pub air: AirStats,
    /// Fan state held by the main unit at the end.
    pub fan: FanStatus,
    /// Identity the controller ended up with.
    pub identity: Option<NetworkIdentity>,
    /// Ticks where the controller pins matched no radio mode.
    pub invalid_mode_ticks: u64,
    /// Engine counters, when the host installed a recorder.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, u64>,
}

impl SimReport {
    /// Outcome kinds in order.
    pub fn kinds(&self) -> Vec<OutcomeKind> {
        self.outcomes
            .iter()
            .map(|t| OutcomeKind::of(&t.outcome))
            .collect()
    }

    /// Compare against the expected outcome sequence. An empty list accepts
    /// any run.
    pub fn check(&self, expect: &[OutcomeKind]) -> SimResult<()> {
        let actual = self.kinds();
        if expect.is_empty() || actual == expect {
            return Ok(());
        }
        let names = |kinds: &[OutcomeKind]| -> Vec<String> {
            kinds.iter().map(|k| format!("{:?}", k)).collect()
        };
        Err(SimError::Expectation {
            expected: names(expect),
            actual: names(&actual),
        })
    }
}

/// A controller and a main unit on a simulated channel.
pub struct Simulation {
    chip: SharedChip,
    engine: ZehnderRf<SimRadio>,
    main_unit: MainUnit,
    air: Air,
    now_ms: u64,
    tick_ms: u64,
    outcomes: Vec<TimedOutcome>,
    invalid_mode_ticks: u64,
}

impl Simulation {
    /// Build the participants of `scenario` and initialize the controller
    /// radio.
    pub fn new(scenario: &Scenario) -> SimResult<Self> {
        let chip = SimChip::shared();
        let (spi, pins) = SimChip::attach(&chip);
        let mut radio = Nrf905::new(spi, pins);
        radio.initialize(scenario.radio.clone())?;

        let mut engine_config = scenario.engine.clone();
        engine_config.rng_seed.get_or_insert(scenario.seed);

        Ok(Simulation {
            chip,
            engine: ZehnderRf::new(radio, engine_config),
            main_unit: MainUnit::new(scenario.main_unit.clone()),
            air: Air::new(&scenario.air, scenario.seed.wrapping_add(1)),
            now_ms: 0,
            tick_ms: scenario.tick_ms.max(1),
            outcomes: Vec::new(),
            invalid_mode_ticks: 0,
        })
    }

    /// Current simulated time (ms).
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// The controller engine.
    pub fn engine(&self) -> &ZehnderRf<SimRadio> {
        &self.engine
    }

    /// Mutable access to the controller engine, for issuing commands.
    pub fn engine_mut(&mut self) -> &mut ZehnderRf<SimRadio> {
        &mut self.engine
    }

    /// The simulated main unit.
    pub fn main_unit(&self) -> &MainUnit {
        &self.main_unit
    }

    /// The controller's simulated transceiver.
    pub fn chip(&self) -> &SharedChip {
        &self.chip
    }

    /// Outcomes reported so far.
    pub fn outcomes(&self) -> &[TimedOutcome] {
        &self.outcomes
    }

    /// Air traffic so far.
    pub fn air_stats(&self) -> AirStats {
        self.air.stats()
    }

    /// Advance one tick.
    pub fn step(&mut self) -> Option<Outcome> {
        let now = self.now_ms;
        let outcome = self.engine.poll(now);
        if let Some(outcome) = outcome {
            info!("Simulation: {:?} at {} ms", outcome, now);
            self.outcomes.push(TimedOutcome {
                at_ms: now,
                outcome,
            });
        }

        let sent = self.chip.borrow_mut().take_transmissions();
        for tx in sent {
            if !self.air.carry_from_controller() {
                continue;
            }
            if self.main_unit.listens_on(tx.address) {
                self.main_unit.receive(now, tx.address, &tx.payload);
            } else {
                self.air.record_missed();
            }
        }

        if let Some((address, payload)) = self.main_unit.next_transmission(now) {
            if self.air.carry_from_main_unit() && !self.chip.borrow_mut().deliver(address, &payload)
            {
                self.air.record_missed();
            }
        }

        if self.chip.borrow().mode().is_none() {
            self.invalid_mode_ticks += 1;
        }
        self.now_ms += self.tick_ms;
        outcome
    }

    /// Step until `deadline_ms`, returning the outcomes reported on the way.
    pub fn run_until(&mut self, deadline_ms: u64) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        while self.now_ms < deadline_ms {
            outcomes.extend(self.step());
        }
        outcomes
    }

    /// Step until the engine reports an outcome or `limit_ms` passes.
    pub fn run_until_outcome(&mut self, limit_ms: u64) -> Option<Outcome> {
        while self.now_ms < limit_ms {
            if let Some(outcome) = self.step() {
                return Some(outcome);
            }
        }
        None
    }

    /// Play the scenario script to the end and summarize.
    ///
    /// Commands rejected as `Busy` or `NotReady` are retried on later ticks;
    /// any other rejection aborts the run.
    pub fn run(&mut self, scenario: &Scenario) -> SimResult<SimReport> {
        let mut steps: Vec<&Step> = scenario.steps.iter().collect();
        steps.sort_by_key(|s| s.at_ms);
        let mut next = 0;

        while self.now_ms < scenario.duration_ms {
            self.step();
            while let Some(step) = steps.get(next).filter(|s| s.at_ms <= self.now_ms) {
                match self.apply(&step.action) {
                    Ok(()) => next += 1,
                    Err(EngineError::Busy) | Err(EngineError::NotReady) => {
                        debug!("Simulation: Deferring {:?} at {} ms", step.action, self.now_ms);
                        break;
                    }
                    Err(source) => {
                        return Err(SimError::Engine {
                            at_ms: self.now_ms,
                            source,
                        })
                    }
                }
            }
        }

        Ok(self.report(&scenario.name))
    }

    /// Summary of the run so far.
    pub fn report(&self, name: &str) -> SimReport {
        SimReport {
            name: name.to_string(),
            duration_ms: self.now_ms,
            outcomes: self.outcomes.clone(),
            air: self.air.stats(),
            fan: self.main_unit.status(),
            identity: self.engine.identity().copied(),
            invalid_mode_ticks: self.invalid_mode_ticks,
            metrics: BTreeMap::new(),
        }
    }

    fn apply(&mut self, action: &Action) -> Result<(), EngineError> {
        debug!("Simulation: {:?} at {} ms", action, self.now_ms);
        match *action {
            Action::Discover => self.engine.discover(),
            Action::Query => self.engine.query_device(),
            Action::SetSpeed { speed, timer } => self.engine.set_speed(speed, timer),
            Action::SetUpdateInterval { interval_ms } => {
                self.engine.set_update_interval(interval_ms);
                Ok(())
            }
        }
    }
}
