//! In-memory `metrics` recorder for simulation runs.
//!
//! Counters are kept as atomics keyed by metric name and labels, and can be
//! snapshotted into the run report. Gauges and histograms are not used by
//! the engine and are dropped.

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Recorder that keeps counter totals in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    counters: Mutex<BTreeMap<String, Arc<AtomicU64>>>,
    descriptions: Mutex<BTreeMap<String, String>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of every counter touched so far.
    pub fn counters(&self) -> BTreeMap<String, u64> {
        match self.counters.lock() {
            Ok(counters) => counters
                .iter()
                .map(|(name, value)| (name.clone(), value.load(Ordering::Relaxed)))
                .collect(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Value of one counter, 0 if it was never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters().get(name).copied().unwrap_or(0)
    }

    /// Description registered for `name`.
    pub fn description(&self, name: &str) -> Option<String> {
        self.descriptions.lock().ok()?.get(name).cloned()
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        if let Ok(mut descriptions) = self.descriptions.lock() {
            descriptions.insert(key.as_str().to_string(), description.to_string());
        }
    }
}

/// Counter name with labels appended as `name{k=v,...}`.
fn key_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for InMemoryRecorder {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let Ok(mut counters) = self.counters.lock() else {
            return Counter::noop();
        };
        let value = counters
            .entry(key_string(key))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        Counter::from_arc(Arc::clone(value))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Scenario, Simulation};
    use zehnder_rf::metrics::{describe_metrics, FRAMES_RECEIVED, FRAMES_SENT, TIMEOUTS};

    #[test]
    fn test_counts_increments() {
        let recorder = InMemoryRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("a").increment(2);
            metrics::counter!("a").increment(3);
            metrics::counter!("b", "kind" => "x").increment(1);
        });

        assert_eq!(recorder.counter("a"), 5);
        assert_eq!(recorder.counter("b{kind=x}"), 1);
        assert_eq!(recorder.counter("missing"), 0);
    }

    #[test]
    fn test_engine_counters_during_discovery() {
        let recorder = InMemoryRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            let mut sim = Simulation::new(&Scenario::default()).unwrap();
            sim.step();
            sim.engine_mut().discover().unwrap();
            sim.run_until_outcome(5_000)
        });

        assert_eq!(recorder.counter(FRAMES_SENT), 2);
        assert!(recorder.counter(FRAMES_RECEIVED) >= 2);
        assert_eq!(recorder.counter(TIMEOUTS), 0);
        assert_eq!(
            recorder.description(FRAMES_SENT).as_deref(),
            Some("Frames handed to the radio")
        );
    }
}
