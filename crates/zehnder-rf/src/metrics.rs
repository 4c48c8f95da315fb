//! Metric names reported by the engine.
//!
//! Counters are no-ops until the host installs a `metrics` recorder.

use ::metrics::{describe_counter, Unit};

/// Frames handed to the radio, first attempts and retries.
pub const FRAMES_SENT: &str = "zehnder.rf.frames_sent";
/// Frames received and decoded.
pub const FRAMES_RECEIVED: &str = "zehnder.rf.frames_received";
/// Frames received that matched no outstanding exchange.
pub const FRAMES_IGNORED: &str = "zehnder.rf.frames_ignored";
/// Reply windows that closed without a matching frame.
pub const TIMEOUTS: &str = "zehnder.rf.timeouts";
/// Requests re-issued after a reply timeout.
pub const RETRIES: &str = "zehnder.rf.retries";
/// Exchanges abandoned after exhausting their retries.
pub const EXCHANGE_FAILURES: &str = "zehnder.rf.exchange_failures";

/// Register descriptions for all engine metrics.
pub fn describe_metrics() {
    describe_counter!(FRAMES_SENT, Unit::Count, "Frames handed to the radio");
    describe_counter!(FRAMES_RECEIVED, Unit::Count, "Frames received and decoded");
    describe_counter!(FRAMES_IGNORED, Unit::Count, "Received frames matching no exchange");
    describe_counter!(TIMEOUTS, Unit::Count, "Reply windows closed without a match");
    describe_counter!(RETRIES, Unit::Count, "Requests re-issued after a reply timeout");
    describe_counter!(EXCHANGE_FAILURES, Unit::Count, "Exchanges that ran out of retries");
}
