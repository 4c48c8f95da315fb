//! End-to-end tests: the protocol engine on the simulated nRF905 talking to a
//! simulated main unit.

use std::path::Path;

use nrf905::{Band, Mode};
use zehnder_packet::{Command, DeviceType, FanSpeed, Frame, NETWORK_LINK_ID};
use zehnder_rf::{
    EngineConfig, EngineError, Exchange, Fan, NetworkIdentity, Outcome, ProtocolState,
};
use zehnder_sim::{MainUnitConfig, OutcomeKind, Scenario, Simulation};

// ============================================================================
// Helpers
// ============================================================================

const NETWORK: u32 = 0xDEAD_BEEF;
const MAIN_UNIT_ID: u8 = 66;
const OWN_ID: u8 = 0x17;

fn joined_identity() -> NetworkIdentity {
    NetworkIdentity {
        device_type: DeviceType::RemoteControl,
        device_id: OWN_ID,
        main_unit_type: DeviceType::MainUnit,
        main_unit_id: MAIN_UNIT_ID,
        network_id: NETWORK,
    }
}

/// A scenario whose controller already belongs to the main unit's network.
fn joined_scenario() -> Scenario {
    Scenario {
        engine: EngineConfig {
            identity: Some(joined_identity()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Build the simulation and let the engine leave Startup.
fn started(scenario: &Scenario) -> Simulation {
    let mut sim = Simulation::new(scenario).unwrap();
    sim.step();
    assert_eq!(sim.engine().state(), ProtocolState::Idle);
    sim
}

fn scenario_path(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
}

// ============================================================================
// Radio
// ============================================================================

#[test]
fn test_radio_initialized_for_fan_network() {
    let sim = Simulation::new(&Scenario::default()).unwrap();
    let radio = sim.engine().radio();

    assert!(radio.is_ready());
    assert_eq!(radio.mode(), Mode::Idle);
    assert_eq!(radio.config().band, Band::Mhz868);
    assert_eq!(radio.config().channel, 118);
    assert_eq!(radio.config().frequency_khz(), 868_400);
    assert_eq!(radio.config().rx_payload_width, 16);
    assert_eq!(radio.config().tx_payload_width, 16);

    let chip = sim.chip().borrow();
    assert_eq!(chip.rx_address(), 0x8981_6EA9);
    assert_eq!(chip.tx_address(), 0x8981_6EA9);
    assert_eq!(chip.mode(), Some(Mode::Idle));
}

#[test]
fn test_pins_always_match_a_mode() {
    let mut sim = started(&Scenario::default());
    sim.engine_mut().discover().unwrap();

    let check_until = |sim: &mut Simulation, deadline_ms: u64| {
        while sim.now_ms() < deadline_ms {
            sim.step();
            let chip = sim.chip().borrow();
            let lines = chip.lines();
            assert!(!lines.tx_enable || lines.power, "TX_EN without PWR_UP");
            assert!(!lines.chip_enable || lines.power, "TRX_CE without PWR_UP");
            assert!(chip.mode().is_some(), "pins {:?} match no mode", lines);
        }
    };

    check_until(&mut sim, 2_000);
    assert!(sim.engine().identity().is_some());
    sim.engine_mut().set_speed(FanSpeed::High, 0).unwrap();
    check_until(&mut sim, 4_000);
    assert_eq!(sim.report("pins").invalid_mode_ticks, 0);
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_discovery_round_trip() {
    let mut sim = started(&Scenario::default());
    sim.engine_mut().discover().unwrap();

    let outcome = sim.run_until_outcome(5_000);
    let Some(Outcome::Discovered(identity)) = outcome else {
        panic!("expected discovery, got {:?}", outcome);
    };
    assert_eq!(identity.network_id, NETWORK);
    assert_eq!(identity.main_unit_type, DeviceType::MainUnit);
    assert_eq!(identity.main_unit_id, MAIN_UNIT_ID);
    assert_eq!(identity.device_type, DeviceType::RemoteControl);
    assert!((1..=0xFE).contains(&identity.device_id));

    assert_eq!(sim.engine().state(), ProtocolState::Idle);
    assert_eq!(sim.chip().borrow().rx_address(), NETWORK);
    assert_eq!(sim.chip().borrow().tx_address(), NETWORK);
    assert_eq!(
        sim.main_unit().members(),
        &[(DeviceType::RemoteControl, identity.device_id)]
    );
}

#[test]
fn test_join_request_uses_link_address() {
    let mut sim = started(&Scenario::default());
    sim.engine_mut().discover().unwrap();

    // The join request goes out on the poll after discover()
    let now = sim.now_ms();
    sim.engine_mut().poll(now);
    let sent = sim.chip().borrow_mut().take_transmissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, NETWORK_LINK_ID);

    let frame = Frame::decode(&sent[0].payload).unwrap();
    assert_eq!(frame.command, Command::NetworkJoinRequest);
    assert_eq!(frame.dst_type, DeviceType::MainUnit);
    assert_eq!(frame.dst_id, 0);
    assert_eq!(frame.payload_u32_le(0), Some(NETWORK_LINK_ID));
}

#[test]
fn test_discovery_terminates_without_main_unit() {
    let scenario = Scenario {
        main_unit: MainUnitConfig {
            join_open: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut sim = started(&scenario);
    sim.engine_mut().discover().unwrap();

    let outcome = sim.run_until_outcome(30_000);
    assert_eq!(outcome, Some(Outcome::DiscoveryFailed));
    assert!(sim.engine().identity().is_none());
    assert_eq!(sim.engine().state(), ProtocolState::Idle);

    // 1 + 10 requests of 4 copies each, at least one discovery timeout apart
    assert_eq!(sim.air_stats().controller_frames, 44);
    assert!(sim.now_ms() >= 11 * 1000);
}

// ============================================================================
// Speed control
// ============================================================================

#[test]
fn test_set_speed_high() {
    let mut sim = started(&joined_scenario());
    sim.engine_mut().set_speed(FanSpeed::High, 0).unwrap();

    let first = sim.chip().borrow_mut().take_transmissions();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].address, NETWORK);
    let frame = Frame::decode(&first[0].payload).unwrap();
    assert_eq!(frame.command.to_byte(), 0x02);
    assert_eq!(frame.payload[0], 0x03);
    assert_eq!(frame.dst_type, DeviceType::MainUnit);
    assert_eq!(frame.dst_id, MAIN_UNIT_ID);
    assert_eq!(frame.src_id, OWN_ID);

    let outcome = sim.run_until_outcome(2_000);
    let Some(Outcome::SpeedSet(status)) = outcome else {
        panic!("expected speed set, got {:?}", outcome);
    };
    assert_eq!(status.speed, FanSpeed::High);
    assert_eq!(sim.main_unit().status().speed, FanSpeed::High);
    assert_eq!(sim.engine().speed(), Some(FanSpeed::High));

    // The closing confirm goes out and the engine settles
    sim.run_until(sim.now_ms() + 50);
    assert_eq!(sim.engine().state(), ProtocolState::Idle);
}

#[test]
fn test_set_timer() {
    let mut sim = started(&joined_scenario());
    sim.engine_mut().set_speed(FanSpeed::Max, 30).unwrap();

    let outcome = sim.run_until_outcome(2_000);
    let Some(Outcome::SpeedSet(status)) = outcome else {
        panic!("expected speed set, got {:?}", outcome);
    };
    assert_eq!(status.timer, 30);
    assert_eq!(sim.main_unit().status().timer, 30);
}

#[test]
fn test_second_set_speed_is_busy() {
    let mut sim = started(&joined_scenario());
    sim.engine_mut().set_speed(FanSpeed::High, 0).unwrap();
    assert_eq!(
        sim.engine_mut().set_speed(FanSpeed::Low, 0),
        Err(EngineError::Busy)
    );
    assert_eq!(sim.engine().state(), ProtocolState::WaitSetSpeedResponse);

    let outcome = sim.run_until_outcome(2_000);
    assert!(matches!(outcome, Some(Outcome::SpeedSet(s)) if s.speed == FanSpeed::High));
    assert_eq!(sim.main_unit().status().speed, FanSpeed::High);
}

#[test]
fn test_query_round_trip() {
    let mut sim = started(&joined_scenario());
    sim.engine_mut().query_device().unwrap();

    let outcome = sim.run_until_outcome(2_000);
    let Some(Outcome::Status(status)) = outcome else {
        panic!("expected status, got {:?}", outcome);
    };
    assert_eq!(status, sim.main_unit().status());
    assert_eq!(status.speed, FanSpeed::Low);
}

// ============================================================================
// Retries
// ============================================================================

#[test]
fn test_retry_bound_and_spacing() {
    let mut scenario = joined_scenario();
    scenario.main_unit.responsive = false;
    let mut sim = started(&scenario);
    sim.engine_mut().query_device().unwrap();

    let mut heard_at = Vec::new();
    let mut handled = sim.main_unit().frames_handled();
    let mut outcome = None;
    while outcome.is_none() && sim.now_ms() < 30_000 {
        let now = sim.now_ms();
        outcome = sim.step();
        if sim.main_unit().frames_handled() > handled {
            handled = sim.main_unit().frames_handled();
            heard_at.push(now);
        }
    }

    assert_eq!(outcome, Some(Outcome::Failure(Exchange::Query)));
    assert_eq!(heard_at.len(), 11);
    for pair in heard_at.windows(2) {
        assert!(pair[1] - pair[0] >= 1000, "resent after {} ms", pair[1] - pair[0]);
    }
}

#[test]
fn test_stalled_transmitter_fails_exchange() {
    let mut sim = started(&joined_scenario());
    sim.chip().borrow_mut().stall_transmitter(true);
    sim.engine_mut().query_device().unwrap();

    let outcome = sim.run_until_outcome(5_000);
    assert_eq!(outcome, Some(Outcome::Failure(Exchange::Query)));
    assert_eq!(sim.engine().state(), ProtocolState::Idle);
    assert!(!sim.engine().radio().is_busy());
    assert_eq!(sim.air_stats().controller_frames, 0);

    // Once the chip recovers the next exchange goes through
    sim.chip().borrow_mut().stall_transmitter(false);
    sim.engine_mut().query_device().unwrap();
    let limit = sim.now_ms() + 2_000;
    assert!(matches!(sim.run_until_outcome(limit), Some(Outcome::Status(_))));
}

#[test]
fn test_lossy_link_recovers() {
    let mut scenario = joined_scenario();
    scenario.air.loss_probability = 0.5;
    scenario.seed = 3;
    let mut sim = started(&scenario);
    sim.engine_mut().set_speed(FanSpeed::Medium, 0).unwrap();

    let outcome = sim.run_until_outcome(20_000);
    assert!(
        matches!(outcome, Some(Outcome::SpeedSet(_)) | Some(Outcome::Failure(_))),
        "{:?}",
        outcome
    );
    assert!(sim.air_stats().lost > 0);
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_set_speed_scenario_file() {
    let scenario = Scenario::load(&scenario_path("set_speed.yaml")).unwrap();
    let mut sim = Simulation::new(&scenario).unwrap();
    let report = sim.run(&scenario).unwrap();

    report.check(&scenario.expect).unwrap();
    assert_eq!(report.fan.speed, FanSpeed::Max);
    assert_eq!(report.fan.timer, 30);
    assert_eq!(report.invalid_mode_ticks, 0);
}

#[test]
fn test_no_main_unit_scenario_file() {
    let scenario = Scenario::load(&scenario_path("no_main_unit.yaml")).unwrap();
    let mut sim = Simulation::new(&scenario).unwrap();
    let report = sim.run(&scenario).unwrap();

    assert_eq!(report.kinds(), vec![OutcomeKind::DiscoveryFailed]);
    assert!(report.identity.is_none());
}

#[test]
fn test_same_seed_same_run() {
    let scenario = Scenario::load(&scenario_path("lossy_link.yaml")).unwrap();

    let run = |seed: u64| {
        let mut scenario = scenario.clone();
        scenario.seed = seed;
        let mut sim = Simulation::new(&scenario).unwrap();
        let report = sim.run(&scenario).unwrap();
        (report.outcomes, report.air)
    };

    assert_eq!(run(11), run(11));
}

#[test]
fn test_periodic_refresh_in_simulation() {
    let mut scenario = joined_scenario();
    scenario.engine.update_interval_ms = 2_000;
    let mut sim = started(&scenario);

    let outcomes = sim.run_until(7_000);
    let statuses = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Status(_)))
        .count();
    assert_eq!(statuses, 3);
}
