//! The fan protocol engine.
//!
//! [`ZehnderRf`] owns the radio and drives every exchange with the main unit
//! from a single cooperative [`poll`](ZehnderRf::poll) entry point. Only one
//! request is ever in flight; commands issued while an exchange is running
//! are rejected with [`EngineError::Busy`].

use crate::config::{EngineConfig, NetworkIdentity};
use crate::fan::{Fan, FanStatus};
use crate::metrics::{
    EXCHANGE_FAILURES, FRAMES_IGNORED, FRAMES_RECEIVED, FRAMES_SENT, RETRIES, TIMEOUTS,
};
use crate::radio::Radio;
use crate::state::{Exchange, ProtocolState};
use crate::{EngineError, EngineResult};
use nrf905::{Payload, RadioError, RadioEvent, ReplyPolicy};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use zehnder_packet::{Command, DeviceType, FanSpeed, Frame, NETWORK_LINK_ID};

/// Device type this controller announces itself as.
const OWN_DEVICE_TYPE: DeviceType = DeviceType::RemoteControl;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a finished exchange, reported by [`ZehnderRf::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Discovery joined a network.
    Discovered(NetworkIdentity),
    /// No main unit answered the join request, or the join was not confirmed.
    DiscoveryFailed,
    /// Answer to a status query.
    Status(FanStatus),
    /// The main unit acknowledged a speed change.
    SpeedSet(FanStatus),
    /// An exchange ran out of retries.
    Failure(Exchange),
}

/// The request currently awaiting a reply.
#[derive(Debug, Clone, Copy)]
struct Pending {
    frame: Frame,
    timeout_ms: u64,
    retries_left: u8,
    /// Speed and timer of a set-speed request, used when the reply carries
    /// no status.
    requested: Option<(FanSpeed, u8)>,
}

/// Network offered by a main unit during discovery.
#[derive(Debug, Clone, Copy)]
struct JoinOffer {
    main_unit_type: DeviceType,
    main_unit_id: u8,
    network_id: u32,
}

// ============================================================================
// Engine
// ============================================================================

/// Zehnder/BUVA fan protocol engine on top of a [`Radio`].
pub struct ZehnderRf<R> {
    radio: R,
    config: EngineConfig,
    state: ProtocolState,
    identity: Option<NetworkIdentity>,
    /// Device id used while discovering; replaced by `identity` once joined.
    device_id: u8,
    offer: Option<JoinOffer>,
    pending: Option<Pending>,
    status: Option<FanStatus>,
    rng: ChaCha8Rng,
    update_interval_ms: u64,
    next_update_ms: Option<u64>,
}

impl<R: Radio> ZehnderRf<R> {
    /// Create an engine bound to `radio`.
    ///
    /// The engine stays in [`ProtocolState::Startup`] until the radio reports
    /// itself initialized.
    pub fn new(radio: R, config: EngineConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let identity = config.identity;

        ZehnderRf {
            radio,
            update_interval_ms: config.update_interval_ms,
            config,
            state: ProtocolState::Startup,
            identity,
            device_id: identity.map(|id| id.device_id).unwrap_or(0),
            offer: None,
            pending: None,
            status: None,
            rng,
            next_update_ms: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Network identity, once joined.
    pub fn identity(&self) -> Option<&NetworkIdentity> {
        self.identity.as_ref()
    }

    /// Last status reported by the main unit.
    pub fn status(&self) -> Option<FanStatus> {
        self.status
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Interval of the automatic status refresh (0 when disabled).
    pub fn update_interval(&self) -> u64 {
        self.update_interval_ms
    }

    /// The bound radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable access to the bound radio.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Log the engine configuration and identity.
    pub fn dump_config(&self) {
        info!("Zehnder RF fan:");
        info!(
            "  Repeats: {}, retries: {}",
            self.config.tx_repeats, self.config.retries
        );
        info!(
            "  Timeouts: reply {} ms, discovery {} ms",
            self.config.reply_timeout_ms, self.config.discovery_timeout_ms
        );
        info!("  Update interval: {} ms", self.update_interval_ms);
        match &self.identity {
            Some(id) => info!(
                "  Joined: network 0x{:08X}, main unit {:?}/0x{:02X}, own {:?}/0x{:02X}",
                id.network_id, id.main_unit_type, id.main_unit_id, id.device_type, id.device_id
            ),
            None => info!("  Not joined"),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Start network discovery with a freshly drawn device id.
    ///
    /// The join request goes out on the next [`poll`](Self::poll).
    pub fn discover(&mut self) -> EngineResult<()> {
        self.ensure_idle()?;

        self.device_id = self.rng.gen_range(1..=0xFE);
        self.offer = None;
        self.state = ProtocolState::StartDiscovery;
        info!(
            "ZehnderRf[{:02X}]: Starting discovery",
            self.device_id
        );
        Ok(())
    }

    /// Ask the main unit for its current settings.
    pub fn query_device(&mut self) -> EngineResult<()> {
        self.ensure_idle()?;
        let identity = self.identity.ok_or(EngineError::NotJoined)?;

        debug!("ZehnderRf[{:02X}]: Querying main unit", identity.device_id);
        let frame = Self::frame_to_main_unit(&identity, Command::QueryDevice);
        self.request(
            frame,
            self.config.reply_timeout_ms,
            ProtocolState::WaitQueryResponse,
            None,
        )?;
        Ok(())
    }

    /// Change the fan speed, optionally for `timer` minutes.
    pub fn set_speed(&mut self, speed: FanSpeed, timer: u8) -> EngineResult<()> {
        self.ensure_idle()?;
        let identity = self.identity.ok_or(EngineError::NotJoined)?;

        let frame = if timer > 0 {
            Self::frame_to_main_unit(&identity, Command::SetTimer)
                .with_payload(&[speed.to_byte(), timer])
        } else {
            Self::frame_to_main_unit(&identity, Command::SetSpeed).with_payload(&[speed.to_byte()])
        };

        debug!(
            "ZehnderRf[{:02X}]: Setting speed {:?} (timer {} min)",
            identity.device_id, speed, timer
        );
        self.request(
            frame,
            self.config.reply_timeout_ms,
            ProtocolState::WaitSetSpeedResponse,
            Some((speed, timer)),
        )?;
        Ok(())
    }

    /// Change the automatic refresh interval (0 disables).
    pub fn set_update_interval(&mut self, interval_ms: u64) {
        self.update_interval_ms = interval_ms;
        self.next_update_ms = None;
    }

    // ========================================================================
    // Poll
    // ========================================================================

    /// Advance the protocol. Call once per scheduler tick.
    pub fn poll(&mut self, now_ms: u64) -> Option<Outcome> {
        match self.state {
            ProtocolState::Startup => {
                if self.radio.is_ready() {
                    self.leave_startup();
                }
                return None;
            }
            ProtocolState::StartDiscovery => return self.begin_discovery(),
            ProtocolState::DiscoveryJoinComplete => {
                self.state = ProtocolState::Idle;
                return self.identity.map(Outcome::Discovered);
            }
            _ => {}
        }

        let outcome = match self.radio.poll(now_ms) {
            RadioEvent::Idle => None,
            RadioEvent::TransmitComplete => {
                if self.state == ProtocolState::WaitSetSpeedConfirm {
                    trace!("ZehnderRf[{:02X}]: Confirm sent", self.device_id);
                    self.state = ProtocolState::Idle;
                }
                None
            }
            RadioEvent::FrameReceived(payload) => self.handle_payload(&payload),
            RadioEvent::ReceiveTimeout => self.handle_timeout(),
            RadioEvent::TransmitTimeout => self.handle_transmit_timeout(),
        };

        if outcome.is_none() {
            self.refresh_if_due(now_ms);
        }
        outcome
    }

    // ========================================================================
    // State handlers
    // ========================================================================

    fn leave_startup(&mut self) {
        if let Some(identity) = self.identity {
            if let Err(e) = self.radio.set_network_address(identity.network_id) {
                warn!(
                    "ZehnderRf[{:02X}]: Failed to set network address: {}",
                    identity.device_id, e
                );
            }
        }
        debug!("ZehnderRf[{:02X}]: Radio ready", self.device_id);
        self.state = ProtocolState::Idle;
    }

    fn begin_discovery(&mut self) -> Option<Outcome> {
        if let Err(e) = self.radio.set_network_address(NETWORK_LINK_ID) {
            warn!(
                "ZehnderRf[{:02X}]: Failed to select link address: {}",
                self.device_id, e
            );
            return Some(self.fail(Exchange::Discovery));
        }

        let frame = Frame::new(
            DeviceType::MainUnit,
            0,
            OWN_DEVICE_TYPE,
            self.device_id,
            Command::NetworkJoinRequest,
        )
        .with_payload(&NETWORK_LINK_ID.to_le_bytes());

        match self.request(
            frame,
            self.config.discovery_timeout_ms,
            ProtocolState::DiscoveryWaitForLinkRequest,
            None,
        ) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "ZehnderRf[{:02X}]: Failed to send join request: {}",
                    self.device_id, e
                );
                Some(self.fail(Exchange::Discovery))
            }
        }
    }

    fn handle_payload(&mut self, payload: &Payload) -> Option<Outcome> {
        let frame = match Frame::decode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("ZehnderRf[{:02X}]: Dropping frame: {}", self.device_id, e);
                return None;
            }
        };
        ::metrics::counter!(FRAMES_RECEIVED).increment(1);
        trace!("ZehnderRf[{:02X}]: RX {}", self.device_id, frame);

        if frame.ttl == 0 {
            return self.ignore(&frame);
        }

        match self.state {
            ProtocolState::DiscoveryWaitForLinkRequest => self.on_link_request(&frame),
            ProtocolState::DiscoveryWaitForJoinResponse => self.on_join_response(&frame),
            ProtocolState::WaitQueryResponse => self.on_query_response(&frame),
            ProtocolState::WaitSetSpeedResponse => self.on_set_speed_response(&frame),
            _ => self.ignore(&frame),
        }
    }

    fn on_link_request(&mut self, frame: &Frame) -> Option<Outcome> {
        let offered = frame
            .payload_u32_le(0)
            .filter(|_| frame.command == Command::NetworkJoinOpen)
            .filter(|_| frame.src_type == DeviceType::MainUnit)
            .filter(|_| frame.is_addressed_to(OWN_DEVICE_TYPE, self.device_id));
        let Some(network_id) = offered else {
            return self.ignore(frame);
        };

        info!(
            "ZehnderRf[{:02X}]: Main unit 0x{:02X} offers network 0x{:08X}",
            self.device_id, frame.src_id, network_id
        );
        self.radio.end_receive();
        self.pending = None;
        self.offer = Some(JoinOffer {
            main_unit_type: frame.src_type,
            main_unit_id: frame.src_id,
            network_id,
        });

        if let Err(e) = self.radio.set_network_address(network_id) {
            warn!(
                "ZehnderRf[{:02X}]: Failed to select network address: {}",
                self.device_id, e
            );
            return Some(self.fail(Exchange::Discovery));
        }

        let ack = Frame::new(
            frame.src_type,
            frame.src_id,
            OWN_DEVICE_TYPE,
            self.device_id,
            Command::NetworkJoinAck,
        )
        .with_payload(&network_id.to_le_bytes());

        match self.request(
            ack,
            self.config.discovery_timeout_ms,
            ProtocolState::DiscoveryWaitForJoinResponse,
            None,
        ) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "ZehnderRf[{:02X}]: Failed to acknowledge join: {}",
                    self.device_id, e
                );
                Some(self.fail(Exchange::Discovery))
            }
        }
    }

    fn on_join_response(&mut self, frame: &Frame) -> Option<Outcome> {
        let Some(offer) = self.offer else {
            return self.ignore(frame);
        };
        let accepted = frame.is_from(offer.main_unit_type, offer.main_unit_id)
            && frame.is_addressed_to(OWN_DEVICE_TYPE, self.device_id)
            && matches!(
                frame.command,
                Command::NetworkJoinAck | Command::FanSettings | Command::Confirm
            );
        if !accepted {
            return self.ignore(frame);
        }

        self.radio.end_receive();
        self.pending = None;
        self.offer = None;
        if frame.command == Command::FanSettings {
            self.status = FanStatus::from_payload(&frame.payload).ok();
        }

        let identity = NetworkIdentity {
            device_type: OWN_DEVICE_TYPE,
            device_id: self.device_id,
            main_unit_type: offer.main_unit_type,
            main_unit_id: offer.main_unit_id,
            network_id: offer.network_id,
        };
        info!(
            "ZehnderRf[{:02X}]: Joined network 0x{:08X}",
            self.device_id, identity.network_id
        );
        self.identity = Some(identity);
        self.next_update_ms = None;
        self.state = ProtocolState::DiscoveryJoinComplete;
        None
    }

    fn on_query_response(&mut self, frame: &Frame) -> Option<Outcome> {
        if !self.is_from_main_unit(frame) || frame.command != Command::FanSettings {
            return self.ignore(frame);
        }
        let status = match FanStatus::from_payload(&frame.payload) {
            Ok(status) => status,
            Err(e) => {
                warn!("ZehnderRf[{:02X}]: Bad settings frame: {}", self.device_id, e);
                return self.ignore(frame);
            }
        };

        self.radio.end_receive();
        self.pending = None;
        self.status = Some(status);
        self.state = ProtocolState::Idle;
        debug!(
            "ZehnderRf[{:02X}]: Fan at {:?}, {}%, timer {}",
            self.device_id, status.speed, status.voltage, status.timer
        );
        Some(Outcome::Status(status))
    }

    fn on_set_speed_response(&mut self, frame: &Frame) -> Option<Outcome> {
        if !self.is_from_main_unit(frame)
            || !matches!(frame.command, Command::SetSpeedReply | Command::FanSettings)
        {
            return self.ignore(frame);
        }

        let requested = self.pending.and_then(|p| p.requested);
        let status = match (FanStatus::from_payload(&frame.payload), requested) {
            (Ok(status), _) => status,
            (Err(_), Some((speed, timer))) => FanStatus {
                speed,
                voltage: speed.nominal_voltage(),
                timer,
            },
            (Err(e), None) => {
                warn!("ZehnderRf[{:02X}]: Bad speed reply: {}", self.device_id, e);
                return self.ignore(frame);
            }
        };

        self.radio.end_receive();
        self.pending = None;
        self.status = Some(status);
        self.state = ProtocolState::Idle;

        if let Some(identity) = self.identity {
            let confirm = Self::frame_to_main_unit(&identity, Command::Confirm);
            match self.transmit(&confirm, ReplyPolicy::None) {
                Ok(()) => self.state = ProtocolState::WaitSetSpeedConfirm,
                Err(e) => warn!(
                    "ZehnderRf[{:02X}]: Failed to send confirm: {}",
                    self.device_id, e
                ),
            }
        }
        Some(Outcome::SpeedSet(status))
    }

    fn handle_timeout(&mut self) -> Option<Outcome> {
        if !self.state.is_waiting() {
            return None;
        }
        let exchange = self.state.exchange()?;
        ::metrics::counter!(TIMEOUTS).increment(1);

        let Some(pending) = self.pending.as_mut() else {
            return Some(self.fail(exchange));
        };
        if pending.retries_left == 0 {
            warn!(
                "ZehnderRf[{:02X}]: No reply to {} after {} retries",
                self.device_id, exchange, self.config.retries
            );
            return Some(self.fail(exchange));
        }

        pending.retries_left -= 1;
        let frame = pending.frame;
        let timeout_ms = pending.timeout_ms;
        debug!(
            "ZehnderRf[{:02X}]: No reply to {}, resending ({} retries left)",
            self.device_id, exchange, pending.retries_left
        );
        ::metrics::counter!(RETRIES).increment(1);

        match self.transmit(&frame, ReplyPolicy::Await { timeout_ms }) {
            Ok(()) => None,
            Err(e) => {
                warn!("ZehnderRf[{:02X}]: Resend failed: {}", self.device_id, e);
                Some(self.fail(exchange))
            }
        }
    }

    /// A transmission never completed. Requests go through the same
    /// resend-or-fail path as a missed reply.
    fn handle_transmit_timeout(&mut self) -> Option<Outcome> {
        warn!(
            "ZehnderRf[{:02X}]: Transmission stalled in {}",
            self.device_id, self.state
        );
        if self.state == ProtocolState::WaitSetSpeedConfirm {
            self.state = ProtocolState::Idle;
            return None;
        }
        self.handle_timeout()
    }

    fn refresh_if_due(&mut self, now_ms: u64) {
        if self.state != ProtocolState::Idle
            || self.identity.is_none()
            || self.update_interval_ms == 0
        {
            return;
        }

        match self.next_update_ms {
            None => self.next_update_ms = Some(now_ms.saturating_add(self.update_interval_ms)),
            Some(due) if now_ms >= due => {
                self.next_update_ms = Some(now_ms.saturating_add(self.update_interval_ms));
                trace!("ZehnderRf[{:02X}]: Periodic refresh", self.device_id);
                if let Err(e) = self.query_device() {
                    warn!("ZehnderRf[{:02X}]: Refresh failed: {}", self.device_id, e);
                }
            }
            Some(_) => {}
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn ensure_idle(&self) -> EngineResult<()> {
        match self.state {
            ProtocolState::Idle => Ok(()),
            ProtocolState::Startup => Err(EngineError::NotReady),
            _ => Err(EngineError::Busy),
        }
    }

    fn frame_to_main_unit(identity: &NetworkIdentity, command: Command) -> Frame {
        Frame::new(
            identity.main_unit_type,
            identity.main_unit_id,
            identity.device_type,
            identity.device_id,
            command,
        )
    }

    fn is_from_main_unit(&self, frame: &Frame) -> bool {
        match &self.identity {
            Some(id) => {
                frame.is_from(id.main_unit_type, id.main_unit_id)
                    && frame.is_addressed_to(id.device_type, id.device_id)
            }
            None => false,
        }
    }

    fn transmit(&mut self, frame: &Frame, reply: ReplyPolicy) -> Result<(), RadioError> {
        trace!("ZehnderRf[{:02X}]: TX {}", self.device_id, frame);
        self.radio
            .start_transmit(&frame.encode(), self.config.tx_repeats, reply)?;
        ::metrics::counter!(FRAMES_SENT).increment(1);
        Ok(())
    }

    /// Send `frame` expecting a reply and enter `state`.
    fn request(
        &mut self,
        frame: Frame,
        timeout_ms: u64,
        state: ProtocolState,
        requested: Option<(FanSpeed, u8)>,
    ) -> Result<(), RadioError> {
        self.transmit(&frame, ReplyPolicy::Await { timeout_ms })?;
        self.pending = Some(Pending {
            frame,
            timeout_ms,
            retries_left: self.config.retries,
            requested,
        });
        self.state = state;
        Ok(())
    }

    fn ignore(&self, frame: &Frame) -> Option<Outcome> {
        ::metrics::counter!(FRAMES_IGNORED).increment(1);
        debug!(
            "ZehnderRf[{:02X}]: Ignoring {:?} from {:?}/0x{:02X} in {}",
            self.device_id, frame.command, frame.src_type, frame.src_id, self.state
        );
        None
    }

    fn fail(&mut self, exchange: Exchange) -> Outcome {
        ::metrics::counter!(EXCHANGE_FAILURES).increment(1);
        self.pending = None;
        self.offer = None;
        self.state = ProtocolState::Idle;

        match exchange {
            Exchange::Discovery => {
                if let Some(identity) = self.identity {
                    self.device_id = identity.device_id;
                    if let Err(e) = self.radio.set_network_address(identity.network_id) {
                        warn!(
                            "ZehnderRf[{:02X}]: Failed to restore network address: {}",
                            self.device_id, e
                        );
                    }
                }
                Outcome::DiscoveryFailed
            }
            other => Outcome::Failure(other),
        }
    }
}

impl<R: Radio> Fan for ZehnderRf<R> {
    fn speed(&self) -> Option<FanSpeed> {
        self.status.map(|s| s.speed)
    }

    fn set_speed(&mut self, speed: FanSpeed) -> EngineResult<()> {
        ZehnderRf::set_speed(self, speed, 0)
    }
}
