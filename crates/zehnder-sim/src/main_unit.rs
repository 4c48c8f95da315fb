//! A simulated ventilation main unit.
//!
//! The unit listens on the link address for join requests while its join
//! window is open and on its network address for everything else. Replies are
//! queued with a configurable delay and sent as a burst of identical copies,
//! the way real units repeat every frame.

use crate::scenario::MainUnitConfig;
use std::collections::VecDeque;
use tracing::{debug, trace};
use zehnder_packet::{Command, DeviceType, FanSpeed, Frame, FRAME_SIZE, NETWORK_LINK_ID};
use zehnder_rf::FanStatus;

/// A frame waiting to be put on air by the main unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outgoing {
    /// Earliest send time (ms).
    pub due_ms: u64,
    /// Address the frame is sent to.
    pub address: u32,
    /// Encoded frame.
    pub payload: [u8; FRAME_SIZE],
    /// Copies still to send.
    pub copies_left: u8,
}

/// Simulated main unit.
#[derive(Debug)]
pub struct MainUnit {
    config: MainUnitConfig,
    status: FanStatus,
    members: Vec<(DeviceType, u8)>,
    outbox: VecDeque<Outgoing>,
    last_heard: Option<([u8; FRAME_SIZE], u64)>,
    frames_handled: u64,
}

impl MainUnit {
    /// Create a main unit.
    pub fn new(config: MainUnitConfig) -> Self {
        let speed = config.initial_speed;
        MainUnit {
            config,
            status: FanStatus {
                speed,
                voltage: speed.nominal_voltage(),
                timer: 0,
            },
            members: Vec::new(),
            outbox: VecDeque::new(),
            last_heard: None,
            frames_handled: 0,
        }
    }

    /// Current fan state.
    pub fn status(&self) -> FanStatus {
        self.status
    }

    /// Devices that completed a join.
    pub fn members(&self) -> &[(DeviceType, u8)] {
        &self.members
    }

    /// Distinct requests processed so far.
    pub fn frames_handled(&self) -> u64 {
        self.frames_handled
    }

    /// Whether the unit listens on `address`.
    pub fn listens_on(&self, address: u32) -> bool {
        address == self.config.network_id || (self.config.join_open && address == NETWORK_LINK_ID)
    }

    /// Process a payload heard on `address`.
    pub fn receive(&mut self, now_ms: u64, address: u32, payload: &[u8; FRAME_SIZE]) {
        if !self.listens_on(address) {
            return;
        }
        if let Some((last, at)) = self.last_heard {
            if last == *payload && now_ms.saturating_sub(at) <= self.config.dedup_window_ms {
                return;
            }
        }
        self.last_heard = Some((*payload, now_ms));

        let frame = match Frame::decode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("MainUnit[{:02X}]: Undecodable frame: {}", self.config.id, e);
                return;
            }
        };
        if !frame.is_addressed_to(DeviceType::MainUnit, self.config.id) {
            return;
        }

        self.frames_handled += 1;
        trace!("MainUnit[{:02X}]: RX {}", self.config.id, frame);
        if !self.config.responsive {
            return;
        }

        if address == NETWORK_LINK_ID {
            self.on_link_frame(now_ms, &frame);
        } else {
            self.on_network_frame(now_ms, &frame);
        }
    }

    /// Pop the next copy due at `now_ms`, if any.
    pub fn next_transmission(&mut self, now_ms: u64) -> Option<(u32, [u8; FRAME_SIZE])> {
        let front = self.outbox.front_mut()?;
        if front.due_ms > now_ms {
            return None;
        }
        let sent = (front.address, front.payload);
        front.copies_left = front.copies_left.saturating_sub(1);
        if front.copies_left == 0 {
            self.outbox.pop_front();
        }
        Some(sent)
    }

    fn on_link_frame(&mut self, now_ms: u64, frame: &Frame) {
        if frame.command != Command::NetworkJoinRequest {
            return;
        }
        debug!(
            "MainUnit[{:02X}]: Join request from {:?}/0x{:02X}",
            self.config.id, frame.src_type, frame.src_id
        );
        let reply = self
            .reply_to(frame, Command::NetworkJoinOpen)
            .with_payload(&self.config.network_id.to_le_bytes());
        self.queue(now_ms, NETWORK_LINK_ID, &reply);
    }

    fn on_network_frame(&mut self, now_ms: u64, frame: &Frame) {
        let reply = match frame.command {
            Command::NetworkJoinAck => {
                let member = (frame.src_type, frame.src_id);
                if !self.members.contains(&member) {
                    self.members.push(member);
                }
                debug!(
                    "MainUnit[{:02X}]: {:?}/0x{:02X} joined",
                    self.config.id, frame.src_type, frame.src_id
                );
                self.reply_to(frame, Command::NetworkJoinAck)
                    .with_payload(&self.config.network_id.to_le_bytes())
            }
            Command::QueryDevice => {
                self.reply_to(frame, Command::FanSettings).with_payload(&self.status.to_payload())
            }
            Command::SetSpeed | Command::SetTimer => {
                let Ok(speed) = FanSpeed::from_byte(frame.payload[0]) else {
                    debug!(
                        "MainUnit[{:02X}]: Ignoring speed 0x{:02X}",
                        self.config.id, frame.payload[0]
                    );
                    return;
                };
                let timer = if frame.command == Command::SetTimer {
                    frame.payload[1]
                } else {
                    0
                };
                self.status = FanStatus {
                    speed,
                    voltage: speed.nominal_voltage(),
                    timer,
                };
                debug!(
                    "MainUnit[{:02X}]: Speed {:?}, timer {}",
                    self.config.id, speed, timer
                );
                self.reply_to(frame, Command::SetSpeedReply)
                    .with_payload(&self.status.to_payload())
            }
            _ => return,
        };
        let address = self.config.network_id;
        self.queue(now_ms, address, &reply);
    }

    fn reply_to(&self, frame: &Frame, command: Command) -> Frame {
        Frame::new(
            frame.src_type,
            frame.src_id,
            DeviceType::MainUnit,
            self.config.id,
            command,
        )
    }

    fn queue(&mut self, now_ms: u64, address: u32, frame: &Frame) {
        self.outbox.push_back(Outgoing {
            due_ms: now_ms + self.config.response_delay_ms,
            address,
            payload: frame.encode(),
            copies_left: self.config.reply_copies.max(1),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLER_ID: u8 = 0x17;

    fn request(command: Command, payload: &[u8]) -> [u8; FRAME_SIZE] {
        Frame::new(
            DeviceType::MainUnit,
            0x42,
            DeviceType::RemoteControl,
            CONTROLLER_ID,
            command,
        )
        .with_payload(payload)
        .encode()
    }

    fn drain(unit: &mut MainUnit, now_ms: u64) -> Vec<(u32, Frame)> {
        std::iter::from_fn(|| unit.next_transmission(now_ms))
            .map(|(address, payload)| (address, Frame::decode(&payload).unwrap()))
            .collect()
    }

    #[test]
    fn test_join_request_answered_on_link() {
        let mut unit = MainUnit::new(MainUnitConfig::default());
        let join = Frame::new(
            DeviceType::MainUnit,
            0,
            DeviceType::RemoteControl,
            CONTROLLER_ID,
            Command::NetworkJoinRequest,
        )
        .with_payload(&NETWORK_LINK_ID.to_le_bytes());
        unit.receive(0, NETWORK_LINK_ID, &join.encode());

        assert!(drain(&mut unit, 10).is_empty());
        let sent = drain(&mut unit, 20);
        assert_eq!(sent.len(), 4);
        let (address, reply) = sent[0];
        assert_eq!(address, NETWORK_LINK_ID);
        assert_eq!(reply.command, Command::NetworkJoinOpen);
        assert_eq!(reply.dst_id, CONTROLLER_ID);
        assert_eq!(reply.payload_u32_le(0), Some(0xDEAD_BEEF));
    }

    #[test]
    fn test_closed_join_window() {
        let mut unit = MainUnit::new(MainUnitConfig {
            join_open: false,
            ..Default::default()
        });
        assert!(!unit.listens_on(NETWORK_LINK_ID));
        unit.receive(0, NETWORK_LINK_ID, &request(Command::NetworkJoinRequest, &[]));
        assert_eq!(unit.frames_handled(), 0);
    }

    #[test]
    fn test_repeats_deduplicated() {
        let mut unit = MainUnit::new(MainUnitConfig::default());
        let query = request(Command::QueryDevice, &[]);
        for t in 0..4 {
            unit.receive(t, 0xDEAD_BEEF, &query);
        }
        assert_eq!(unit.frames_handled(), 1);

        unit.receive(1500, 0xDEAD_BEEF, &query);
        assert_eq!(unit.frames_handled(), 2);
    }

    #[test]
    fn test_set_speed_updates_status() {
        let mut unit = MainUnit::new(MainUnitConfig::default());
        unit.receive(0, 0xDEAD_BEEF, &request(Command::SetTimer, &[0x04, 15]));

        assert_eq!(unit.status().speed, FanSpeed::Max);
        assert_eq!(unit.status().timer, 15);
        let sent = drain(&mut unit, 100);
        assert_eq!(sent[0].1.command, Command::SetSpeedReply);
        assert_eq!(&sent[0].1.payload[..3], &[0x04, 100, 15]);
    }

    #[test]
    fn test_join_ack_registers_member() {
        let mut unit = MainUnit::new(MainUnitConfig::default());
        unit.receive(0, 0xDEAD_BEEF, &request(Command::NetworkJoinAck, &[]));
        assert_eq!(unit.members(), &[(DeviceType::RemoteControl, CONTROLLER_ID)]);
    }

    #[test]
    fn test_unresponsive_unit_stays_silent() {
        let mut unit = MainUnit::new(MainUnitConfig {
            responsive: false,
            ..Default::default()
        });
        unit.receive(0, 0xDEAD_BEEF, &request(Command::QueryDevice, &[]));
        assert_eq!(unit.frames_handled(), 1);
        assert!(drain(&mut unit, 1000).is_empty());
    }

    #[test]
    fn test_frames_for_other_units_ignored() {
        let mut unit = MainUnit::new(MainUnitConfig::default());
        let other = Frame::new(
            DeviceType::MainUnit,
            0x77,
            DeviceType::RemoteControl,
            CONTROLLER_ID,
            Command::QueryDevice,
        );
        unit.receive(0, 0xDEAD_BEEF, &other.encode());
        assert_eq!(unit.frames_handled(), 0);
    }
}
