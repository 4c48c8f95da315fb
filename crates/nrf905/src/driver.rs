//! The transceiver driver: mode sequencing and non-blocking transfers.

use crate::registers::{
    Config, CONFIG_REGISTER_SIZE, PAYLOAD_WIDTH, RX_ADDRESS_OFFSET, R_CONFIG, R_RX_PAYLOAD,
    R_TX_ADDRESS, STATUS_DR, W_CONFIG, W_TX_ADDRESS, W_TX_PAYLOAD,
};
use crate::{InitError, Mode, Pin, Pins, RadioError};
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Error as _, ErrorKind, Operation, SpiDevice};
use log::{debug, error, info, trace, warn};

/// A raw payload as moved across the air.
pub type Payload = [u8; PAYLOAD_WIDTH];

/// Longest wait for DR after starting one copy of a transmission (ms).
///
/// A 16-byte payload takes about 5 ms on air at 50 kbps including preamble
/// and CRC.
pub const TRANSMIT_TIMEOUT_MS: u64 = 50;

/// What the driver should do once the last repeat of a transmission is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPolicy {
    /// Return to Idle.
    None,
    /// Switch to Receive and wait up to `timeout_ms` for a payload.
    Await {
        /// Reply window, counted from transmit completion.
        timeout_ms: u64,
    },
}

/// Result of one [`Nrf905::poll`] tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// Nothing to report.
    Idle,
    /// The last repeat of the pending transmission left the antenna.
    TransmitComplete,
    /// DR never signalled the end of a copy. The transmission is abandoned
    /// and the radio is back in Idle.
    TransmitTimeout,
    /// A payload arrived during a reply wait.
    FrameReceived(Payload),
    /// The reply window closed without [`Nrf905::end_receive`].
    ReceiveTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Transmitting {
        repeats_left: u8,
        reply: ReplyPolicy,
        /// Armed on the first poll of each copy.
        deadline_ms: Option<u64>,
    },
    AwaitingReply { deadline_ms: u64 },
}

/// nRF905 driver.
///
/// The driver never blocks: transmissions are started with
/// [`start_transmit`](Self::start_transmit) and progress on each
/// [`poll`](Self::poll) call, which compares deadlines against the caller's
/// millisecond clock.
pub struct Nrf905<SPI, OUT, IN> {
    spi: SPI,
    pins: Pins<OUT, IN>,
    config: Config,
    mode: Mode,
    ready: bool,
    phase: Phase,
}

impl<SPI, OUT, IN> Nrf905<SPI, OUT, IN>
where
    SPI: SpiDevice,
    OUT: OutputPin,
    IN: InputPin,
{
    /// Bind a driver to its bus and signals. Nothing is touched until
    /// [`initialize`](Self::initialize).
    pub fn new(spi: SPI, pins: Pins<OUT, IN>) -> Self {
        Nrf905 {
            spi,
            pins,
            config: Config::default(),
            mode: Mode::PowerDown,
            ready: false,
            phase: Phase::Idle,
        }
    }

    /// Bring the chip up with `config`.
    ///
    /// Aborts with [`InitError::MissingPin`] before touching any signal when
    /// TRX_CE, PWR_UP or TX_EN is unbound. Written registers are read back and
    /// verified; any failure leaves the driver not ready.
    pub fn initialize(&mut self, config: Config) -> Result<(), InitError> {
        debug!("Starting nRF905 initialization");
        self.ready = false;
        self.phase = Phase::Idle;

        self.check_pins()?;
        config.validate()?;

        self.set_mode(Mode::PowerDown);

        let current = self.read_config_registers()?;
        debug!("Configuration registers at reset: {:02X?}", current);

        let image = config.to_registers();
        self.write_config_registers(&image)?;
        let readback = self.read_config_registers()?;
        if readback != image {
            error!(
                "Configuration register mismatch: wrote {:02X?}, read {:02X?}",
                image, readback
            );
            return Err(InitError::RegisterMismatch {
                register: "configuration",
                expected: image.to_vec(),
                actual: readback.to_vec(),
            });
        }

        self.write_tx_address(config.tx_address)
            .map_err(InitError::Spi)?;
        let tx_address = self.read_tx_address()?;
        if tx_address != config.tx_address {
            error!(
                "TX address mismatch: wrote {:08X}, read {:08X}",
                config.tx_address, tx_address
            );
            return Err(InitError::RegisterMismatch {
                register: "TX address",
                expected: config.tx_address.to_le_bytes().to_vec(),
                actual: tx_address.to_le_bytes().to_vec(),
            });
        }

        self.set_mode(Mode::Standby);
        self.set_mode(Mode::Idle);

        self.config = config;
        self.ready = true;
        debug!("nRF905 setup complete");
        Ok(())
    }

    fn check_pins(&self) -> Result<(), InitError> {
        for pin in [
            Pin::AddressMatch,
            Pin::CarrierDetect,
            Pin::ChipEnable,
            Pin::DataReady,
            Pin::Power,
            Pin::TxEnable,
        ] {
            if self.pins.is_bound(pin) {
                continue;
            }
            if pin.is_mandatory() {
                error!("{} pin is not configured. Initialization aborted.", pin);
                return Err(InitError::MissingPin(pin));
            }
            warn!("{} pin is not configured.", pin);
        }
        Ok(())
    }

    /// Log the active configuration.
    pub fn dump_config(&self) {
        info!("nRF905:");
        info!("  Ready: {}", self.ready);
        info!("  Mode: {}", self.mode);
        info!(
            "  Frequency: {}.{} MHz (channel {}, {:?})",
            self.config.frequency_khz() / 1000,
            self.config.frequency_khz() % 1000 / 100,
            self.config.channel,
            self.config.band
        );
        info!("  CRC: {:?}", self.config.crc);
        info!("  TX power: {:?}", self.config.tx_power);
        info!("  RX address: {:08X}", self.config.rx_address);
        info!("  TX address: {:08X}", self.config.tx_address);
        for pin in [Pin::AddressMatch, Pin::DataReady, Pin::CarrierDetect] {
            if !self.pins.is_bound(pin) {
                warn!("  {} pin not configured.", pin);
            }
        }
    }

    // ========================================================================
    // Mode Control
    // ========================================================================

    /// Drive the control outputs for `mode`.
    ///
    /// TRX_CE is dropped first and raised last so the chip never radiates
    /// while direction or power change. PWR_UP goes high before TX_EN and
    /// low after it. Never fails: unbound pins are skipped and pin errors
    /// are logged.
    pub fn set_mode(&mut self, mode: Mode) {
        trace!("Setting mode: {}", mode);
        let levels = mode.pin_levels();

        write_pin(&mut self.pins.chip_enable, Pin::ChipEnable, false);
        if levels.power {
            write_pin(&mut self.pins.power, Pin::Power, true);
            write_pin(&mut self.pins.tx_enable, Pin::TxEnable, levels.tx_enable);
        } else {
            write_pin(&mut self.pins.tx_enable, Pin::TxEnable, levels.tx_enable);
            write_pin(&mut self.pins.power, Pin::Power, false);
        }
        if levels.chip_enable {
            write_pin(&mut self.pins.chip_enable, Pin::ChipEnable, true);
        }

        self.mode = mode;
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether initialization succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether a transmission or reply wait is pending.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Load `payload` and start sending it `repeats` times back-to-back.
    ///
    /// Returns immediately; completion shows up on a later [`poll`](Self::poll).
    /// Each copy must raise DR within [`TRANSMIT_TIMEOUT_MS`] of the first
    /// poll that waits for it, or the transmission ends with
    /// [`RadioEvent::TransmitTimeout`].
    pub fn start_transmit(
        &mut self,
        payload: &Payload,
        repeats: u8,
        reply: ReplyPolicy,
    ) -> Result<(), RadioError> {
        if !self.ready {
            return Err(RadioError::NotReady);
        }
        if self.is_busy() {
            return Err(RadioError::Busy);
        }

        self.set_mode(Mode::Idle);
        if let Err(kind) = self.write_tx_payload(payload) {
            warn!("Failed to load TX payload: {}", kind);
            return Err(RadioError::Spi(kind));
        }
        self.set_mode(Mode::Transmit);

        self.phase = Phase::Transmitting {
            repeats_left: repeats.max(1) - 1,
            reply,
            deadline_ms: None,
        };
        Ok(())
    }

    /// Close a reply wait early and return to Idle.
    pub fn end_receive(&mut self) {
        if let Phase::AwaitingReply { .. } = self.phase {
            self.set_mode(Mode::Idle);
            self.phase = Phase::Idle;
        }
    }

    /// Advance pending work. Call once per scheduler tick.
    pub fn poll(&mut self, now_ms: u64) -> RadioEvent {
        match self.phase {
            Phase::Idle => RadioEvent::Idle,
            Phase::Transmitting {
                repeats_left,
                reply,
                deadline_ms,
            } => {
                if !self.data_ready() {
                    let deadline_ms =
                        deadline_ms.unwrap_or_else(|| now_ms.saturating_add(TRANSMIT_TIMEOUT_MS));
                    if now_ms >= deadline_ms {
                        warn!("Transmission did not complete, abandoning");
                        self.set_mode(Mode::Idle);
                        self.phase = Phase::Idle;
                        return RadioEvent::TransmitTimeout;
                    }
                    self.phase = Phase::Transmitting {
                        repeats_left,
                        reply,
                        deadline_ms: Some(deadline_ms),
                    };
                    return RadioEvent::Idle;
                }

                if repeats_left > 0 {
                    // Pulse TRX_CE to send the loaded payload again
                    self.set_mode(Mode::Idle);
                    self.set_mode(Mode::Transmit);
                    self.phase = Phase::Transmitting {
                        repeats_left: repeats_left - 1,
                        reply,
                        deadline_ms: None,
                    };
                    return RadioEvent::Idle;
                }

                match reply {
                    ReplyPolicy::Await { timeout_ms } => {
                        self.set_mode(Mode::Receive);
                        self.phase = Phase::AwaitingReply {
                            deadline_ms: now_ms.saturating_add(timeout_ms),
                        };
                    }
                    ReplyPolicy::None => {
                        self.set_mode(Mode::Idle);
                        self.phase = Phase::Idle;
                    }
                }
                RadioEvent::TransmitComplete
            }
            Phase::AwaitingReply { deadline_ms } => {
                // The window closes on time even while other traffic keeps DR busy
                if now_ms >= deadline_ms {
                    trace!("Reply window closed");
                    self.set_mode(Mode::Idle);
                    self.phase = Phase::Idle;
                    return RadioEvent::ReceiveTimeout;
                }

                if self.data_ready() {
                    match self.read_rx_payload() {
                        Ok(payload) => return RadioEvent::FrameReceived(payload),
                        Err(kind) => warn!("Failed to read RX payload: {}", kind),
                    }
                }
                RadioEvent::Idle
            }
        }
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    /// Change the receive address.
    pub fn set_rx_address(&mut self, address: u32) -> Result<(), RadioError> {
        if self.is_busy() {
            return Err(RadioError::Busy);
        }
        let mut buf = [0u8; 5];
        buf[0] = W_CONFIG | RX_ADDRESS_OFFSET as u8;
        buf[1..].copy_from_slice(&address.to_le_bytes());
        self.spi.write(&buf).map_err(|e| RadioError::Spi(e.kind()))?;
        self.config.rx_address = address;
        debug!("RX address set to {:08X}", address);
        Ok(())
    }

    /// Change the transmit address.
    pub fn set_tx_address(&mut self, address: u32) -> Result<(), RadioError> {
        if self.is_busy() {
            return Err(RadioError::Busy);
        }
        self.write_tx_address(address).map_err(RadioError::Spi)?;
        self.config.tx_address = address;
        debug!("TX address set to {:08X}", address);
        Ok(())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Level of the address-match input, if bound.
    pub fn address_matched(&mut self) -> Option<bool> {
        read_pin(&mut self.pins.address_match, Pin::AddressMatch)
    }

    /// Level of the carrier-detect input, if bound.
    pub fn carrier_detected(&mut self) -> Option<bool> {
        read_pin(&mut self.pins.carrier_detect, Pin::CarrierDetect)
    }

    /// Read the configuration register image from the chip.
    pub fn read_config(&mut self) -> Result<Config, InitError> {
        let regs = self.read_config_registers()?;
        let tx_address = self.read_tx_address()?;
        Config::from_registers(&regs, tx_address)
    }

    /// Give back the bus and signals.
    pub fn release(self) -> (SPI, Pins<OUT, IN>) {
        (self.spi, self.pins)
    }

    // ========================================================================
    // Register Access
    // ========================================================================

    fn data_ready(&mut self) -> bool {
        if let Some(level) = read_pin(&mut self.pins.data_ready, Pin::DataReady) {
            return level;
        }
        // Without a DR pin, the status register clocked out with any
        // instruction carries the same flag.
        let mut status = [R_CONFIG];
        match self.spi.transfer_in_place(&mut status) {
            Ok(()) => status[0] & STATUS_DR != 0,
            Err(e) => {
                warn!("Failed to read status register: {}", e.kind());
                false
            }
        }
    }

    fn read_config_registers(&mut self) -> Result<[u8; CONFIG_REGISTER_SIZE], InitError> {
        let mut regs = [0u8; CONFIG_REGISTER_SIZE];
        self.spi
            .transaction(&mut [Operation::Write(&[R_CONFIG]), Operation::Read(&mut regs)])
            .map_err(|e| InitError::Spi(e.kind()))?;
        Ok(regs)
    }

    fn write_config_registers(&mut self, regs: &[u8; CONFIG_REGISTER_SIZE]) -> Result<(), InitError> {
        self.spi
            .transaction(&mut [Operation::Write(&[W_CONFIG]), Operation::Write(regs)])
            .map_err(|e| InitError::Spi(e.kind()))
    }

    fn read_tx_address(&mut self) -> Result<u32, InitError> {
        let mut addr = [0u8; 4];
        self.spi
            .transaction(&mut [Operation::Write(&[R_TX_ADDRESS]), Operation::Read(&mut addr)])
            .map_err(|e| InitError::Spi(e.kind()))?;
        Ok(u32::from_le_bytes(addr))
    }

    fn write_tx_address(&mut self, address: u32) -> Result<(), ErrorKind> {
        let addr = address.to_le_bytes();
        self.spi
            .transaction(&mut [Operation::Write(&[W_TX_ADDRESS]), Operation::Write(&addr)])
            .map_err(|e| e.kind())
    }

    fn write_tx_payload(&mut self, payload: &Payload) -> Result<(), ErrorKind> {
        self.spi
            .transaction(&mut [Operation::Write(&[W_TX_PAYLOAD]), Operation::Write(payload)])
            .map_err(|e| e.kind())
    }

    fn read_rx_payload(&mut self) -> Result<Payload, ErrorKind> {
        // The payload is read in standby, then listening resumes
        self.set_mode(Mode::Idle);
        let mut payload = [0u8; PAYLOAD_WIDTH];
        let result = self
            .spi
            .transaction(&mut [Operation::Write(&[R_RX_PAYLOAD]), Operation::Read(&mut payload)])
            .map_err(|e| e.kind());
        self.set_mode(Mode::Receive);
        result.map(|()| payload)
    }
}

fn write_pin<P: OutputPin>(pin: &mut Option<P>, name: Pin, high: bool) {
    let Some(pin) = pin.as_mut() else {
        return;
    };
    let result = if high { pin.set_high() } else { pin.set_low() };
    if let Err(e) = result {
        warn!("Failed to drive {} pin: {:?}", name, embedded_hal::digital::Error::kind(&e));
    }
}

fn read_pin<P: InputPin>(pin: &mut Option<P>, name: Pin) -> Option<bool> {
    let pin = pin.as_mut()?;
    match pin.is_high() {
        Ok(level) => Some(level),
        Err(e) => {
            warn!("Failed to read {} pin: {:?}", name, embedded_hal::digital::Error::kind(&e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::DEFAULT_ADDRESS;
    use crate::sim::{SharedChip, SimChip, SimInput, SimOutput, SimSpi};

    type SimRadio = Nrf905<SimSpi, SimOutput, SimInput>;

    fn sim_radio() -> (SharedChip, SimRadio) {
        let chip = SimChip::shared();
        let (spi, pins) = SimChip::attach(&chip);
        (chip, Nrf905::new(spi, pins))
    }

    fn ready_radio() -> (SharedChip, SimRadio) {
        let (chip, mut radio) = sim_radio();
        radio.initialize(Config::default()).unwrap();
        (chip, radio)
    }

    #[test]
    fn test_initialize_writes_configuration() {
        let (chip, radio) = ready_radio();

        assert!(radio.is_ready());
        assert_eq!(radio.mode(), Mode::Idle);
        assert_eq!(chip.borrow().registers(), Config::default().to_registers());
        assert_eq!(chip.borrow().rx_address(), DEFAULT_ADDRESS);
        assert_eq!(chip.borrow().tx_address(), DEFAULT_ADDRESS);
        assert_eq!(chip.borrow().mode(), Some(Mode::Idle));
    }

    #[test]
    fn test_read_config_after_initialize() {
        let (_chip, mut radio) = ready_radio();
        assert_eq!(radio.read_config().unwrap(), Config::default());
    }

    #[test]
    fn test_missing_tx_enable_aborts() {
        let chip = SimChip::shared();
        let (spi, mut pins) = SimChip::attach(&chip);
        pins.tx_enable = None;
        let mut radio = Nrf905::new(spi, pins);

        assert_eq!(
            radio.initialize(Config::default()),
            Err(InitError::MissingPin(Pin::TxEnable))
        );
        assert!(!radio.is_ready());
        assert_eq!(chip.borrow().pin_writes(), 0);
        assert_eq!(chip.borrow().registers(), crate::sim::RESET_REGISTERS);
        assert_eq!(
            radio.start_transmit(&[0u8; PAYLOAD_WIDTH], 1, ReplyPolicy::None),
            Err(RadioError::NotReady)
        );
    }

    #[test]
    fn test_missing_chip_enable_reported_first() {
        let chip = SimChip::shared();
        let (spi, mut pins) = SimChip::attach(&chip);
        pins.power = None;
        pins.chip_enable = None;
        let mut radio = Nrf905::new(spi, pins);

        assert_eq!(
            radio.initialize(Config::default()),
            Err(InitError::MissingPin(Pin::ChipEnable))
        );
    }

    #[test]
    fn test_optional_pins_not_required() {
        let chip = SimChip::shared();
        let (spi, mut pins) = SimChip::attach(&chip);
        pins.address_match = None;
        pins.carrier_detect = None;
        let mut radio = Nrf905::new(spi, pins);

        assert!(radio.initialize(Config::default()).is_ok());
        assert_eq!(radio.address_matched(), None);
        assert_eq!(radio.carrier_detected(), None);
    }

    #[test]
    fn test_register_mismatch_is_fatal() {
        let (chip, mut radio) = sim_radio();
        chip.borrow_mut().jam_register(0);

        let err = radio.initialize(Config::default()).unwrap_err();
        assert!(matches!(err, InitError::RegisterMismatch { register: "configuration", .. }));
        assert!(!radio.is_ready());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (_chip, mut radio) = sim_radio();
        let config = Config {
            tx_payload_width: 32,
            ..Config::default()
        };
        assert!(matches!(radio.initialize(config), Err(InitError::InvalidConfig(_))));
    }

    #[test]
    fn test_set_mode_pin_table() {
        let (chip, mut radio) = ready_radio();

        for from in Mode::ALL {
            for to in Mode::ALL {
                radio.set_mode(from);
                radio.set_mode(to);
                assert_eq!(chip.borrow().control_levels(), to.pin_levels(), "{from} -> {to}");
                assert_eq!(radio.mode(), to);
            }
        }
    }

    #[test]
    fn test_transmit_repeats_then_completes() {
        let (chip, mut radio) = ready_radio();
        let payload = [0x5Au8; PAYLOAD_WIDTH];

        radio.start_transmit(&payload, 4, ReplyPolicy::None).unwrap();
        assert_eq!(radio.mode(), Mode::Transmit);

        for _ in 0..3 {
            assert_eq!(radio.poll(0), RadioEvent::Idle);
        }
        assert_eq!(radio.poll(0), RadioEvent::TransmitComplete);
        assert_eq!(radio.mode(), Mode::Idle);
        assert!(!radio.is_busy());

        let sent = chip.borrow_mut().take_transmissions();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|t| t.payload == payload && t.address == DEFAULT_ADDRESS));
        assert_eq!(radio.poll(0), RadioEvent::Idle);
    }

    #[test]
    fn test_transmit_while_busy() {
        let (_chip, mut radio) = ready_radio();
        let payload = [1u8; PAYLOAD_WIDTH];

        radio.start_transmit(&payload, 1, ReplyPolicy::Await { timeout_ms: 1000 }).unwrap();
        assert_eq!(
            radio.start_transmit(&payload, 1, ReplyPolicy::None),
            Err(RadioError::Busy)
        );

        assert_eq!(radio.poll(10), RadioEvent::TransmitComplete);
        // Still busy while waiting for the reply
        assert_eq!(
            radio.start_transmit(&payload, 1, ReplyPolicy::None),
            Err(RadioError::Busy)
        );
        assert_eq!(radio.set_rx_address(1), Err(RadioError::Busy));
    }

    #[test]
    fn test_reply_received() {
        let (chip, mut radio) = ready_radio();
        radio.start_transmit(&[1u8; PAYLOAD_WIDTH], 1, ReplyPolicy::Await { timeout_ms: 1000 }).unwrap();
        assert_eq!(radio.poll(100), RadioEvent::TransmitComplete);
        assert_eq!(radio.mode(), Mode::Receive);
        assert!(chip.borrow().is_listening());

        let reply = [9u8; PAYLOAD_WIDTH];
        assert!(chip.borrow_mut().deliver(DEFAULT_ADDRESS, &reply));
        assert_eq!(radio.address_matched(), Some(true));
        assert_eq!(radio.poll(200), RadioEvent::FrameReceived(reply));

        // Listening resumes until the caller ends the wait
        assert!(chip.borrow().is_listening());
        assert!(radio.is_busy());
        radio.end_receive();
        assert!(!radio.is_busy());
        assert_eq!(radio.mode(), Mode::Idle);
    }

    #[test]
    fn test_reply_timeout() {
        let (chip, mut radio) = ready_radio();
        radio.start_transmit(&[1u8; PAYLOAD_WIDTH], 1, ReplyPolicy::Await { timeout_ms: 1000 }).unwrap();
        assert_eq!(radio.poll(100), RadioEvent::TransmitComplete);

        assert_eq!(radio.poll(1099), RadioEvent::Idle);
        assert_eq!(radio.poll(1100), RadioEvent::ReceiveTimeout);
        assert_eq!(radio.mode(), Mode::Idle);
        assert_eq!(chip.borrow().mode(), Some(Mode::Idle));
        assert!(!radio.is_busy());
    }

    #[test]
    fn test_reply_window_closes_under_foreign_traffic() {
        let (chip, mut radio) = ready_radio();
        radio.start_transmit(&[1u8; PAYLOAD_WIDTH], 1, ReplyPolicy::Await { timeout_ms: 1000 }).unwrap();
        assert_eq!(radio.poll(0), RadioEvent::TransmitComplete);

        let foreign = [0xEEu8; PAYLOAD_WIDTH];
        let mut closed_at = None;
        for now in (100..=20_000).step_by(100) {
            chip.borrow_mut().deliver(DEFAULT_ADDRESS, &foreign);
            match radio.poll(now) {
                RadioEvent::FrameReceived(payload) => assert_eq!(payload, foreign),
                RadioEvent::ReceiveTimeout => {
                    closed_at = Some(now);
                    break;
                }
                other => panic!("unexpected {:?} at {} ms", other, now),
            }
        }

        assert_eq!(closed_at, Some(1000));
        assert!(!radio.is_busy());
        assert_eq!(chip.borrow().mode(), Some(Mode::Idle));
    }

    #[test]
    fn test_transmit_times_out_without_data_ready() {
        let (chip, mut radio) = ready_radio();
        chip.borrow_mut().stall_transmitter(true);

        radio.start_transmit(&[1u8; PAYLOAD_WIDTH], 1, ReplyPolicy::Await { timeout_ms: 1000 }).unwrap();
        assert_eq!(radio.poll(0), RadioEvent::Idle);
        assert_eq!(radio.poll(TRANSMIT_TIMEOUT_MS - 1), RadioEvent::Idle);
        assert!(radio.is_busy());
        assert_eq!(radio.poll(TRANSMIT_TIMEOUT_MS), RadioEvent::TransmitTimeout);

        assert!(!radio.is_busy());
        assert_eq!(radio.mode(), Mode::Idle);
        assert_eq!(chip.borrow().mode(), Some(Mode::Idle));
        assert_eq!(radio.poll(TRANSMIT_TIMEOUT_MS + 1), RadioEvent::Idle);

        // The radio accepts the next transmission once the chip recovers
        chip.borrow_mut().stall_transmitter(false);
        radio.start_transmit(&[2u8; PAYLOAD_WIDTH], 1, ReplyPolicy::None).unwrap();
        assert_eq!(radio.poll(100), RadioEvent::TransmitComplete);
    }

    #[test]
    fn test_transmit_timeout_with_sparse_polls() {
        let (chip, mut radio) = ready_radio();
        chip.borrow_mut().stall_transmitter(true);
        radio.start_transmit(&[1u8; PAYLOAD_WIDTH], 4, ReplyPolicy::Await { timeout_ms: 1000 }).unwrap();

        let events: Vec<RadioEvent> = (0..3600u64)
            .map(|s| radio.poll(s * 1000))
            .filter(|e| *e != RadioEvent::Idle)
            .collect();
        assert_eq!(events, vec![RadioEvent::TransmitTimeout]);
        assert!(!radio.is_busy());
    }

    #[test]
    fn test_power_up_before_tx_enable() {
        let (chip, mut radio) = ready_radio();
        for from in Mode::ALL {
            for to in Mode::ALL {
                radio.set_mode(from);
                radio.set_mode(to);
            }
        }
        assert_eq!(chip.borrow().unpowered_enables(), 0);
    }

    #[test]
    fn test_data_ready_from_status_register() {
        let chip = SimChip::shared();
        let (spi, mut pins) = SimChip::attach(&chip);
        pins.data_ready = None;
        let mut radio = Nrf905::new(spi, pins);
        radio.initialize(Config::default()).unwrap();

        radio.start_transmit(&[3u8; PAYLOAD_WIDTH], 2, ReplyPolicy::None).unwrap();
        assert_eq!(radio.poll(0), RadioEvent::Idle);
        assert_eq!(radio.poll(0), RadioEvent::TransmitComplete);
        assert_eq!(chip.borrow_mut().take_transmissions().len(), 2);
    }

    #[test]
    fn test_change_addresses() {
        let (chip, mut radio) = ready_radio();

        radio.set_rx_address(0xA55A_5AA5).unwrap();
        radio.set_tx_address(0xA55A_5AA5).unwrap();

        assert_eq!(chip.borrow().rx_address(), 0xA55A_5AA5);
        assert_eq!(chip.borrow().tx_address(), 0xA55A_5AA5);
        assert_eq!(radio.config().rx_address, 0xA55A_5AA5);
    }
}
