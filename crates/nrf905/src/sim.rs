//! Simulated nRF905 for host-side testing.
//!
//! [`SimChip`] models the parts of the transceiver the driver relies on: the
//! configuration and address registers, the TX/RX payload buffers, the
//! status register and the DR/AM/CD outputs. It is shared between a
//! [`SimSpi`] bus and [`SimOutput`]/[`SimInput`] pins, all of which implement
//! the `embedded-hal` traits, so a real [`Nrf905`](crate::Nrf905) runs on top
//! of it unchanged.
//!
//! Transmissions complete the moment TRX_CE rises with TX_EN set; each one
//! is recorded for the test to collect with [`SimChip::take_transmissions`].
//! Payloads are injected with [`SimChip::deliver`], which only succeeds while
//! the chip is listening on a matching address.

use crate::registers::{
    CONFIG_REGISTER_SIZE, PAYLOAD_WIDTH, RX_ADDRESS_OFFSET, R_CONFIG, R_RX_PAYLOAD, R_TX_ADDRESS,
    R_TX_PAYLOAD, STATUS_AM, STATUS_DR, W_CONFIG, W_TX_ADDRESS, W_TX_PAYLOAD,
};
use crate::{Mode, Pin, PinLevels, Pins};
use embedded_hal::digital::{ErrorType as DigitalErrorType, InputPin, OutputPin};
use embedded_hal::spi::{ErrorKind, ErrorType as SpiErrorType, Operation, SpiDevice};
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

/// Register contents after power-on reset.
pub const RESET_REGISTERS: [u8; CONFIG_REGISTER_SIZE] =
    [0x6C, 0x00, 0x44, 0x20, 0x20, 0xE7, 0xE7, 0xE7, 0xE7, 0xE7];

/// A simulated chip shared by its bus and pins.
pub type SharedChip = Rc<RefCell<SimChip>>;

/// A payload that left the simulated antenna.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmission {
    /// Contents of the TX address register at the time.
    pub address: u32,
    /// Contents of the TX payload register at the time.
    pub payload: [u8; PAYLOAD_WIDTH],
}

/// Level of every transceiver signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimLines {
    /// PWR_UP.
    pub power: bool,
    /// TRX_CE.
    pub chip_enable: bool,
    /// TX_EN.
    pub tx_enable: bool,
    /// DR.
    pub data_ready: bool,
    /// AM.
    pub address_match: bool,
    /// CD.
    pub carrier_detect: bool,
}

/// Simulated transceiver state.
#[derive(Debug)]
pub struct SimChip {
    registers: [u8; CONFIG_REGISTER_SIZE],
    tx_address: u32,
    tx_payload: [u8; PAYLOAD_WIDTH],
    rx_payload: [u8; PAYLOAD_WIDTH],
    lines: SimLines,
    transmitted: Vec<Transmission>,
    jammed_register: Option<usize>,
    transmitter_stalled: bool,
    failing_instruction: Option<u8>,
    pin_writes: u64,
    unpowered_enables: u64,
}

impl Default for SimChip {
    fn default() -> Self {
        SimChip {
            registers: RESET_REGISTERS,
            tx_address: 0xE7E7_E7E7,
            tx_payload: [0u8; PAYLOAD_WIDTH],
            rx_payload: [0u8; PAYLOAD_WIDTH],
            lines: SimLines::default(),
            transmitted: Vec::new(),
            jammed_register: None,
            transmitter_stalled: false,
            failing_instruction: None,
            pin_writes: 0,
            unpowered_enables: 0,
        }
    }
}

impl SimChip {
    /// Create a chip in its reset state, ready to be shared.
    pub fn shared() -> SharedChip {
        Rc::new(RefCell::new(SimChip::default()))
    }

    /// Bus and fully bound pins for `chip`.
    pub fn attach(chip: &SharedChip) -> (SimSpi, Pins<SimOutput, SimInput>) {
        let output = |pin| SimOutput {
            chip: Rc::clone(chip),
            pin,
        };
        let input = |pin| SimInput {
            chip: Rc::clone(chip),
            pin,
        };
        let pins = Pins::new(output(Pin::Power), output(Pin::ChipEnable), output(Pin::TxEnable))
            .with_data_ready(input(Pin::DataReady))
            .with_address_match(input(Pin::AddressMatch))
            .with_carrier_detect(input(Pin::CarrierDetect));
        (SimSpi { chip: Rc::clone(chip) }, pins)
    }

    /// Current signal levels.
    pub fn lines(&self) -> SimLines {
        self.lines
    }

    /// The three mode-control outputs.
    pub fn control_levels(&self) -> PinLevels {
        PinLevels::new(self.lines.power, self.lines.chip_enable, self.lines.tx_enable)
    }

    /// The mode selected by the control outputs.
    pub fn mode(&self) -> Option<Mode> {
        self.control_levels().mode()
    }

    /// Whether the chip is in receive mode.
    pub fn is_listening(&self) -> bool {
        self.mode() == Some(Mode::Receive)
    }

    /// Configuration register image.
    pub fn registers(&self) -> [u8; CONFIG_REGISTER_SIZE] {
        self.registers
    }

    /// RX address held in the configuration register.
    pub fn rx_address(&self) -> u32 {
        let r = &self.registers[RX_ADDRESS_OFFSET..RX_ADDRESS_OFFSET + 4];
        u32::from_le_bytes([r[0], r[1], r[2], r[3]])
    }

    /// TX address register.
    pub fn tx_address(&self) -> u32 {
        self.tx_address
    }

    /// Number of output pin writes seen so far.
    pub fn pin_writes(&self) -> u64 {
        self.pin_writes
    }

    /// Make writes to configuration byte `index` have no effect.
    pub fn jam_register(&mut self, index: usize) {
        self.jammed_register = Some(index);
    }

    /// While stalled, a TRX_CE pulse in transmit sends nothing and DR stays low.
    pub fn stall_transmitter(&mut self, stalled: bool) {
        self.transmitter_stalled = stalled;
    }

    /// Reject every SPI transaction that starts with `instruction`.
    pub fn fail_instruction(&mut self, instruction: Option<u8>) {
        self.failing_instruction = instruction;
    }

    /// Pin writes that left TRX_CE or TX_EN high with PWR_UP low.
    pub fn unpowered_enables(&self) -> u64 {
        self.unpowered_enables
    }

    /// Drain the payloads transmitted since the last call.
    pub fn take_transmissions(&mut self) -> Vec<Transmission> {
        std::mem::take(&mut self.transmitted)
    }

    /// Offer a payload sent to `address`.
    ///
    /// Accepted only while listening on `address` with the previous payload
    /// already read out; otherwise the payload is lost, as it would be on air.
    pub fn deliver(&mut self, address: u32, payload: &[u8; PAYLOAD_WIDTH]) -> bool {
        if !self.is_listening() || address != self.rx_address() || self.lines.data_ready {
            return false;
        }
        self.rx_payload = *payload;
        self.lines.address_match = true;
        self.lines.data_ready = true;
        true
    }

    /// Set the carrier-detect output.
    pub fn set_carrier(&mut self, present: bool) {
        self.lines.carrier_detect = present && self.lines.power;
    }

    fn set_output(&mut self, pin: Pin, high: bool) {
        self.pin_writes += 1;
        let before = self.lines;
        match pin {
            Pin::Power => self.lines.power = high,
            Pin::ChipEnable => self.lines.chip_enable = high,
            Pin::TxEnable => self.lines.tx_enable = high,
            _ => return,
        }

        if !self.lines.power {
            if self.lines.chip_enable || self.lines.tx_enable {
                self.unpowered_enables += 1;
            }
            self.lines.data_ready = false;
            self.lines.address_match = false;
            self.lines.carrier_detect = false;
            return;
        }

        let ce_rose = !before.chip_enable && self.lines.chip_enable;
        let ce_fell = before.chip_enable && !self.lines.chip_enable;

        if ce_fell && self.lines.tx_enable {
            self.lines.data_ready = false;
        }
        if ce_rose && self.lines.tx_enable && !self.transmitter_stalled {
            self.transmitted.push(Transmission {
                address: self.tx_address,
                payload: self.tx_payload,
            });
            self.lines.data_ready = true;
        }
    }

    fn status(&self) -> u8 {
        let mut status = 0;
        if self.lines.data_ready {
            status |= STATUS_DR;
        }
        if self.lines.address_match {
            status |= STATUS_AM;
        }
        status
    }

    /// Clock one byte through the SPI shift register.
    fn clock(&mut self, cursor: &mut Cursor, mosi: u8) -> u8 {
        let Some(instruction) = cursor.instruction else {
            cursor.instruction = Some(mosi);
            return self.status();
        };
        let index = cursor.index;
        cursor.index += 1;

        match instruction {
            i if i & 0xF0 == W_CONFIG => {
                let reg = (i & 0x0F) as usize + index;
                if reg < CONFIG_REGISTER_SIZE && self.jammed_register != Some(reg) {
                    self.registers[reg] = mosi;
                }
                0
            }
            i if i & 0xF0 == R_CONFIG => {
                let reg = (i & 0x0F) as usize + index;
                self.registers.get(reg).copied().unwrap_or(0)
            }
            W_TX_PAYLOAD => {
                if let Some(b) = self.tx_payload.get_mut(index) {
                    *b = mosi;
                }
                0
            }
            R_TX_PAYLOAD => self.tx_payload.get(index).copied().unwrap_or(0),
            W_TX_ADDRESS => {
                if index < 4 {
                    let mut bytes = self.tx_address.to_le_bytes();
                    bytes[index] = mosi;
                    self.tx_address = u32::from_le_bytes(bytes);
                }
                0
            }
            R_TX_ADDRESS => self.tx_address.to_le_bytes().get(index).copied().unwrap_or(0),
            R_RX_PAYLOAD => self.rx_payload.get(index).copied().unwrap_or(0),
            _ => 0,
        }
    }

    fn end_transaction(&mut self, cursor: &Cursor) {
        if cursor.instruction == Some(R_RX_PAYLOAD) && cursor.index > 0 {
            self.lines.data_ready = false;
            self.lines.address_match = false;
        }
    }
}

#[derive(Debug, Default)]
struct Cursor {
    instruction: Option<u8>,
    index: usize,
}

/// SPI bus wired to a [`SimChip`].
#[derive(Debug, Clone)]
pub struct SimSpi {
    chip: SharedChip,
}

impl SpiErrorType for SimSpi {
    type Error = ErrorKind;
}

impl SpiDevice for SimSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut chip = self.chip.borrow_mut();
        if chip.failing_instruction.is_some() && chip.failing_instruction == first_byte(operations) {
            return Err(ErrorKind::Other);
        }
        let mut cursor = Cursor::default();

        for op in operations.iter_mut() {
            match op {
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = chip.clock(&mut cursor, 0);
                    }
                }
                Operation::Write(buf) => {
                    for &b in buf.iter() {
                        chip.clock(&mut cursor, b);
                    }
                }
                Operation::Transfer(read, write) => {
                    for i in 0..read.len().max(write.len()) {
                        let mosi = write.get(i).copied().unwrap_or(0);
                        let miso = chip.clock(&mut cursor, mosi);
                        if let Some(r) = read.get_mut(i) {
                            *r = miso;
                        }
                    }
                }
                Operation::TransferInPlace(buf) => {
                    for b in buf.iter_mut() {
                        *b = chip.clock(&mut cursor, *b);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }

        chip.end_transaction(&cursor);
        Ok(())
    }
}

fn first_byte(operations: &[Operation<'_, u8>]) -> Option<u8> {
    operations.iter().find_map(|op| match op {
        Operation::Write(buf) => buf.first().copied(),
        Operation::Transfer(_, write) => write.first().copied(),
        Operation::TransferInPlace(buf) => buf.first().copied(),
        Operation::Read(_) | Operation::DelayNs(_) => None,
    })
}

/// Output signal wired to a [`SimChip`].
#[derive(Debug, Clone)]
pub struct SimOutput {
    chip: SharedChip,
    pin: Pin,
}

impl DigitalErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.chip.borrow_mut().set_output(self.pin, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.chip.borrow_mut().set_output(self.pin, true);
        Ok(())
    }
}

/// Input signal wired to a [`SimChip`].
#[derive(Debug, Clone)]
pub struct SimInput {
    chip: SharedChip,
    pin: Pin,
}

impl DigitalErrorType for SimInput {
    type Error = Infallible;
}

impl InputPin for SimInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let lines = self.chip.borrow().lines;
        Ok(match self.pin {
            Pin::DataReady => lines.data_ready,
            Pin::AddressMatch => lines.address_match,
            Pin::CarrierDetect => lines.carrier_detect,
            Pin::Power => lines.power,
            Pin::ChipEnable => lines.chip_enable,
            Pin::TxEnable => lines.tx_enable,
        })
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}
