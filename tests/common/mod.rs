//! A scripted fake bootloader, standing in for real hardware in the
//! integration tests. It understands just enough of the wire protocol
//! (SLIP framing, the 8-byte response header, `READ_REG`/`WRITE_REG`
//! SPI bit-banging) to answer a `Session` the way an ESP32 ROM would.

use std::collections::{HashMap, VecDeque};
use std::io;

use espflasher::Port;

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

const CHIP_MAGIC_REG: u32 = 0x4000_1000;

// ESP32 SPI controller register map, matching `target::Target::Esp32`.
const SPI_CMD: u32 = 0x3FF4_2000;
const SPI_USR2: u32 = 0x3FF4_2088;
const SPI_W0: u32 = 0x3FF4_2098;
const SPI_CMD_USR: u32 = 1 << 18;
const SPI_FLASH_READ_ID: u8 = 0x9F;

fn slip_encode(data: &[u8], out: &mut Vec<u8>) {
    out.push(END);
    for &b in data {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            other => out.push(other),
        }
    }
    out.push(END);
}

fn slip_decode_one(framed: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = framed.iter().copied().peekable();
    while let Some(b) = iter.next() {
        match b {
            END => continue,
            ESC => match iter.next() {
                Some(ESC_END) => out.push(END),
                Some(ESC_ESC) => out.push(ESC),
                Some(other) => {
                    out.push(ESC);
                    out.push(other);
                }
                None => {}
            },
            other => out.push(other),
        }
    }
    out
}

/// Builds one response frame's payload: `direction, cmd, size, value, data...,
/// status, error`, matching `response::ResponsePacket`'s wire layout.
fn response_frame(cmd_code: u8, value: u32, data: &[u8], status: u8, error: u8) -> Vec<u8> {
    let mut payload = data.to_vec();
    payload.push(status);
    payload.push(error);
    let size = payload.len() as u16;

    let mut out = vec![0x01, cmd_code];
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// What a scripted command produces: an ack (`value`, optional `data`), or a
/// device-reported failure (`status = 1`, `error`).
pub enum Reply {
    Ack { value: u32, data: Vec<u8> },
    Fail { error: u8 },
}

impl Reply {
    pub fn ack() -> Self {
        Reply::Ack {
            value: 0,
            data: Vec::new(),
        }
    }

    pub fn ack_value(value: u32) -> Self {
        Reply::Ack {
            value,
            data: Vec::new(),
        }
    }

    pub fn ack_data(data: Vec<u8>) -> Self {
        Reply::Ack { value: 0, data }
    }
}

/// A `Port` that plays the part of an ESP32 ROM bootloader: it decodes every
/// outgoing SLIP frame, tracks just enough SPI register state to answer
/// `SPI_FLASH_READ_ID`, and otherwise acks whatever it's sent unless the
/// test has queued an override for that command.
pub struct FakePort {
    outgoing: VecDeque<u8>,
    pub sent: Vec<Vec<u8>>,
    registers: HashMap<u32, u32>,
    magic: u32,
    pending_spi_opcode: Option<u8>,
    flash_id: u32,
    overrides: HashMap<u8, VecDeque<Reply>>,
    starved: bool,
}

impl FakePort {
    pub fn new(magic: u32) -> Self {
        FakePort {
            outgoing: VecDeque::new(),
            sent: Vec::new(),
            registers: HashMap::new(),
            magic,
            pending_spi_opcode: None,
            flash_id: 0x16_40_20, // size_id 0x16 -> 4 MiB, per the flash-size test oracle
            overrides: HashMap::new(),
            starved: false,
        }
    }

    pub fn with_flash_id(mut self, flash_id: u32) -> Self {
        self.flash_id = flash_id;
        self
    }

    /// Queue a one-shot reply for the next occurrence of `cmd_code`, ahead
    /// of the generic ack/SPI-aware behavior.
    pub fn queue_reply(&mut self, cmd_code: u8, reply: Reply) {
        self.overrides.entry(cmd_code).or_default().push_back(reply);
    }

    /// After this, every further read starves (times out) instead of being
    /// answered, simulating a device that's stopped responding.
    pub fn starve(&mut self) {
        self.starved = true;
    }

    fn push_response(&mut self, cmd_code: u8, value: u32, data: &[u8], status: u8, error: u8) {
        let frame = response_frame(cmd_code, value, data, status, error);
        let mut framed = Vec::new();
        slip_encode(&frame, &mut framed);
        self.outgoing.extend(framed);
    }

    fn dispatch(&mut self, packet: &[u8]) {
        if packet.len() < 8 {
            return;
        }
        let cmd_code = packet[1];
        let size = u16::from_le_bytes([packet[2], packet[3]]) as usize;
        let body = &packet[8..];
        let body = if body.len() >= size { &body[..size] } else { body };

        if let Some(queue) = self.overrides.get_mut(&cmd_code) {
            if let Some(reply) = queue.pop_front() {
                match reply {
                    Reply::Ack { value, data } => self.push_response(cmd_code, value, &data, 0, 0),
                    Reply::Fail { error } => self.push_response(cmd_code, 0, &[], 1, error),
                }
                return;
            }
        }

        match cmd_code {
            0x08 => {
                // SYNC: the transport expects exactly eight matching frames.
                for _ in 0..8 {
                    self.push_response(0x08, 0, &[], 0, 0);
                }
            }
            0x09 if body.len() >= 4 => {
                // READ_REG
                let address = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                let value = if address == CHIP_MAGIC_REG {
                    self.magic
                } else {
                    *self.registers.get(&address).unwrap_or(&0)
                };
                self.push_response(0x09, value, &[], 0, 0);
            }
            0x0A if body.len() >= 16 => {
                // WRITE_REG
                let address = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                let value = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);

                if address == SPI_USR2 {
                    self.pending_spi_opcode = Some((value & 0xFF) as u8);
                }
                if address == SPI_CMD && value & SPI_CMD_USR != 0 {
                    if self.pending_spi_opcode == Some(SPI_FLASH_READ_ID) {
                        self.registers.insert(SPI_W0, self.flash_id);
                    }
                } else {
                    self.registers.insert(address, value);
                }
                self.push_response(0x0A, 0, &[], 0, 0);
            }
            _ => self.push_response(cmd_code, 0, &[], 0, 0),
        }
    }
}

impl Port for FakePort {
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let decoded = slip_decode_one(bytes);
        self.sent.push(decoded.clone());
        self.dispatch(&decoded);
        Ok(())
    }

    fn recv_byte_with_deadline(&mut self) -> io::Result<u8> {
        if self.starved {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "device stopped responding"));
        }
        self.outgoing
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no more scripted bytes"))
    }

    fn start_timer(&mut self, _timeout_ms: u32) {}
    fn delay_ms(&mut self, _ms: u32) {}
    fn enter_bootloader(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn reset_target(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn debug_print(&mut self, _text: &str) {}
}
