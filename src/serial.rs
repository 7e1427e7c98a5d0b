// Copyright 2022 Stephen Checkoway
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A [`Port`] backed by a real UART via the `serialport` crate.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort as SerialPortTrait};

use crate::port::Port;

/// The minimum per-read timeout handed to the underlying serial port, so a
/// deadline that has already passed doesn't turn into a zero-length,
/// always-failing read.
const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(10);

const RESET_SETTLE_MS: u64 = 100;
const BOOT_STRAP_SETTLE_MS: u64 = 500;

pub struct SerialPort {
    inner: Box<dyn SerialPortTrait>,
    deadline: Instant,
}

impl SerialPort {
    pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
        let inner = serialport::new(path, baud_rate).open()?;
        Ok(SerialPort {
            inner,
            deadline: Instant::now(),
        })
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.inner.set_baud_rate(baud_rate)
    }
}

impl Port for SerialPort {
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.set_timeout(Duration::from_secs(5))?;
        self.inner.write_all(bytes)
    }

    fn recv_byte_with_deadline(&mut self) -> io::Result<u8> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        self.inner.set_timeout(remaining.max(MIN_POLL_TIMEOUT))?;
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn start_timer(&mut self, timeout_ms: u32) {
        self.deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    /// `/RTS` is wired to `EN` (reset) and `/DTR` to `GPIO0` (the boot
    /// strap pin): pulse reset while holding the strap pin low, then
    /// release it once the chip has started.
    fn enter_bootloader(&mut self) -> io::Result<()> {
        self.inner.clear(ClearBuffer::All)?;
        self.inner.write_request_to_send(true)?;
        self.inner.write_data_terminal_ready(false)?;
        std::thread::sleep(Duration::from_millis(RESET_SETTLE_MS));
        self.inner.clear(ClearBuffer::All)?;
        self.inner.write_data_terminal_ready(true)?;
        self.inner.write_request_to_send(false)?;
        std::thread::sleep(Duration::from_millis(BOOT_STRAP_SETTLE_MS));
        self.inner.write_data_terminal_ready(false)?;
        Ok(())
    }

    fn reset_target(&mut self) -> io::Result<()> {
        self.inner.write_request_to_send(true)?;
        self.inner.write_data_terminal_ready(false)?;
        std::thread::sleep(Duration::from_millis(RESET_SETTLE_MS));
        self.inner.write_request_to_send(false)?;
        Ok(())
    }

    fn debug_print(&mut self, text: &str) {
        eprintln!("{text}");
    }
}
