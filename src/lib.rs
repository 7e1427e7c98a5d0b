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

//! A bootloader protocol engine for flashing Espressif ESP8266/ESP32-family
//! chips over a byte-oriented serial link.
//!
//! [`Session`] drives the connect → begin → write× → finish → verify
//! lifecycle against anything implementing [`Port`], the crate's only
//! hardware boundary. A concrete [`serial::SerialPort`] is provided behind
//! the `serial` feature for real UART transports.

mod checksum;
mod codec;
mod command;
pub mod error;
pub mod event;
mod response;
mod session;
pub mod port;
pub mod target;

#[cfg(feature = "serial")]
pub mod serial;

pub use command::Command;
pub use error::{Error, ErrorExt, Result};
pub use port::Port;
pub use session::Session;
pub use target::Target;

#[inline]
pub(crate) fn ceil_div(a: u32, b: u32) -> u32 {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

#[inline]
pub(crate) fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

/// The per-MiB-scaled operations (flash begin, RAM load, MD5 verify) never
/// arm a deadline shorter than this, regardless of how small `bytes` is —
/// spec §4.7's "default flash timeout".
pub(crate) const DEFAULT_FLASH_TIMEOUT_MS: u32 = 3000;

/// Integer replacement for the original `time_per_mb * (size / 1e6f)`
/// floating-point computation, which loses precision for small `bytes`
/// values and differs across platforms' float rounding. Floored at
/// [`DEFAULT_FLASH_TIMEOUT_MS`], matching the original's per-MiB timeouts.
pub(crate) fn timeout_per_mb(bytes: u32, time_per_mb_ms: u32) -> u32 {
    let scaled = ((time_per_mb_ms as u64) * (bytes as u64) + 999_999) / 1_000_000;
    (scaled as u32).max(DEFAULT_FLASH_TIMEOUT_MS)
}
