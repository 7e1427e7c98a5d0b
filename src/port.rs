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

use std::io;

/// The boundary between the protocol engine and the physical world.
///
/// A `Port` is owned exclusively by one `Session` for its lifetime. Every
/// method is synchronous and may block; there is no cancellation besides the
/// deadline armed by `start_timer`.
pub trait Port {
    /// Write `bytes` to the wire. Blocking; returns on the first I/O error.
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read a single byte, honoring the deadline most recently armed by
    /// `start_timer`. Implementations must return an `io::Error` of kind
    /// `TimedOut` once that deadline has passed without a byte arriving.
    fn recv_byte_with_deadline(&mut self) -> io::Result<u8>;

    /// Arm the shared receive deadline `timeout_ms` milliseconds from now.
    /// Subsequent calls to `recv_byte_with_deadline` are bounded by it until
    /// the next call to `start_timer`.
    fn start_timer(&mut self, timeout_ms: u32);

    /// Block the calling thread for `ms` milliseconds. Used for the fixed
    /// settling pauses in the connect retry loop and the deflate-start
    /// sequence.
    fn delay_ms(&mut self, ms: u32);

    /// Pulse reset/strap lines to land the target in ROM download mode.
    fn enter_bootloader(&mut self) -> io::Result<()>;

    /// Release the target so it boots normally.
    fn reset_target(&mut self) -> io::Result<()>;

    /// Best-effort diagnostic sink; implementations may no-op this.
    fn debug_print(&mut self, text: &str);
}
