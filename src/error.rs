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

//! The crate's error taxonomy.
//!
//! Every failure a `Session` can report is one of the variants below; there
//! is no second, looser error type hiding behind an `anyhow`-style box.

/// The sub-kind carried by a device-reported failure, decoded from the
/// `error_code` byte of a response's status tail. Byte values follow the
/// original firmware's error constants (`0x06` is `DeflateError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeviceErrorCode {
    #[error("invalid CRC in message")]
    InvalidCrc,
    #[error("invalid command")]
    InvalidCommand,
    #[error("command failed")]
    CommandFailed,
    #[error("flash write error")]
    FlashWriteErr,
    #[error("flash read error")]
    FlashReadErr,
    #[error("read length error")]
    ReadLengthErr,
    #[error("deflate error")]
    DeflateError,
    #[error("unknown device error code 0x{0:02X}")]
    Unknown(u8),
}

impl From<u8> for DeviceErrorCode {
    fn from(value: u8) -> Self {
        use DeviceErrorCode::*;
        match value {
            0x05 => InvalidCrc,
            0x06 => DeflateError,
            0x07 => InvalidCommand,
            0x08 => CommandFailed,
            0x09 => FlashWriteErr,
            0x0A => FlashReadErr,
            0x0B => ReadLengthErr,
            other => Unknown(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("timed out waiting for a response")]
    Timeout,

    #[error("device reported a failure: {0}")]
    InvalidResponse(DeviceErrorCode),

    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error(
        "image of {image_size} bytes at offset 0x{offset:X} exceeds detected flash size 0x{flash_size:X}"
    )]
    ImageSize {
        offset: u32,
        image_size: u32,
        flash_size: u32,
    },

    #[error("unsupported chip: {0}")]
    UnsupportedChip(String),

    #[error("operation is not supported on this chip")]
    UnsupportedFunc,

    #[error("MD5 mismatch after flashing: expected {expected}, device reported {actual}")]
    InvalidMD5 { expected: String, actual: String },

    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Distinguishes timeouts from other failures without a distinct `Result`
/// variant per call site, mirroring the original source's treatment of
/// `ESP_LOADER_ERROR_TIMEOUT` as an ordinary, inspectable error value.
pub trait ErrorExt {
    fn is_timeout(&self) -> bool;
}

impl ErrorExt for Error {
    fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Io(err) => err.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

impl<T> ErrorExt for Result<T> {
    fn is_timeout(&self) -> bool {
        self.as_ref().err().map_or(false, Error::is_timeout)
    }
}
