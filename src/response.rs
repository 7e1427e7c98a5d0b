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

//! Hand-written response parsing.
//!
//! A response can't be overlaid with a single static `binrw` struct: the
//! length of its status tail depends on the target generation, which isn't
//! known yet during `SYNC`, and `SPI_FLASH_MD5`'s payload is 32 ASCII hex
//! bytes rather than the usual binary value. Both are resolved here as an
//! explicit little-endian reader instead.

use crate::error::{Error, Result};

/// One decoded response frame: `direction, command, size, value, data...`
/// per the wire schema, with `data`'s trailing status tail (`failed, error`,
/// plus reserved bytes on later targets) split out.
#[derive(Debug, Clone)]
pub(crate) struct ResponsePacket {
    pub(crate) cmd_code: u8,
    pub(crate) value: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) status: u8,
    pub(crate) error: u8,
}

const RESPONSE_DIRECTION: u8 = 0x01;
const HEADER_LEN: usize = 8;

impl ResponsePacket {
    /// Parse one SLIP-decoded frame. `long_status_tail` selects a 4-byte
    /// tail (ESP32-S2 and later) over the default 2-byte one.
    pub(crate) fn parse(frame: &[u8], long_status_tail: bool) -> Result<Self> {
        let tail_len = if long_status_tail { 4 } else { 2 };

        if frame.len() < HEADER_LEN {
            return Err(Error::MalformedResponse("response shorter than the 8-byte header"));
        }

        let direction = frame[0];
        if direction != RESPONSE_DIRECTION {
            return Err(Error::MalformedResponse("response direction byte is not 0x01"));
        }

        let cmd_code = frame[1];
        let size = u16::from_le_bytes([frame[2], frame[3]]) as usize;
        let value = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

        let payload = &frame[HEADER_LEN..];
        if payload.len() != size {
            return Err(Error::MalformedResponse(
                "declared payload size does not match the frame length",
            ));
        }
        if size < tail_len {
            return Err(Error::MalformedResponse("payload shorter than the status tail"));
        }

        let data_len = size - tail_len;
        let data = payload[..data_len].to_vec();
        let status = payload[data_len];
        let error = payload[data_len + 1];

        Ok(ResponsePacket {
            cmd_code,
            value,
            data,
            status,
            error,
        })
    }
}
