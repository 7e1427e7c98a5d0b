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

//! SLIP framing. Stateless between frames: `encode` builds one frame at a
//! time into a caller-owned buffer, and `decode` reads one frame at a time
//! off a `Port`, blocking byte-by-byte under that port's armed deadline.

use crate::error::{Error, Result};
use crate::port::Port;

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Append the SLIP-framed encoding of `data` (leading and trailing `0xC0`,
/// `0xC0`/`0xDB` bytes escaped) to `out`.
pub(crate) fn encode(data: &[u8], out: &mut Vec<u8>) {
    out.reserve(data.len() + 2);
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

/// Read one SLIP frame from `port` into `buf`, which is cleared first.
/// Leading `0xC0` bytes are skipped as frame separators. A frame whose
/// decoded length would exceed `max_len` fails before the closing
/// delimiter is consumed.
pub(crate) fn decode<P: Port + ?Sized>(port: &mut P, buf: &mut Vec<u8>, max_len: usize) -> Result<()> {
    buf.clear();

    loop {
        if port.recv_byte_with_deadline()? == END {
            break;
        }
    }

    loop {
        match port.recv_byte_with_deadline()? {
            END => return Ok(()),
            ESC => match port.recv_byte_with_deadline()? {
                ESC_END => buf.push(END),
                ESC_ESC => buf.push(ESC),
                // Not a valid escape sequence; pass both bytes through
                // rather than silently dropping data.
                other => {
                    buf.push(ESC);
                    buf.push(other);
                }
            },
            other => buf.push(other),
        }
        if buf.len() > max_len {
            return Err(Error::MalformedResponse("SLIP frame exceeded maximum length"));
        }
    }
}
