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

//! Per-command XOR checksum and the rolling MD5 used to verify a flash.

/// `compute_checksum` from `protocol.c`: fold every payload byte into an
/// accumulator seeded at `0xEF`. An empty payload yields `0xEF`, which is
/// the value placed in the checksum field of commands that carry no data
/// body (the field is nominally unused there).
pub(crate) fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0xEFu8, |acc, &b| acc ^ b)
}

/// A rolling MD5 accumulated across an entire flash write, matching
/// `s_md5_context` in `esp_loader.c`.
pub(crate) struct RollingMd5 {
    context: md5::Context,
}

impl RollingMd5 {
    pub(crate) fn new() -> Self {
        RollingMd5 {
            context: md5::Context::new(),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    pub(crate) fn finish(self) -> [u8; 16] {
        self.context.compute().0
    }
}

/// Lower-case ASCII hex encoding, matching the 32-byte hex digest the ROM
/// bootloader returns from `SPI_FLASH_MD5`.
pub(crate) fn hex_lower(digest: &[u8; 16]) -> [u8; 32] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = [0u8; 32];
    for (i, &b) in digest.iter().enumerate() {
        out[2 * i] = HEX[(b >> 4) as usize];
        out[2 * i + 1] = HEX[(b & 0xF) as usize];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_checksum_is_seed() {
        assert_eq!(xor_checksum(&[]), 0xEF);
    }

    #[test]
    fn checksum_folds_every_byte() {
        assert_eq!(xor_checksum(&[0x00]), 0xEF);
        assert_eq!(xor_checksum(&[0xEF]), 0x00);
        assert_eq!(xor_checksum(&[0x01, 0x02, 0x03]), 0xEF ^ 0x01 ^ 0x02 ^ 0x03);
    }

    #[test]
    fn md5_of_empty_input() {
        let md5 = RollingMd5::new();
        let digest = md5.finish();
        assert_eq!(
            hex_lower(&digest),
            *b"d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn md5_rolling_update_matches_single_shot() {
        let mut rolling = RollingMd5::new();
        rolling.update(b"hello, ");
        rolling.update(b"world");
        let digest = rolling.finish();

        let mut single = RollingMd5::new();
        single.update(b"hello, world");
        let expected = single.finish();

        assert_eq!(digest, expected);
    }
}
