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

//! The chip identity register and the per-target quirks that follow from it.

use std::fmt;

/// MMIO address of the chip identity register, read once per `connect()`.
pub(crate) const CHIP_MAGIC_REG: u32 = 0x4000_1000;

/// The SPI flash controller register addresses a target exposes. `mosi_dlen`
/// and `miso_dlen` are `0` on targets (ESP8266) that instead pack the
/// transfer lengths into bit fields of `USR1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiRegisters {
    pub cmd: u32,
    pub usr: u32,
    pub usr1: u32,
    pub usr2: u32,
    pub w0: u32,
    pub mosi_dlen: u32,
    pub miso_dlen: u32,
}

impl SpiRegisters {
    /// The address of the `index`-th 32-bit data word register, `W0..W15`.
    pub fn w(&self, index: usize) -> u32 {
        assert!(index < 16, "SPI data registers are W0 through W15");
        self.w0 + (index as u32) * 4
    }
}

/// The chip families this crate drives, identified from `CHIP_MAGIC_REG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Esp8266,
    Esp32,
    Esp32S2,
    Esp32S3,
    Esp32C3,
}

impl Target {
    /// Map a chip identity register value to a target, or `None` if it
    /// doesn't match any recognized magic.
    pub fn try_from_magic(magic: u32) -> Option<Self> {
        match magic {
            0xFFF0_C101 => Some(Target::Esp8266),
            0x00F0_1D83 => Some(Target::Esp32),
            0x0000_07c6 => Some(Target::Esp32S2),
            0x6921_506F | 0x1B31_506F => Some(Target::Esp32C3),
            0x0000_0009 => Some(Target::Esp32S3),
            _ => None,
        }
    }

    /// The SPI flash controller registers for this target.
    pub fn spi_registers(self) -> SpiRegisters {
        match self {
            Target::Esp8266 => SpiRegisters {
                cmd: 0x6000_0200,
                usr: 0x6000_0220,
                usr1: 0x6000_0224,
                usr2: 0x6000_0228,
                w0: 0x6000_0240,
                mosi_dlen: 0,
                miso_dlen: 0,
            },
            Target::Esp32 => SpiRegisters {
                cmd: 0x3FF4_2000,
                usr: 0x3FF4_2080,
                usr1: 0x3FF4_2084,
                usr2: 0x3FF4_2088,
                w0: 0x3FF4_2098,
                mosi_dlen: 0x3FF4_2090,
                miso_dlen: 0x3FF4_2094,
            },
            Target::Esp32S2 => SpiRegisters {
                cmd: 0x3F40_2000,
                usr: 0x3F40_2080,
                usr1: 0x3F40_2084,
                usr2: 0x3F40_2088,
                w0: 0x3F40_2098,
                mosi_dlen: 0x3F40_2090,
                miso_dlen: 0x3F40_2094,
            },
            Target::Esp32S3 => SpiRegisters {
                cmd: 0x6000_2000,
                usr: 0x6000_2180,
                usr1: 0x6000_2184,
                usr2: 0x6000_2188,
                w0: 0x6000_2098,
                mosi_dlen: 0x6000_2190,
                miso_dlen: 0x6000_2194,
            },
            Target::Esp32C3 => SpiRegisters {
                cmd: 0x6000_2000,
                usr: 0x6000_2180,
                usr1: 0x6000_2184,
                usr2: 0x6000_2188,
                w0: 0x6000_2098,
                mosi_dlen: 0x6000_2190,
                miso_dlen: 0x6000_2194,
            },
        }
    }

    /// Whether `FLASH_BEGIN`/`FLASH_DEFL_BEGIN` carry a trailing `encrypted`
    /// word. The ESP8266 ROM predates the flash-encryption feature and
    /// doesn't accept one.
    pub fn accepts_encryption_flag(self) -> bool {
        !matches!(self, Target::Esp8266)
    }

    /// Whether this target's response status tail is 4 bytes
    /// (`failed, error` plus two reserved bytes) rather than 2.
    pub fn long_status_tail(self) -> bool {
        matches!(self, Target::Esp32S2 | Target::Esp32S3 | Target::Esp32C3)
    }

    /// The ESP8266 has no `SPI_ATTACH` command; its ROM bootloader is
    /// attached to flash implicitly by a zero-length `FLASH_BEGIN`.
    pub fn supports_spi_attach(self) -> bool {
        !matches!(self, Target::Esp8266)
    }

    /// The ESP8266 ROM bootloader has no `CHANGE_BAUDRATE` command.
    pub fn supports_change_baud_rate(self) -> bool {
        !matches!(self, Target::Esp8266)
    }

    /// The ESP8266 ROM bootloader has no `SPI_FLASH_MD5` command.
    pub fn supports_verify(self) -> bool {
        !matches!(self, Target::Esp8266)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Esp8266 => "ESP8266",
            Target::Esp32 => "ESP32",
            Target::Esp32S2 => "ESP32-S2",
            Target::Esp32S3 => "ESP32-S3",
            Target::Esp32C3 => "ESP32-C3",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_round_trip() {
        assert_eq!(Target::try_from_magic(0xFFF0_C101), Some(Target::Esp8266));
        assert_eq!(Target::try_from_magic(0x00F0_1D83), Some(Target::Esp32));
        assert_eq!(Target::try_from_magic(0x0000_07c6), Some(Target::Esp32S2));
        assert_eq!(Target::try_from_magic(0x6921_506F), Some(Target::Esp32C3));
        assert_eq!(Target::try_from_magic(0x1B31_506F), Some(Target::Esp32C3));
        assert_eq!(Target::try_from_magic(0x0000_0009), Some(Target::Esp32S3));
        assert_eq!(Target::try_from_magic(0xDEAD_BEEF), None);
    }

    #[test]
    fn esp8266_is_the_only_outlier() {
        assert!(!Target::Esp8266.accepts_encryption_flag());
        assert!(!Target::Esp8266.supports_spi_attach());
        assert!(!Target::Esp8266.supports_change_baud_rate());
        assert!(!Target::Esp8266.supports_verify());
        assert!(!Target::Esp8266.long_status_tail());

        for target in [Target::Esp32, Target::Esp32S2, Target::Esp32S3, Target::Esp32C3] {
            assert!(target.accepts_encryption_flag());
            assert!(target.supports_spi_attach());
            assert!(target.supports_change_baud_rate());
            assert!(target.supports_verify());
        }
    }

    #[test]
    fn long_status_tail_only_on_s2_and_later() {
        assert!(Target::Esp32S2.long_status_tail());
        assert!(Target::Esp32S3.long_status_tail());
        assert!(Target::Esp32C3.long_status_tail());
        assert!(!Target::Esp32.long_status_tail());
    }
}
