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

//! Outbound command bodies. Each variant's tail is declared with `binrw`
//! since, unlike a response, an outbound command's layout is static per
//! variant — the only conditional field is `FlashBegin`/`FlashDeflBegin`'s
//! trailing `encrypted` word, present on every target but the ESP8266.

use binrw::binrw;

#[derive(Debug, Clone)]
#[binrw]
#[brw(import(accepts_encryption: bool), little)]
pub enum Command {
    FlashBegin {
        erase_size: u32,
        block_count: u32,
        block_size: u32,
        offset: u32,
        #[br(if(accepts_encryption, 0))]
        #[bw(args_raw = accepts_encryption, write_with = |data: &u32, writer, opts, accepts_encryption| {
            if accepts_encryption {
                data.write_options(writer, opts, ())?;
            }
            Ok(())
        })]
        encrypted: u32,
    },
    FlashData {
        data_size: u32,
        #[brw(pad_after = 8)]
        sequence_num: u32,
    },
    FlashEnd {
        stay_in_loader: u32,
    },
    MemBegin {
        total_size: u32,
        block_count: u32,
        block_size: u32,
        offset: u32,
    },
    MemEnd {
        stay_in_loader: u32,
        entry_point: u32,
    },
    MemData {
        data_size: u32,
        #[brw(pad_after = 8)]
        sequence_num: u32,
    },
    #[brw(magic = b"\x07\x07\x12 UUUUUUUUUUUUUUUUUUUUUUUUUUUUUUUU")]
    Sync,
    ReadReg {
        address: u32,
    },
    WriteReg {
        address: u32,
        value: u32,
        mask: u32,
        delay_us: u32,
    },
    SpiSetParams {
        id: u32,
        total_size: u32,
        block_size: u32,
        sector_size: u32,
        page_size: u32,
        status_mask: u32,
    },
    SpiAttach {
        configuration: u32,
        zero: u32,
    },
    FlashDeflBegin {
        uncompressed_size: u32,
        block_count: u32,
        block_size: u32,
        offset: u32,
        #[br(if(accepts_encryption, 0))]
        #[bw(args_raw = accepts_encryption, write_with = |data: &u32, writer, opts, accepts_encryption| {
            if accepts_encryption {
                data.write_options(writer, opts, ())?;
            }
            Ok(())
        })]
        encrypted: u32,
    },
    FlashDeflData {
        data_size: u32,
        #[brw(pad_after = 8)]
        sequence_num: u32,
    },
    FlashDeflEnd {
        stay_in_loader: u32,
    },
    SpiFlashMD5 {
        address: u32,
        #[brw(pad_after = 8)]
        size: u32,
    },
    ChangeBaudRate {
        new_baud: u32,
        old_baud: u32,
    },
}

impl Command {
    /// The wire opcode byte for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::FlashBegin { .. } => 0x02,
            Command::FlashData { .. } => 0x03,
            Command::FlashEnd { .. } => 0x04,
            Command::MemBegin { .. } => 0x05,
            Command::MemEnd { .. } => 0x06,
            Command::MemData { .. } => 0x07,
            Command::Sync => 0x08,
            Command::ReadReg { .. } => 0x09,
            Command::WriteReg { .. } => 0x0A,
            Command::SpiSetParams { .. } => 0x0B,
            Command::SpiAttach { .. } => 0x0D,
            Command::FlashDeflBegin { .. } => 0x10,
            Command::FlashDeflData { .. } => 0x11,
            Command::FlashDeflEnd { .. } => 0x12,
            Command::SpiFlashMD5 { .. } => 0x13,
            Command::ChangeBaudRate { .. } => 0x15,
        }
    }

    /// A short name for event traces.
    pub fn name(&self) -> &'static str {
        Command::name_from_code(self.code())
    }

    /// Look up a command's name from its opcode alone, for traces of
    /// responses and timeouts where only the byte is on hand.
    pub fn name_from_code(code: u8) -> &'static str {
        match code {
            0x02 => "FLASH_BEGIN",
            0x03 => "FLASH_DATA",
            0x04 => "FLASH_END",
            0x05 => "MEM_BEGIN",
            0x06 => "MEM_END",
            0x07 => "MEM_DATA",
            0x08 => "SYNC",
            0x09 => "READ_REG",
            0x0A => "WRITE_REG",
            0x0B => "SPI_SET_PARAMS",
            0x0D => "SPI_ATTACH",
            0x10 => "FLASH_DEFL_BEGIN",
            0x11 => "FLASH_DEFL_DATA",
            0x12 => "FLASH_DEFL_END",
            0x13 => "SPI_FLASH_MD5",
            0x15 => "CHANGE_BAUDRATE",
            _ => "UNKNOWN",
        }
    }
}
