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

//! The flashing/memory session state machine: `connect` → `*_begin` →
//! `*_write`× → `*_finish` → optional `verify`, driven over a generic
//! [`Port`].

use std::borrow::Cow;
use std::io::Cursor;
use std::rc::Rc;

use binrw::BinWrite;

use crate::checksum::{hex_lower, xor_checksum, RollingMd5};
use crate::codec;
use crate::command::Command;
use crate::error::{DeviceErrorCode, Error, Result};
use crate::event::{Event, EventObserver, EventProvider};
use crate::port::Port;
use crate::response::ResponsePacket;
use crate::target::{Target, CHIP_MAGIC_REG};
use crate::{ceil_div, round_up4, timeout_per_mb};

/// Per-command timeout (`DEFAULT_TIMEOUT` in `esp_loader.c`). The per-MiB
/// operations below use `timeout_per_mb`, which floors at the separate,
/// longer `DEFAULT_FLASH_TIMEOUT_MS` instead.
const DEFAULT_TIMEOUT_MS: u32 = 1000;
const ERASE_REGION_TIMEOUT_PER_MB_MS: u32 = 10_000;
const MD5_TIMEOUT_PER_MB_MS: u32 = 8_000;
const LOAD_RAM_TIMEOUT_PER_MB_MS: u32 = 2_000_000;

const MAX_FRAME_LEN: usize = 64 * 1024 + 64;

const SPI_CMD_USR: u32 = 1 << 18;
const SPI_USR_CMD: u32 = 1 << 31;
const SPI_USR_MISO: u32 = 1 << 28;
const SPI_USR_MOSI: u32 = 1 << 27;
const SPI_POLL_TRIALS: u32 = 10;

/// A bootloader protocol session bound to one `Port`.
///
/// Holds all state the original C implementation kept in file-scope
/// globals (`s_target`, `s_reg`, `s_sequence_number`, `s_md5_context`, ...)
/// as ordinary owned fields, so a `Session` is exclusively responsible for
/// one target's flashing lifecycle for as long as it exists.
pub struct Session<P: Port> {
    port: P,
    target: Option<Target>,
    attached: bool,
    flash_block_size: u32,
    sequence_number: u32,
    md5: Option<RollingMd5>,
    md5_start_address: u32,
    md5_image_size: u32,
    event_provider: EventProvider,
}

impl<P: Port> Session<P> {
    pub fn new(port: P) -> Self {
        Session {
            port,
            target: None,
            attached: false,
            flash_block_size: 0,
            sequence_number: 0,
            md5: None,
            md5_start_address: 0,
            md5_image_size: 0,
            event_provider: EventProvider::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Rc<dyn EventObserver>) {
        self.event_provider.add_observer(observer);
    }

    pub fn remove_observer(&mut self, observer: &Rc<dyn EventObserver>) {
        self.event_provider.remove_observer(observer);
    }

    /// The detected target, if `connect()` has succeeded.
    pub fn target(&self) -> Option<Target> {
        self.target
    }

    /// Whether this session treats the connected device as a ROM bootloader
    /// (`SPI_FLASH_MD5` returns 32 ASCII hex bytes, not a raw 16-byte
    /// digest). Always `true`: stub-loader upload is out of scope for this
    /// crate, so there is no public setter, only this documented hook for a
    /// future reimplementation that adds one.
    pub fn rom_loader(&self) -> bool {
        true
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    // -- Transport --------------------------------------------------------

    fn long_status_tail(&self) -> bool {
        self.target.map(Target::long_status_tail).unwrap_or(false)
    }

    fn build_packet(&self, cmd: &Command, data: &[u8]) -> Result<Vec<u8>> {
        let mut packet = Vec::with_capacity(16 + data.len());
        let checksum = xor_checksum(data);
        packet.extend_from_slice(&[0x00, cmd.code(), 0, 0, checksum, 0, 0, 0]);

        let accepts_encryption = self.target.map(Target::accepts_encryption_flag).unwrap_or(false);
        {
            let mut cursor = Cursor::new(&mut packet);
            cursor.set_position(8);
            cmd.write_le_args(&mut cursor, (accepts_encryption,))
                .map_err(|_| Error::InvalidParam("failed to serialize command body"))?;
        }
        packet.extend_from_slice(data);

        let size: u16 = (packet.len() - 8)
            .try_into()
            .map_err(|_| Error::InvalidParam("command body is too large to frame"))?;
        packet[2] = size as u8;
        packet[3] = (size >> 8) as u8;
        Ok(packet)
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        let mut framed = Vec::new();
        codec::encode(packet, &mut framed);
        self.event_provider
            .send_event(Event::SlipWrite(Cow::Borrowed(packet)));
        self.port.send_bytes(&framed)?;
        self.event_provider
            .send_event(Event::SerialWrite(Cow::Borrowed(&framed)));
        Ok(())
    }

    /// Read frames until `responses_needed` have matched `cmd_code`,
    /// returning the last one's `(value, data)`. Frames for a different
    /// command, or that fail to parse, are discarded without counting
    /// against `responses_needed`. The first failure response short-circuits
    /// immediately, per `check_response` in the original transport.
    fn await_response(&mut self, cmd_code: u8, responses_needed: u8) -> Result<(u32, Vec<u8>)> {
        let mut raw = Vec::new();
        let mut last = None;
        let mut remaining = responses_needed;
        let long_status_tail = self.long_status_tail();

        while remaining > 0 {
            if let Err(err) = codec::decode(&mut self.port, &mut raw, MAX_FRAME_LEN) {
                return Err(err);
            }
            self.event_provider
                .send_event(Event::SlipRead(Cow::Borrowed(&raw)));

            let packet = match ResponsePacket::parse(&raw, long_status_tail) {
                Ok(packet) => packet,
                Err(_) => {
                    self.event_provider
                        .send_event(Event::InvalidResponse(Cow::Borrowed(&raw)));
                    continue;
                }
            };

            self.event_provider.send_event(Event::Response(
                packet.cmd_code,
                packet.status,
                packet.error,
                packet.value,
                Cow::Borrowed(&packet.data),
            ));

            if packet.cmd_code != cmd_code {
                continue;
            }

            if packet.status != 0 {
                return Err(Error::InvalidResponse(DeviceErrorCode::from(packet.error)));
            }

            last = Some((packet.value, packet.data));
            remaining -= 1;
        }

        Ok(last.expect("responses_needed > 0 guarantees at least one matched frame"))
    }

    fn send_command(&mut self, cmd: &Command) -> Result<(u32, Vec<u8>)> {
        self.send_command_with_data(cmd, &[])
    }

    fn send_command_with_data(&mut self, cmd: &Command, data: &[u8]) -> Result<(u32, Vec<u8>)> {
        let packet = self.build_packet(cmd, data)?;
        self.event_provider
            .send_event(Event::Command(cmd.clone(), Cow::Borrowed(data)));
        self.send_packet(&packet)?;
        match self.await_response(cmd.code(), 1) {
            Err(err) if err.is_timeout() => {
                self.event_provider.send_event(Event::CommandTimeout(cmd.code()));
                Err(err)
            }
            other => other,
        }
    }

    /// Send a `*_DATA`-family command whose sequence number advances only
    /// on success, so a failed block does not skip a sequence number.
    fn send_data_command(
        &mut self,
        make_cmd: impl FnOnce(u32, u32) -> Command,
        data: &[u8],
    ) -> Result<()> {
        let cmd = make_cmd(data.len() as u32, self.sequence_number);
        self.send_command_with_data(&cmd, data)?;
        self.sequence_number += 1;
        Ok(())
    }

    // -- Sync & connect -----------------------------------------------------

    /// Send `SYNC` and drain exactly eight matching frames, the special
    /// case `send_cmd` gives this one command in the original transport.
    pub fn sync(&mut self) -> Result<()> {
        let packet = self.build_packet(&Command::Sync, &[])?;
        self.event_provider
            .send_event(Event::Command(Command::Sync, Cow::Borrowed(&[])));
        self.send_packet(&packet)?;
        self.await_response(Command::Sync.code(), 8)?;
        Ok(())
    }

    /// Enter the bootloader, sync up to `trials` times (spaced `100ms`
    /// apart on timeout), detect the target, and attach to its SPI flash.
    pub fn connect(&mut self, sync_timeout_ms: u32, trials: u32) -> Result<()> {
        self.port.enter_bootloader()?;

        let mut trials_left = trials;
        loop {
            self.port.start_timer(sync_timeout_ms);
            match self.sync() {
                Ok(()) => break,
                Err(err) if err.is_timeout() => {
                    trials_left -= 1;
                    if trials_left == 0 {
                        return Err(Error::Timeout);
                    }
                    self.port.delay_ms(100);
                }
                Err(err) => return Err(err),
            }
        }

        let target = self.detect_target()?;
        if target == Target::Esp8266 {
            self.flash_begin_raw(0, 0, 0, 0, false)?;
        } else {
            self.spi_attach()?;
        }
        self.attached = true;

        Ok(())
    }

    fn detect_target(&mut self) -> Result<Target> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        let magic = self.read_register(CHIP_MAGIC_REG)?;
        let target = Target::try_from_magic(magic)
            .ok_or_else(|| Error::UnsupportedChip(format!("unrecognized chip magic 0x{magic:08X}")))?;
        self.target = Some(target);
        Ok(target)
    }

    fn require_target(&self) -> Result<Target> {
        self.target
            .ok_or(Error::InvalidParam("no target detected; call connect() first"))
    }

    pub fn reset_target(&mut self) -> Result<()> {
        self.port.reset_target()?;
        self.target = None;
        self.attached = false;
        self.event_provider.send_event(Event::Reset);
        Ok(())
    }

    // -- Registers & SPI attach ----------------------------------------------

    pub fn read_register(&mut self, address: u32) -> Result<u32> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        let (value, _) = self.send_command(&Command::ReadReg { address })?;
        Ok(value)
    }

    pub fn write_register(&mut self, address: u32, value: u32) -> Result<()> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_command(&Command::WriteReg {
            address,
            value,
            mask: 0xFFFF_FFFF,
            delay_us: 0,
        })?;
        Ok(())
    }

    fn spi_attach(&mut self) -> Result<()> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_command(&Command::SpiAttach {
            configuration: 0,
            zero: 0,
        })?;
        Ok(())
    }

    fn spi_set_params(&mut self, flash_size: u32) -> Result<()> {
        self.send_command(&Command::SpiSetParams {
            id: 0,
            total_size: flash_size,
            block_size: 64 * 1024,
            sector_size: 4 * 1024,
            page_size: 256,
            status_mask: 0xFFFF,
        })?;
        Ok(())
    }

    pub fn change_transmission_rate(&mut self, new_baud: u32) -> Result<()> {
        let target = self.require_target()?;
        if !target.supports_change_baud_rate() {
            return Err(Error::UnsupportedFunc);
        }
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_command(&Command::ChangeBaudRate { new_baud, old_baud: 0 })?;
        Ok(())
    }

    // -- SPI-flash probing ----------------------------------------------------

    /// Issue a raw SPI flash vendor command via `WRITE_REG`/`READ_REG`
    /// bit-banging of the SPI controller, as in `spi_flash_command` of the
    /// original source. `mosi_words` is written starting at `W0`;
    /// `miso_bits` selects how many bits of `W0` are read back afterward
    /// (the controller is limited to a single 32-bit capture per command).
    fn spi_command(&mut self, opcode: u8, mosi_words: &[u32], mosi_bits: u32, miso_bits: u32) -> Result<u32> {
        if !self.attached {
            return Err(Error::InvalidParam("SPI commands require connect() to attach first"));
        }
        let target = self.require_target()?;
        let regs = target.spi_registers();

        let old_usr = self.read_register(regs.usr)?;
        let old_usr2 = self.read_register(regs.usr2)?;

        if target == Target::Esp8266 {
            let miso_field = miso_bits.saturating_sub(1);
            let mosi_field = mosi_bits.saturating_sub(1);
            self.write_register(regs.usr1, (miso_field << 8) | (mosi_field << 17))?;
        } else {
            if mosi_bits > 0 {
                self.write_register(regs.mosi_dlen, mosi_bits - 1)?;
            }
            if miso_bits > 0 {
                self.write_register(regs.miso_dlen, miso_bits - 1)?;
            }
        }

        let mut usr = SPI_USR_CMD;
        if miso_bits > 0 {
            usr |= SPI_USR_MISO;
        }
        if mosi_bits > 0 {
            usr |= SPI_USR_MOSI;
        }
        self.write_register(regs.usr, usr)?;
        self.write_register(regs.usr2, (7u32 << 28) | opcode as u32)?;

        if mosi_words.is_empty() {
            self.write_register(regs.w0, 0)?;
        } else {
            for (i, word) in mosi_words.iter().enumerate() {
                self.write_register(regs.w(i), *word)?;
            }
        }

        self.write_register(regs.cmd, SPI_CMD_USR)?;

        let mut settled = false;
        for _ in 0..SPI_POLL_TRIALS {
            if self.read_register(regs.cmd)? & SPI_CMD_USR == 0 {
                settled = true;
                break;
            }
        }
        if !settled {
            return Err(Error::Timeout);
        }

        let result = if miso_bits > 0 { self.read_register(regs.w0)? } else { 0 };

        self.write_register(regs.usr, old_usr)?;
        self.write_register(regs.usr2, old_usr2)?;

        Ok(result)
    }

    /// `SPI_FLASH_READ_ID` (`0x9F`): read a 24-bit JEDEC-style ID and decode
    /// its top byte as a flash-size id (`0x12..=0x18`).
    fn detect_flash_size(&mut self) -> Result<u32> {
        let raw = self.spi_command(0x9F, &[], 0, 24)?;
        let size_id = (raw >> 16) & 0xFF;
        if !(0x12..=0x18).contains(&size_id) {
            return Err(Error::UnsupportedChip(format!(
                "unsupported SPI flash size id 0x{size_id:02X}"
            )));
        }
        Ok(1u32 << size_id)
    }

    // -- Flashing ---------------------------------------------------------

    fn flash_begin_raw(
        &mut self,
        offset: u32,
        erase_size: u32,
        block_size: u32,
        block_count: u32,
        encrypted: bool,
    ) -> Result<()> {
        self.sequence_number = 0;
        self.send_command(&Command::FlashBegin {
            erase_size,
            block_count,
            block_size,
            offset,
            encrypted: encrypted as u32,
        })?;
        Ok(())
    }

    fn flash_defl_begin_raw(
        &mut self,
        offset: u32,
        erase_size: u32,
        block_size: u32,
        block_count: u32,
        encrypted: bool,
    ) -> Result<()> {
        self.sequence_number = 0;
        self.send_command(&Command::FlashDeflBegin {
            uncompressed_size: erase_size,
            block_count,
            block_size,
            offset,
            encrypted: encrypted as u32,
        })?;
        Ok(())
    }

    /// Begin a raw (uncompressed) flash write of `image_size` bytes at
    /// `offset`, streamed in blocks of at most `block_size` bytes.
    pub fn flash_start(&mut self, offset: u32, image_size: u32, block_size: u32) -> Result<()> {
        let target = self.require_target()?;
        let blocks_to_write = ceil_div(image_size, block_size);
        let erase_size = block_size * blocks_to_write;
        self.flash_block_size = block_size;

        match self.detect_flash_size() {
            Ok(flash_size) => {
                if (offset as u64) + (image_size as u64) > flash_size as u64 {
                    return Err(Error::ImageSize {
                        offset,
                        image_size,
                        flash_size,
                    });
                }
                self.port.start_timer(DEFAULT_TIMEOUT_MS);
                self.spi_set_params(flash_size)?;
            }
            Err(_) => self
                .port
                .debug_print("flash size detection failed, using default flash parameters"),
        }

        self.md5 = Some(RollingMd5::new());
        self.md5_start_address = offset;
        self.md5_image_size = image_size;

        let accepts_encryption = target.accepts_encryption_flag();
        self.port
            .start_timer(timeout_per_mb(erase_size, ERASE_REGION_TIMEOUT_PER_MB_MS));
        self.flash_begin_raw(offset, erase_size, block_size, blocks_to_write, accepts_encryption)
    }

    /// Begin a DEFLATE-compressed flash write. `compressed_size` bounds the
    /// compressed stream that will be handed to `flash_defl_write`;
    /// `image_size` is the uncompressed image size used for erase sizing
    /// and the flash-size bounds check.
    pub fn flash_defl_start(
        &mut self,
        offset: u32,
        image_size: u32,
        compressed_size: u32,
        block_size: u32,
    ) -> Result<()> {
        let target = self.require_target()?;
        let blocks_to_write = ceil_div(compressed_size, block_size);
        let blocks_to_erase = ceil_div(image_size, block_size);
        let erase_size = block_size * blocks_to_erase;
        self.flash_block_size = block_size;

        self.port.delay_ms(20);
        match self.detect_flash_size() {
            Ok(flash_size) => {
                self.port.delay_ms(20);
                if (offset as u64) + (image_size as u64) > flash_size as u64 {
                    return Err(Error::ImageSize {
                        offset,
                        image_size,
                        flash_size,
                    });
                }
                self.port.start_timer(DEFAULT_TIMEOUT_MS);
                self.spi_set_params(flash_size)?;
                self.port.delay_ms(20);
            }
            Err(_) => self
                .port
                .debug_print("flash size detection failed, using default flash parameters"),
        }

        self.port.delay_ms(10);
        self.md5 = Some(RollingMd5::new());
        self.md5_start_address = offset;
        self.md5_image_size = image_size;

        self.port.delay_ms(10);
        let accepts_encryption = target.accepts_encryption_flag();

        self.port.delay_ms(10);
        self.port
            .start_timer(timeout_per_mb(erase_size, ERASE_REGION_TIMEOUT_PER_MB_MS));
        self.flash_defl_begin_raw(offset, erase_size, block_size, blocks_to_write, accepts_encryption)
    }

    /// Write one raw block, padded with `0xFF` up to the block size set by
    /// `flash_start`. The rolling MD5 only advances by the rounded-up
    /// original length, so at most three padding bytes are ever hashed.
    pub fn flash_write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u32 > self.flash_block_size {
            return Err(Error::InvalidParam("block exceeds the flash block size set by flash_start"));
        }

        let mut padded = data.to_vec();
        padded.resize(self.flash_block_size as usize, 0xFF);

        let hashed_len = round_up4(data.len());
        if let Some(md5) = self.md5.as_mut() {
            md5.update(&padded[..hashed_len]);
        }

        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_data_command(
            |data_size, sequence_num| Command::FlashData {
                data_size,
                sequence_num,
            },
            &padded,
        )
    }

    /// Write one compressed block as given, unpadded. Like
    /// `esp_loader_flash_defl_write`, the rolling MD5 advances over these
    /// compressed bytes (rounded up to 4) rather than the image's
    /// uncompressed bytes, since an individual compressed block's
    /// uncompressed length isn't known to this layer.
    pub fn flash_defl_write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u32 > self.flash_block_size {
            return Err(Error::InvalidParam(
                "compressed block exceeds the flash block size set by flash_defl_start",
            ));
        }

        let hashed_len = round_up4(data.len());
        if let Some(md5) = self.md5.as_mut() {
            let mut hashed = data.to_vec();
            hashed.resize(hashed_len, 0);
            md5.update(&hashed);
        }

        // `esp_loader.c`'s deflate-data timeout is `DEFAULT_TIMEOUT * 50`.
        self.port.start_timer(DEFAULT_TIMEOUT_MS * 50);
        self.send_data_command(
            |data_size, sequence_num| Command::FlashDeflData {
                data_size,
                sequence_num,
            },
            data,
        )
    }

    pub fn flash_finish(&mut self, reboot: bool) -> Result<()> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_command(&Command::FlashEnd {
            stay_in_loader: (!reboot) as u32,
        })?;
        Ok(())
    }

    pub fn flash_defl_finish(&mut self, reboot: bool) -> Result<()> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_command(&Command::FlashDeflEnd {
            stay_in_loader: (!reboot) as u32,
        })?;
        Ok(())
    }

    // -- RAM loading --------------------------------------------------------

    pub fn mem_start(&mut self, offset: u32, size: u32, block_size: u32) -> Result<()> {
        let blocks_to_write = ceil_div(size, block_size);
        self.flash_block_size = block_size;
        self.port
            .start_timer(timeout_per_mb(size, LOAD_RAM_TIMEOUT_PER_MB_MS));
        self.sequence_number = 0;
        self.send_command(&Command::MemBegin {
            total_size: size,
            block_count: blocks_to_write,
            block_size,
            offset,
        })?;
        Ok(())
    }

    pub fn mem_write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u32 > self.flash_block_size {
            return Err(Error::InvalidParam("block exceeds the block size set by mem_start"));
        }
        self.port
            .start_timer(timeout_per_mb(data.len() as u32, LOAD_RAM_TIMEOUT_PER_MB_MS));
        self.send_data_command(
            |data_size, sequence_num| Command::MemData {
                data_size,
                sequence_num,
            },
            data,
        )
    }

    pub fn mem_finish(&mut self, entry_point: u32) -> Result<()> {
        self.port.start_timer(DEFAULT_TIMEOUT_MS);
        self.send_command(&Command::MemEnd {
            stay_in_loader: (entry_point == 0) as u32,
            entry_point,
        })?;
        Ok(())
    }

    // -- Verification ---------------------------------------------------------

    fn md5_cmd(&mut self, address: u32, size: u32) -> Result<[u8; 32]> {
        let (_, data) = self.send_command(&Command::SpiFlashMD5 { address, size })?;
        if data.len() != 32 || !data.iter().all(u8::is_ascii_hexdigit) {
            return Err(Error::MalformedResponse(
                "SPI_FLASH_MD5 response was not 32 ASCII hex bytes",
            ));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&data);
        Ok(out)
    }

    /// Ask the device to compute the MD5 of `length` bytes of flash
    /// starting at `address`, returned as 32 lower-case ASCII hex bytes.
    pub fn get_md5_hex(&mut self, address: u32, length: u32) -> Result<[u8; 32]> {
        if let Ok(flash_size) = self.detect_flash_size() {
            self.port.start_timer(DEFAULT_TIMEOUT_MS);
            self.spi_set_params(flash_size)?;
        }
        self.port
            .start_timer(timeout_per_mb(length, MD5_TIMEOUT_PER_MB_MS));
        self.md5_cmd(address, length)
    }

    /// Compare the rolling MD5 accumulated since the last `flash_start`/
    /// `flash_defl_start` against the device's own hash of that region.
    /// Consumes the recorded hash state, so a second call without an
    /// intervening begin fails with `InvalidParam`.
    pub fn flash_verify(&mut self) -> Result<()> {
        let target = self.require_target()?;
        if !target.supports_verify() {
            return Err(Error::UnsupportedFunc);
        }

        let md5 = self
            .md5
            .take()
            .ok_or(Error::InvalidParam("verify called without a preceding flash_start"))?;
        let expected = hex_lower(&md5.finish());
        let expected_str = std::str::from_utf8(&expected).unwrap().to_owned();

        let start_address = self.md5_start_address;
        let image_size = self.md5_image_size;
        self.port
            .start_timer(timeout_per_mb(image_size, MD5_TIMEOUT_PER_MB_MS));
        // `esp_loader_flash_verify` issues only `loader_md5_cmd` here — no
        // flash re-probe, no re-sent `SPI_SET_PARAMS` — since `flash_start`
        // already attached and sized the flash for this session.
        let actual = self.md5_cmd(start_address, image_size)?;
        let actual_str = std::str::from_utf8(&actual).unwrap().to_owned();

        if expected != actual {
            self.port
                .debug_print(&format!("MD5 mismatch: expected {expected_str}, got {actual_str}"));
            return Err(Error::InvalidMD5 {
                expected: expected_str,
                actual: actual_str,
            });
        }
        Ok(())
    }
}
