//! Raw and DEFLATE-compressed flash-write scenarios, plus the flash-size
//! bounds check that `SPI_FLASH_READ_ID` feeds.

mod common;

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use common::{FakePort, Reply};
use espflasher::{Error, Session};

const ESP32_MAGIC: u32 = 0x00F0_1D83;

fn connected_session() -> Session<FakePort> {
    let mut session = Session::new(FakePort::new(ESP32_MAGIC));
    session.connect(100, 3).unwrap();
    session
}

#[test]
fn minimal_raw_flash_write_round_trip() {
    let mut session = connected_session();
    session.flash_start(0, 8, 16).unwrap();
    session.flash_write(&[1, 2, 3, 4, 5]).unwrap();
    session.flash_finish(false).unwrap();

    let data_frames: Vec<_> = session
        .port()
        .sent
        .iter()
        .filter(|frame| frame.get(1) == Some(&0x03))
        .collect();
    assert_eq!(data_frames.len(), 1);
    // data_size field (command body bytes 8..12 of the full packet).
    let data_size = u32::from_le_bytes([data_frames[0][8], data_frames[0][9], data_frames[0][10], data_frames[0][11]]);
    assert_eq!(data_size, 16, "block should be padded up to the block size");
}

#[test]
fn sequence_number_advances_only_on_success() {
    let mut port = FakePort::new(ESP32_MAGIC);
    port.queue_reply(0x03, Reply::Fail { error: 0x09 });
    let mut session = Session::new(port);
    session.connect(100, 3).unwrap();
    session.flash_start(0, 8, 16).unwrap();

    let err = session.flash_write(&[1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));

    // The retry should reuse sequence number 0, not 1.
    session.flash_write(&[1, 2, 3, 4]).unwrap();
    let seq_of = |frame: &Vec<u8>| u32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]);
    let data_frames: Vec<_> = session
        .port()
        .sent
        .iter()
        .filter(|frame| frame.get(1) == Some(&0x03))
        .collect();
    assert_eq!(data_frames.len(), 2);
    assert_eq!(seq_of(data_frames[0]), 0);
    assert_eq!(seq_of(data_frames[1]), 0);
}

#[test]
fn flash_write_rejects_a_block_larger_than_flash_start_declared() {
    let mut session = connected_session();
    session.flash_start(0, 8, 4).unwrap();
    let err = session.flash_write(&[0u8; 5]).unwrap_err();
    assert!(matches!(err, Error::InvalidParam(_)));
}

#[test]
fn flash_start_rejects_an_image_past_the_detected_flash_size() {
    // size_id 0x12 decodes to 1 << 0x12 == 256 KiB of flash.
    let mut session = Session::new(FakePort::new(ESP32_MAGIC).with_flash_id(0x12_00_00));
    session.connect(100, 3).unwrap();

    let offset = 256 * 1024 - 4;
    let err = session.flash_start(offset, 16, 16).unwrap_err();
    assert!(matches!(err, Error::ImageSize { .. }));
}

/// A realistic deflate-write session: compress an image with `flate2` (the
/// way a caller above this crate would), split the compressed stream into
/// blocks, and stream it through `flash_defl_start`/`flash_defl_write`.
/// The core never calls `flate2` itself — only tests do, to build fixtures.
#[test]
fn deflate_write_streams_a_flate2_compressed_image_in_blocks() {
    let image: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&image).unwrap();
    let compressed = encoder.finish().unwrap();
    assert!(
        compressed.len() < image.len(),
        "fixture should actually compress for this test to be meaningful"
    );

    let block_size = 256u32;
    let mut session = connected_session();
    session
        .flash_defl_start(0x1000, image.len() as u32, compressed.len() as u32, block_size)
        .unwrap();

    let mut blocks_sent = 0;
    for chunk in compressed.chunks(block_size as usize) {
        session.flash_defl_write(chunk).unwrap();
        blocks_sent += 1;
    }
    session.flash_defl_finish(true).unwrap();

    let data_frames: Vec<_> = session
        .port()
        .sent
        .iter()
        .filter(|frame| frame.get(1) == Some(&0x11))
        .collect();
    assert_eq!(data_frames.len(), blocks_sent);

    // Sequence numbers run 0..blocks_sent in order, one per compressed block.
    let seq_of = |frame: &Vec<u8>| u32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]);
    for (k, frame) in data_frames.iter().enumerate() {
        assert_eq!(seq_of(frame), k as u32);
    }
}

#[test]
fn deflate_write_pads_the_rolling_md5_input_to_four_bytes() {
    let mut session = connected_session();
    session.flash_defl_start(0, 64, 8, 16).unwrap();
    // 5 compressed bytes; the hashed window should still be 8 (round_up4(5)).
    session.flash_defl_write(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]).unwrap();
    session.flash_defl_finish(false).unwrap();

    assert!(session
        .port()
        .sent
        .iter()
        .any(|frame| frame.get(1) == Some(&0x10)));
    assert!(session
        .port()
        .sent
        .iter()
        .any(|frame| frame.get(1) == Some(&0x11)));
    assert!(session
        .port()
        .sent
        .iter()
        .any(|frame| frame.get(1) == Some(&0x12)));
}
