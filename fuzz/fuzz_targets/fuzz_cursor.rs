#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use packet_engine::core::{BinaryCursor, LengthPrefix, TextOptions};

fuzz_target!(|data: &[u8]| {
    // Split at the first byte's value so reads cross chunk boundaries
    let cut = data.first().map_or(0, |b| *b as usize).min(data.len());
    let chunks = [
        Bytes::copy_from_slice(&data[..cut]),
        Bytes::copy_from_slice(&data[cut..]),
    ];
    let mut cursor = BinaryCursor::new(&chunks);
    let options = TextOptions::default().with_max_len(1024);

    while !cursor.is_empty() {
        let before = cursor.consumed();
        let _ = cursor.try_read_varint_u64();
        let _ = cursor.read_text(LengthPrefix::VarInt, &options);
        let _ = cursor.read_delimited_text(b"\r\n", &options);
        let _ = cursor.starts_with(b"\x00\x01");
        if let Ok(len) = cursor.peek_u16() {
            let _ = cursor.read_slice(len as usize).map(|mut s| s.read_bytes(s.remaining()));
        }
        if cursor.consumed() == before && cursor.skip(1).is_err() {
            break;
        }
    }
});
