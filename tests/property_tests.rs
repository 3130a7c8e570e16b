//! Property-based tests using proptest
//!
//! These tests validate codec and decode-loop invariants across a wide range of
//! randomly generated inputs, including arbitrary chunk boundaries.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use packet_engine::core::varint::{encoded_len, MAX_VARINT32_LEN};
use packet_engine::core::{
    BinaryCursor, BinarySink, ByteSequence, GrowableBuffer, Latin1, LengthFraming, LengthPrefix,
    TextOptions,
};
use packet_engine::protocol::{self, DispatchContext, Pipeline};
use packet_engine::registry::{parse_fn, PacketRegistry, Registration, RegistryDecoder};
use proptest::prelude::*;

/// Split `data` at the given cut points into a chunked sequence
fn split_at(data: &[u8], cuts: &[usize]) -> ByteSequence {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(Bytes::copy_from_slice(&data[start..point]));
        start = point;
    }
    chunks.push(Bytes::copy_from_slice(&data[start..]));
    ByteSequence::from_chunks(chunks)
}

fn framed_values(values: &[u32]) -> Vec<u8> {
    let framing = LengthFraming::default();
    let mut buffer = GrowableBuffer::with_chunk_size(16);
    let mut sink = BinarySink::new(&mut buffer).unwrap();
    for value in values {
        framing
            .write_frame(&mut sink, &1u8, |body| body.write_varint_u32(*value))
            .unwrap();
    }
    sink.release(false).unwrap();
    drop(sink);
    buffer.as_slice().to_vec()
}

/// Registry-backed decode chain that collects every decoded `u32`
fn collecting_pipeline() -> (Pipeline, Arc<Mutex<Vec<u32>>>) {
    let registry = Arc::new(PacketRegistry::<u8>::new([Registration::parser(
        1,
        0,
        parse_fn(|cursor: &mut BinaryCursor<'_>| cursor.read_varint_u32()),
    )]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&seen);

    let pipeline = Pipeline::new();
    pipeline
        .add_last(Arc::new(RegistryDecoder::new(registry).into_stage()))
        .unwrap();
    pipeline
        .add_last(Arc::new(protocol::inbound(
            move |value: &mut u32, _ctx: &DispatchContext<'_>| {
                store.lock().unwrap().push(*value);
                Ok(())
            },
        )))
        .unwrap();
    (pipeline, seen)
}

/// Any bit pattern, with the infinities and NaN payloads weighted in
fn f32_values() -> impl Strategy<Value = f32> {
    prop_oneof![
        any::<u32>().prop_map(f32::from_bits),
        Just(f32::INFINITY),
        Just(f32::NEG_INFINITY),
        Just(f32::NAN),
        Just(f32::from_bits(0xFFC0_0001)),
    ]
}

fn f64_values() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<u64>().prop_map(f64::from_bits),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(f64::NAN),
        Just(f64::from_bits(0x7FF0_0000_0000_0001)),
    ]
}

// Property: Varint length matches the bytes actually written
proptest! {
    #[test]
    fn prop_varint_length_matches_encoding(value in any::<u64>()) {
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        sink.write_varint_u64(value).unwrap();
        prop_assert_eq!(sink.len(), encoded_len(value));
        sink.release(false).unwrap();
        drop(sink);

        let bytes = buffer.freeze();
        let mut cursor = BinaryCursor::from_bytes(&bytes);
        prop_assert_eq!(cursor.read_varint_u64().unwrap(), value);
        prop_assert!(cursor.is_empty());
    }
}

// Property: 32-bit varints never exceed five bytes
proptest! {
    #[test]
    fn prop_varint_u32_bounded(value in any::<u32>()) {
        prop_assert!(encoded_len(u64::from(value)) <= MAX_VARINT32_LEN);
    }
}

// Property: Reads produce the same values however the input is chunked
proptest! {
    #[test]
    fn prop_reads_independent_of_chunking(
        values in prop::collection::vec(any::<u64>(), 1..32),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        let sequence = split_at(&data, &cuts);
        let mut cursor = sequence.cursor();

        for value in &values {
            prop_assert_eq!(cursor.read_u64().unwrap(), *value);
        }
        prop_assert!(cursor.is_empty());
    }
}

// Property: Every fixed-width primitive reads back bit for bit
proptest! {
    #[test]
    fn prop_primitives_round_trip(
        small in any::<i8>(),
        short in any::<i16>(),
        int in any::<i32>(),
        long in any::<i64>(),
        port in any::<u16>(),
        word in any::<u32>(),
        single in f32_values(),
        double in f64_values(),
        flag in any::<bool>(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let mut buffer = GrowableBuffer::with_chunk_size(16);
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        sink.write_i8(small).unwrap();
        sink.write_i16(short).unwrap();
        sink.write_i32(int).unwrap();
        sink.write_i64(long).unwrap();
        sink.write_u16(port).unwrap();
        sink.write_u32(word).unwrap();
        sink.write_f32(single).unwrap();
        sink.write_f64(double).unwrap();
        sink.write_bool(flag).unwrap();
        sink.release(false).unwrap();
        drop(sink);

        let sequence = split_at(buffer.as_slice(), &cuts);
        let mut cursor = sequence.cursor();
        prop_assert_eq!(cursor.read_i8().unwrap(), small);
        prop_assert_eq!(cursor.read_i16().unwrap(), short);
        prop_assert_eq!(cursor.read_i32().unwrap(), int);
        prop_assert_eq!(cursor.read_i64().unwrap(), long);
        prop_assert_eq!(cursor.read_u16().unwrap(), port);
        prop_assert_eq!(cursor.read_u32().unwrap(), word);
        prop_assert_eq!(cursor.read_f32().unwrap().to_bits(), single.to_bits());
        prop_assert_eq!(cursor.read_f64().unwrap().to_bits(), double.to_bits());
        prop_assert_eq!(cursor.read_bool().unwrap(), flag);
        prop_assert!(cursor.is_empty());
    }
}

// Property: try_* reads either succeed or leave the cursor where it was
proptest! {
    #[test]
    fn prop_try_reads_are_atomic(data in prop::collection::vec(any::<u8>(), 0..24)) {
        let bytes = Bytes::from(data);
        let mut cursor = BinaryCursor::from_bytes(&bytes);

        loop {
            let before = cursor.consumed();
            let progressed = cursor.try_read_varint_u64().is_some()
                || cursor.try_read_u32().is_some()
                || cursor.try_read_u8().is_some();
            if !progressed {
                prop_assert_eq!(cursor.consumed(), before);
                break;
            }
            prop_assert!(cursor.consumed() > before);
        }
        prop_assert!(cursor.is_empty());
    }
}

// Property: Arbitrary bytes never panic the cursor
proptest! {
    #[test]
    fn prop_arbitrary_input_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let bytes = Bytes::from(data);
        let mut cursor = BinaryCursor::from_bytes(&bytes);
        let _ = cursor.read_string(LengthPrefix::VarInt);
        let _ = cursor.read_delimited_text(b"\n", &TextOptions::default().with_max_len(32));
        let _ = cursor.read_varint_u32();
        let _ = LengthFraming::new(64).read_frame::<u16>(&mut cursor);
    }
}

// Property: Latin-1 text survives the sink and cursor unchanged
proptest! {
    #[test]
    fn prop_latin1_text_preserved(text in "[\\x00-\\xff]{0,64}") {
        let latin1 = Latin1;
        let options = TextOptions::new(&latin1);
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        sink.write_text(LengthPrefix::VarInt, &text, &options).unwrap();
        prop_assert_eq!(sink.len() - encoded_len(text.chars().count() as u64), text.chars().count());
        sink.release(false).unwrap();
        drop(sink);

        let bytes = buffer.freeze();
        let mut cursor = BinaryCursor::from_bytes(&bytes);
        prop_assert_eq!(cursor.read_text(LengthPrefix::VarInt, &options).unwrap(), text);
    }
}

// Property: A framed stream decodes to the same payloads at any chunk boundary
proptest! {
    #[test]
    fn prop_decode_independent_of_chunking(
        values in prop::collection::vec(any::<u32>(), 0..24),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let data = framed_values(&values);
        let (pipeline, seen) = collecting_pipeline();

        let mut sequence = split_at(&data, &cuts);
        pipeline.fire_inbound(&mut sequence).unwrap();

        prop_assert!(sequence.is_empty());
        prop_assert_eq!(&*seen.lock().unwrap(), &values);
    }
}

// Property: Feeding the stream piece by piece yields every payload exactly once
proptest! {
    #[test]
    fn prop_incremental_decode_delivers_everything(
        values in prop::collection::vec(any::<u32>(), 1..24),
        step in 1usize..17,
    ) {
        let data = framed_values(&values);
        let (pipeline, seen) = collecting_pipeline();

        let mut pending = ByteSequence::new();
        for piece in data.chunks(step) {
            pending.push(Bytes::copy_from_slice(piece));
            pipeline.fire_inbound(&mut pending).unwrap();
            // a whole frame is at most header + id + five varint bytes
            prop_assert!(pending.len() < 10);
        }

        prop_assert!(pending.is_empty());
        prop_assert_eq!(&*seen.lock().unwrap(), &values);
    }
}
