#![no_main]

use std::sync::Arc;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use packet_engine::core::{BinaryCursor, ByteSequence, LengthFraming, LengthPrefix};
use packet_engine::protocol::Pipeline;
use packet_engine::registry::{parse_fn, PacketRegistry, Registration, RegistryDecoder};

fuzz_target!(|data: &[u8]| {
    // Fuzz the registry decode loop - test for panics and loops that never end
    let registry = Arc::new(PacketRegistry::<u8>::new([
        Registration::parser(1, 0, parse_fn(|c: &mut BinaryCursor<'_>| c.read_u32())),
        Registration::parser(
            2,
            0,
            parse_fn(|c: &mut BinaryCursor<'_>| c.read_string(LengthPrefix::VarInt)),
        ),
    ]));
    let pipeline = Pipeline::new();
    if pipeline
        .add_last(Arc::new(
            RegistryDecoder::with_framing(registry, LengthFraming::new(4096)).into_stage(),
        ))
        .is_err()
    {
        return;
    }

    let mut pending = ByteSequence::new();
    for piece in data.chunks(5) {
        pending.push(Bytes::copy_from_slice(piece));
        if pipeline.fire_inbound(&mut pending).is_err() {
            break;
        }
    }
});
