use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use packet_engine::core::{BinaryCursor, BinarySink, ByteSequence, GrowableBuffer, LengthFraming};
use packet_engine::protocol::{self, DispatchContext, Handler, Pipeline};
use packet_engine::registry::{
    compose_fn, parse_fn, PacketRegistry, Registration, RegistryDecoder, RegistryEncoder,
};

#[derive(Debug, Clone)]
struct Sample {
    channel: u16,
    value: u64,
}

fn sample_registry(ids: u16) -> Arc<PacketRegistry<u16>> {
    let mut registrations = Vec::new();
    for id in 0..ids {
        registrations.push(Registration::parser(
            id,
            0,
            parse_fn(|c: &mut BinaryCursor<'_>| {
                Ok(Sample {
                    channel: c.read_u16()?,
                    value: c.read_varint_u64()?,
                })
            }),
        ));
    }
    registrations.push(Registration::composer(
        0,
        0,
        compose_fn(|s: &Sample, sink: &mut BinarySink<'_>| {
            sink.write_u16(s.channel)?;
            sink.write_varint_u64(s.value)
        }),
    ));
    Arc::new(PacketRegistry::new(registrations))
}

fn counting_stage(counter: &Arc<AtomicU64>) -> Arc<dyn Handler> {
    let counter = Arc::clone(counter);
    Arc::new(protocol::inbound(
        move |sample: &mut Sample, _ctx: &DispatchContext<'_>| {
            counter.fetch_add(sample.value, Ordering::Relaxed);
            Ok(())
        },
    ))
}

#[allow(clippy::unwrap_used)]
fn bench_decode_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_chain");
    let frame_counts = [16usize, 256, 4096];
    let registry = sample_registry(64);
    let framing = LengthFraming::default();

    for &frames in &frame_counts {
        let mut buffer = GrowableBuffer::with_chunk_size(4096);
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        for i in 0..frames {
            let id = (i % 64) as u16;
            framing
                .write_frame(&mut sink, &id, |body| {
                    body.write_u16(id)?;
                    body.write_varint_u64(i as u64)
                })
                .unwrap();
        }
        sink.release(false).unwrap();
        drop(sink);
        let stream = buffer.freeze();

        let counter = Arc::new(AtomicU64::new(0));
        let pipeline = Pipeline::new();
        pipeline
            .add_last(Arc::new(RegistryDecoder::new(Arc::clone(&registry)).into_stage()))
            .unwrap();
        pipeline.add_last(counting_stage(&counter)).unwrap();

        group.throughput(Throughput::Elements(frames as u64));
        group.bench_function(format!("contiguous_{frames}_frames"), |b| {
            b.iter_batched(
                || ByteSequence::from(stream.clone()),
                |mut sequence| pipeline.fire_inbound(&mut sequence).unwrap(),
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("fragmented_{frames}_frames"), |b| {
            b.iter_batched(
                || ByteSequence::from_chunks(stream.chunks(13).map(Bytes::copy_from_slice)),
                |mut sequence| pipeline.fire_inbound(&mut sequence).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_dispatch_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_depth");
    let depths = [1usize, 8, 32];

    for &depth in &depths {
        let counter = Arc::new(AtomicU64::new(0));
        let pipeline = Pipeline::new();
        // stages for other payload types are skipped by the walk
        for _ in 1..depth {
            pipeline
                .add_last(Arc::new(protocol::inbound(
                    |_value: &mut String, _ctx: &DispatchContext<'_>| Ok(()),
                )))
                .unwrap();
        }
        pipeline.add_last(counting_stage(&counter)).unwrap();

        group.bench_function(format!("depth_{depth}"), |b| {
            b.iter(|| {
                pipeline
                    .fire_inbound(&mut Sample { channel: 1, value: 1 })
                    .unwrap()
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_encode_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_chain");
    let registry = sample_registry(1);
    let written = Arc::new(AtomicU64::new(0));
    let total = Arc::clone(&written);

    let pipeline = Pipeline::new();
    pipeline
        .add_last(Arc::new(RegistryEncoder::new(registry)))
        .unwrap();
    pipeline
        .add_last(Arc::new(protocol::outbound(
            move |bytes: &mut ByteSequence, _ctx: &DispatchContext<'_>| {
                total.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Ok(())
            },
        )))
        .unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("compose_and_frame", |b| {
        b.iter(|| {
            pipeline
                .fire_outbound(&mut Sample {
                    channel: 7,
                    value: u64::MAX,
                })
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode_chain, bench_dispatch_depth, bench_encode_chain);
criterion_main!(benches);
