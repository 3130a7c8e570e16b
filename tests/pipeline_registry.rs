//! End-to-end tests: registry-backed encode and decode chains over a small chat protocol

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use packet_engine::config::EngineConfig;
use packet_engine::core::{BinaryCursor, BinarySink, ByteSequence, LengthPrefix};
use packet_engine::error::ProtocolError;
use packet_engine::protocol::{self, DispatchContext, Pipeline};
use packet_engine::registry::{
    compose_fn, parse_fn, ComponentKinds, PacketRegistry, Registration, RegistryDecoder,
    RegistryEncoder, RegistryHandlerStage,
};
use packet_engine::utils::metrics::Metrics;

const HELLO: u16 = 0x0001;
const CHAT: u16 = 0x0002;
const BYE: u16 = 0x00FF;

#[derive(Debug, Clone, PartialEq)]
struct Hello {
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Chat {
    room: u16,
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Bye;

fn login_module(greeted: Arc<Mutex<Vec<String>>>) -> PacketRegistry<u16> {
    PacketRegistry::new([
        Registration::parser(
            HELLO,
            0,
            parse_fn(|c: &mut BinaryCursor<'_>| {
                Ok(Hello {
                    name: c.read_string(LengthPrefix::U8)?,
                })
            }),
        ),
        Registration::composer(
            HELLO,
            0,
            compose_fn(|h: &Hello, s: &mut BinarySink<'_>| s.write_string(LengthPrefix::U8, &h.name)),
        ),
        Registration::handler_fn(0, move |h: &mut Hello, _ctx: &DispatchContext<'_>| {
            greeted.lock().unwrap().push(h.name.clone());
            Ok(())
        }),
        Registration::parser(BYE, 0, parse_fn(|_c: &mut BinaryCursor<'_>| Ok(Bye))),
        Registration::composer(BYE, 0, compose_fn(|_b: &Bye, _s: &mut BinarySink<'_>| Ok(()))),
    ])
}

fn chat_module() -> PacketRegistry<u16> {
    PacketRegistry::new([
        Registration::parser(
            CHAT,
            0,
            parse_fn(|c: &mut BinaryCursor<'_>| {
                Ok(Chat {
                    room: c.read_u16()?,
                    text: c.read_string(LengthPrefix::VarInt)?,
                })
            }),
        ),
        Registration::composer(
            CHAT,
            0,
            compose_fn(|m: &Chat, s: &mut BinarySink<'_>| {
                s.write_u16(m.room)?;
                s.write_string(LengthPrefix::VarInt, &m.text)
            }),
        ),
    ])
}

/// Outbound chain ending in a stage that captures the framed bytes
fn encoding_chain(registry: &Arc<PacketRegistry<u16>>) -> (Pipeline, Arc<Mutex<ByteSequence>>) {
    let wire = Arc::new(Mutex::new(ByteSequence::new()));
    let out = Arc::clone(&wire);

    let pipeline = Pipeline::new();
    pipeline
        .add_last(Arc::new(RegistryEncoder::new(Arc::clone(registry))))
        .unwrap();
    pipeline
        .add_last(Arc::new(protocol::outbound(
            move |bytes: &mut ByteSequence, _ctx: &DispatchContext<'_>| {
                out.lock().unwrap().append(bytes.clone());
                Ok(())
            },
        )))
        .unwrap();
    (pipeline, wire)
}

/// Inbound chain: decode frames, run registry handlers, collect chats and byes
fn decoding_chain(
    registry: &Arc<PacketRegistry<u16>>,
    metrics: Option<Arc<Metrics>>,
) -> (Pipeline, Arc<Mutex<Vec<Chat>>>, Arc<Mutex<usize>>) {
    let chats = Arc::new(Mutex::new(Vec::new()));
    let byes = Arc::new(Mutex::new(0usize));
    let chat_store = Arc::clone(&chats);
    let bye_count = Arc::clone(&byes);

    let pipeline = match metrics {
        Some(metrics) => Pipeline::with_metrics(metrics),
        None => Pipeline::new(),
    };
    pipeline
        .add_last(Arc::new(RegistryDecoder::new(Arc::clone(registry)).into_stage()))
        .unwrap();
    pipeline
        .add_last(Arc::new(RegistryHandlerStage::new(Arc::clone(registry))))
        .unwrap();
    pipeline
        .add_last(Arc::new(protocol::inbound(
            move |chat: &mut Chat, _ctx: &DispatchContext<'_>| {
                chat_store.lock().unwrap().push(chat.clone());
                Ok(())
            },
        )))
        .unwrap();
    pipeline
        .add_last(Arc::new(protocol::inbound(
            move |_bye: &mut Bye, _ctx: &DispatchContext<'_>| {
                *bye_count.lock().unwrap() += 1;
                Ok(())
            },
        )))
        .unwrap();
    (pipeline, chats, byes)
}

fn combined(greeted: &Arc<Mutex<Vec<String>>>) -> Arc<PacketRegistry<u16>> {
    let registry = PacketRegistry::default();
    registry
        .combine(&login_module(Arc::clone(greeted)), ComponentKinds::ALL)
        .unwrap();
    registry.combine(&chat_module(), ComponentKinds::ALL).unwrap();
    Arc::new(registry)
}

#[test]
fn test_conversation_round_trip() {
    let greeted = Arc::new(Mutex::new(Vec::new()));
    let registry = combined(&greeted);
    let (outbound, wire) = encoding_chain(&registry);

    outbound.fire_outbound(&mut Hello { name: "ada".into() }).unwrap();
    outbound
        .fire_outbound(&mut Chat { room: 3, text: "hi all".into() })
        .unwrap();
    outbound
        .fire_outbound(&mut Chat { room: 4, text: "ünïcode".into() })
        .unwrap();
    outbound.fire_outbound(&mut Bye).unwrap();

    let (inbound, chats, byes) = decoding_chain(&registry, None);
    let mut bytes = wire.lock().unwrap().clone();
    inbound.fire_inbound(&mut bytes).unwrap();

    assert!(bytes.is_empty());
    assert_eq!(*greeted.lock().unwrap(), vec!["ada".to_string()]);
    assert_eq!(
        *chats.lock().unwrap(),
        vec![
            Chat { room: 3, text: "hi all".into() },
            Chat { room: 4, text: "ünïcode".into() },
        ]
    );
    assert_eq!(*byes.lock().unwrap(), 1);
}

#[test]
fn test_wire_layout_of_encoded_frame() {
    let registry = combined(&Arc::new(Mutex::new(Vec::new())));
    let (outbound, wire) = encoding_chain(&registry);

    outbound.fire_outbound(&mut Hello { name: "bo".into() }).unwrap();

    // length 5 = id (2) + prefix (1) + "bo" (2)
    assert_eq!(
        wire.lock().unwrap().to_vec(),
        vec![0, 0, 0, 5, 0, 1, 2, b'b', b'o']
    );
}

#[test]
fn test_unregistered_payload_passes_through_encoder() {
    let registry = combined(&Arc::new(Mutex::new(Vec::new())));
    let (outbound, wire) = encoding_chain(&registry);
    let passed = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&passed);
    outbound
        .add_last(Arc::new(protocol::outbound(
            move |raw: &mut u64, _ctx: &DispatchContext<'_>| {
                store.lock().unwrap().push(*raw);
                Ok(())
            },
        )))
        .unwrap();

    outbound.fire_outbound(&mut 99u64).unwrap();

    assert!(wire.lock().unwrap().is_empty());
    assert_eq!(*passed.lock().unwrap(), vec![99]);
}

#[test]
fn test_removed_module_frames_are_skipped() {
    let greeted = Arc::new(Mutex::new(Vec::new()));
    let registry = combined(&greeted);
    let (outbound, wire) = encoding_chain(&registry);
    outbound
        .fire_outbound(&mut Chat { room: 1, text: "first".into() })
        .unwrap();
    outbound.fire_outbound(&mut Hello { name: "eve".into() }).unwrap();
    let bytes = wire.lock().unwrap().clone();

    let removed = registry.remove(&chat_module(), ComponentKinds::ALL).unwrap();
    assert_eq!(removed, 2);
    assert!(!registry.has_consumer(&CHAT));
    assert!(registry.outbound_id::<Chat>().is_none());

    let (inbound, chats, _byes) = decoding_chain(&registry, None);
    let mut bytes = bytes;
    inbound.fire_inbound(&mut bytes).unwrap();

    assert!(bytes.is_empty());
    assert!(chats.lock().unwrap().is_empty());
    assert_eq!(*greeted.lock().unwrap(), vec!["eve".to_string()]);
}

#[test]
fn test_split_delivery_with_metrics() {
    let greeted = Arc::new(Mutex::new(Vec::new()));
    let registry = combined(&greeted);
    let (outbound, wire) = encoding_chain(&registry);
    for room in 0..5u16 {
        outbound
            .fire_outbound(&mut Chat { room, text: format!("msg {room}") })
            .unwrap();
    }
    let stream = wire.lock().unwrap().to_bytes();

    let metrics = Arc::new(Metrics::new());
    let (inbound, chats, _byes) = decoding_chain(&registry, Some(Arc::clone(&metrics)));
    let mut pending = ByteSequence::new();
    for piece in stream.chunks(7) {
        pending.push(bytes::Bytes::copy_from_slice(piece));
        inbound.fire_inbound(&mut pending).unwrap();
    }

    assert!(pending.is_empty());
    let rooms: Vec<u16> = chats.lock().unwrap().iter().map(|c| c.room).collect();
    assert_eq!(rooms, vec![0, 1, 2, 3, 4]);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.payloads_decoded, 5);
    assert_eq!(snapshot.bytes_decoded, stream.len() as u64);
    assert!(snapshot.partial_decodes > 0);
}

#[test]
fn test_oversized_frame_fails_the_connection() {
    let registry = combined(&Arc::new(Mutex::new(Vec::new())));
    let (outbound, wire) = encoding_chain(&registry);
    outbound
        .fire_outbound(&mut Chat { room: 9, text: "x".repeat(64) })
        .unwrap();

    let config = EngineConfig::default_with_overrides(|c| c.framing.max_frame_length = 32);
    let inbound = Pipeline::new();
    inbound
        .add_last(Arc::new(
            RegistryDecoder::from_config(Arc::clone(&registry), &config).into_stage(),
        ))
        .unwrap();

    let mut bytes = wire.lock().unwrap().clone();
    let result = inbound.fire_inbound(&mut bytes);
    assert!(matches!(
        result,
        Err(ProtocolError::LimitExceeded { limit: 32, .. })
    ));
    assert!(!bytes.is_empty());
}

#[test]
fn test_late_override_replaces_handler() {
    let greeted = Arc::new(Mutex::new(Vec::new()));
    let registry = combined(&greeted);
    let shouted = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&shouted);
    registry
        .register([Registration::handler_fn(
            10,
            move |h: &mut Hello, _ctx: &DispatchContext<'_>| {
                store.lock().unwrap().push(h.name.to_uppercase());
                Ok(())
            },
        )])
        .unwrap();

    let (outbound, wire) = encoding_chain(&registry);
    outbound.fire_outbound(&mut Hello { name: "zed".into() }).unwrap();
    let (inbound, _chats, _byes) = decoding_chain(&registry, None);
    let mut bytes = wire.lock().unwrap().clone();
    inbound.fire_inbound(&mut bytes).unwrap();

    assert!(greeted.lock().unwrap().is_empty());
    assert_eq!(*shouted.lock().unwrap(), vec!["ZED".to_string()]);
}
