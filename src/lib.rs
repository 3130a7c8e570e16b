//! # Packet Engine
//!
//! Building blocks for length-framed binary network protocols.
//!
//! ## Layers
//! - **Codec** ([`core`]): zero-copy [`BinaryCursor`] over chunked bytes and a
//!   [`BinarySink`] writing into pluggable destinations, with framing helpers and a
//!   `tokio-util` codec
//! - **Handler chain** ([`protocol`]): per-connection [`Pipeline`] of stages that typed
//!   payloads flow through
//! - **Packet registry** ([`registry`]): wire id to decode behavior and payload type to
//!   encode behavior, built from declarative [`Registration`]s
//!
//! Every operation is synchronous; a transport feeds bytes in and awaits more when a
//! decode loop reports a partial frame.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use packet_engine::core::{BinaryCursor, BinarySink, ByteSequence};
//! use packet_engine::protocol::{self, DispatchContext, Pipeline};
//! use packet_engine::registry::{
//!     compose_fn, parse_fn, PacketRegistry, Registration, RegistryDecoder, RegistryEncoder,
//! };
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Ping(u32);
//!
//! let registry = Arc::new(PacketRegistry::<u8>::new([
//!     Registration::parser(1, 0, parse_fn(|c: &mut BinaryCursor<'_>| Ok(Ping(c.read_u32()?)))),
//!     Registration::composer(1, 0, compose_fn(|p: &Ping, s: &mut BinarySink<'_>| s.write_u32(p.0))),
//! ]));
//!
//! // outbound: Ping -> framed bytes
//! let wire = Arc::new(std::sync::Mutex::new(ByteSequence::new()));
//! let out = Arc::clone(&wire);
//! let outbound = Pipeline::new();
//! outbound.add_last(Arc::new(RegistryEncoder::new(Arc::clone(&registry))))?;
//! outbound.add_last(Arc::new(protocol::outbound(
//!     move |bytes: &mut ByteSequence, _ctx: &DispatchContext<'_>| {
//!         out.lock().unwrap().append(bytes.clone());
//!         Ok(())
//!     },
//! )))?;
//! outbound.fire_outbound(&mut Ping(7))?;
//!
//! // inbound: framed bytes -> Ping
//! let received = Arc::new(std::sync::Mutex::new(Vec::new()));
//! let store = Arc::clone(&received);
//! let inbound = Pipeline::new();
//! inbound.add_last(Arc::new(RegistryDecoder::new(registry).into_stage()))?;
//! inbound.add_last(Arc::new(protocol::inbound(
//!     move |ping: &mut Ping, _ctx: &DispatchContext<'_>| {
//!         store.lock().unwrap().push(ping.clone());
//!         Ok(())
//!     },
//! )))?;
//! let mut bytes = wire.lock().unwrap().clone();
//! inbound.fire_inbound(&mut bytes)?;
//!
//! assert_eq!(*received.lock().unwrap(), vec![Ping(7)]);
//! # Ok::<(), packet_engine::error::ProtocolError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod utils;

pub use crate::config::EngineConfig;
pub use crate::core::{BinaryCursor, BinarySink, ByteSequence, LengthFraming};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::{DispatchContext, Handler, Pipeline};
pub use crate::registry::{PacketRegistry, Registration};
pub use crate::utils::metrics::Metrics;
