//! # Handler Chain
//!
//! Per-connection pipeline of stages that decoded payloads flow through.
//!
//! ## Dispatch
//! A payload enters at the head of a [`Pipeline`] snapshot and walks forward:
//! - a stage declaring the payload's exact type is invoked and the walk stops there
//! - an any-payload stage is invoked and decides itself whether to forward
//! - every other stage is skipped
//!
//! Reaching the end is a silent no-op. Strict protocols add a catch-all tail stage.
//!
//! ## Stage Kinds
//! - **Typed**: one payload type ([`Typed`] over a [`TypedHandler`])
//! - **Any-payload**: implements [`Handler`] with [`Interest::Any`]
//! - **Byte decoder**: [`DecoderStage`], turns a [`ByteSequence`](crate::core::ByteSequence)
//!   into zero or more payloads
//! - **Byte encoder**: [`EncoderStage`], turns one payload into a byte sequence
//!
//! ## Concurrency
//! Mutations take one guard per pipeline and publish a new stage list; dispatch reads
//! a snapshot and never blocks on that guard.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use packet_engine::protocol::{self, Handler, Pipeline};
//!
//! let seen = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&seen);
//! let stage: Arc<dyn Handler> = Arc::new(protocol::inbound(move |value: &mut u32, _ctx| {
//!     counter.fetch_add(*value, Ordering::Relaxed);
//!     Ok(())
//! }));
//!
//! let pipeline = Pipeline::new();
//! pipeline.add_last(stage)?;
//! pipeline.fire_inbound(&mut 5u32)?;
//! pipeline.fire_inbound(&mut "ignored")?;
//! assert_eq!(seen.load(Ordering::Relaxed), 5);
//! # Ok::<(), packet_engine::error::ProtocolError>(())
//! ```

pub mod context;
pub mod handler;
pub mod pipeline;
pub mod stages;

pub use context::{DispatchContext, Stage};
pub use handler::{inbound, outbound, Direction, Handler, Interest, Typed, TypedHandler};
pub use pipeline::Pipeline;
pub use stages::{
    decode_all, ByteDecoder, ByteEncoder, DecodeStatus, DecodeSummary, DecoderStage,
    EncoderStage, LoopExit,
};
