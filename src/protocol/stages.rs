//! Byte-decoder and byte-encoder stages.
//!
//! ## Decode Loop
//! A [`DecoderStage`] reacts to an inbound [`ByteSequence`] and calls
//! [`ByteDecoder::decode`] repeatedly. Each attempt runs against its own copy of the
//! cursor and is kept only when it reports [`DecodeStatus::Complete`]. The loop stops when
//! - no bytes remain,
//! - an attempt reports [`DecodeStatus::Partial`], or
//! - a complete attempt consumed nothing.
//!
//! Afterwards the sequence is advanced past every completed object. Bytes read by a
//! partial attempt are never dropped, so splitting a stream at any boundary yields the
//! same payloads once the rest arrives.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use super::context::DispatchContext;
use super::handler::{Handler, Interest};
use crate::config::{CodecConfig, DEFAULT_SINK_CHUNK_SIZE};
use crate::core::{BinaryCursor, BinarySink, ByteSequence, GrowableBuffer};
use crate::error::Result;

/// Outcome of one decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// One object was decoded and fired
    Complete,
    /// Not enough bytes for one object; wait for more
    Partial,
}

/// Why a decode loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Drained,
    Partial,
    Stalled,
}

/// Result of one decode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Completed attempts
    pub decoded: usize,
    /// Bytes removed from the sequence
    pub consumed: usize,
    pub exit: LoopExit,
}

/// Decodes one object per call and fires it through `ctx`.
///
/// Implemented for any `Fn(&mut BinaryCursor, &DispatchContext) -> Result<DecodeStatus>`.
pub trait ByteDecoder: Send + Sync + 'static {
    fn decode(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>)
        -> Result<DecodeStatus>;
}

impl<F> ByteDecoder for F
where
    F: Fn(&mut BinaryCursor<'_>, &DispatchContext<'_>) -> Result<DecodeStatus>
        + Send
        + Sync
        + 'static,
{
    #[inline]
    fn decode(
        &self,
        cursor: &mut BinaryCursor<'_>,
        ctx: &DispatchContext<'_>,
    ) -> Result<DecodeStatus> {
        self(cursor, ctx)
    }
}

/// Run the decode loop over `bytes`, advancing it past every completed object.
///
/// On error the sequence is still advanced past the objects completed before the
/// failing attempt.
pub fn decode_all<D>(
    decoder: &D,
    bytes: &mut ByteSequence,
    ctx: &DispatchContext<'_>,
) -> Result<DecodeSummary>
where
    D: ByteDecoder + ?Sized,
{
    let metrics = ctx.metrics();
    let mut cursor = bytes.cursor();
    let mut decoded = 0;
    let mut failure = None;

    let exit = loop {
        if cursor.is_empty() {
            break LoopExit::Drained;
        }

        let mut attempt = cursor.clone();
        let status = match decoder.decode(&mut attempt, ctx) {
            Ok(status) => status,
            Err(e) => {
                if let Some(metrics) = metrics {
                    metrics.decode_error();
                }
                failure = Some(e);
                break LoopExit::Stalled;
            }
        };
        let progressed = attempt.consumed() - cursor.consumed();

        match status {
            DecodeStatus::Partial => {
                trace!(
                    buffered = cursor.remaining(),
                    "Decode attempt partial, waiting for more bytes"
                );
                if let Some(metrics) = metrics {
                    metrics.partial_decode();
                }
                break LoopExit::Partial;
            }
            DecodeStatus::Complete if progressed == 0 => {
                trace!(
                    buffered = cursor.remaining(),
                    "Decode attempt consumed nothing, stopping"
                );
                if let Some(metrics) = metrics {
                    metrics.stalled_decode();
                }
                break LoopExit::Stalled;
            }
            DecodeStatus::Complete => {
                if let Some(metrics) = metrics {
                    metrics.payload_decoded(progressed as u64);
                }
                decoded += 1;
                cursor = attempt;
            }
        }
    };

    let consumed = cursor.consumed();
    bytes.advance(consumed);

    match failure {
        Some(e) => Err(e),
        None => Ok(DecodeSummary {
            decoded,
            consumed,
            exit,
        }),
    }
}

/// Inbound stage that turns byte sequences into payloads
pub struct DecoderStage<D> {
    decoder: D,
}

impl<D: ByteDecoder> DecoderStage<D> {
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// Stage over a decode closure
    pub fn from_fn(decoder: D) -> Self
    where
        D: Fn(&mut BinaryCursor<'_>, &DispatchContext<'_>) -> Result<DecodeStatus>,
    {
        Self { decoder }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<D: ByteDecoder> Handler for DecoderStage<D> {
    fn name(&self) -> &str {
        std::any::type_name::<D>()
    }

    fn inbound(&self) -> Interest {
        Interest::of::<ByteSequence>()
    }

    fn on_inbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        match payload.downcast_mut::<ByteSequence>() {
            Some(bytes) => decode_all(&self.decoder, bytes, ctx).map(|_| ()),
            None => ctx.forward_inbound(payload),
        }
    }
}

impl<D> fmt::Debug for DecoderStage<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderStage")
            .field("decoder", &std::any::type_name::<D>())
            .finish()
    }
}

/// Writes one payload through a sink.
///
/// Implemented for any `Fn(&T, &mut BinarySink) -> Result<()>`.
pub trait ByteEncoder<T: 'static>: Send + Sync + 'static {
    fn encode(&self, payload: &T, sink: &mut BinarySink<'_>) -> Result<()>;
}

impl<T, F> ByteEncoder<T> for F
where
    T: 'static,
    F: Fn(&T, &mut BinarySink<'_>) -> Result<()> + Send + Sync + 'static,
{
    #[inline]
    fn encode(&self, payload: &T, sink: &mut BinarySink<'_>) -> Result<()> {
        self(payload, sink)
    }
}

/// Outbound stage that turns `T` into a [`ByteSequence`] and forwards it
pub struct EncoderStage<E, T> {
    encoder: E,
    chunk_size: usize,
    _payload: PhantomData<fn(T)>,
}

impl<E, T> EncoderStage<E, T>
where
    E: ByteEncoder<T>,
    T: 'static,
{
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            chunk_size: DEFAULT_SINK_CHUNK_SIZE,
            _payload: PhantomData,
        }
    }

    /// Stage over an encode closure
    pub fn from_fn(encoder: E) -> Self
    where
        E: Fn(&T, &mut BinarySink<'_>) -> Result<()>,
    {
        Self::new(encoder)
    }

    pub fn with_config(encoder: E, config: &CodecConfig) -> Self {
        Self {
            chunk_size: config.sink_chunk_size,
            ..Self::new(encoder)
        }
    }

    fn encode(&self, payload: &T) -> Result<ByteSequence> {
        let mut buffer = GrowableBuffer::with_chunk_size(self.chunk_size);
        let mut sink = BinarySink::new(&mut buffer)?;
        self.encoder.encode(payload, &mut sink)?;
        sink.release(false)?;
        drop(sink);
        Ok(buffer.into_sequence())
    }
}

impl<E, T> Handler for EncoderStage<E, T>
where
    E: ByteEncoder<T>,
    T: 'static,
{
    fn name(&self) -> &str {
        std::any::type_name::<E>()
    }

    fn outbound(&self) -> Interest {
        Interest::of::<T>()
    }

    fn on_outbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        let mut bytes = match payload.downcast_ref::<T>() {
            Some(typed) => self.encode(typed)?,
            None => return ctx.forward_outbound(payload),
        };
        if let Some(metrics) = ctx.metrics() {
            metrics.payload_composed(bytes.len() as u64);
        }
        ctx.fire_outbound(&mut bytes)
    }
}

impl<E, T> fmt::Debug for EncoderStage<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderStage")
            .field("payload", &std::any::type_name::<T>())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
