//! Chain stages backed by a [`PacketRegistry`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::PacketRegistry;
use crate::config::{EngineConfig, DEFAULT_SINK_CHUNK_SIZE};
use crate::core::{BinaryCursor, BinarySink, ByteSequence, GrowableBuffer, LengthFraming, WireId};
use crate::error::Result;
use crate::protocol::{
    ByteDecoder, DecodeStatus, DecoderStage, DispatchContext, Handler, Interest,
};

/// Reads one length-framed packet per call and hands its body to the consumer for its id.
///
/// Frames with no consumer are skipped.
pub struct RegistryDecoder<K> {
    registry: Arc<PacketRegistry<K>>,
    framing: LengthFraming,
}

impl<K: WireId> RegistryDecoder<K> {
    pub fn new(registry: Arc<PacketRegistry<K>>) -> Self {
        Self::with_framing(registry, LengthFraming::default())
    }

    pub fn with_framing(registry: Arc<PacketRegistry<K>>, framing: LengthFraming) -> Self {
        Self { registry, framing }
    }

    pub fn from_config(registry: Arc<PacketRegistry<K>>, config: &EngineConfig) -> Self {
        Self::with_framing(registry, LengthFraming::from_config(&config.framing))
    }

    /// Wrap in a byte-decoder stage
    pub fn into_stage(self) -> DecoderStage<Self> {
        DecoderStage::new(self)
    }
}

impl<K: WireId> ByteDecoder for RegistryDecoder<K> {
    fn decode(
        &self,
        cursor: &mut BinaryCursor<'_>,
        ctx: &DispatchContext<'_>,
    ) -> Result<DecodeStatus> {
        let Some((id, mut body)) = self.framing.read_frame::<K>(cursor)? else {
            return Ok(DecodeStatus::Partial);
        };
        if !self.registry.consume(&id, &mut body, ctx)? {
            trace!(?id, length = body.len(), "No consumer for packet id, frame skipped");
        }
        Ok(DecodeStatus::Complete)
    }
}

impl<K: fmt::Debug> fmt::Debug for RegistryDecoder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryDecoder")
            .field("framing", &self.framing)
            .finish()
    }
}

/// Outbound stage writing payloads with a registered composer as length-framed packets.
///
/// The resulting [`ByteSequence`] continues down the chain; payloads without a composer
/// are forwarded unchanged.
pub struct RegistryEncoder<K> {
    registry: Arc<PacketRegistry<K>>,
    framing: LengthFraming,
    chunk_size: usize,
}

impl<K: WireId> RegistryEncoder<K> {
    pub fn new(registry: Arc<PacketRegistry<K>>) -> Self {
        Self {
            registry,
            framing: LengthFraming::default(),
            chunk_size: DEFAULT_SINK_CHUNK_SIZE,
        }
    }

    pub fn from_config(registry: Arc<PacketRegistry<K>>, config: &EngineConfig) -> Self {
        Self {
            registry,
            framing: LengthFraming::from_config(&config.framing),
            chunk_size: config.codec.sink_chunk_size,
        }
    }
}

impl<K: WireId> Handler for RegistryEncoder<K> {
    fn name(&self) -> &str {
        "RegistryEncoder"
    }

    fn outbound(&self) -> Interest {
        Interest::Any
    }

    fn on_outbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        if payload.is::<ByteSequence>() {
            return ctx.forward_outbound(payload);
        }
        let Some(resolved) = self.registry.composer_for((*payload).type_id()) else {
            return ctx.forward_outbound(payload);
        };

        let mut buffer = GrowableBuffer::with_chunk_size(self.chunk_size);
        let mut sink = BinarySink::new(&mut buffer)?;
        self.framing
            .write_frame(&mut sink, &resolved.id, |body| resolved.compose(&*payload, body))?;
        sink.release(false)?;
        drop(sink);

        let mut bytes = buffer.into_sequence();
        if let Some(metrics) = ctx.metrics() {
            metrics.payload_composed(bytes.len() as u64);
        }
        ctx.fire_outbound(&mut bytes)
    }
}

impl<K: fmt::Debug> fmt::Debug for RegistryEncoder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEncoder")
            .field("framing", &self.framing)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Inbound stage handing payloads to the registry's handler for their type.
///
/// Payloads without a handler continue down the chain.
pub struct RegistryHandlerStage<K> {
    registry: Arc<PacketRegistry<K>>,
}

impl<K: WireId> RegistryHandlerStage<K> {
    pub fn new(registry: Arc<PacketRegistry<K>>) -> Self {
        Self { registry }
    }
}

impl<K: WireId> Handler for RegistryHandlerStage<K> {
    fn name(&self) -> &str {
        "RegistryHandlerStage"
    }

    fn inbound(&self) -> Interest {
        Interest::Any
    }

    fn on_inbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        if self.registry.handle_any(payload, ctx)? {
            Ok(())
        } else {
            ctx.forward_inbound(payload)
        }
    }
}

impl<K> fmt::Debug for RegistryHandlerStage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandlerStage").finish()
    }
}
