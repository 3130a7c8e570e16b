//! # Frame Codec
//!
//! Tokio codec for moving whole length-prefixed frames over a byte stream.
//!
//! Decoding splits the frame off the read buffer and returns the body as a `Bytes`
//! handle into the same allocation, so no payload byte is copied. The id is decoded
//! eagerly; the body is left for a registry parser or consumer.
//!
//! ## Example
//! ```rust
//! use bytes::{Bytes, BytesMut};
//! use packet_engine::core::codec::{FrameCodec, RawFrame};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut codec = FrameCodec::<u16>::new();
//! let mut wire = BytesMut::new();
//! codec.encode(RawFrame::new(7, Bytes::from_static(b"hi")), &mut wire)?;
//!
//! let frame = codec.decode(&mut wire)?.expect("complete frame");
//! assert_eq!(frame.id, 7);
//! assert_eq!(frame.body.as_ref(), b"hi");
//! # Ok::<(), packet_engine::error::ProtocolError>(())
//! ```

use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::cursor::BinaryCursor;
use super::framing::{LengthFraming, WireId, FRAME_HEADER_LEN};
use super::sink::{BinarySink, GrowableBuffer};
use crate::config::FramingConfig;
use crate::error::{ProtocolError, Result};

/// One undecoded frame: the id plus the raw body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame<K> {
    pub id: K,
    pub body: Bytes,
}

impl<K> RawFrame<K> {
    pub fn new(id: K, body: Bytes) -> Self {
        Self { id, body }
    }
}

/// Length-prefixed frame codec keyed by `K`
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec<K> {
    framing: LengthFraming,
    _id: PhantomData<fn() -> K>,
}

impl<K: WireId> FrameCodec<K> {
    pub fn new() -> Self {
        Self::with_framing(LengthFraming::default())
    }

    pub fn with_framing(framing: LengthFraming) -> Self {
        Self {
            framing,
            _id: PhantomData,
        }
    }

    pub fn from_config(config: &FramingConfig) -> Self {
        Self::with_framing(LengthFraming::from_config(config))
    }
}

impl<K: WireId> Default for FrameCodec<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: WireId> Decoder for FrameCodec<K> {
    type Item = RawFrame<K>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&src[..FRAME_HEADER_LEN]);
        let length = u32::from_be_bytes(header) as usize;
        if length > self.framing.max_frame_length() {
            return Err(ProtocolError::LimitExceeded {
                limit: self.framing.max_frame_length(),
                actual: length,
            });
        }

        let total = FRAME_HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let frame = src.split_to(length).freeze();
        let mut cursor = BinaryCursor::from_bytes(&frame);
        let id = K::read_id(&mut cursor)?;
        let body = frame.slice(cursor.consumed()..);
        Ok(Some(RawFrame { id, body }))
    }
}

impl<K: WireId> Encoder<RawFrame<K>> for FrameCodec<K> {
    type Error = ProtocolError;

    fn encode(&mut self, item: RawFrame<K>, dst: &mut BytesMut) -> Result<()> {
        let mut id_buffer = GrowableBuffer::with_chunk_size(16);
        {
            let mut sink = BinarySink::new(&mut id_buffer)?;
            item.id.write_id(&mut sink)?;
            sink.release(false)?;
        }

        let length = id_buffer.len() + item.body.len();
        if length > self.framing.max_frame_length() {
            return Err(ProtocolError::LimitExceeded {
                limit: self.framing.max_frame_length(),
                actual: length,
            });
        }

        dst.reserve(FRAME_HEADER_LEN + length);
        dst.put_u32(length as u32);
        dst.put_slice(id_buffer.as_slice());
        dst.put_slice(&item.body);
        Ok(())
    }
}
