//! # Length-Prefixed Framing
//!
//! Wire identifiers and the frame layout used by the registry-backed stages.
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [Id(N)] [Body(M)]      Length = N + M, big-endian
//! ```
//!
//! ## Identifiers
//! Integer ids are fixed-width big-endian; `String` ids are UTF-8 behind a
//! variable-length-integer length prefix.

use std::fmt::Debug;
use std::hash::Hash;

use super::cursor::{BinaryCursor, LengthPrefix};
use super::sink::BinarySink;
use crate::config::{FramingConfig, MAX_FRAME_LENGTH};
use crate::error::{ProtocolError, Result};

/// Bytes taken by the frame length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Key type the registry can index by
pub trait PacketId: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> PacketId for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// A packet id with a wire representation
pub trait WireId: PacketId + Sized {
    fn read_id(cursor: &mut BinaryCursor<'_>) -> Result<Self>;

    fn write_id(&self, sink: &mut BinarySink<'_>) -> Result<()>;
}

macro_rules! integer_wire_id {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            impl WireId for $ty {
                #[inline]
                fn read_id(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
                    cursor.$read()
                }

                #[inline]
                fn write_id(&self, sink: &mut BinarySink<'_>) -> Result<()> {
                    sink.$write(*self)
                }
            }
        )*
    };
}

integer_wire_id! {
    u8 => read_u8, write_u8;
    u16 => read_u16, write_u16;
    u32 => read_u32, write_u32;
    u64 => read_u64, write_u64;
}

impl WireId for String {
    fn read_id(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        cursor.read_string(LengthPrefix::VarInt)
    }

    fn write_id(&self, sink: &mut BinarySink<'_>) -> Result<()> {
        sink.write_string(LengthPrefix::VarInt, self)
    }
}

/// Length-prefixed frame reader and writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthFraming {
    max_frame_length: usize,
}

impl LengthFraming {
    /// Limits above what the 32-bit prefix can express are clamped
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: max_frame_length.min(u32::MAX as usize),
        }
    }

    pub fn from_config(config: &FramingConfig) -> Self {
        Self::new(config.max_frame_length)
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Length of the next frame body, or `None` when the header is incomplete
    pub fn peek_length(&self, cursor: &BinaryCursor<'_>) -> Result<Option<usize>> {
        let Ok(length) = cursor.peek_u32() else {
            return Ok(None);
        };
        let length = length as usize;
        if length > self.max_frame_length {
            return Err(ProtocolError::LimitExceeded {
                limit: self.max_frame_length,
                actual: length,
            });
        }
        Ok(Some(length))
    }

    /// Read one frame, returning its id and a cursor over its body.
    ///
    /// `Ok(None)` means the frame is not complete yet; the cursor is untouched then.
    pub fn read_frame<'a, K: WireId>(
        &self,
        cursor: &mut BinaryCursor<'a>,
    ) -> Result<Option<(K, BinaryCursor<'a>)>> {
        let Some(length) = self.peek_length(cursor)? else {
            return Ok(None);
        };
        if cursor.remaining() < FRAME_HEADER_LEN + length {
            return Ok(None);
        }
        cursor.skip(FRAME_HEADER_LEN)?;
        let mut frame = cursor.read_slice(length)?;
        let id = K::read_id(&mut frame)?;
        Ok(Some((id, frame)))
    }

    /// Write the length header, `id`, then whatever `body` writes
    pub fn write_frame<K, F>(&self, sink: &mut BinarySink<'_>, id: &K, body: F) -> Result<()>
    where
        K: WireId,
        F: FnOnce(&mut BinarySink<'_>) -> Result<()>,
    {
        let header = sink.reserve(FRAME_HEADER_LEN)?;
        let start = sink.len();
        let written = id
            .write_id(sink)
            .and_then(|_| body(sink))
            .map(|_| sink.len() - start);

        match written {
            Ok(length) if length <= self.max_frame_length => {
                sink.fill_reserved(header, |slot| slot.write_u32(length as u32))
            }
            Ok(length) => {
                sink.complete(header);
                Err(ProtocolError::LimitExceeded {
                    limit: self.max_frame_length,
                    actual: length,
                })
            }
            Err(e) => {
                sink.complete(header);
                Err(e)
            }
        }
    }
}

impl Default for LengthFraming {
    fn default() -> Self {
        Self::new(MAX_FRAME_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ByteSequence, GrowableBuffer};
    use bytes::Bytes;

    fn frame<K: WireId>(framing: &LengthFraming, id: &K, body: &[u8]) -> Bytes {
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        framing
            .write_frame(&mut sink, id, |s| s.write_bytes(body))
            .unwrap();
        sink.release(false).unwrap();
        drop(sink);
        buffer.freeze()
    }

    #[test]
    fn test_frame_layout() {
        let bytes = frame(&LengthFraming::default(), &0x0102u16, b"xyz");
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 5, 0x01, 0x02, b'x', b'y', b'z']);
    }

    #[test]
    fn test_read_frame_string_id() {
        let framing = LengthFraming::default();
        let bytes = frame(&framing, &"chat".to_string(), b"hello");
        let seq = ByteSequence::from(bytes);
        let mut cursor = seq.cursor();
        let (id, mut body) = framing.read_frame::<String>(&mut cursor).unwrap().unwrap();
        assert_eq!(id, "chat");
        assert_eq!(body.read_bytes(5).unwrap().as_ref(), b"hello");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_partial_frame_leaves_cursor() {
        let framing = LengthFraming::default();
        let bytes = frame(&framing, &7u8, b"abcdef");
        let seq = ByteSequence::from(bytes.slice(..6));
        let mut cursor = seq.cursor();
        assert!(framing.read_frame::<u8>(&mut cursor).unwrap().is_none());
        assert_eq!(cursor.consumed(), 0);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let framing = LengthFraming::new(4);
        let seq = ByteSequence::from(vec![0, 0, 0, 9, 1, 2, 3]);
        assert!(matches!(
            framing.read_frame::<u8>(&mut seq.cursor()),
            Err(ProtocolError::LimitExceeded { limit: 4, actual: 9 })
        ));

        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        let result = framing.write_frame(&mut sink, &1u8, |s| s.write_u64(0));
        assert!(matches!(result, Err(ProtocolError::LimitExceeded { .. })));
    }
}
