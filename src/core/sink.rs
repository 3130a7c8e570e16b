//! # Binary Sink
//!
//! Append-only encoder over a pluggable [`BufferDestination`].
//!
//! ## Destinations
//! - [`GrowableBuffer`]: in-memory `BytesMut`, grows on demand
//! - [`FixedBuffer`]: externally supplied slice, overflow is [`ProtocolError::OutOfRange`]
//! - [`IoDestination`]: buffers committed bytes and writes them through on flush
//!
//! ## Chunks
//! The sink writes into the destination's active region. A write that does not fit
//! commits what has been written so far and requests a region at least as large as the
//! write. While a [`Reservation`] is outstanding the sink grows the region in place
//! instead of committing, so reserved bytes stay addressable.
//!
//! ## Lifecycle
//! The first region is acquired in [`BinarySink::new`]. [`BinarySink::release`] commits
//! pending bytes and optionally flushes; releasing twice, or writing after release,
//! returns [`ProtocolError::AlreadyReleased`]. A sink dropped without release still
//! commits its pending bytes but never flushes.
//!
//! ## Example
//! ```rust
//! use packet_engine::core::{BinarySink, GrowableBuffer, LengthPrefix};
//!
//! let mut buffer = GrowableBuffer::new();
//! let mut sink = BinarySink::new(&mut buffer)?;
//! let length = sink.reserve(2)?;
//! sink.write_string(LengthPrefix::U8, "ping")?;
//! let body = (sink.len() - 2) as u16;
//! sink.fill_reserved(length, |slot| slot.write_u16(body))?;
//! sink.release(false)?;
//! drop(sink);
//!
//! assert_eq!(buffer.as_slice(), &[0, 5, 4, b'p', b'i', b'n', b'g']);
//! # Ok::<(), packet_engine::error::ProtocolError>(())
//! ```

use std::io::Write;

use bytes::{Bytes, BytesMut};

use super::cursor::{BinaryCursor, LengthPrefix, TextOptions};
use super::sequence::ByteSequence;
use super::varint::{self, MAX_VARINT64_LEN};
use crate::config::{CodecConfig, DEFAULT_SINK_CHUNK_SIZE};
use crate::error::{constants, ProtocolError, Result};

/// Byte destination a [`BinarySink`] writes into.
///
/// The active region starts right after the committed bytes. Implementations must keep
/// uncommitted bytes in place when the region is re-requested.
pub trait BufferDestination {
    /// Make at least `min` writable bytes available and return the size of the active region
    fn request(&mut self, min: usize) -> Result<usize>;

    /// The active region
    fn active_mut(&mut self) -> &mut [u8];

    /// Mark the first `count` bytes of the active region as written
    fn commit(&mut self, count: usize);

    /// Push committed bytes to their final target
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Grow `buf` so at least `min` bytes follow `committed`
#[inline]
fn grow(buf_len: usize, committed: usize, min: usize, chunk_size: usize) -> Option<usize> {
    let available = buf_len - committed;
    if available >= min.max(1) {
        return None;
    }
    Some(committed + min.max(chunk_size).max(available * 2))
}

/// In-memory destination backed by `BytesMut`
#[derive(Debug)]
pub struct GrowableBuffer {
    buf: BytesMut,
    committed: usize,
    chunk_size: usize,
}

impl GrowableBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_SINK_CHUNK_SIZE)
    }

    /// Smallest region requested from the allocator
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            committed: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn with_config(config: &CodecConfig) -> Self {
        Self::with_chunk_size(config.sink_chunk_size)
    }

    /// Committed bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.committed]
    }

    pub fn len(&self) -> usize {
        self.committed
    }

    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// Committed bytes as an immutable buffer; uncommitted space is discarded
    pub fn freeze(mut self) -> Bytes {
        self.buf.truncate(self.committed);
        self.buf.freeze()
    }

    pub fn into_sequence(self) -> ByteSequence {
        ByteSequence::from(self.freeze())
    }
}

impl Default for GrowableBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferDestination for GrowableBuffer {
    fn request(&mut self, min: usize) -> Result<usize> {
        if let Some(target) = grow(self.buf.len(), self.committed, min, self.chunk_size) {
            self.buf.resize(target, 0);
        }
        Ok(self.buf.len() - self.committed)
    }

    fn active_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.committed..]
    }

    fn commit(&mut self, count: usize) {
        self.committed = (self.committed + count).min(self.buf.len());
    }
}

/// Destination over a caller-owned slice that never grows
#[derive(Debug)]
pub struct FixedBuffer<'a> {
    buf: &'a mut [u8],
    committed: usize,
}

impl<'a> FixedBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, committed: 0 }
    }

    /// Bytes committed so far
    pub fn written(&self) -> usize {
        self.committed
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl BufferDestination for FixedBuffer<'_> {
    fn request(&mut self, min: usize) -> Result<usize> {
        let available = self.buf.len() - self.committed;
        if available < min {
            return Err(ProtocolError::out_of_range(min, available));
        }
        Ok(available)
    }

    fn active_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.committed..]
    }

    fn commit(&mut self, count: usize) {
        self.committed = (self.committed + count).min(self.buf.len());
    }
}

/// Destination that stages bytes in memory and writes them to `W` on flush
#[derive(Debug)]
pub struct IoDestination<W: Write> {
    writer: W,
    buf: Vec<u8>,
    committed: usize,
    chunk_size: usize,
}

impl<W: Write> IoDestination<W> {
    pub fn new(writer: W) -> Self {
        Self::with_chunk_size(writer, DEFAULT_SINK_CHUNK_SIZE)
    }

    pub fn with_chunk_size(writer: W, chunk_size: usize) -> Self {
        Self {
            writer,
            buf: Vec::new(),
            committed: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Committed bytes not yet written through
    pub fn pending(&self) -> usize {
        self.committed
    }

    /// Unflushed bytes are discarded
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BufferDestination for IoDestination<W> {
    fn request(&mut self, min: usize) -> Result<usize> {
        if let Some(target) = grow(self.buf.len(), self.committed, min, self.chunk_size) {
            self.buf.resize(target, 0);
        }
        Ok(self.buf.len() - self.committed)
    }

    fn active_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.committed..]
    }

    fn commit(&mut self, count: usize) {
        self.committed = (self.committed + count).min(self.buf.len());
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.write_all(&self.buf[..self.committed])?;
        self.buf.drain(..self.committed);
        self.committed = 0;
        self.writer.flush()?;
        Ok(())
    }
}

/// A zero-filled region carved out of the sink for later patching.
///
/// Hand it back through [`BinarySink::fill_reserved`] or [`BinarySink::complete`].
#[must_use = "a reservation keeps the sink from committing until it is completed"]
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    start: usize,
    len: usize,
}

impl Reservation {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Append-only encoder; single-use and not shareable across threads.
pub struct BinarySink<'a> {
    dest: &'a mut dyn BufferDestination,
    room: usize,
    written: usize,
    length: usize,
    outstanding: usize,
    released: bool,
}

macro_rules! fixed_width_writes {
    ($($write:ident => $ty:ty, $convert:ident;)*) => {
        $(
            #[doc = concat!("Write a `", stringify!($ty), "`.")]
            #[inline]
            pub fn $write(&mut self, value: $ty) -> Result<()> {
                self.write_bytes(&value.$convert())
            }
        )*
    };
}

impl<'a> BinarySink<'a> {
    /// Acquire the first region of `dest`
    pub fn new(dest: &'a mut dyn BufferDestination) -> Result<Self> {
        let room = dest.request(0)?;
        Ok(Self {
            dest,
            room,
            written: 0,
            length: 0,
            outstanding: 0,
            released: false,
        })
    }

    /// Total bytes written through this sink
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure(&mut self, count: usize) -> Result<()> {
        if self.released {
            return Err(ProtocolError::AlreadyReleased);
        }
        if self.written + count <= self.room {
            return Ok(());
        }
        if self.outstanding == 0 {
            self.dest.commit(self.written);
            self.written = 0;
            self.room = self.dest.request(count)?;
        } else {
            self.room = self.dest.request(self.written + count)?;
        }
        Ok(())
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure(bytes.len())?;
        let start = self.written;
        self.dest.active_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();
        self.length += bytes.len();
        Ok(())
    }

    fixed_width_writes! {
        write_u8 => u8, to_be_bytes;
        write_i8 => i8, to_be_bytes;
        write_u16 => u16, to_be_bytes;
        write_i16 => i16, to_be_bytes;
        write_u32 => u32, to_be_bytes;
        write_i32 => i32, to_be_bytes;
        write_u64 => u64, to_be_bytes;
        write_i64 => i64, to_be_bytes;
        write_u16_le => u16, to_le_bytes;
        write_u32_le => u32, to_le_bytes;
        write_u64_le => u64, to_le_bytes;
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_u32(value.to_bits())
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_u64(value.to_bits())
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_varint_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT64_LEN];
        let len = varint::encode_u32(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    pub fn write_varint_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT64_LEN];
        let len = varint::encode_u64(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Copy every remaining byte of `cursor` segment by segment, consuming it
    pub fn write_cursor(&mut self, cursor: &mut BinaryCursor<'_>) -> Result<()> {
        while !cursor.is_empty() {
            let segment = cursor.segment();
            self.write_bytes(segment)?;
            cursor.advance_unchecked(segment.len());
        }
        Ok(())
    }

    fn write_prefix(&mut self, prefix: LengthPrefix, len: usize) -> Result<()> {
        if len > prefix.max_len() {
            return Err(ProtocolError::LimitExceeded {
                limit: prefix.max_len(),
                actual: len,
            });
        }
        match prefix {
            LengthPrefix::U8 => self.write_u8(len as u8),
            LengthPrefix::U16 => self.write_u16(len as u16),
            LengthPrefix::U32 => self.write_u32(len as u32),
            LengthPrefix::VarInt => self.write_varint_u32(len as u32),
        }
    }

    /// Length-prefixed string; the guard applies to the encoded byte length
    pub fn write_text(
        &mut self,
        prefix: LengthPrefix,
        text: &str,
        options: &TextOptions<'_>,
    ) -> Result<()> {
        let encoded = options.encoding.encode(text)?;
        options.check(encoded.len())?;
        self.write_prefix(prefix, encoded.len())?;
        self.write_bytes(&encoded)
    }

    /// Length-prefixed UTF-8 string without a length guard
    pub fn write_string(&mut self, prefix: LengthPrefix, text: &str) -> Result<()> {
        self.write_text(prefix, text, &TextOptions::default())
    }

    /// String followed by `delimiter`; text that contains the delimiter is rejected
    pub fn write_delimited_text(
        &mut self,
        text: &str,
        delimiter: &[u8],
        options: &TextOptions<'_>,
    ) -> Result<()> {
        if delimiter.is_empty() {
            return Err(ProtocolError::malformed(constants::ERR_EMPTY_DELIMITER));
        }
        let encoded = options.encoding.encode(text)?;
        options.check(encoded.len())?;
        if encoded.windows(delimiter.len()).any(|w| w == delimiter) {
            return Err(ProtocolError::malformed(constants::ERR_DELIMITER_IN_TEXT));
        }
        self.write_bytes(&encoded)?;
        self.write_bytes(delimiter)
    }

    /// Carve out `len` zero bytes to be patched later
    pub fn reserve(&mut self, len: usize) -> Result<Reservation> {
        self.ensure(len)?;
        let start = self.written;
        self.dest.active_mut()[start..start + len].fill(0);
        self.written += len;
        self.length += len;
        self.outstanding += 1;
        Ok(Reservation { start, len })
    }

    /// Direct access to a reserved region
    pub fn reserved_mut(&mut self, reservation: &Reservation) -> Result<&mut [u8]> {
        if self.released {
            return Err(ProtocolError::AlreadyReleased);
        }
        let end = reservation.start + reservation.len;
        if end > self.written {
            return Err(ProtocolError::out_of_range(end, self.written));
        }
        Ok(&mut self.dest.active_mut()[reservation.start..end])
    }

    /// Hand a reservation back once its bytes are final
    pub fn complete(&mut self, reservation: Reservation) {
        debug_assert!(reservation.start + reservation.len <= self.written || self.released);
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Write into a reserved region through a nested sink over a fixed buffer.
    ///
    /// The nested sink cannot grow: writing past the reservation is
    /// [`ProtocolError::OutOfRange`]. The reservation is completed either way.
    pub fn fill_reserved<F>(&mut self, reservation: Reservation, fill: F) -> Result<()>
    where
        F: FnOnce(&mut BinarySink<'_>) -> Result<()>,
    {
        let result = self.reserved_mut(&reservation).and_then(|region| {
            let mut fixed = FixedBuffer::new(region);
            let mut nested = BinarySink::new(&mut fixed)?;
            fill(&mut nested)?;
            nested.release(false)
        });
        self.complete(reservation);
        result
    }

    /// Commit pending bytes and optionally flush the destination
    pub fn release(&mut self, flush: bool) -> Result<()> {
        if self.released {
            return Err(ProtocolError::AlreadyReleased);
        }
        self.released = true;
        self.dest.commit(self.written);
        self.written = 0;
        self.room = 0;
        if flush {
            self.dest.flush()?;
        }
        Ok(())
    }
}

impl Drop for BinarySink<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.dest.commit(self.written);
        }
    }
}

impl std::fmt::Debug for BinarySink<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySink")
            .field("length", &self.length)
            .field("pending", &self.written)
            .field("room", &self.room)
            .field("outstanding", &self.outstanding)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::text::Latin1;

    fn encode(chunk_size: usize, write: impl FnOnce(&mut BinarySink<'_>) -> Result<()>) -> Bytes {
        let mut buffer = GrowableBuffer::with_chunk_size(chunk_size);
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        write(&mut sink).unwrap();
        sink.release(false).unwrap();
        drop(sink);
        buffer.freeze()
    }

    #[test]
    fn test_primitives_mirror_cursor() {
        let bytes = encode(4, |sink| {
            sink.write_u16(0xBEEF)?;
            sink.write_i32(-7)?;
            sink.write_u64_le(42)?;
            sink.write_f64(0.5)?;
            sink.write_bool(true)?;
            sink.write_varint_u64(u64::MAX)
        });
        let mut cursor = BinaryCursor::from_bytes(&bytes);
        assert_eq!(cursor.read_u16().unwrap(), 0xBEEF);
        assert_eq!(cursor.read_i32().unwrap(), -7);
        assert_eq!(cursor.read_u64_le().unwrap(), 42);
        assert_eq!(cursor.read_f64().unwrap(), 0.5);
        assert!(cursor.read_bool().unwrap());
        assert_eq!(cursor.read_varint_u64().unwrap(), u64::MAX);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_small_chunks_commit_and_grow() {
        let payload: Vec<u8> = (0..200u8).collect();
        let bytes = encode(3, |sink| {
            for byte in &payload {
                sink.write_u8(*byte)?;
            }
            sink.write_bytes(&payload)
        });
        assert_eq!(bytes.len(), 400);
        assert_eq!(&bytes[..200], payload.as_slice());
        assert_eq!(&bytes[200..], payload.as_slice());
    }

    #[test]
    fn test_fixed_buffer_overflow() {
        let mut storage = [0u8; 3];
        let mut fixed = FixedBuffer::new(&mut storage);
        let mut sink = BinarySink::new(&mut fixed).unwrap();
        sink.write_u16(1).unwrap();
        assert!(matches!(
            sink.write_u16(2),
            Err(ProtocolError::OutOfRange { needed: 2, .. })
        ));
    }

    #[test]
    fn test_reservation_survives_growth() {
        let bytes = encode(2, |sink| {
            let slot = sink.reserve(4)?;
            sink.write_bytes(&[7u8; 64])?;
            sink.fill_reserved(slot, |nested| nested.write_u32(64))
        });
        assert_eq!(bytes.len(), 68);
        assert_eq!(&bytes[..4], &64u32.to_be_bytes());
        assert!(bytes[4..].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_fill_reserved_is_bounded() {
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        let slot = sink.reserve(2).unwrap();
        let result = sink.fill_reserved(slot, |nested| nested.write_u32(1));
        assert!(matches!(result, Err(ProtocolError::OutOfRange { .. })));
    }

    #[test]
    fn test_reserved_mut_direct_patch() {
        let bytes = encode(16, |sink| {
            let slot = sink.reserve(1)?;
            sink.write_u8(0xFF)?;
            sink.reserved_mut(&slot)?[0] = 0x01;
            sink.complete(slot);
            Ok(())
        });
        assert_eq!(bytes.as_ref(), &[0x01, 0xFF]);
    }

    #[test]
    fn test_release_twice() {
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        sink.write_u8(1).unwrap();
        sink.release(false).unwrap();
        assert!(matches!(sink.release(false), Err(ProtocolError::AlreadyReleased)));
        assert!(matches!(sink.write_u8(2), Err(ProtocolError::AlreadyReleased)));
        drop(sink);
        assert_eq!(buffer.as_slice(), &[1]);
    }

    #[test]
    fn test_drop_commits_without_release() {
        let mut buffer = GrowableBuffer::new();
        {
            let mut sink = BinarySink::new(&mut buffer).unwrap();
            sink.write_u32(9).unwrap();
        }
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_write_cursor_copies_all_segments() {
        let source = ByteSequence::from_chunks([
            Bytes::from_static(b"ab"),
            Bytes::from_static(b"cde"),
        ]);
        let mut cursor = source.cursor();
        cursor.skip(1).unwrap();
        let bytes = encode(2, |sink| sink.write_cursor(&mut cursor));
        assert_eq!(bytes.as_ref(), b"bcde");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_io_destination_flush() {
        let mut dest = IoDestination::with_chunk_size(Vec::new(), 2);
        let mut sink = BinarySink::new(&mut dest).unwrap();
        sink.write_string(LengthPrefix::U8, "abc").unwrap();
        sink.release(true).unwrap();
        drop(sink);
        assert_eq!(dest.pending(), 0);
        assert_eq!(dest.into_inner(), vec![3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_delimited_text_rejects_embedded_delimiter() {
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        let result = sink.write_delimited_text("a;b", b";", &TextOptions::default());
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_text_guards() {
        let mut buffer = GrowableBuffer::new();
        let mut sink = BinarySink::new(&mut buffer).unwrap();
        let long = "x".repeat(300);
        assert!(matches!(
            sink.write_string(LengthPrefix::U8, &long),
            Err(ProtocolError::LimitExceeded { limit: 255, actual: 300 })
        ));
        let guarded = TextOptions::new(&Latin1).with_max_len(2);
        assert!(matches!(
            sink.write_text(LengthPrefix::U16, "abc", &guarded),
            Err(ProtocolError::LimitExceeded { limit: 2, actual: 3 })
        ));
    }
}
