//! # Binary Cursor
//!
//! Zero-copy, forward-only decoder over a chunked [`ByteSequence`](super::ByteSequence).
//!
//! ## Wire Conventions
//! - Multi-byte integers are big-endian unless the method name ends in `_le`
//! - Floats are the same-width integer bit pattern
//! - Booleans are one byte, `1` is the only canonical true
//! - Variable-length integers are base-128, least-significant group first
//!
//! ## Failure Behavior
//! Consuming reads return [`ProtocolError::OutOfRange`] when too few bytes remain.
//! `try_*` reads return `None` instead and never move the cursor on failure, including
//! the multi-byte variable-length integer reads.
//!
//! ## Slices
//! [`BinaryCursor::read_slice`] returns an independent cursor over a prefix of the
//! remaining bytes and moves the parent past it. Both borrow the same chunks.

use std::cmp::Ordering;

use bytes::{Bytes, BytesMut};

use super::text::{TextEncoding, UTF8};
use super::varint::{
    CONTINUATION, MAX_VARINT32_LEN, MAX_VARINT64_LEN, VALUE_MASK, VARINT32_LAST_MAX,
    VARINT64_LAST_MAX,
};
use crate::config::CodecConfig;
use crate::error::{constants, ProtocolError, Result};

/// Multi-chunk reads shorter than this are gathered on the stack
pub const STACK_COPY_LIMIT: usize = 128;

/// Width of the length prefix in front of a string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    U8,
    U16,
    U32,
    /// Variable-length 32-bit integer
    VarInt,
}

impl LengthPrefix {
    /// Largest byte length the prefix can express
    pub fn max_len(self) -> usize {
        match self {
            LengthPrefix::U8 => u8::MAX as usize,
            LengthPrefix::U16 => u16::MAX as usize,
            LengthPrefix::U32 | LengthPrefix::VarInt => u32::MAX as usize,
        }
    }
}

/// Encoding and length guard applied to string reads and writes
#[derive(Clone, Copy)]
pub struct TextOptions<'e> {
    pub encoding: &'e dyn TextEncoding,
    pub max_len: Option<usize>,
}

impl<'e> TextOptions<'e> {
    pub fn new(encoding: &'e dyn TextEncoding) -> Self {
        Self {
            encoding,
            max_len: None,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// UTF-8 with the configured default guard
    pub fn from_config(config: &CodecConfig) -> TextOptions<'static> {
        TextOptions {
            encoding: &UTF8,
            max_len: config.max_text_length,
        }
    }

    #[inline]
    pub(crate) fn check(&self, len: usize) -> Result<()> {
        match self.max_len {
            Some(limit) if len > limit => Err(ProtocolError::LimitExceeded { limit, actual: len }),
            _ => Ok(()),
        }
    }
}

impl Default for TextOptions<'static> {
    fn default() -> Self {
        TextOptions::new(&UTF8)
    }
}

impl std::fmt::Debug for TextOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextOptions")
            .field("encoding", &self.encoding.name())
            .field("max_len", &self.max_len)
            .finish()
    }
}

/// Forward-only decoder over borrowed chunks.
///
/// Cloning is cheap and yields an independent cursor at the same position, which is
/// how callers retry a read against partial data.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    chunks: &'a [Bytes],
    index: usize,
    offset: usize,
    consumed: usize,
    remaining: usize,
}

macro_rules! fixed_width_reads {
    ($($read:ident, $try_read:ident, $peek:ident => $ty:ty, $convert:ident;)*) => {
        $(
            #[doc = concat!("Read a `", stringify!($ty), "`.")]
            #[inline]
            pub fn $read(&mut self) -> Result<$ty> {
                self.read_array::<{ std::mem::size_of::<$ty>() }>()
                    .map(<$ty>::$convert)
            }

            #[doc = concat!("Read a `", stringify!($ty), "`, or `None` without moving when too few bytes remain.")]
            #[inline]
            pub fn $try_read(&mut self) -> Option<$ty> {
                self.$read().ok()
            }

            #[doc = concat!("Decode the next `", stringify!($ty), "` without consuming it.")]
            #[inline]
            pub fn $peek(&self) -> Result<$ty> {
                self.clone().$read()
            }
        )*
    };
}

impl<'a> BinaryCursor<'a> {
    /// Cursor over every byte of `chunks`
    pub fn new(chunks: &'a [Bytes]) -> Self {
        let remaining = chunks.iter().map(Bytes::len).sum();
        let mut cursor = Self {
            chunks,
            index: 0,
            offset: 0,
            consumed: 0,
            remaining,
        };
        cursor.skip_exhausted();
        cursor
    }

    /// Cursor over a single contiguous buffer
    pub fn from_bytes(bytes: &'a Bytes) -> Self {
        Self::new(std::slice::from_ref(bytes))
    }

    /// Bytes read so far
    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Size of the window this cursor was created over
    #[inline]
    pub fn len(&self) -> usize {
        self.consumed + self.remaining
    }

    /// True once every byte has been read
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Upcoming bytes that can be read without crossing a chunk boundary
    #[inline]
    pub fn segment(&self) -> &'a [u8] {
        if self.remaining == 0 {
            return &[];
        }
        let chunks = self.chunks;
        let chunk: &'a [u8] = &chunks[self.index][self.offset..];
        &chunk[..chunk.len().min(self.remaining)]
    }

    /// Move past `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.advance_unchecked(count);
        Ok(())
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.remaining {
            Err(ProtocolError::out_of_range(needed, self.remaining))
        } else {
            Ok(())
        }
    }

    #[inline]
    fn skip_exhausted(&mut self) {
        while self.index < self.chunks.len() && self.offset >= self.chunks[self.index].len() {
            self.index += 1;
            self.offset = 0;
        }
    }

    /// Caller guarantees `count <= remaining`
    #[inline]
    pub(crate) fn advance_unchecked(&mut self, count: usize) {
        debug_assert!(count <= self.remaining);
        self.consumed += count;
        self.remaining -= count;

        let mut left = count;
        while left > 0 {
            let available = self.chunks[self.index].len() - self.offset;
            if left < available {
                self.offset += left;
                left = 0;
            } else {
                left -= available;
                self.index += 1;
                self.offset = 0;
            }
        }
        self.skip_exhausted();
    }

    /// Caller guarantees `dst.len() <= remaining`
    fn copy_into(&mut self, dst: &mut [u8]) {
        let mut filled = 0;
        while filled < dst.len() {
            let segment = self.segment();
            let n = segment.len().min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&segment[..n]);
            self.advance_unchecked(n);
            filled += n;
        }
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        let segment = self.segment();
        if segment.len() >= N {
            out.copy_from_slice(&segment[..N]);
            self.advance_unchecked(N);
        } else {
            self.copy_into(&mut out);
        }
        Ok(out)
    }

    /// Run `f` over the next `count` bytes as one contiguous slice, then consume them.
    ///
    /// Single-chunk data is borrowed in place; data spanning chunks is gathered on the
    /// stack below [`STACK_COPY_LIMIT`] bytes and on the heap otherwise.
    fn with_contiguous<R>(&mut self, count: usize, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.ensure(count)?;
        let segment = self.segment();
        if segment.len() >= count {
            let out = f(&segment[..count]);
            self.advance_unchecked(count);
            return Ok(out);
        }
        if count < STACK_COPY_LIMIT {
            let mut buf = [0u8; STACK_COPY_LIMIT];
            self.copy_into(&mut buf[..count]);
            Ok(f(&buf[..count]))
        } else {
            let mut buf = vec![0u8; count];
            self.copy_into(&mut buf);
            Ok(f(&buf))
        }
    }

    fixed_width_reads! {
        read_u8, try_read_u8, peek_u8 => u8, from_be_bytes;
        read_i8, try_read_i8, peek_i8 => i8, from_be_bytes;
        read_u16, try_read_u16, peek_u16 => u16, from_be_bytes;
        read_i16, try_read_i16, peek_i16 => i16, from_be_bytes;
        read_u32, try_read_u32, peek_u32 => u32, from_be_bytes;
        read_i32, try_read_i32, peek_i32 => i32, from_be_bytes;
        read_u64, try_read_u64, peek_u64 => u64, from_be_bytes;
        read_i64, try_read_i64, peek_i64 => i64, from_be_bytes;
        read_u16_le, try_read_u16_le, peek_u16_le => u16, from_le_bytes;
        read_u32_le, try_read_u32_le, peek_u32_le => u32, from_le_bytes;
        read_u64_le, try_read_u64_le, peek_u64_le => u64, from_le_bytes;
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    #[inline]
    pub fn try_read_f32(&mut self) -> Option<f32> {
        self.try_read_u32().map(f32::from_bits)
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_u64().map(f64::from_bits)
    }

    #[inline]
    pub fn try_read_f64(&mut self) -> Option<f64> {
        self.try_read_u64().map(f64::from_bits)
    }

    /// One byte; only `1` decodes as true
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|b| b == 1)
    }

    #[inline]
    pub fn try_read_bool(&mut self) -> Option<bool> {
        self.try_read_u8().map(|b| b == 1)
    }

    /// Decode the next boolean without consuming it
    #[inline]
    pub fn peek_bool(&self) -> Result<bool> {
        self.peek_u8().map(|b| b == 1)
    }

    fn read_varint(&mut self, max_len: usize, last_max: u8, overflow: &str) -> Result<u64> {
        let mut value = 0u64;
        for index in 0..max_len {
            let byte = self.read_u8()?;
            let shift = 7 * index as u32;
            if index == max_len - 1 {
                if byte > last_max {
                    return Err(ProtocolError::malformed(overflow));
                }
                return Ok(value | (u64::from(byte) << shift));
            }
            value |= u64::from(byte & VALUE_MASK) << shift;
            if byte & CONTINUATION == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::malformed(overflow))
    }

    /// Variable-length integer of at most 32 bits.
    ///
    /// Errors with [`ProtocolError::Malformed`] when the 5th byte carries more than 4 bits.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        self.read_varint(
            MAX_VARINT32_LEN,
            VARINT32_LAST_MAX,
            constants::ERR_VARINT32_OVERFLOW,
        )
        .map(|v| v as u32)
    }

    /// Variable-length integer of at most 64 bits.
    ///
    /// Errors with [`ProtocolError::Malformed`] when the 10th byte carries more than 1 bit.
    pub fn read_varint_u64(&mut self) -> Result<u64> {
        self.read_varint(
            MAX_VARINT64_LEN,
            VARINT64_LAST_MAX,
            constants::ERR_VARINT64_OVERFLOW,
        )
    }

    /// Atomic: on failure no bytes are consumed
    pub fn try_read_varint_u32(&mut self) -> Option<u32> {
        let mut probe = self.clone();
        let value = probe.read_varint_u32().ok()?;
        *self = probe;
        Some(value)
    }

    /// Atomic: on failure no bytes are consumed
    pub fn try_read_varint_u64(&mut self) -> Option<u64> {
        let mut probe = self.clone();
        let value = probe.read_varint_u64().ok()?;
        *self = probe;
        Some(value)
    }

    /// Next `count` bytes; zero-copy when they sit in one chunk
    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
        self.ensure(count)?;
        if count == 0 {
            return Ok(Bytes::new());
        }
        if self.segment().len() >= count {
            let bytes = self.chunks[self.index].slice(self.offset..self.offset + count);
            self.advance_unchecked(count);
            return Ok(bytes);
        }
        let mut joined = BytesMut::zeroed(count);
        self.copy_into(&mut joined);
        Ok(joined.freeze())
    }

    /// Fill `dst` from the upcoming bytes
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure(dst.len())?;
        self.copy_into(dst);
        Ok(())
    }

    /// Independent cursor over the next `count` bytes; `self` moves past them
    pub fn read_slice(&mut self, count: usize) -> Result<BinaryCursor<'a>> {
        self.ensure(count)?;
        let slice = BinaryCursor {
            chunks: self.chunks,
            index: self.index,
            offset: self.offset,
            consumed: 0,
            remaining: count,
        };
        self.advance_unchecked(count);
        Ok(slice)
    }

    fn read_prefix(&mut self, prefix: LengthPrefix) -> Result<usize> {
        Ok(match prefix {
            LengthPrefix::U8 => self.read_u8()? as usize,
            LengthPrefix::U16 => self.read_u16()? as usize,
            LengthPrefix::U32 => self.read_u32()? as usize,
            LengthPrefix::VarInt => self.read_varint_u32()? as usize,
        })
    }

    /// Length-prefixed string; the guard applies to the encoded byte length
    pub fn read_text(&mut self, prefix: LengthPrefix, options: &TextOptions<'_>) -> Result<String> {
        let len = self.read_prefix(prefix)?;
        options.check(len)?;
        let encoding = options.encoding;
        self.with_contiguous(len, |bytes| encoding.decode(bytes))?
    }

    /// Length-prefixed UTF-8 string without a length guard
    pub fn read_string(&mut self, prefix: LengthPrefix) -> Result<String> {
        self.read_text(prefix, &TextOptions::default())
    }

    /// String terminated by `delimiter`; the delimiter is consumed but not returned
    pub fn read_delimited_text(
        &mut self,
        delimiter: &[u8],
        options: &TextOptions<'_>,
    ) -> Result<String> {
        if delimiter.is_empty() {
            return Err(ProtocolError::malformed(constants::ERR_EMPTY_DELIMITER));
        }
        match self.position_of(delimiter, options.max_len) {
            Some(len) => {
                let encoding = options.encoding;
                let text = self.with_contiguous(len, |bytes| encoding.decode(bytes))??;
                self.advance_unchecked(delimiter.len());
                Ok(text)
            }
            None => match options.max_len {
                Some(limit) if self.remaining >= limit + delimiter.len() => {
                    Err(ProtocolError::LimitExceeded {
                        limit,
                        actual: limit + 1,
                    })
                }
                _ => Err(ProtocolError::out_of_range(
                    self.remaining + 1,
                    self.remaining,
                )),
            },
        }
    }

    /// Offset of the first occurrence of `pattern` in the remaining bytes.
    ///
    /// With a `limit`, only matches starting at or before `limit` are found.
    pub fn position_of(&self, pattern: &[u8], limit: Option<usize>) -> Option<usize> {
        if pattern.is_empty() {
            return Some(0);
        }
        let scan_end = limit.map_or(self.remaining, |l| {
            l.saturating_add(pattern.len()).min(self.remaining)
        });
        let segment = self.segment();
        if segment.len() >= scan_end {
            return segment[..scan_end]
                .windows(pattern.len())
                .position(|window| window == pattern);
        }

        let mut probe = self.clone();
        let mut offset = 0;
        while offset + pattern.len() <= scan_end {
            if probe.starts_with(pattern) {
                return Some(offset);
            }
            probe.advance_unchecked(1);
            offset += 1;
        }
        None
    }

    /// True when the upcoming bytes equal `pattern`; never consumes
    pub fn starts_with(&self, pattern: &[u8]) -> bool {
        if pattern.len() > self.remaining {
            return false;
        }
        let segment = self.segment();
        if segment.len() >= pattern.len() {
            return &segment[..pattern.len()] == pattern;
        }
        self.clone()
            .with_contiguous(pattern.len(), |upcoming| upcoming == pattern)
            .unwrap_or(false)
    }

    /// Three-way comparison of the upcoming bytes against `pattern`; never consumes.
    ///
    /// When fewer than `pattern.len()` bytes remain, the shorter run orders first.
    pub fn compare(&self, pattern: &[u8]) -> Ordering {
        let n = pattern.len().min(self.remaining);
        let segment = self.segment();
        if segment.len() >= n {
            return segment[..n].cmp(pattern);
        }
        self.clone()
            .with_contiguous(n, |upcoming| upcoming.cmp(pattern))
            .unwrap_or(Ordering::Less)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::text::Latin1;
    use crate::core::ByteSequence;

    fn split(data: &'static [u8], at: &[usize]) -> ByteSequence {
        let mut chunks = Vec::new();
        let mut last = 0;
        for &cut in at {
            chunks.push(Bytes::from_static(&data[last..cut]));
            last = cut;
        }
        chunks.push(Bytes::from_static(&data[last..]));
        ByteSequence::from_chunks(chunks)
    }

    #[test]
    fn test_big_endian_reads_across_chunks() {
        let seq = split(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], &[1, 3]);
        let mut cursor = seq.cursor();
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 0x5678_9ABC);
        assert!(cursor.is_empty());
        assert_eq!(cursor.consumed(), 6);
    }

    #[test]
    fn test_little_endian_read() {
        let seq = ByteSequence::from(vec![0x34, 0x12]);
        assert_eq!(seq.cursor().read_u16_le().unwrap(), 0x1234);
    }

    #[test]
    fn test_consumed_plus_remaining_is_constant() {
        let seq = split(&[1, 2, 3, 4, 5, 6, 7, 8], &[3, 5]);
        let mut cursor = seq.cursor();
        let total = cursor.len();
        while cursor.try_read_u8().is_some() {
            assert_eq!(cursor.consumed() + cursor.remaining(), total);
        }
    }

    #[test]
    fn test_try_read_leaves_cursor_unchanged() {
        let seq = ByteSequence::from(vec![0xAA, 0xBB, 0xCC]);
        let mut cursor = seq.cursor();
        assert_eq!(cursor.try_read_u32(), None);
        assert_eq!(cursor.consumed(), 0);
        assert_eq!(cursor.try_read_u16(), Some(0xAABB));
    }

    #[test]
    fn test_out_of_range_reports_sizes() {
        let seq = ByteSequence::from(vec![0x01]);
        let err = seq.cursor().read_u64().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::OutOfRange {
                needed: 8,
                remaining: 1
            }
        ));
    }

    #[test]
    fn test_bool_canonical_true() {
        let seq = ByteSequence::from(vec![1, 0, 2]);
        let mut cursor = seq.cursor();
        assert!(cursor.read_bool().unwrap());
        assert!(!cursor.read_bool().unwrap());
        assert!(!cursor.read_bool().unwrap());
    }

    #[test]
    fn test_peek_bool_does_not_consume() {
        let seq = ByteSequence::from(vec![1]);
        let cursor = seq.cursor();
        assert!(cursor.peek_bool().unwrap());
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_float_bit_patterns() {
        let mut raw = 1.5f32.to_bits().to_be_bytes().to_vec();
        raw.extend_from_slice(&(-2.25f64).to_bits().to_be_bytes());
        let seq = ByteSequence::from(raw);
        let mut cursor = seq.cursor();
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
        assert_eq!(cursor.read_f64().unwrap(), -2.25);
    }

    #[test]
    fn test_varint_300() {
        let seq = ByteSequence::from(vec![0xAC, 0x02]);
        assert_eq!(seq.cursor().read_varint_u32().unwrap(), 300);
    }

    #[test]
    fn test_varint64_tenth_byte_overflow() {
        let seq = ByteSequence::from(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02]);
        assert!(matches!(
            seq.cursor().read_varint_u64(),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_varint32_fifth_byte_overflow() {
        let ok = ByteSequence::from(vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(ok.cursor().read_varint_u32().unwrap(), u32::MAX);

        let bad = ByteSequence::from(vec![0xFF, 0xFF, 0xFF, 0xFF, 0x10]);
        assert!(matches!(
            bad.cursor().read_varint_u32(),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_try_varint_is_atomic() {
        let seq = ByteSequence::from(vec![0x80, 0x80]);
        let mut cursor = seq.cursor();
        assert_eq!(cursor.try_read_varint_u32(), None);
        assert_eq!(cursor.consumed(), 0);
        assert!(cursor.read_varint_u32().is_err());
    }

    #[test]
    fn test_slice_is_independent() {
        let seq = split(b"abcdefgh", &[2, 5]);
        let mut cursor = seq.cursor();
        cursor.skip(1).unwrap();
        let mut slice = cursor.read_slice(4).unwrap();
        assert_eq!(cursor.consumed(), 5);
        assert_eq!(slice.len(), 4);
        assert_eq!(slice.read_bytes(4).unwrap().as_ref(), b"bcde");
        assert!(slice.read_u8().is_err());
        assert_eq!(cursor.read_u8().unwrap(), b'f');
    }

    #[test]
    fn test_read_bytes_single_chunk_is_zero_copy() {
        let bytes = Bytes::from(vec![9u8; 32]);
        let mut cursor = BinaryCursor::from_bytes(&bytes);
        cursor.skip(4).unwrap();
        let slice = cursor.read_bytes(8).unwrap();
        assert_eq!(slice.as_ptr(), bytes[4..].as_ptr());
    }

    #[test]
    fn test_prefixed_strings() {
        let mut raw = vec![5];
        raw.extend_from_slice(b"hello");
        raw.extend_from_slice(&[0x00, 0x02]);
        raw.extend_from_slice(b"hi");
        raw.push(3);
        raw.extend_from_slice(b"abc");
        let seq = ByteSequence::from(raw);
        let mut cursor = seq.cursor();
        assert_eq!(cursor.read_string(LengthPrefix::U8).unwrap(), "hello");
        assert_eq!(cursor.read_string(LengthPrefix::U16).unwrap(), "hi");
        assert_eq!(cursor.read_string(LengthPrefix::VarInt).unwrap(), "abc");
    }

    #[test]
    fn test_text_limit() {
        let mut raw = vec![5];
        raw.extend_from_slice(b"hello");
        let seq = ByteSequence::from(raw);
        let options = TextOptions::default().with_max_len(4);
        assert!(matches!(
            seq.cursor().read_text(LengthPrefix::U8, &options),
            Err(ProtocolError::LimitExceeded { limit: 4, actual: 5 })
        ));
    }

    #[test]
    fn test_text_across_chunks_with_latin1() {
        let seq = split(&[4, b'c', b'a', b'f', 0xE9], &[2]);
        let options = TextOptions::new(&Latin1);
        assert_eq!(
            seq.cursor().read_text(LengthPrefix::U8, &options).unwrap(),
            "café"
        );
    }

    #[test]
    fn test_delimited_text() {
        let seq = split(b"GET /index\r\nrest", &[3, 11]);
        let mut cursor = seq.cursor();
        let line = cursor
            .read_delimited_text(b"\r\n", &TextOptions::default())
            .unwrap();
        assert_eq!(line, "GET /index");
        assert!(cursor.starts_with(b"rest"));
    }

    #[test]
    fn test_delimited_text_guard_and_missing_delimiter() {
        let seq = ByteSequence::from(&b"abcdefgh"[..]);
        let guarded = TextOptions::default().with_max_len(3);
        assert!(matches!(
            seq.cursor().read_delimited_text(b";", &guarded),
            Err(ProtocolError::LimitExceeded { limit: 3, .. })
        ));
        assert!(matches!(
            seq.cursor().read_delimited_text(b";", &TextOptions::default()),
            Err(ProtocolError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_compare_across_chunks() {
        let seq = split(b"MAGIC1", &[2, 3]);
        let cursor = seq.cursor();
        assert!(cursor.starts_with(b"MAGIC"));
        assert_eq!(cursor.compare(b"MAGIC"), Ordering::Equal);
        assert_eq!(cursor.compare(b"MAGID"), Ordering::Less);
        assert_eq!(cursor.compare(b"MAGIB"), Ordering::Greater);
        assert_eq!(cursor.consumed(), 0);
    }

    #[test]
    fn test_compare_long_pattern_uses_heap_path() {
        let data: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        let seq = ByteSequence::from_chunks([
            Bytes::copy_from_slice(&data[..100]),
            Bytes::copy_from_slice(&data[100..]),
        ]);
        let cursor = seq.cursor();
        assert!(cursor.starts_with(&data[..200]));
        assert_eq!(cursor.compare(&data), Ordering::Equal);
    }
}
