//! # Byte Sequence
//!
//! An immutable, possibly multi-chunk run of bytes as delivered by a transport.
//!
//! Chunks are [`bytes::Bytes`] handles, so building, slicing and advancing a sequence
//! never copies payload data. A sequence is the inbound payload the byte-decoder stage
//! reacts to and the outbound payload the byte-encoder stage produces.

use bytes::{Buf, Bytes, BytesMut};

use super::cursor::BinaryCursor;

/// Chunked, reference-counted byte sequence.
#[derive(Debug, Clone, Default)]
pub struct ByteSequence {
    chunks: Vec<Bytes>,
    len: usize,
}

impl ByteSequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence from existing chunks; empty chunks are dropped.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut sequence = Self::new();
        for chunk in chunks {
            sequence.push(chunk);
        }
        sequence
    }

    /// Append a chunk to the end of the sequence
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Append every chunk of `other`, typically a newly received tail
    pub fn append(&mut self, other: ByteSequence) {
        for chunk in other.chunks {
            self.push(chunk);
        }
    }

    /// Total number of bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-empty chunks backing the sequence
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Forward-only decoder over the whole sequence
    pub fn cursor(&self) -> BinaryCursor<'_> {
        BinaryCursor::new(&self.chunks)
    }

    /// Drop the first `count` bytes without copying.
    ///
    /// Advancing past the end leaves the sequence empty.
    pub fn advance(&mut self, count: usize) {
        let mut left = count.min(self.len);
        self.len -= left;

        let mut drained = 0;
        for chunk in self.chunks.iter_mut() {
            if left == 0 {
                break;
            }
            if left >= chunk.len() {
                left -= chunk.len();
                drained += 1;
            } else {
                chunk.advance(left);
                left = 0;
            }
        }
        self.chunks.drain(..drained);
    }

    /// Contiguous view of the sequence; copies only when there is more than one chunk.
    pub fn to_bytes(&self) -> Bytes {
        match self.chunks.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => {
                let mut joined = BytesMut::with_capacity(self.len);
                for chunk in many {
                    joined.extend_from_slice(chunk);
                }
                joined.freeze()
            }
        }
    }

    /// Copy the content into a vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

impl From<Bytes> for ByteSequence {
    fn from(bytes: Bytes) -> Self {
        Self::from_chunks([bytes])
    }
}

impl From<BytesMut> for ByteSequence {
    fn from(bytes: BytesMut) -> Self {
        Self::from(bytes.freeze())
    }
}

impl From<Vec<u8>> for ByteSequence {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for ByteSequence {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from(Bytes::from_static(bytes))
    }
}

impl PartialEq for ByteSequence {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for ByteSequence {}
