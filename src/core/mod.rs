//! # Core Codec Components
//!
//! Zero-copy binary reading and writing over chunked byte buffers.
//!
//! This module provides the foundation every other layer builds on: decoders read
//! through a [`BinaryCursor`], encoders write through a [`BinarySink`].
//!
//! ## Components
//! - **ByteSequence**: chunked, reference-counted transport payload
//! - **BinaryCursor**: forward-only decoder with slices, varints and text
//! - **BinarySink**: append-only encoder over pluggable destinations with reserved slices
//! - **TextEncoding**: UTF-8 and Latin-1 string codecs
//! - **LengthFraming / FrameCodec**: length-prefixed frames keyed by a wire id
//!
//! ## Byte Order
//! Big-endian unless the operation name ends in `_le`.
//!
//! ## Security
//! - Every read is bounds-checked before any allocation
//! - Text and frame lengths can be capped through configuration

pub mod codec;
pub mod cursor;
pub mod framing;
pub mod sequence;
pub mod sink;
pub mod text;
pub mod varint;

pub use cursor::{BinaryCursor, LengthPrefix, TextOptions, STACK_COPY_LIMIT};
pub use framing::{LengthFraming, PacketId, WireId, FRAME_HEADER_LEN};
pub use sequence::ByteSequence;
pub use sink::{BinarySink, BufferDestination, FixedBuffer, GrowableBuffer, IoDestination, Reservation};
pub use text::{Latin1, TextEncoding, Utf8, UTF8};
