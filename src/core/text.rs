//! Pluggable text encodings for length-prefixed and delimited strings.

use std::borrow::Cow;

use crate::error::{constants, ProtocolError, Result};

/// A text encoding used by the cursor and sink string operations.
pub trait TextEncoding: Send + Sync {
    /// Human-readable encoding name
    fn name(&self) -> &'static str;

    /// Decode wire bytes into a string
    fn decode(&self, bytes: &[u8]) -> Result<String>;

    /// Encode a string into wire bytes, borrowing when no conversion is needed
    fn encode<'t>(&self, text: &'t str) -> Result<Cow<'t, [u8]>>;
}

/// UTF-8, the default wire encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl TextEncoding for Utf8 {
    fn name(&self) -> &'static str {
        "UTF-8"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::malformed(constants::ERR_INVALID_UTF8))
    }

    #[inline]
    fn encode<'t>(&self, text: &'t str) -> Result<Cow<'t, [u8]>> {
        Ok(Cow::Borrowed(text.as_bytes()))
    }
}

/// ISO-8859-1: one byte per character, code points 0-255
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1;

impl TextEncoding for Latin1 {
    fn name(&self) -> &'static str {
        "ISO-8859-1"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    fn encode<'t>(&self, text: &'t str) -> Result<Cow<'t, [u8]>> {
        if text.is_ascii() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }
        text.chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect::<Option<Vec<u8>>>()
            .map(Cow::Owned)
            .ok_or_else(|| ProtocolError::malformed(constants::ERR_UNMAPPABLE_LATIN1))
    }
}

/// Shared default encoding instance
pub static UTF8: Utf8 = Utf8;
