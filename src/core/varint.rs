//! Base-128 variable-length integers.
//!
//! Seven value bits per byte, least-significant group first, high bit set on every
//! byte except the last. The terminal byte of a maximum-length encoding may only carry
//! the bits that still fit the target width: 4 bits for the 5th byte of a 32-bit value,
//! 1 bit for the 10th byte of a 64-bit value.

/// Maximum encoded length of a 32-bit value
pub const MAX_VARINT32_LEN: usize = 5;

/// Maximum encoded length of a 64-bit value
pub const MAX_VARINT64_LEN: usize = 10;

pub(crate) const CONTINUATION: u8 = 0x80;
pub(crate) const VALUE_MASK: u8 = 0x7F;

/// Largest terminal byte allowed at position [`MAX_VARINT32_LEN`]
pub(crate) const VARINT32_LAST_MAX: u8 = 0x0F;

/// Largest terminal byte allowed at position [`MAX_VARINT64_LEN`]
pub(crate) const VARINT64_LAST_MAX: u8 = 0x01;

/// Encode `value` into `buf`, returning the number of bytes used.
#[inline]
pub fn encode_u64(mut value: u64, buf: &mut [u8; MAX_VARINT64_LEN]) -> usize {
    let mut len = 0;
    while value >= u64::from(CONTINUATION) {
        buf[len] = (value as u8 & VALUE_MASK) | CONTINUATION;
        value >>= 7;
        len += 1;
    }
    buf[len] = value as u8;
    len + 1
}

/// Encode a 32-bit value; never longer than [`MAX_VARINT32_LEN`] bytes.
#[inline]
pub fn encode_u32(value: u32, buf: &mut [u8; MAX_VARINT64_LEN]) -> usize {
    encode_u64(u64::from(value), buf)
}

/// Number of bytes `value` occupies on the wire
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}
