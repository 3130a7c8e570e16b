//! # Error Types
//!
//! Error handling for the codec, the handler chain and the packet registry.
//!
//! Every fallible operation in the crate returns [`Result`], and every failure is one
//! variant of [`ProtocolError`].
//!
//! ## Error Categories
//! - **Codec Errors**: not enough bytes, malformed variable-length integers or text,
//!   caller-supplied limits exceeded
//! - **Registry Errors**: unresolvable ids or payload types, components that do not
//!   satisfy the capability they were registered for
//! - **Sink Errors**: writes after release, I/O failures while flushing
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! A codec error ends the current decode attempt. The transport that owns the
//! connection is expected to treat it as fatal for that connection only.
//!
//! ## Example Usage
//! ```rust
//! use packet_engine::core::ByteSequence;
//! use packet_engine::error::{ProtocolError, Result};
//!
//! fn read_opcode(bytes: &ByteSequence) -> Result<u16> {
//!     let mut cursor = bytes.cursor();
//!     cursor.read_u16()
//! }
//!
//! let short = ByteSequence::from(vec![0x01]);
//! assert!(matches!(
//!     read_opcode(&short),
//!     Err(ProtocolError::OutOfRange { needed: 2, remaining: 1 })
//! ));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Variable-length integer errors
    pub const ERR_VARINT32_OVERFLOW: &str = "variable-length integer overflows 32 bits";
    pub const ERR_VARINT64_OVERFLOW: &str = "variable-length integer overflows 64 bits";

    /// Text errors
    pub const ERR_INVALID_UTF8: &str = "text is not valid UTF-8";
    pub const ERR_UNMAPPABLE_LATIN1: &str = "text contains characters outside Latin-1";
    pub const ERR_DELIMITER_IN_TEXT: &str = "text contains its own delimiter";
    pub const ERR_EMPTY_DELIMITER: &str = "delimiter must not be empty";

    /// Pipeline errors
    pub const ERR_PIPELINE_LOCK: &str = "Failed to acquire pipeline mutation lock";

    /// Registry errors
    pub const ERR_REGISTRY_LOCK: &str = "Failed to acquire registry entry lock";
    pub const ERR_MISSING_ID: &str = "registration requires a wire identifier";
    pub const ERR_MISSING_PAYLOAD: &str = "registration requires a payload type";
}

/// ProtocolError is the primary error type for all engine operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Not enough remaining bytes (or room) for the requested operation.
    #[error("Out of range: needed {needed} bytes, {remaining} remaining")]
    OutOfRange { needed: usize, remaining: usize },

    /// Bytes that cannot be decoded, such as a variable-length integer whose
    /// terminal byte overflows the target width.
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// A caller-supplied maximum was exceeded.
    #[error("Limit exceeded: {actual} exceeds maximum of {limit}")]
    LimitExceeded { limit: usize, actual: usize },

    /// No parser or composer resolves for the requested id or payload type.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A sink was released twice or written to after release.
    #[error("Sink already released")]
    AlreadyReleased,

    /// A registered component does not satisfy the capability it was registered for.
    #[error("Registration conflict: {0}")]
    RegistrationConflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    #[inline]
    pub(crate) fn out_of_range(needed: usize, remaining: usize) -> Self {
        ProtocolError::OutOfRange { needed, remaining }
    }

    #[inline]
    pub(crate) fn malformed(reason: &str) -> Self {
        ProtocolError::Malformed(reason.to_string())
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
