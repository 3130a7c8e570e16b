//! # Configuration Management
//!
//! Centralized configuration for the codec and framing layers.
//!
//! The engine itself has no global state; a loaded [`EngineConfig`] is handed to the
//! pieces that need it (`GrowableBuffer::with_config`, `LengthFraming::from_config`,
//! `TextOptions::from_config`).
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - Environment variables prefixed `PACKET_ENGINE_` via `from_env()`
//! - Direct instantiation with defaults
//!
//! ## Security Considerations
//! - The default frame limit (16 MB) bounds memory a single peer can make us buffer
//! - Text reads are unbounded unless `max_text_length` is set

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Max allowed frame size for the length-prefixed framing (16 MB)
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Smallest region a growable sink destination requests at a time
pub const DEFAULT_SINK_CHUNK_SIZE: usize = 512;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "PACKET_ENGINE_";

/// Main engine configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cursor and sink settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Length-prefixed framing settings
    #[serde(default)]
    pub framing: FramingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Recognized: `PACKET_ENGINE_MAX_TEXT_LENGTH`, `PACKET_ENGINE_SINK_CHUNK_SIZE`,
    /// `PACKET_ENGINE_MAX_FRAME_LENGTH`. Unparseable values are a `ConfigError`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    /// Overrides from an arbitrary variable lookup, keyed without the prefix
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("MAX_TEXT_LENGTH") {
            config.codec.max_text_length = Some(parse_var("MAX_TEXT_LENGTH", &value)?);
        }

        if let Some(value) = lookup("SINK_CHUNK_SIZE") {
            config.codec.sink_chunk_size = parse_var("SINK_CHUNK_SIZE", &value)?;
        }

        if let Some(value) = lookup("MAX_FRAME_LENGTH") {
            config.framing.max_frame_length = parse_var("MAX_FRAME_LENGTH", &value)?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.codec.validate());
        errors.extend(self.framing.validate());

        if let Some(max_text) = self.codec.max_text_length {
            if max_text > self.framing.max_frame_length {
                errors.push(format!(
                    "Max text length {max_text} exceeds max frame length {}",
                    self.framing.max_frame_length
                ));
            }
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_var(name: &str, value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|e| {
        ProtocolError::ConfigError(format!("Invalid value for {ENV_PREFIX}{name}: '{value}' ({e})"))
    })
}

/// Cursor and sink configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CodecConfig {
    /// Default guard applied to text reads and writes (`None` = unbounded)
    #[serde(default)]
    pub max_text_length: Option<usize>,

    /// Smallest region a growable destination requests at a time
    pub sink_chunk_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_text_length: None,
            sink_chunk_size: DEFAULT_SINK_CHUNK_SIZE,
        }
    }
}

impl CodecConfig {
    /// Validate codec configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.sink_chunk_size == 0 {
            errors.push("Sink chunk size must be greater than 0".to_string());
        } else if self.sink_chunk_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Sink chunk size too large: {} bytes (maximum recommended: 16 MB)",
                self.sink_chunk_size
            ));
        }

        if self.max_text_length == Some(0) {
            errors.push("Max text length must be greater than 0 when set".to_string());
        }

        errors
    }
}

/// Length-prefixed framing configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FramingConfig {
    /// Largest accepted id + body length in bytes
    pub max_frame_length: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

impl FramingConfig {
    /// Validate framing configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_length == 0 {
            errors.push("Max frame length cannot be 0".to_string());
        } else if self.max_frame_length > u32::MAX as usize {
            errors.push(format!(
                "Max frame length {} does not fit the 32-bit length prefix",
                self.max_frame_length
            ));
        } else if self.max_frame_length > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max frame length too large: {} bytes (maximum recommended: 100 MB)",
                self.max_frame_length
            ));
        }

        errors
    }
}
