//! Decode limits.

use serde::Deserialize;

use crate::{Error, Result};

/// Default maximum trigger nesting (outer trigger included).
pub const DEFAULT_MAX_TRIGGER_DEPTH: usize = 16;

/// Default maximum input size accepted by a single decode (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for decoding untrusted or persisted bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Deepest chain of triggers accepted (a composite wrapping a composite ...).
    pub max_trigger_depth: usize,
    /// Largest buffer a single decode call accepts.
    pub max_message_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_trigger_depth: DEFAULT_MAX_TRIGGER_DEPTH,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl CodecConfig {
    /// Parse a configuration from TOML. Missing keys keep their defaults.
    ///
    /// ```toml
    /// max_trigger_depth = 8
    /// max_message_size = 1048576
    /// ```
    ///
    /// # Errors
    /// Returns [`Error::Config`] on invalid TOML, unknown keys, or wrong types.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::config(e.to_string()))
    }

    /// Override the trigger depth limit.
    #[must_use]
    pub const fn with_max_trigger_depth(mut self, depth: usize) -> Self {
        self.max_trigger_depth = depth;
        self
    }

    /// Override the input size limit.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}
