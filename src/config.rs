//! Decoder configuration

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

/// Tuning knobs of a background decoder.
///
/// Missing fields fall back to their defaults when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Minimum ring capacity (fast buffers round it up to a power of two)
    pub buffer_size: usize,
    /// Slots kept free so consumers can peek without racing the producer
    pub lookahead: usize,
    /// Use the power-of-two ring variant
    pub fast_buffer: bool,
    /// Upper bound on waiting for the producer thread in `stop`
    pub join_timeout_ms: u64,
    /// Interval between buffer-full rechecks
    pub full_wait_ms: u64,
    /// Consecutive rejected packets before decoding is abandoned
    pub max_consecutive_rejections: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16,
            lookahead: 0,
            fast_buffer: false,
            join_timeout_ms: 2000,
            full_wait_ms: 100,
            max_consecutive_rejections: 10,
        }
    }
}

impl DecoderConfig {
    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the ring geometry: a non-empty buffer with at least one usable slot.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be > 0".into()));
        }
        if self.lookahead >= self.buffer_size {
            return Err(Error::Config(format!(
                "lookahead ({}) must be smaller than buffer_size ({})",
                self.lookahead, self.buffer_size
            )));
        }
        if self.max_consecutive_rejections == 0 {
            return Err(Error::Config(
                "max_consecutive_rejections must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn full_wait(&self) -> Duration {
        Duration::from_millis(self.full_wait_ms.max(1))
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_fast_buffer(mut self, fast: bool) -> Self {
        self.fast_buffer = fast;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
