//! Writer configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables (prefixed with `BLACKBOX_`)
//!
//! # Environment Variable Overrides
//!
//! Environment variables with the `BLACKBOX_` prefix can override
//! configuration values:
//!
//! ```text
//! BLACKBOX_BUFFER_CAPACITY=1048576
//! BLACKBOX_MIN_WRITE_CHUNK=8192
//! BLACKBOX_FSYNC_INTERVAL_WRITES=50
//! ```
//!
//! Every field carries a serde default, so an empty file (or no file at
//! all) yields a usable configuration.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, WriterError};

/// Safety margin added on top of the minimum write chunk when sizing the
/// buffer: the capacity must exceed the largest expected single write so
/// the producer is not starved while the drain is in flight.
pub const CAPACITY_MARGIN: usize = 300;

fn default_buffer_capacity() -> usize {
    1024 * 1024
}

fn default_min_write_chunk() -> usize {
    4096
}

fn default_fsync_interval() -> u32 {
    100
}

fn default_thread_stack_size() -> usize {
    64 * 1024
}

fn default_thread_priority() -> i32 {
    -40
}

/// Tunables for the log writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Ring buffer capacity in bytes.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Minimum number of buffered bytes before the drain thread issues a
    /// write syscall, so small records amortize over fewer, larger writes.
    #[serde(default = "default_min_write_chunk")]
    pub min_write_chunk: usize,

    /// Number of file writes between forced fsyncs. Bounds the amount of
    /// data that can be lost on power failure.
    #[serde(default = "default_fsync_interval")]
    pub fsync_interval_writes: u32,

    /// Stack size of the background writer thread in bytes.
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,

    /// Advisory scheduling priority delta for the writer thread, applied
    /// by the embedding host's scheduler (disk I/O must never preempt the
    /// real-time producers). This crate only records the value.
    #[serde(default = "default_thread_priority")]
    pub thread_priority: i32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            min_write_chunk: default_min_write_chunk(),
            fsync_interval_writes: default_fsync_interval(),
            thread_stack_size: default_thread_stack_size(),
            thread_priority: default_thread_priority(),
        }
    }
}

impl WriterConfig {
    /// Load configuration from a TOML file with `BLACKBOX_` environment
    /// variable overrides, then validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let config: WriterConfig = Figment::from(Serialized::defaults(WriterConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BLACKBOX_"))
            .extract()
            .map_err(|e| WriterError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints that parsing alone cannot catch.
    pub fn validate(&self) -> Result<()> {
        if self.min_write_chunk == 0 {
            return Err(WriterError::Config(
                "min_write_chunk must be greater than 0".to_string(),
            ));
        }

        if self.buffer_capacity < self.min_write_chunk + CAPACITY_MARGIN {
            return Err(WriterError::Config(format!(
                "buffer_capacity ({}) must be at least min_write_chunk + {} ({})",
                self.buffer_capacity,
                CAPACITY_MARGIN,
                self.min_write_chunk + CAPACITY_MARGIN
            )));
        }

        if self.fsync_interval_writes == 0 {
            return Err(WriterError::Config(
                "fsync_interval_writes must be greater than 0".to_string(),
            ));
        }

        if self.thread_stack_size < 16 * 1024 {
            return Err(WriterError::Config(format!(
                "thread_stack_size ({}) is below the 16 KiB minimum",
                self.thread_stack_size
            )));
        }

        Ok(())
    }

    /// Effective buffer capacity: the configured value, raised to the
    /// enforced minimum of `min_write_chunk + CAPACITY_MARGIN` if needed.
    pub fn effective_capacity(&self) -> usize {
        self.buffer_capacity.max(self.min_write_chunk + CAPACITY_MARGIN)
    }
}
