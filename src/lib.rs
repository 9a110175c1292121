//! Durable background log writer for real-time acquisition hosts.
//!
//! A bounded in-memory ring buffer decouples a latency-sensitive producer
//! from a background thread that drains the buffer to a file and
//! periodically forces it to stable storage. The producer never blocks on
//! disk I/O; a dropped record on overflow is signaled synchronously and
//! never reordered.
//!
//! # Example
//!
//! ```no_run
//! use blackbox_writer::{config::WriterConfig, writer::BlackboxWriter};
//!
//! fn main() -> blackbox_writer::error::Result<()> {
//!     let mut writer = BlackboxWriter::new(WriterConfig::default())?;
//!     writer.init();
//!     writer.start()?;
//!     writer.start_log("/tmp/session.blackbox")?;
//!
//!     // Producer side: never blocks on I/O.
//!     if !writer.write(b"record") {
//!         // buffer full, record dropped
//!     }
//!
//!     writer.stop_log(); // drain and close happen in the background
//!     writer.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod ring;
pub mod writer;

pub use config::WriterConfig;
pub use error::{Result, WriterError};
pub use metrics::{NoopMetrics, TraceMetrics, WriterMetrics};
pub use ring::RingBuffer;
pub use writer::BlackboxWriter;
