//! Timing instrumentation for the drain thread.
//!
//! The writer reports the elapsed time of every file write and every fsync
//! to an injected [`WriterMetrics`] sink rather than to ambient global
//! counters, keeping the core testable in isolation. Failure to report is
//! never an error condition; implementations must not panic.

use std::time::Duration;

/// Sink for write/fsync timing reported by the drain thread.
pub trait WriterMetrics: Send + Sync {
    /// A file write of `bytes` bytes completed in `elapsed`.
    fn record_write(&self, elapsed: Duration, bytes: usize);

    /// A forced sync to stable storage completed in `elapsed`.
    fn record_fsync(&self, elapsed: Duration);
}

impl<M: WriterMetrics + ?Sized> WriterMetrics for std::sync::Arc<M> {
    fn record_write(&self, elapsed: Duration, bytes: usize) {
        (**self).record_write(elapsed, bytes);
    }

    fn record_fsync(&self, elapsed: Duration) {
        (**self).record_fsync(elapsed);
    }
}

/// Discards all measurements. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl WriterMetrics for NoopMetrics {
    fn record_write(&self, _elapsed: Duration, _bytes: usize) {}

    fn record_fsync(&self, _elapsed: Duration) {}
}

/// Emits each measurement as a `tracing` event at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceMetrics;

impl WriterMetrics for TraceMetrics {
    fn record_write(&self, elapsed: Duration, bytes: usize) {
        tracing::trace!(elapsed_us = elapsed.as_micros() as u64, bytes, "log write");
    }

    fn record_fsync(&self, elapsed: Duration) {
        tracing::trace!(elapsed_us = elapsed.as_micros() as u64, "log fsync");
    }
}
