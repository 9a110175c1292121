//! Background log writer: controller facade plus drain thread.
//!
//! [`BlackboxWriter`] is the synchronized facade the producer talks to.
//! Its `write` call only touches the ring buffer under a short lock and
//! never blocks on disk I/O; a long-lived background thread owns the file
//! handle and the sole read cursor, draining buffered bytes in chunks and
//! forcing them to stable storage every [`WriterConfig::fsync_interval_writes`]
//! writes.
//!
//! One mutex protects all shared state and one condition variable carries
//! every wakeup (new data, run-state change, exit request). The drain
//! thread always re-validates its predicate in a loop after waking rather
//! than assuming the reason it was woken. File write and fsync syscalls
//! run outside the lock, so the producer is never stalled by disk latency.
//!
//! Lifecycle: `start_log` opens the file and flips `should_run`;
//! `stop_log` only requests cessation: the thread drains whatever is
//! still buffered, closes the file, and clears `running` once the buffer
//! is provably empty. Process shutdown uses the stronger exit flag, which
//! terminates the thread even mid-drain.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::WriterConfig;
use crate::error::{Result, WriterError};
use crate::metrics::{NoopMetrics, WriterMetrics};
use crate::ring::RingBuffer;

/// The open output file for the current log session.
///
/// Owned by the drain thread for the whole session; every exit path out of
/// the drain loop either closes it explicitly or drops it, so the handle
/// is released even on failure branches.
struct LogStream {
    file: File,
    path: PathBuf,
    total_written: u64,
}

/// All state shared between the producer-facing controller and the drain
/// thread, guarded by a single mutex.
#[derive(Default)]
struct State {
    /// Allocated once by `init`; capacity is immutable afterwards.
    ring: Option<RingBuffer>,
    /// Desired state: a log should be actively draining. Only the
    /// controller flips this.
    should_run: bool,
    /// Observed state: file open and draining. Only the drain thread
    /// clears this, and only after the buffer is fully drained and the
    /// file closed.
    running: bool,
    /// One-way flag requesting permanent thread termination.
    exit_thread: bool,
    /// Stream opened by `start_log`, waiting for the drain thread to
    /// take ownership.
    pending: Option<LogStream>,
}

struct Shared {
    state: Mutex<State>,
    work: Condvar,
    config: WriterConfig,
    metrics: Box<dyn WriterMetrics>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.work.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// Asynchronous durable log writer.
///
/// Exactly one producer thread may call [`write`], [`start_log`] and
/// [`stop_log`]; the drain loop runs on the single background thread
/// spawned by [`start`].
///
/// [`write`]: BlackboxWriter::write
/// [`start_log`]: BlackboxWriter::start_log
/// [`stop_log`]: BlackboxWriter::stop_log
/// [`start`]: BlackboxWriter::start
pub struct BlackboxWriter {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl BlackboxWriter {
    /// Create a writer with the given configuration and no metrics sink.
    pub fn new(config: WriterConfig) -> Result<Self> {
        Self::with_metrics(config, NoopMetrics)
    }

    /// Create a writer reporting write/fsync timings to `metrics`.
    pub fn with_metrics<M>(config: WriterConfig, metrics: M) -> Result<Self>
    where
        M: WriterMetrics + 'static,
    {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                work: Condvar::new(),
                config,
                metrics: Box::new(metrics),
            }),
            thread: None,
        })
    }

    /// Allocate the ring buffer storage. Idempotent: repeated calls leave
    /// the existing buffer (and anything buffered in it) untouched.
    pub fn init(&self) {
        let mut state = self.shared.lock();
        if state.ring.is_none() {
            let capacity = self.shared.config.effective_capacity();
            state.ring = Some(RingBuffer::new(capacity));
            debug!(capacity, "log buffer allocated");
        }
    }

    /// Spawn the background drain thread. Idempotent.
    ///
    /// The thread gets a fixed, small stack
    /// ([`WriterConfig::thread_stack_size`]); its reduced scheduling
    /// priority is applied by the embedding host.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("blackbox-writer".to_string())
            .stack_size(self.shared.config.thread_stack_size)
            .spawn(move || run(&shared))?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Open a new log file (create-or-truncate, write-only) and begin
    /// draining into it.
    ///
    /// On open failure the error is logged and returned and `should_run`
    /// stays false; the component remains ready for a fresh `start_log`.
    /// Starting while a session is active is an error: only one output
    /// stream exists at a time.
    pub fn start_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        {
            let state = self.shared.lock();
            if state.ring.is_none() {
                return Err(WriterError::NotInitialized);
            }
            if state.should_run || state.running {
                return Err(WriterError::AlreadyLogging);
            }
        }

        // Open outside the lock; the drain thread stays idle meanwhile.
        let file = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) => {
                error!(path = %path.display(), error = %e, "can't open log file");
                return Err(e.into());
            }
        };

        let mut state = self.shared.lock();
        if state.should_run || state.running {
            // Lost a race with a concurrent start; the fresh handle is
            // dropped and with it the file closed.
            return Err(WriterError::AlreadyLogging);
        }

        if let Some(ring) = state.ring.as_mut() {
            ring.reset();
        }
        state.pending = Some(LogStream {
            file,
            path: path.to_path_buf(),
            total_written: 0,
        });
        state.should_run = true;
        state.running = true;
        drop(state);

        info!(path = %path.display(), "opened log file");
        self.shared.work.notify_all();
        Ok(())
    }

    /// Request the current session to stop. Non-blocking: draining and the
    /// file close happen on the drain thread. Poll [`is_running`] to learn
    /// when the file is actually closed.
    ///
    /// [`is_running`]: BlackboxWriter::is_running
    pub fn stop_log(&self) {
        let mut state = self.shared.lock();
        state.should_run = false;
        drop(state);
        self.shared.work.notify_all();
    }

    /// Append a log record to the ring buffer.
    ///
    /// Returns `false` when the record does not fit in the free space (or
    /// `init` was never called); the record is dropped in its entirety and
    /// the buffer left unchanged. Callers are expected to count lost
    /// messages; there is no retry. Never blocks on I/O.
    pub fn write(&self, data: &[u8]) -> bool {
        let mut state = self.shared.lock();
        let accepted = match state.ring.as_mut() {
            Some(ring) => ring.write(data),
            None => false,
        };
        drop(state);

        if accepted {
            self.shared.work.notify_all();
        }
        accepted
    }

    /// Whether a log file is currently open and draining. Stays true from
    /// a successful `start_log` until the drain thread has flushed every
    /// buffered byte and closed the file.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Number of unread bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.shared
            .lock()
            .ring
            .as_ref()
            .map_or(0, RingBuffer::len)
    }

    /// Terminate the drain thread permanently and join it, abandoning any
    /// unflushed bytes of an active session.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.exit_thread = true;
        state.should_run = false;
        drop(state);
        self.shared.work.notify_all();

        match self.thread.take() {
            Some(handle) => {
                if handle.join().is_err() {
                    warn!("writer thread panicked before exit");
                }
                Ok(())
            }
            None => Err(WriterError::ThreadNotStarted),
        }
    }
}

impl Drop for BlackboxWriter {
    fn drop(&mut self) {
        // Best effort; a writer that was never started has no thread to
        // join.
        let _ = self.shutdown();
    }
}

/// Outer loop of the drain thread: wait in Idle for a session (or exit),
/// then run the drain loop for that session.
fn run(shared: &Shared) {
    loop {
        let stream = {
            let mut state = shared.lock();
            loop {
                if state.exit_thread {
                    debug!("writer thread exiting");
                    return;
                }
                if state.should_run {
                    if let Some(stream) = state.pending.take() {
                        break stream;
                    }
                }
                state = shared.wait(state);
            }
        };

        if drain_session(shared, stream).is_break() {
            return;
        }
    }
}

/// Drain loop for one log session. Owns the output stream; every return
/// path releases the file handle.
fn drain_session(shared: &Shared, mut stream: LogStream) -> ControlFlow<()> {
    let min_chunk = shared.config.min_write_chunk;
    let mut scratch: Vec<u8> = Vec::with_capacity(shared.config.effective_capacity());
    let mut writes_since_sync: u32 = 0;

    loop {
        // Wait under the lock until enough data is buffered to amortize
        // the syscall, the region is a wrapped tail (must be drained
        // before more can accumulate contiguously), or a stop was
        // requested (remaining bytes flush regardless of size). Copy the
        // contiguous region out so the write runs outside the lock.
        let (len, is_partial, should_run) = {
            let mut state = shared.lock();
            loop {
                if state.exit_thread {
                    // Abandon unflushed bytes; dropping the stream closes
                    // the file.
                    return ControlFlow::Break(());
                }

                let Some(ring) = state.ring.as_ref() else {
                    return ControlFlow::Break(());
                };
                let (region, is_partial) = ring.read_region();
                if region.len() >= min_chunk || is_partial || !state.should_run {
                    scratch.clear();
                    scratch.extend_from_slice(region);
                    break (scratch.len(), is_partial, state.should_run);
                }

                state = shared.wait(state);
            }
        };

        let mut written = 0usize;
        if len > 0 {
            let start = Instant::now();
            let result = stream.file.write(&scratch[..len]);
            let elapsed = start.elapsed();

            match result {
                Ok(n) => {
                    written = n;
                    shared.metrics.record_write(elapsed, written);
                    writes_since_sync += 1;
                    if writes_since_sync >= shared.config.fsync_interval_writes {
                        let start = Instant::now();
                        if let Err(e) = stream.file.sync_all() {
                            warn!(error = %e, "error syncing log file");
                        }
                        shared.metrics.record_fsync(start.elapsed());
                        writes_since_sync = 0;
                    }

                    let mut state = shared.lock();
                    if let Some(ring) = state.ring.as_mut() {
                        // Partial file writes retire only what actually
                        // reached the file; the rest stays queued.
                        ring.mark_read(written);
                    }
                    stream.total_written += written as u64;
                }
                Err(e) => {
                    // A failed syscall moved no bytes.
                    shared.metrics.record_write(elapsed, 0);
                    // Abandon this stream: no retry, the session stops.
                    warn!(error = %e, path = %stream.path.display(), "error writing log file");
                    let mut state = shared.lock();
                    state.should_run = false;
                    if let Some(ring) = state.ring.as_mut() {
                        ring.reset();
                    }
                    state.running = false;
                    drop(state);
                    close_stream(stream);
                    return ControlFlow::Continue(());
                }
            }
        }

        // Stop only when the buffer is provably drained: stop requested,
        // the whole region reached the file, and the region was not a
        // wrapped tail with more data behind it.
        if !should_run && written == len && !is_partial {
            let mut state = shared.lock();
            if let Some(ring) = state.ring.as_mut() {
                ring.reset();
            }
            state.running = false;
            drop(state);
            close_stream(stream);
            return ControlFlow::Continue(());
        }
    }
}

/// Flush and close the output stream, logging the session total. A close
/// failure is a warning only; the handle is released regardless.
fn close_stream(stream: LogStream) {
    if let Err(e) = stream.file.sync_all() {
        warn!(error = %e, path = %stream.path.display(), "error closing log file");
    } else {
        info!(
            path = %stream.path.display(),
            bytes_written = stream.total_written,
            "closed log file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> WriterConfig {
        WriterConfig {
            buffer_capacity: 1024,
            min_write_chunk: 300,
            ..WriterConfig::default()
        }
    }

    #[test]
    fn test_write_before_init_is_rejected() {
        let writer = BlackboxWriter::new(test_config()).unwrap();
        assert!(!writer.write(b"dropped"));
    }

    #[test]
    fn test_start_log_before_init_fails() {
        let writer = BlackboxWriter::new(test_config()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = writer.start_log(dir.path().join("log.bin")).unwrap_err();
        assert!(matches!(err, WriterError::NotInitialized));
    }

    #[test]
    fn test_init_is_idempotent() {
        let writer = BlackboxWriter::new(test_config()).unwrap();
        writer.init();
        assert!(writer.write(b"abc"));
        // A second init must not reallocate or clear the buffer.
        writer.init();
        assert_eq!(writer.buffered_bytes(), 3);
    }

    #[test]
    fn test_buffer_works_without_open_stream() {
        let writer = BlackboxWriter::new(test_config()).unwrap();
        writer.init();
        assert!(writer.write(&[0u8; 512]));
        assert_eq!(writer.buffered_bytes(), 512);
        assert!(!writer.is_running());
    }

    #[test]
    fn test_overflow_returns_false() {
        let writer = BlackboxWriter::new(test_config()).unwrap();
        writer.init();
        assert!(writer.write(&[0u8; 1024]));
        assert!(!writer.write(&[0u8; 1]));
        assert_eq!(writer.buffered_bytes(), 1024);
    }

    #[test]
    fn test_stop_log_without_session_is_harmless() {
        let writer = BlackboxWriter::new(test_config()).unwrap();
        writer.init();
        writer.stop_log();
        assert!(!writer.is_running());
    }

    #[test]
    fn test_shutdown_without_thread_errors() {
        let mut writer = BlackboxWriter::new(test_config()).unwrap();
        assert!(matches!(
            writer.shutdown(),
            Err(WriterError::ThreadNotStarted)
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = WriterConfig {
            buffer_capacity: 100,
            min_write_chunk: 300,
            ..WriterConfig::default()
        };
        assert!(BlackboxWriter::new(config).is_err());
    }
}
