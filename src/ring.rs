//! Fixed-capacity byte ring buffer with wraparound-aware reads.
//!
//! This is the handoff point between the latency-sensitive producer and
//! the background drain thread. The producer appends with [`RingBuffer::write`],
//! which never blocks and never allocates; the consumer takes contiguous
//! slices with [`RingBuffer::read_region`] and retires them with
//! [`RingBuffer::mark_read`].
//!
//! # Partial regions
//!
//! The unread span can straddle the physical end of the storage array. The
//! consumer is never handed a discontiguous slice: when the span wraps,
//! `read_region` returns only the tail slice (up to the physical end) and
//! flags it as partial. Once that tail is marked read, the read offset
//! becomes non-negative again and the next call returns the remainder as a
//! single contiguous slice. Consumers must not "simplify" this into one
//! gathered copy: the two-step handoff is what lets the drain thread make
//! progress (and free space) before the rest of the span is available
//! contiguously.
//!
//! # Thread safety
//!
//! The buffer itself is not synchronized. It is owned by the writer
//! controller and only reachable through its mutex; both the producer copy
//! and the `count` update happen under that lock, so a message is atomic
//! from the reader's perspective.

/// Fixed-capacity circular byte buffer.
///
/// `head` is the next write offset and `count` the number of valid unread
/// bytes; the derived read offset is `(head - count) mod capacity`. At all
/// times the `count` most-recently-written bytes, read from that offset
/// and wrapping at the capacity, are exactly the unread payload in write
/// order.
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    head: usize,
    count: usize,
}

impl RingBuffer {
    /// Allocate a buffer of `capacity` bytes. This is the only allocation
    /// the buffer ever performs; the capacity is immutable afterwards.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            count: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unread bytes currently buffered.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the buffer holds no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Free space in bytes.
    pub fn available(&self) -> usize {
        self.storage.len() - self.count
    }

    /// Append `data`, wrapping at the physical end of the storage array.
    ///
    /// Returns `false` (buffer overflow) when `data` does not fit in the
    /// free space; the payload is dropped in its entirety and the buffer
    /// is left untouched; no partial write is ever visible to the reader.
    /// O(len), at most two memory copies, no allocation.
    pub fn write(&mut self, data: &[u8]) -> bool {
        if data.len() > self.available() {
            return false;
        }

        let capacity = self.storage.len();
        // Bytes that fit between head and the physical end of storage.
        let to_end = capacity - self.head;
        let first = if data.len() > to_end {
            self.storage[self.head..].copy_from_slice(&data[..to_end]);
            self.head = 0;
            to_end
        } else {
            0
        };

        let rest = data.len() - first;
        self.storage[self.head..self.head + rest].copy_from_slice(&data[first..]);
        self.head = (self.head + rest) % capacity;
        self.count += data.len();
        true
    }

    /// Contiguous unread region and whether it is only the wrapped tail.
    ///
    /// When the unread span wraps the physical end, the returned slice is
    /// the tail (read offset to end-of-storage) and the flag is `true`;
    /// otherwise the slice is the full unread span and the flag is `false`.
    /// An empty buffer yields an empty, non-partial slice.
    pub fn read_region(&self) -> (&[u8], bool) {
        let read = self.head as isize - self.count as isize;

        if read < 0 {
            // Unread data wraps: hand out only the tail slice for now.
            let start = (read + self.storage.len() as isize) as usize;
            (&self.storage[start..], true)
        } else {
            let start = read as usize;
            (&self.storage[start..start + self.count], false)
        }
    }

    /// Retire `n` bytes previously obtained from [`read_region`] after
    /// they were written out. Does not move `head`.
    ///
    /// Must be called under the same lock as the read that produced the
    /// consumed bytes.
    ///
    /// [`read_region`]: RingBuffer::read_region
    pub fn mark_read(&mut self, n: usize) {
        debug_assert!(n <= self.count, "marking more bytes than buffered");
        self.count = self.count.saturating_sub(n);
    }

    /// Reset accounting to empty. Used when a new output stream starts and
    /// after a completed drain; the storage allocation is retained.
    pub fn reset(&mut self) {
        self.head = 0;
        self.count = 0;
    }
}
