//! Fixed-capacity byte ring shared by the reader task and the protocol driver.
//!
//! All index arithmetic lives in the private `Ring`; callers only see
//! logical offsets counted from the oldest buffered byte. Every public
//! operation takes the lock once and releases it before returning, so the lock
//! is never held across a transport read or a sink write.
//!
//! Two [`Notify`] handles let the consumer sleep until bytes arrive and the
//! producer sleep until space frees up. Each side is a single task, so
//! `notify_one` permits are never lost between a failed attempt and the wait.
//!
//! # Example
//!
//! ```
//! use simftp::buffer::RingBuffer;
//!
//! let ring = RingBuffer::new(8);
//! assert_eq!(ring.put_bulk(b"OK\r\n"), 4);
//! assert_eq!(ring.find_byte(b'\n'), Some(3));
//!
//! let mut out = [0u8; 4];
//! assert_eq!(ring.read_bulk(&mut out), 4);
//! assert_eq!(&out, b"OK\r\n");
//! ```

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default buffer capacity (8 KB).
pub const DEFAULT_CAPACITY: usize = 8192;

/// Backing storage plus the logical window into it.
struct Ring {
    storage: Box<[u8]>,
    start: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    #[inline]
    fn physical(&self, index: usize) -> usize {
        (self.start + index) % self.capacity()
    }

    fn push_slice(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let end = self.physical(self.len);
        let first = n.min(self.capacity() - end);
        self.storage[end..end + first].copy_from_slice(&src[..first]);
        self.storage[..n - first].copy_from_slice(&src[first..n]);
        self.len += n;
        n
    }

    fn pop_into(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let first = n.min(self.capacity() - self.start);
        dest[..first].copy_from_slice(&self.storage[self.start..self.start + first]);
        dest[first..n].copy_from_slice(&self.storage[..n - first]);
        self.start = (self.start + n) % self.capacity();
        self.len -= n;
        n
    }

    /// Buffered bytes as two slices in logical order. The second slice is
    /// empty unless the data wraps past the end of storage.
    fn segments(&self) -> (&[u8], &[u8]) {
        let first_len = self.len.min(self.capacity() - self.start);
        (
            &self.storage[self.start..self.start + first_len],
            &self.storage[..self.len - first_len],
        )
    }
}

/// Thread-safe circular byte buffer.
///
/// Designed for exactly one producer (the reader task) and one consumer (the
/// command engine), though any number of callers stay consistent.
pub struct RingBuffer {
    inner: Mutex<Ring>,
    readable: Notify,
    writable: Notify,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(Ring::new(capacity)),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// Append one byte. Returns `false` and drops the byte if full.
    pub fn put(&self, byte: u8) -> bool {
        self.put_bulk(&[byte]) == 1
    }

    /// Append as many bytes from `src` as fit and return how many were taken.
    ///
    /// Never blocks. Zero means the buffer is full (or `src` was empty).
    pub fn put_bulk(&self, src: &[u8]) -> usize {
        let written = self.inner.lock().push_slice(src);
        if written > 0 {
            self.readable.notify_one();
        }
        written
    }

    /// Remove and return the oldest byte.
    pub fn get(&self) -> Option<u8> {
        let mut byte = [0u8; 1];
        (self.read_bulk(&mut byte) == 1).then_some(byte[0])
    }

    /// Remove up to `dest.len()` of the oldest bytes into `dest`.
    ///
    /// Returns the number of bytes copied, 0 if the buffer is empty.
    pub fn read_bulk(&self, dest: &mut [u8]) -> usize {
        let read = self.inner.lock().pop_into(dest);
        if read > 0 {
            self.writable.notify_one();
        }
        read
    }

    /// Byte at logical offset `index` from the oldest byte, without removing it.
    pub fn peek(&self, index: usize) -> Option<u8> {
        let ring = self.inner.lock();
        (index < ring.len).then(|| ring.storage[ring.physical(index)])
    }

    /// Logical offset of the first occurrence of `target`, oldest first.
    pub fn find_byte(&self, target: u8) -> Option<usize> {
        let ring = self.inner.lock();
        let (head, tail) = ring.segments();
        head.iter().position(|&b| b == target).or_else(|| {
            tail.iter()
                .position(|&b| b == target)
                .map(|pos| head.len() + pos)
        })
    }

    /// Number of buffered bytes.
    pub fn available(&self) -> usize {
        self.inner.lock().len
    }

    /// Number of bytes that can be appended before the buffer is full.
    pub fn free_space(&self) -> usize {
        self.inner.lock().free()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Wait until bytes have been appended since the last wake-up.
    ///
    /// May return spuriously; callers re-check the buffer afterwards.
    pub async fn readable(&self) {
        self.readable.notified().await;
    }

    /// Wait until bytes have been removed since the last wake-up.
    ///
    /// May return spuriously; callers re-check the buffer afterwards.
    pub async fn writable(&self) {
        self.writable.notified().await;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.inner.lock();
        f.debug_struct("RingBuffer")
            .field("capacity", &ring.capacity())
            .field("len", &ring.len)
            .finish()
    }
}
