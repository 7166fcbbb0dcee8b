//! Line and binary-frame extraction on top of [`RingBuffer`].
//!
//! The modem interleaves two kinds of data on one stream:
//! - text lines terminated by `\n` (status replies such as `OK`)
//! - raw payloads whose length was announced by the preceding line
//!   (`+CFTPSGET: DATA,<len>`)
//!
//! [`FrameReader::try_read_line`] never consumes anything until a full line is
//! buffered. [`FrameReader::read_exact_bytes`] ignores line terminators
//! entirely, so payload bytes are never mistaken for lines. The caller decides
//! which one to use based on the last line it saw.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use simftp::buffer::{FrameReader, RingBuffer};
//!
//! let ring = Arc::new(RingBuffer::new(64));
//! ring.put_bulk(b"abc\ndef");
//!
//! let reader = FrameReader::new(ring.clone());
//! assert_eq!(reader.try_read_line(256).as_deref(), Some("abc\n"));
//! assert_eq!(reader.try_read_line(256), None);
//! assert_eq!(ring.available(), 3);
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::RingBuffer;

/// Default upper bound for one text line, terminator included.
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Default interval between buffer polls while waiting for data.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Extracts lines and declared-length frames from a shared ring buffer.
///
/// Holds no protocol state of its own; cloning it just shares the buffer.
#[derive(Debug, Clone)]
pub struct FrameReader {
    buffer: Arc<RingBuffer>,
    poll_interval: Duration,
}

impl FrameReader {
    /// Create a reader with the default poll interval.
    pub fn new(buffer: Arc<RingBuffer>) -> Self {
        Self::with_poll_interval(buffer, DEFAULT_POLL_INTERVAL)
    }

    /// Create a reader with a custom poll interval.
    pub fn with_poll_interval(buffer: Arc<RingBuffer>, poll_interval: Duration) -> Self {
        Self {
            buffer,
            poll_interval,
        }
    }

    /// The underlying shared buffer.
    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    /// Remove one complete line, terminator included, if one is buffered.
    ///
    /// Returns `None` without touching the buffer when no `\n` has arrived yet.
    /// A line longer than `max_len - 1` bytes is returned in pieces; the rest
    /// stays buffered for the next call.
    pub fn try_read_line(&self, max_len: usize) -> Option<String> {
        let newline = self.buffer.find_byte(b'\n')?;
        let take = (newline + 1).min(max_len.max(2) - 1);

        let mut line = vec![0u8; take];
        let n = self.buffer.read_bulk(&mut line);
        if n == 0 {
            return None;
        }
        line.truncate(n);

        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Poll for the next line until one arrives or `timeout` elapses.
    ///
    /// `None` as timeout waits indefinitely.
    pub async fn next_line(&self, max_len: usize, timeout: Option<Duration>) -> Option<String> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(line) = self.try_read_line(max_len) {
                return Some(line);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }
            self.wait_for_data().await;
        }
    }

    /// Remove exactly `n` bytes, waiting for them as long as it takes.
    ///
    /// Line terminators inside the payload have no special meaning. Never
    /// returns a short read; bound it with [`read_exact_bytes_timeout`].
    ///
    /// [`read_exact_bytes_timeout`]: Self::read_exact_bytes_timeout
    pub async fn read_exact_bytes(&self, n: usize) -> Bytes {
        let mut payload = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let got = self.buffer.read_bulk(&mut payload[filled..]);
            if got == 0 {
                self.wait_for_data().await;
                continue;
            }
            filled += got;
        }

        Bytes::from(payload)
    }

    /// Like [`read_exact_bytes`](Self::read_exact_bytes) but gives up after
    /// `limit`. Bytes drained before the deadline are lost.
    pub async fn read_exact_bytes_timeout(&self, n: usize, limit: Duration) -> Option<Bytes> {
        tokio::time::timeout(limit, self.read_exact_bytes(n))
            .await
            .ok()
    }

    /// Sleep until new bytes arrive or one poll interval passes.
    async fn wait_for_data(&self) {
        // Elapsing is the normal outcome; the caller polls again either way.
        let _ = tokio::time::timeout(self.poll_interval, self.buffer.readable()).await;
    }
}
