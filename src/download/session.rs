//! Per-download bookkeeping: offset, retry counter and byte totals.

/// Default number of bytes requested per `AT+CFTPSGET`.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// State of one file download.
///
/// Owned by the state machine for the duration of a single transfer. The
/// offset only moves forward and only by bytes the modem has confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    filename: String,
    total_size: u64,
    offset: u64,
    chunk_size: usize,
    retries: u32,
    bytes_received: u64,
}

impl DownloadSession {
    /// Start a download of `total_size` bytes at offset 0.
    pub fn new(filename: impl Into<String>, total_size: u64, chunk_size: usize) -> Self {
        Self {
            filename: filename.into(),
            total_size,
            offset: 0,
            chunk_size: chunk_size.max(1),
            retries: 0,
            bytes_received: 0,
        }
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Next byte to request.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Retries spent on the current offset.
    #[inline]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Bytes confirmed and delivered so far.
    #[inline]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Length of the next request, or `None` once the file is complete.
    pub fn current_chunk(&self) -> Option<usize> {
        let remaining = self.remaining();
        (remaining > 0).then(|| remaining.min(self.chunk_size as u64) as usize)
    }

    /// Bytes not yet confirmed.
    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.offset)
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total_size
    }

    /// Count one more retry at the current offset and return the new total.
    pub fn record_retry(&mut self) -> u32 {
        self.retries += 1;
        self.retries
    }

    /// Move past `received` confirmed bytes and reset the retry counter.
    pub fn advance(&mut self, received: u64) {
        self.offset += received;
        self.bytes_received += received;
        self.retries = 0;
    }

    /// Completion in percent, 100 for an empty file.
    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        self.bytes_received as f64 / self.total_size as f64 * 100.0
    }
}
