//! Background reader task that moves transport bytes into the ring buffer.
//!
//! # Architecture
//!
//! ```text
//! Serial port ─► reader task ─► RingBuffer ─► FrameReader ─► CommandChannel
//! ```
//!
//! The task knows nothing about the AT protocol. It reads small chunks with a
//! short timeout, pushes them into the buffer and stalls (rather than drops)
//! when the buffer is full. Read timeouts are normal; other read errors are
//! logged and retried after a short pause. The only way out of the loop is the
//! session's [`CancellationToken`], which also abandons an in-flight read.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer::RingBuffer;
use crate::config::millis;

/// Default size of one transport read.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Default wait for one transport read before looping.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Default pause after a read error or end of stream.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Default pause while the ring buffer is full.
pub const DEFAULT_FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Configuration for the reader task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum bytes requested per transport read.
    pub chunk_size: usize,
    /// How long one read may wait before the loop checks for cancellation.
    #[serde(with = "millis", rename = "read_timeout_ms")]
    pub read_timeout: Duration,
    /// Pause after a read error or end of stream.
    #[serde(with = "millis", rename = "error_backoff_ms")]
    pub error_backoff: Duration,
    /// Upper bound on each wait for buffer space.
    #[serde(with = "millis", rename = "full_backoff_ms")]
    pub full_backoff: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_READ_CHUNK,
            read_timeout: DEFAULT_READ_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            full_backoff: DEFAULT_FULL_BACKOFF,
        }
    }
}

/// Counters reported by the reader task when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Bytes moved from the transport into the buffer.
    pub bytes_received: u64,
    /// Times the buffer was full and the task had to wait.
    pub stalls: u64,
    /// Read errors and end-of-stream events.
    pub read_errors: u64,
}

/// Spawn the reader task.
///
/// # Arguments
///
/// * `reader` - Read half of the transport
/// * `buffer` - Shared ring buffer to fill
/// * `config` - Reader configuration
/// * `cancel` - Token that stops the task
///
/// # Returns
///
/// A `JoinHandle` resolving to the task's [`ReaderStats`] once cancelled.
pub fn spawn_reader_task<R>(
    reader: R,
    buffer: Arc<RingBuffer>,
    config: ReaderConfig,
    cancel: CancellationToken,
) -> JoinHandle<ReaderStats>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(reader_loop(reader, buffer, config, cancel))
}

async fn reader_loop<R>(
    mut reader: R,
    buffer: Arc<RingBuffer>,
    config: ReaderConfig,
    cancel: CancellationToken,
) -> ReaderStats
where
    R: AsyncRead + Unpin,
{
    let mut stats = ReaderStats::default();
    let mut chunk = vec![0u8; config.chunk_size.max(1)];

    while !cancel.is_cancelled() {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = tokio::time::timeout(config.read_timeout, reader.read(&mut chunk)) => read,
        };

        let n = match read {
            // Quiet line, nothing arrived in this window.
            Err(_) => continue,
            Ok(Ok(0)) => {
                stats.read_errors += 1;
                tracing::trace!("transport reported end of stream");
                pause(&cancel, config.error_backoff).await;
                continue;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Ok(Err(e)) => {
                stats.read_errors += 1;
                tracing::warn!("Serial read error: {}", e);
                pause(&cancel, config.error_backoff).await;
                continue;
            }
        };

        let mut pending = &chunk[..n];
        while !pending.is_empty() {
            let written = buffer.put_bulk(pending);
            if written == 0 {
                stats.stalls += 1;
                tokio::select! {
                    _ = cancel.cancelled() => return stats,
                    _ = tokio::time::timeout(config.full_backoff, buffer.writable()) => {}
                }
                continue;
            }
            pending = &pending[written..];
        }
        stats.bytes_received += n as u64;
    }

    tracing::debug!(
        bytes = stats.bytes_received,
        stalls = stats.stalls,
        "reader task stopped"
    );
    stats
}

async fn pause(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
