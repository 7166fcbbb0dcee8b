//! Session context: one transport, one reader task, one FTP client.
//!
//! [`SessionBuilder::start`] splits the transport. The read half goes to the
//! reader task, which fills a shared [`RingBuffer`]. The write half goes to
//! the [`FtpClient`], which reads its replies back out of that buffer.
//! [`ModemSession::shutdown`] stops the reader and reports what it saw.
//!
//! # Example
//!
//! ```ignore
//! let port = transport::open_serial("/dev/ttyUSB2", 115_200)?;
//! let mut session = SessionBuilder::new().start(port);
//! session.client().handshake(&credentials).await?;
//! let stats = session.shutdown().await?;
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::buffer::{FrameReader, RingBuffer, DEFAULT_CAPACITY, DEFAULT_MAX_LINE_LEN};
use crate::command::CommandChannel;
use crate::config::Config;
use crate::error::{Result, SimftpError};
use crate::ftp::{FtpClient, Timeouts};
use crate::reader::{spawn_reader_task, ReaderConfig, ReaderStats};

/// Builder for a [`ModemSession`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    buffer_capacity: usize,
    reader: ReaderConfig,
    timeouts: Timeouts,
    max_line_len: usize,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            reader: ReaderConfig::default(),
            timeouts: Timeouts::default(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Take buffer, reader and timeout settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .buffer_capacity(config.buffer_capacity)
            .reader_config(config.reader.clone())
            .timeouts(config.timeouts.clone())
    }

    /// Set the receive buffer capacity in bytes.
    ///
    /// Default: 8192
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Set the reader task configuration.
    pub fn reader_config(mut self, config: ReaderConfig) -> Self {
        self.reader = config;
        self
    }

    /// Set the per-step timeouts.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the maximum length of one reply line.
    ///
    /// Default: 256
    pub fn max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Split `transport`, spawn the reader task and return the session.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<T>(self, transport: T) -> ModemSession<T>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let buffer = Arc::new(RingBuffer::new(self.buffer_capacity));
        let cancel = CancellationToken::new();

        let reader_task =
            spawn_reader_task(read_half, buffer.clone(), self.reader, cancel.clone());

        let channel = CommandChannel::new(write_half, FrameReader::new(buffer.clone()))
            .with_max_line_len(self.max_line_len);
        let client = FtpClient::new(channel, self.timeouts);

        tracing::debug!(capacity = self.buffer_capacity, "session started");

        ModemSession {
            client,
            buffer,
            _guard: cancel.clone().drop_guard(),
            cancel,
            reader_task,
        }
    }
}

/// A running session. Dropping it stops the reader task.
pub struct ModemSession<T> {
    client: FtpClient<WriteHalf<T>>,
    buffer: Arc<RingBuffer>,
    cancel: CancellationToken,
    reader_task: JoinHandle<ReaderStats>,
    _guard: DropGuard,
}

impl<T> ModemSession<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// The FTP client bound to this session's transport.
    pub fn client(&mut self) -> &mut FtpClient<WriteHalf<T>> {
        &mut self.client
    }

    /// The shared receive buffer.
    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    /// Whether the reader task has been told to stop.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the reader task and wait for it.
    pub async fn shutdown(self) -> Result<ReaderStats> {
        self.cancel.cancel();
        let stats = self
            .reader_task
            .await
            .map_err(|e| SimftpError::ReaderTask(e.to_string()))?;
        tracing::debug!(
            bytes = stats.bytes_received,
            read_errors = stats.read_errors,
            "session closed"
        );
        Ok(stats)
    }
}
