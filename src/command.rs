//! Command/response engine.
//!
//! Commands go straight to the transport's write half; replies come back
//! through the [`FrameReader`] the reader task keeps filled:
//!
//! ```text
//! CommandChannel ──write──► transport
//!        ▲
//!        └── FrameReader ◄── RingBuffer ◄── reader task ◄── transport
//! ```
//!
//! Every wait takes its timeout from the caller. A wait that times out just
//! reports failure. Retrying is left to the download state machine.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::buffer::{FrameReader, DEFAULT_MAX_LINE_LEN};
use crate::error::{Result, SimftpError};
use crate::protocol::{command_name, parse_numeric, LINE_TERMINATOR};

/// Default timeout for writing one command.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends AT commands and waits for the lines that answer them.
pub struct CommandChannel<W> {
    writer: W,
    frames: FrameReader,
    write_timeout: Duration,
    max_line_len: usize,
}

impl<W> CommandChannel<W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a channel writing to `writer` and reading replies from `frames`.
    pub fn new(writer: W, frames: FrameReader) -> Self {
        Self {
            writer,
            frames,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Set the default write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum length of one reply line.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// The reader replies are taken from.
    pub fn frames(&self) -> &FrameReader {
        &self.frames
    }

    /// Maximum length of one reply line.
    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Send a command using the default write timeout.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        self.send_command_with_timeout(command, self.write_timeout)
            .await
    }

    /// Send a command followed by `\r\n`, failing unless every byte is
    /// written and flushed within `timeout`.
    pub async fn send_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<()> {
        let name = command_name(command);
        tracing::debug!(command = name, "sending");

        let mut line = String::with_capacity(command.len() + LINE_TERMINATOR.len());
        line.push_str(command);
        line.push_str(LINE_TERMINATOR);

        let write = write_fully(&mut self.writer, line.as_bytes());
        let outcome = match tokio::time::timeout(timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("write not confirmed within {timeout:?}"),
            )),
        };

        outcome.map_err(|source| SimftpError::CommandWrite {
            command: name.to_string(),
            source,
        })
    }

    /// Wait for a line containing `needle`.
    ///
    /// Lines that do not match are logged and discarded. Returns `false` if
    /// `timeout` elapses first.
    pub async fn wait_for_line_containing(&self, needle: &str, timeout: Duration) -> bool {
        self.wait_for(timeout, |line| line.contains(needle).then_some(()))
            .await
            .is_some()
    }

    /// Wait for a line containing `prefix` followed by a number and return it.
    ///
    /// Returns `None` if `timeout` elapses first.
    pub async fn wait_for_numeric(&self, prefix: &str, timeout: Duration) -> Option<u64> {
        self.wait_for(timeout, |line| parse_numeric(line, prefix)).await
    }

    /// Next reply line, waiting at most `timeout` (forever if `None`).
    pub async fn next_line(&self, timeout: Option<Duration>) -> Option<String> {
        let line = self.frames.next_line(self.max_line_len, timeout).await?;
        tracing::debug!(line = line.trim_end(), "received");
        Some(line)
    }

    async fn wait_for<T>(
        &self,
        timeout: Duration,
        mut matches: impl FnMut(&str) -> Option<T>,
    ) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let line = self.next_line(Some(remaining)).await?;
            if let Some(found) = matches(&line) {
                return Some(found);
            }
        }
    }
}

/// Write all of `bytes`, continuing after partial writes, then flush.
async fn write_fully<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut total_written = 0;

    while total_written < bytes.len() {
        let written = writer.write(&bytes[total_written..]).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "transport accepted 0 bytes",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt};

    use crate::buffer::RingBuffer;

    fn channel_with<W: AsyncWrite + Unpin>(writer: W, replies: &[u8]) -> CommandChannel<W> {
        let ring = Arc::new(RingBuffer::new(1024));
        ring.put_bulk(replies);
        CommandChannel::new(writer, FrameReader::new(ring))
    }

    #[tokio::test]
    async fn test_send_command_appends_terminator() {
        let (host, mut device) = duplex(64);
        let mut channel = channel_with(host, b"");

        channel.send_command("AT").await.unwrap();

        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AT\r\n");
    }

    #[tokio::test]
    async fn test_send_command_times_out_when_peer_stalls() {
        // Nobody reads the device side, so the 4-byte pipe fills up.
        let (host, _device) = duplex(4);
        let mut channel = channel_with(host, b"");

        let result = channel
            .send_command_with_timeout("AT+CFTPSSTART", Duration::from_millis(20))
            .await;

        match result {
            Err(SimftpError::CommandWrite { command, source }) => {
                assert_eq!(command, "AT+CFTPSSTART");
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("expected CommandWrite, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_command_fails_on_closed_transport() {
        let (host, device) = duplex(64);
        drop(device);
        let mut channel = channel_with(host, b"");

        let result = channel.send_command("AT").await;
        assert!(matches!(result, Err(SimftpError::CommandWrite { .. })));
    }

    #[tokio::test]
    async fn test_wait_for_line_skips_other_lines() {
        let (host, _device) = duplex(64);
        let channel = channel_with(host, b"AT\r\r\n\r\nOK\r\n");

        assert!(
            channel
                .wait_for_line_containing("OK", Duration::from_millis(100))
                .await
        );
        assert!(channel.frames().buffer().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_line_times_out() {
        let (host, _device) = duplex(64);
        let channel = channel_with(host, b"+CFTPSSTART: 13\r\n");

        let found = channel
            .wait_for_line_containing("+CFTPSSTART: 0", Duration::from_millis(20))
            .await;
        assert!(!found);
    }

    #[tokio::test]
    async fn test_wait_for_numeric() {
        let (host, _device) = duplex(64);
        let channel = channel_with(host, b"OK\r\n+CFTPSSIZE: 10000\r\n");

        let size = channel
            .wait_for_numeric("+CFTPSSIZE: ", Duration::from_millis(100))
            .await;
        assert_eq!(size, Some(10000));
    }

    #[tokio::test]
    async fn test_wait_for_numeric_times_out() {
        let (host, _device) = duplex(64);
        let channel = channel_with(host, b"OK\r\n");

        let size = channel
            .wait_for_numeric("+CFTPSSIZE: ", Duration::from_millis(20))
            .await;
        assert_eq!(size, None);
    }

    #[tokio::test]
    async fn test_write_fully_into_vec() {
        let mut out = std::io::Cursor::new(Vec::new());
        write_fully(&mut out, b"AT+CFTPSTYPE=I\r\n").await.unwrap();
        assert_eq!(out.into_inner(), b"AT+CFTPSTYPE=I\r\n");
    }
}
