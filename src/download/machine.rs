//! Chunked download state machine.
//!
//! One pass per chunk:
//!
//! ```text
//! RequestingChunk ─► AwaitingStatusLine ─┬─ DATA,n ─► ReceivingFrame(n) ─┐
//!        ▲                               │                               │
//!        │                               │◄──────────────────────────────┘
//!        │                               ├─ 14 ─────► RetryOffset ───────┤
//!        │                               ├─ 0 ──────► Complete ──────────┤
//!        └───────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! Frames of one request are staged and only handed to the sink once the
//! modem closes the request with `+CFTPSGET: 0`. A code 14 throws the staged
//! frames away and asks for the same offset again, so the sink never sees the
//! same byte twice.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use super::session::{DownloadSession, DEFAULT_CHUNK_SIZE};
use super::sink::ChunkSink;
use crate::command::CommandChannel;
use crate::config::{millis, option_millis};
use crate::error::{Result, SimftpError};
use crate::protocol::{commands, ChunkResponse};

/// Default number of retries allowed on one offset.
pub const DEFAULT_MAX_OFFSET_RETRIES: u32 = 5;

/// Default limit for draining one declared frame.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// Download state machine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Bytes requested per `AT+CFTPSGET`.
    pub chunk_size: usize,
    /// Code 14 replies tolerated on one offset before giving up.
    pub max_offset_retries: u32,
    /// Limit for receiving the bytes of one `DATA` frame.
    #[serde(with = "millis", rename = "frame_timeout_ms")]
    pub frame_timeout: Duration,
    /// Limit for each status line. `None` waits forever.
    #[serde(with = "option_millis", rename = "status_timeout_ms")]
    pub status_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_offset_retries: DEFAULT_MAX_OFFSET_RETRIES,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            status_timeout: None,
        }
    }
}

/// Summary of a finished download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Bytes delivered to the sink.
    pub bytes_received: u64,
    /// `AT+CFTPSGET` commands sent.
    pub requests: u32,
    /// Frames delivered to the sink.
    pub frames: u32,
    /// Retries spent across all offsets.
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestingChunk,
    AwaitingStatusLine,
    ReceivingFrame(usize),
    RetryOffset,
    Complete,
}

/// Frames received for the request in flight.
#[derive(Debug, Default)]
struct Attempt {
    frames: Vec<Bytes>,
    requested: u64,
    received: u64,
}

impl Attempt {
    fn begin(&mut self, requested: usize) {
        self.frames.clear();
        self.requested = requested as u64;
        self.received = 0;
    }

    /// Bytes still owed for this request. `received` never exceeds `requested`.
    fn room(&self) -> u64 {
        self.requested.saturating_sub(self.received)
    }

    fn stage(&mut self, frame: Bytes) {
        self.received += frame.len() as u64;
        self.frames.push(frame);
    }
}

/// Download `session.total_size()` bytes of `session.filename()` into `sink`.
///
/// Returns once the sink holds the whole file. On error the sink keeps every
/// chunk confirmed before the failing offset, and `session` still points at
/// that offset.
pub async fn run<W, S>(
    channel: &mut CommandChannel<W>,
    session: &mut DownloadSession,
    sink: &mut S,
    config: &DownloadConfig,
) -> Result<DownloadReport>
where
    W: AsyncWrite + Unpin,
    S: ChunkSink + ?Sized,
{
    let mut report = DownloadReport {
        bytes_received: session.bytes_received(),
        ..DownloadReport::default()
    };
    let mut attempt = Attempt::default();
    let mut state = State::RequestingChunk;

    loop {
        state = match state {
            State::RequestingChunk => {
                let Some(len) = session.current_chunk() else {
                    break;
                };
                attempt.begin(len);

                let command = commands::get(session.filename(), session.offset(), len)?;
                channel.send_command(&command).await?;
                report.requests += 1;
                tracing::debug!(offset = session.offset(), len, "chunk requested");
                State::AwaitingStatusLine
            }

            State::AwaitingStatusLine => {
                let line = channel
                    .next_line(config.status_timeout)
                    .await
                    .ok_or(SimftpError::StatusTimeout {
                        offset: session.offset(),
                    })?;

                match ChunkResponse::classify(&line) {
                    ChunkResponse::ExpectData(0) | ChunkResponse::Unrecognized => {
                        State::AwaitingStatusLine
                    }
                    ChunkResponse::ExpectData(len) => State::ReceivingFrame(len),
                    ChunkResponse::Retry => State::RetryOffset,
                    ChunkResponse::Complete if attempt.received == 0 => {
                        tracing::warn!(
                            offset = session.offset(),
                            "chunk closed without data"
                        );
                        State::RetryOffset
                    }
                    ChunkResponse::Complete => State::Complete,
                    ChunkResponse::Error => {
                        return Err(SimftpError::ServerError {
                            offset: session.offset(),
                        })
                    }
                }
            }

            State::ReceivingFrame(len) => {
                if len as u64 > attempt.room() {
                    return Err(SimftpError::ProtocolViolation(format!(
                        "{len}-byte frame at offset {} overruns {}-byte request",
                        session.offset() + attempt.received,
                        attempt.requested
                    )));
                }

                let frame = channel
                    .frames()
                    .read_exact_bytes_timeout(len, config.frame_timeout)
                    .await
                    .ok_or(SimftpError::FrameTimeout {
                        offset: session.offset() + attempt.received,
                        expected: len,
                    })?;
                attempt.stage(frame);
                State::AwaitingStatusLine
            }

            State::RetryOffset => {
                let attempts = session.record_retry();
                report.retries += 1;
                if attempts >= config.max_offset_retries {
                    return Err(SimftpError::RetryBudgetExhausted {
                        offset: session.offset(),
                        attempts,
                    });
                }
                tracing::warn!(
                    offset = session.offset(),
                    attempt = attempts,
                    discarded = attempt.received,
                    "retrying chunk"
                );
                State::RequestingChunk
            }

            State::Complete => {
                let mut offset = session.offset();
                for frame in attempt.frames.drain(..) {
                    sink.accept(offset, &frame)
                        .map_err(|source| SimftpError::Sink { offset, source })?;
                    offset += frame.len() as u64;
                    report.frames += 1;
                }

                session.advance(attempt.received);
                report.bytes_received = session.bytes_received();
                tracing::info!(
                    offset = session.offset(),
                    total = session.total_size(),
                    "{:.1}% downloaded",
                    session.progress_percent()
                );
                State::RequestingChunk
            }
        };
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    use crate::buffer::{FrameReader, RingBuffer};
    use crate::download::MemorySink;

    /// Channel whose replies are already buffered, plus the device end of the
    /// command stream.
    fn scripted(replies: &[u8]) -> (CommandChannel<DuplexStream>, DuplexStream) {
        let ring = Arc::new(RingBuffer::new(64 * 1024));
        assert_eq!(ring.put_bulk(replies), replies.len());
        let (host, device) = duplex(64 * 1024);
        (CommandChannel::new(host, FrameReader::new(ring)), device)
    }

    fn data_reply(payload: &[u8]) -> Vec<u8> {
        let mut reply = format!("+CFTPSGET: DATA,{}\r\n", payload.len()).into_bytes();
        reply.extend_from_slice(payload);
        reply.extend_from_slice(b"\r\n");
        reply
    }

    async fn sent_commands(mut device: DuplexStream) -> Vec<String> {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match tokio::time::timeout(Duration::from_millis(20), device.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => raw.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        String::from_utf8(raw)
            .unwrap()
            .split_terminator("\r\n")
            .map(str::to_owned)
            .collect()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_single_chunk() {
        let file = pattern(100);
        let mut replies = data_reply(&file);
        replies.extend_from_slice(b"+CFTPSGET: 0\r\n");

        let (mut channel, device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 100, 4096);
        let mut sink = MemorySink::new();

        let report = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(sink.data(), &file[..]);
        assert_eq!(
            report,
            DownloadReport {
                bytes_received: 100,
                requests: 1,
                frames: 1,
                retries: 0
            }
        );
        assert_eq!(
            sent_commands(device).await,
            vec![r#"AT+CFTPSGET="fw.bin",0,100"#]
        );
    }

    #[tokio::test]
    async fn test_multiple_frames_per_chunk() {
        let file = pattern(300);
        let mut replies = Vec::new();
        replies.extend_from_slice(b"OK\r\n");
        replies.extend(data_reply(&file[..128]));
        replies.extend(data_reply(&file[128..]));
        replies.extend_from_slice(b"+CFTPSGET: 0\r\n");

        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 300, 4096);
        let mut sink = MemorySink::new();

        let report = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(sink.data(), &file[..]);
        assert_eq!(sink.writes(), &[(0, 128), (128, 172)]);
        assert_eq!(report.frames, 2);
    }

    #[tokio::test]
    async fn test_retry_discards_partial_attempt() {
        let file = pattern(50);
        let mut replies = data_reply(&file[..20]);
        replies.extend_from_slice(b"+CFTPSGET: 14\r\n");
        replies.extend(data_reply(&file));
        replies.extend_from_slice(b"+CFTPSGET: 0\r\n");

        let (mut channel, device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 50, 4096);
        let mut sink = MemorySink::new();

        let report = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(sink.data(), &file[..]);
        assert_eq!(report.retries, 1);
        assert_eq!(report.requests, 2);
        assert_eq!(sent_commands(device).await.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let replies = b"+CFTPSGET: 14\r\n".repeat(5);
        let (mut channel, device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 10, 4096);
        let mut sink = MemorySink::new();

        let result = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default()).await;

        match result {
            Err(SimftpError::RetryBudgetExhausted { offset, attempts }) => {
                assert_eq!(offset, 0);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected RetryBudgetExhausted, got {other:?}"),
        }
        assert!(sink.data().is_empty());
        assert_eq!(sent_commands(device).await.len(), 5);
    }

    #[tokio::test]
    async fn test_complete_without_data_counts_as_retry() {
        let file = pattern(8);
        let mut replies = b"+CFTPSGET: 0\r\n".to_vec();
        replies.extend(data_reply(&file));
        replies.extend_from_slice(b"+CFTPSGET: 0\r\n");

        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 8, 4096);
        let mut sink = MemorySink::new();

        let report = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(report.retries, 1);
        assert_eq!(sink.data(), &file[..]);
    }

    #[tokio::test]
    async fn test_error_is_fatal() {
        let (mut channel, _device) = scripted(b"ERROR\r\n");
        let mut session = DownloadSession::new("fw.bin", 10, 4096);
        let mut sink = MemorySink::new();

        let result = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default()).await;
        assert!(matches!(result, Err(SimftpError::ServerError { offset: 0 })));
    }

    #[tokio::test]
    async fn test_overrun_is_protocol_violation() {
        let replies = data_reply(&pattern(20));
        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 10, 4096);
        let mut sink = MemorySink::new();

        let result = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default()).await;
        assert!(matches!(result, Err(SimftpError::ProtocolViolation(_))));
        assert!(sink.data().is_empty());
    }

    #[tokio::test]
    async fn test_echo_of_error_like_filename() {
        let mut replies = b"AT+CFTPSGET=\"ERROR_log.bin\",0,5\r\r\nOK\r\n".to_vec();
        replies.extend(data_reply(b"hello"));
        replies.extend_from_slice(b"+CFTPSGET: 0\r\n");
        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("ERROR_log.bin", 5, 4096);
        let mut sink = MemorySink::new();

        run(&mut channel, &mut session, &mut sink, &DownloadConfig::default())
            .await
            .unwrap();
        assert_eq!(sink.data(), b"hello");
    }

    #[tokio::test]
    async fn test_huge_frame_after_staged_data() {
        let mut replies = data_reply(b"abcd");
        replies.extend_from_slice(b"+CFTPSGET: DATA,99999999999999999999999\r\n");
        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 10, 4096);
        let mut sink = MemorySink::new();

        let result = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default()).await;
        assert!(matches!(result, Err(SimftpError::ProtocolViolation(_))));
        assert!(sink.data().is_empty());
    }

    #[tokio::test]
    async fn test_frame_larger_than_request() {
        let mut replies = data_reply(&pattern(3000));
        replies.extend_from_slice(b"+CFTPSGET: 0\r\n");
        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 10_000, 2048);
        let mut sink = MemorySink::new();

        let result = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default()).await;
        assert!(matches!(result, Err(SimftpError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_frame_timeout() {
        let replies = b"+CFTPSGET: DATA,10\r\nabc".to_vec();
        let (mut channel, _device) = scripted(&replies);
        let mut session = DownloadSession::new("fw.bin", 10, 4096);
        let mut sink = MemorySink::new();
        let config = DownloadConfig {
            frame_timeout: Duration::from_millis(20),
            ..DownloadConfig::default()
        };

        let result = run(&mut channel, &mut session, &mut sink, &config).await;
        assert!(matches!(
            result,
            Err(SimftpError::FrameTimeout {
                offset: 0,
                expected: 10
            })
        ));
    }

    #[tokio::test]
    async fn test_status_timeout() {
        let (mut channel, _device) = scripted(b"");
        let mut session = DownloadSession::new("fw.bin", 10, 4096);
        let mut sink = MemorySink::new();
        let config = DownloadConfig {
            status_timeout: Some(Duration::from_millis(20)),
            ..DownloadConfig::default()
        };

        let result = run(&mut channel, &mut session, &mut sink, &config).await;
        assert!(matches!(result, Err(SimftpError::StatusTimeout { offset: 0 })));
    }

    #[tokio::test]
    async fn test_empty_file_sends_nothing() {
        let (mut channel, device) = scripted(b"");
        let mut session = DownloadSession::new("empty", 0, 4096);
        let mut sink = MemorySink::new();

        let report = run(&mut channel, &mut session, &mut sink, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(report, DownloadReport::default());
        assert!(sent_commands(device).await.is_empty());
    }
}
