//! FTP client facade over the modem's `AT+CFTPS*` commands.
//!
//! [`FtpClient`] knows which reply confirms each command and how long to wait
//! for it. A typical session:
//!
//! ```ignore
//! let mut client = session.client();
//! client.handshake(&credentials).await?;
//! let mut sink = FileSink::create("fw.bin")?;
//! let report = client.download("fw.bin", &mut sink, &DownloadConfig::default()).await?;
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use crate::command::{CommandChannel, DEFAULT_WRITE_TIMEOUT};
use crate::config::millis;
use crate::download::{self, ChunkSink, DownloadConfig, DownloadReport, DownloadSession};
use crate::error::{Result, SimftpError};
use crate::protocol::commands;

/// One step of the FTP setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    /// `AT`
    Attention,
    /// `AT+CFTPSSTART`
    StartService,
    /// `AT+CFTPSSINGLEIP=1`
    SingleIp,
    /// `AT+CFTPSLOGIN`
    Login,
    /// `AT+CFTPSTYPE=I`
    TransferType,
    /// `AT+CFTPSSIZE`
    FileSize,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStep::Attention => "AT check",
            HandshakeStep::StartService => "FTP service start",
            HandshakeStep::SingleIp => "single-IP mode",
            HandshakeStep::Login => "FTP login",
            HandshakeStep::TransferType => "transfer type",
            HandshakeStep::FileSize => "file size query",
        };
        f.write_str(name)
    }
}

/// How long each step waits for its confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// `AT` -> `OK`.
    #[serde(with = "millis", rename = "ack_ms")]
    pub ack: Duration,
    /// Service start and single-IP mode.
    #[serde(with = "millis", rename = "service_ms")]
    pub service: Duration,
    /// Login, which includes the TCP connect to the server.
    #[serde(with = "millis", rename = "login_ms")]
    pub login: Duration,
    /// Binary transfer type.
    #[serde(with = "millis", rename = "transfer_type_ms")]
    pub transfer_type: Duration,
    /// Remote file size query.
    #[serde(with = "millis", rename = "size_ms")]
    pub size: Duration,
    /// Writing one command to the transport.
    #[serde(with = "millis", rename = "write_ms")]
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ack: Duration::from_secs(1),
            service: Duration::from_secs(5),
            login: Duration::from_secs(30),
            transfer_type: Duration::from_secs(10),
            size: Duration::from_secs(10),
            write: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// FTP server address and account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Drives the modem's FTP client one command at a time.
pub struct FtpClient<W> {
    channel: CommandChannel<W>,
    timeouts: Timeouts,
}

impl<W> FtpClient<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap a command channel. Its write timeout is taken from `timeouts`.
    pub fn new(channel: CommandChannel<W>, timeouts: Timeouts) -> Self {
        let channel = channel.with_write_timeout(timeouts.write);
        Self { channel, timeouts }
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn channel(&self) -> &CommandChannel<W> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut CommandChannel<W> {
        &mut self.channel
    }

    /// `AT`, expecting `OK`. Safe to repeat.
    pub async fn check_alive(&mut self) -> Result<()> {
        let timeout = self.timeouts.ack;
        self.expect(HandshakeStep::Attention, commands::AT, commands::OK, timeout)
            .await
    }

    /// Start the modem's FTP service.
    pub async fn start_service(&mut self) -> Result<()> {
        let timeout = self.timeouts.service;
        self.expect(
            HandshakeStep::StartService,
            commands::START_SERVICE,
            commands::START_OK,
            timeout,
        )
        .await
    }

    /// Restrict the FTP client to one IP connection.
    pub async fn single_ip(&mut self) -> Result<()> {
        let timeout = self.timeouts.service;
        self.expect(
            HandshakeStep::SingleIp,
            commands::SINGLE_IP,
            commands::OK,
            timeout,
        )
        .await
    }

    /// Log in to the FTP server.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let command = commands::login(
            &credentials.host,
            credentials.port,
            &credentials.user,
            &credentials.password,
        )?;
        let timeout = self.timeouts.login;
        self.expect(HandshakeStep::Login, &command, commands::LOGIN_OK, timeout)
            .await
    }

    /// Switch to binary transfers.
    pub async fn set_binary(&mut self) -> Result<()> {
        let timeout = self.timeouts.transfer_type;
        self.expect(
            HandshakeStep::TransferType,
            commands::BINARY_TYPE,
            commands::TYPE_OK,
            timeout,
        )
        .await
    }

    /// Run the setup sequence: AT check, service start, single-IP mode,
    /// login and binary type, stopping at the first failure.
    pub async fn handshake(&mut self, credentials: &Credentials) -> Result<()> {
        self.check_alive().await?;
        self.start_service().await?;
        self.single_ip().await?;
        self.login(credentials).await?;
        self.set_binary().await?;
        tracing::info!(host = %credentials.host, port = credentials.port, "FTP session ready");
        Ok(())
    }

    /// Size of a remote file in bytes.
    pub async fn file_size(&mut self, filename: &str) -> Result<u64> {
        let command = commands::size(filename)?;
        self.channel.send_command(&command).await?;

        let size = self
            .channel
            .wait_for_numeric(commands::SIZE_PREFIX, self.timeouts.size)
            .await
            .ok_or(SimftpError::HandshakeTimeout {
                step: HandshakeStep::FileSize,
            })?;
        tracing::info!(filename, size, "remote file size");
        Ok(size)
    }

    /// Query the size of `filename`, then download all of it into `sink`.
    pub async fn download<S>(
        &mut self,
        filename: &str,
        sink: &mut S,
        config: &DownloadConfig,
    ) -> Result<DownloadReport>
    where
        S: ChunkSink + ?Sized,
    {
        let size = self.file_size(filename).await?;
        self.download_sized(filename, size, sink, config).await
    }

    /// Download a file whose size is already known.
    pub async fn download_sized<S>(
        &mut self,
        filename: &str,
        size: u64,
        sink: &mut S,
        config: &DownloadConfig,
    ) -> Result<DownloadReport>
    where
        S: ChunkSink + ?Sized,
    {
        let mut session = DownloadSession::new(filename, size, config.chunk_size);
        let report = download::run(&mut self.channel, &mut session, sink, config).await?;
        tracing::info!(
            filename,
            bytes = report.bytes_received,
            requests = report.requests,
            retries = report.retries,
            "download complete"
        );
        Ok(report)
    }

    async fn expect(
        &mut self,
        step: HandshakeStep,
        command: &str,
        reply: &str,
        timeout: Duration,
    ) -> Result<()> {
        self.channel.send_command(command).await?;
        if !self.channel.wait_for_line_containing(reply, timeout).await {
            return Err(SimftpError::HandshakeTimeout { step });
        }
        tracing::info!(%step, "ok");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    use crate::buffer::{FrameReader, RingBuffer};
    use crate::download::MemorySink;

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            ack: Duration::from_millis(50),
            service: Duration::from_millis(50),
            login: Duration::from_millis(50),
            transfer_type: Duration::from_millis(50),
            size: Duration::from_millis(50),
            write: Duration::from_millis(50),
        }
    }

    fn scripted(replies: &[u8]) -> (FtpClient<DuplexStream>, DuplexStream) {
        let ring = Arc::new(RingBuffer::new(16 * 1024));
        ring.put_bulk(replies);
        let (host, device) = duplex(16 * 1024);
        let channel = CommandChannel::new(host, FrameReader::new(ring));
        (FtpClient::new(channel, fast_timeouts()), device)
    }

    async fn drain(device: &mut DuplexStream) -> String {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_millis(20), device.read(&mut buf))
            .await
            .map(|r| r.unwrap())
            .unwrap_or(0);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn credentials() -> Credentials {
        Credentials::new("117.131.85.140", 60059, "user", "secret")
    }

    #[tokio::test]
    async fn test_check_alive_twice() {
        let (mut client, _device) = scripted(b"OK\r\nOK\r\n");
        client.check_alive().await.unwrap();
        client.check_alive().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_sends_commands_in_order() {
        let replies = b"OK\r\n+CFTPSSTART: 0\r\nOK\r\n+CFTPSLOGIN: 0\r\n+CFTPSTYPE: 0\r\n";
        let (mut client, mut device) = scripted(replies);

        client.handshake(&credentials()).await.unwrap();

        let sent = drain(&mut device).await;
        let lines: Vec<&str> = sent.split_terminator("\r\n").collect();
        assert_eq!(
            lines,
            vec![
                "AT",
                "AT+CFTPSSTART",
                "AT+CFTPSSINGLEIP=1",
                r#"AT+CFTPSLOGIN="117.131.85.140",60059,"user","secret",0"#,
                "AT+CFTPSTYPE=I",
            ]
        );
    }

    #[tokio::test]
    async fn test_handshake_stops_at_silent_step() {
        let (mut client, mut device) = scripted(b"OK\r\n+CFTPSSTART: 0\r\nOK\r\n+CFTPSLOGIN: 6\r\n");

        let result = client.handshake(&credentials()).await;
        assert!(matches!(
            result,
            Err(SimftpError::HandshakeTimeout {
                step: HandshakeStep::Login
            })
        ));

        let sent = drain(&mut device).await;
        assert!(!sent.contains("AT+CFTPSTYPE"));
    }

    #[tokio::test]
    async fn test_login_rejects_quote() {
        let (mut client, mut device) = scripted(b"");
        let creds = Credentials::new("host", 21, "user", "pa\"ss");

        let result = client.login(&creds).await;
        assert!(matches!(result, Err(SimftpError::InvalidArgument(_))));
        assert!(drain(&mut device).await.is_empty());
    }

    #[tokio::test]
    async fn test_file_size() {
        let (mut client, mut device) = scripted(b"\r\nOK\r\n+CFTPSSIZE: 10000\r\n");

        assert_eq!(client.file_size("fw.bin").await.unwrap(), 10000);
        assert_eq!(drain(&mut device).await, "AT+CFTPSSIZE=\"fw.bin\"\r\n");
    }

    #[tokio::test]
    async fn test_file_size_timeout() {
        let (mut client, _device) = scripted(b"ERROR\r\n");
        let result = client.file_size("missing.bin").await;
        assert!(matches!(
            result,
            Err(SimftpError::HandshakeTimeout {
                step: HandshakeStep::FileSize
            })
        ));
    }

    #[tokio::test]
    async fn test_download_queries_size_first() {
        let replies = b"+CFTPSSIZE: 5\r\n+CFTPSGET: DATA,5\r\nhello\r\n+CFTPSGET: 0\r\n";
        let (mut client, mut device) = scripted(replies);
        let mut sink = MemorySink::new();

        let report = client
            .download("hello.txt", &mut sink, &DownloadConfig::default())
            .await
            .unwrap();

        assert_eq!(sink.data(), b"hello");
        assert_eq!(report.bytes_received, 5);
        assert_eq!(
            drain(&mut device).await,
            "AT+CFTPSSIZE=\"hello.txt\"\r\nAT+CFTPSGET=\"hello.txt\",0,5\r\n"
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", credentials());
        assert!(debug.contains("117.131.85.140"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_step_names() {
        assert_eq!(HandshakeStep::StartService.to_string(), "FTP service start");
        assert_eq!(HandshakeStep::FileSize.to_string(), "file size query");
    }
}
