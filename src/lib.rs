//! # simftp
//!
//! Download files over FTP through a SIMCom cellular modem's AT command port.
//!
//! The modem runs the FTP client itself; the host only talks to it over a
//! serial line, sending `AT+CFTPS*` commands and reading back text replies
//! interleaved with raw file data.
//!
//! ## Architecture
//!
//! - **Reader task**: moves transport bytes into a shared ring buffer
//! - **Frame reader**: pulls text lines and declared-length binary frames
//!   back out of the buffer
//! - **Command channel**: sends commands and waits for the lines that answer
//!   them
//! - **Download state machine**: chunked `AT+CFTPSGET` with per-offset retry
//!
//! ## Example
//!
//! ```ignore
//! use simftp::{Credentials, DownloadConfig, FileSink, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> simftp::Result<()> {
//!     let port = simftp::transport::open_serial("/dev/ttyUSB2", 115_200)?;
//!     let mut session = SessionBuilder::new().start(port);
//!
//!     let client = session.client();
//!     client
//!         .handshake(&Credentials::new("ftp.example.com", 21, "user", "pass"))
//!         .await?;
//!
//!     let mut sink = FileSink::create("fw.bin")?;
//!     client
//!         .download("fw.bin", &mut sink, &DownloadConfig::default())
//!         .await?;
//!
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod command;
pub mod config;
pub mod download;
pub mod error;
pub mod ftp;
pub mod protocol;
pub mod reader;
pub mod session;
pub mod transport;

pub use config::Config;
pub use download::{ChunkSink, DownloadConfig, DownloadReport, FileSink, MemorySink};
pub use error::{Result, SimftpError};
pub use ftp::{Credentials, FtpClient, HandshakeStep, Timeouts};
pub use session::{ModemSession, SessionBuilder};
