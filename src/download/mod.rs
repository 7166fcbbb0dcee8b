//! Download module - chunked `AT+CFTPSGET` transfers.
//!
//! - [`DownloadSession`]: offset, retry and byte accounting for one file
//! - [`run`]: the request/status/frame state machine
//! - [`ChunkSink`]: where confirmed bytes go ([`FileSink`], [`MemorySink`])

mod machine;
mod session;
pub mod sink;

pub use machine::{
    run, DownloadConfig, DownloadReport, DEFAULT_FRAME_TIMEOUT, DEFAULT_MAX_OFFSET_RETRIES,
};
pub use session::{DownloadSession, DEFAULT_CHUNK_SIZE};
pub use sink::{ChunkSink, FileSink, MemorySink};
