//! Protocol module - the SIMCom `AT+CFTPS*` command dialect.
//!
//! - Command builders with safe parameter quoting
//! - Reply markers and numeric field parsing
//! - Classification of `+CFTPSGET` status lines

pub mod commands;
mod response;

pub use commands::{command_name, LINE_TERMINATOR};
pub use response::{
    parse_numeric, ChunkResponse, COMPLETE_MARKER, DATA_MARKER, ERROR_MARKER, RETRY_MARKER,
};
