//! Reply parsing: numeric fields and `+CFTPSGET` status classification.

/// Marker preceding a binary payload announcement.
pub const DATA_MARKER: &str = "+CFTPSGET: DATA,";
/// Status line asking the host to retry the same offset.
pub const RETRY_MARKER: &str = "+CFTPSGET: 14";
/// Status line closing a successful chunk.
pub const COMPLETE_MARKER: &str = "+CFTPSGET: 0";
/// Literal failure token.
pub const ERROR_MARKER: &str = "ERROR";
/// Start of a command echoed back by the modem.
const ECHO_PREFIX: &str = "AT";

/// Classification of one line received while a chunk request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkResponse {
    /// `+CFTPSGET: DATA,<len>`: exactly `len` raw bytes follow.
    ExpectData(usize),
    /// `+CFTPSGET: 14`: transient failure, request the same offset again.
    Retry,
    /// `+CFTPSGET: 0`: the chunk is finished.
    Complete,
    /// `ERROR`: the modem gave up.
    Error,
    /// Anything else (echo, blank line, URC).
    Unrecognized,
}

impl ChunkResponse {
    /// Classify a line by the markers it contains.
    ///
    /// Echoed commands are never a status, whatever the file name inside
    /// them. The payload announcement is checked first, so `DATA,0` never
    /// reads as a completion.
    pub fn classify(line: &str) -> Self {
        if line.trim_start().starts_with(ECHO_PREFIX) {
            return ChunkResponse::Unrecognized;
        }
        if let Some(pos) = line.find(DATA_MARKER) {
            let len = leading_number(&line[pos + DATA_MARKER.len()..]).unwrap_or(0);
            return ChunkResponse::ExpectData(len as usize);
        }
        if line.contains(RETRY_MARKER) {
            ChunkResponse::Retry
        } else if line.contains(COMPLETE_MARKER) {
            ChunkResponse::Complete
        } else if line.contains(ERROR_MARKER) {
            ChunkResponse::Error
        } else {
            ChunkResponse::Unrecognized
        }
    }
}

/// Parse the integer following `prefix` in `line`.
///
/// Skips any non-digit characters after the prefix, then reads consecutive
/// digits. Returns `None` if the prefix is missing or no digit follows.
pub fn parse_numeric(line: &str, prefix: &str) -> Option<u64> {
    let pos = line.find(prefix)?;
    let rest = &line[pos + prefix.len()..];
    let start = rest.find(|c: char| c.is_ascii_digit())?;
    leading_number(&rest[start..])
}

/// Digits at the very start of `s`, saturating on overflow.
fn leading_number(s: &str) -> Option<u64> {
    let digits = s.bytes().take_while(u8::is_ascii_digit);
    let mut seen = false;
    let value = digits.fold(0u64, |acc, d| {
        seen = true;
        acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    });
    seen.then_some(value)
}
