//! AT command strings for the SIMCom FTP(S) client.
//!
//! ```text
//! AT                                  -> OK
//! AT+CFTPSSTART                       -> +CFTPSSTART: 0
//! AT+CFTPSSINGLEIP=1                  -> OK
//! AT+CFTPSLOGIN="h",p,"u","pw",0      -> +CFTPSLOGIN: 0
//! AT+CFTPSTYPE=I                      -> +CFTPSTYPE: 0
//! AT+CFTPSSIZE="file"                 -> +CFTPSSIZE: <n>
//! AT+CFTPSGET="file",<offset>,<len>   -> +CFTPSGET: DATA,<n> ... +CFTPSGET: 0
//! ```
//!
//! Builders return the command without its line terminator; the command
//! channel appends `\r\n` when sending.

use crate::error::{Result, SimftpError};

/// Line terminator appended to every command.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Liveness check.
pub const AT: &str = "AT";
/// Start the FTP client service.
pub const START_SERVICE: &str = "AT+CFTPSSTART";
/// Restrict the FTP client to a single IP connection.
pub const SINGLE_IP: &str = "AT+CFTPSSINGLEIP=1";
/// Switch to binary (image) transfer type.
pub const BINARY_TYPE: &str = "AT+CFTPSTYPE=I";

/// Generic success reply.
pub const OK: &str = "OK";
/// Reply confirming `AT+CFTPSSTART`.
pub const START_OK: &str = "+CFTPSSTART: 0";
/// Reply confirming `AT+CFTPSLOGIN`.
pub const LOGIN_OK: &str = "+CFTPSLOGIN: 0";
/// Reply confirming `AT+CFTPSTYPE`.
pub const TYPE_OK: &str = "+CFTPSTYPE: 0";
/// Prefix of the `AT+CFTPSSIZE` reply, followed by the size in bytes.
pub const SIZE_PREFIX: &str = "+CFTPSSIZE: ";

/// Build the login command.
pub fn login(host: &str, port: u16, user: &str, password: &str) -> Result<String> {
    Ok(format!(
        "AT+CFTPSLOGIN={},{},{},{},0",
        quoted(host)?,
        port,
        quoted(user)?,
        quoted(password)?
    ))
}

/// Build the remote file size query.
pub fn size(filename: &str) -> Result<String> {
    Ok(format!("AT+CFTPSSIZE={}", quoted(filename)?))
}

/// Build one chunked download request.
pub fn get(filename: &str, offset: u64, len: usize) -> Result<String> {
    Ok(format!("AT+CFTPSGET={},{},{}", quoted(filename)?, offset, len))
}

/// Name of a command without its arguments, safe to log.
///
/// `AT+CFTPSLOGIN="host",21,"user","secret",0` becomes `AT+CFTPSLOGIN`.
pub fn command_name(command: &str) -> &str {
    command
        .split_once(['=', '?'])
        .map_or(command, |(name, _)| name)
        .trim_end()
}

/// Wrap a parameter in double quotes, rejecting values the modem cannot parse.
fn quoted(value: &str) -> Result<String> {
    if value.contains(['"', '\r', '\n']) {
        return Err(SimftpError::InvalidArgument(format!(
            "{value:?} cannot be sent inside a quoted AT parameter"
        )));
    }
    Ok(format!("\"{value}\""))
}
