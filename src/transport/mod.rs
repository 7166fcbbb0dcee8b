//! Transport module - the byte stream to the modem.
//!
//! Sessions run over any `AsyncRead + AsyncWrite` stream. This module opens
//! the one used in practice, a serial port.

mod serial;

pub use serial::{available_ports, open_serial};
pub use tokio_serial::SerialStream;
