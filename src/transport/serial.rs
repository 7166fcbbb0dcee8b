//! Serial port transport.
//!
//! The modem's AT port is plain 8N1 without flow control. DTR and RTS are
//! asserted after opening; some USB bridges keep the modem side quiet until
//! they see DTR.
//!
//! # Example
//!
//! ```ignore
//! use simftp::transport::open_serial;
//!
//! let port = open_serial("/dev/ttyUSB2", 115_200)?;
//! let session = SessionBuilder::new().start(port);
//! ```

use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

use crate::error::{Result, SimftpError};

/// Open `port` at `baud` as an async stream.
///
/// Must be called from within a Tokio runtime.
pub fn open_serial(port: &str, baud: u32) -> Result<SerialStream> {
    let open_error = |source| SimftpError::TransportOpen {
        port: port.to_string(),
        source,
    };

    let mut stream = tokio_serial::new(port, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(open_error)?;

    stream.write_data_terminal_ready(true).map_err(open_error)?;
    stream.write_request_to_send(true).map_err(open_error)?;

    tracing::info!(port, baud, "serial port open");
    Ok(stream)
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(|source| SimftpError::TransportOpen {
        port: "<enumeration>".to_string(),
        source,
    })?;
    Ok(ports.into_iter().map(|info| info.port_name).collect())
}
