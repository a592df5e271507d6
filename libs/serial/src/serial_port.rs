use std::time::Duration;

use serial_core::prelude::*;
use serial_core::BaudRate;

use crate::errors::TransportError;

const SUPPORTED_BAUDS: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200];

/// Configures a serial port for a roadway device link.
///
/// Field controllers use 8N1 format without flow control. `read_timeout` bounds each
/// individual read; the time allowed for a complete response is tracked separately.
///
/// # Errors
///
/// Returns:
/// * [`TransportError::UnsupportedBaud`] if `baud` isn't a standard rate.
/// * [`TransportError::Configuration`] if the underlying serial port reports an error.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let mut port = serial::open("/dev/ttyS0")?;
/// roadlink_serial::configure_port(&mut port, 9600, Duration::from_millis(100))?;
/// // Now ready for communication with a sensor (8N1 9600 baud).
/// #
/// # Ok(()) }
/// ```
pub fn configure_port<P: SerialPort>(port: &mut P, baud: u32, read_timeout: Duration) -> Result<(), TransportError> {
    if !SUPPORTED_BAUDS.contains(&baud) {
        return Err(TransportError::UnsupportedBaud { baud });
    }
    let rate = BaudRate::from_speed(baud as usize);
    port.reconfigure(&|settings| {
        settings.set_baud_rate(rate)?;
        settings.set_char_size(serial_core::Bits8);
        settings.set_parity(serial_core::ParityNone);
        settings.set_stop_bits(serial_core::Stop1);
        settings.set_flow_control(serial_core::FlowNone);
        Ok(())
    })?;
    port.set_timeout(read_timeout)?;
    Ok(())
}
