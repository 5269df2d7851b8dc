//! Serial port transport.

use log::{debug, info, trace};
use serialport::{ClearBuffer, SerialPort};

use crate::error::Result;
use crate::settings::Settings;

use super::Transport;

// We'll read 4K maximum each time.
const MAX_CHUNK: u32 = 4096;

// =============================================================================
// Public Interface
// =============================================================================

/// [`Transport`] over an open serial port.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Wrap an already opened and configured port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        SerialLink { port }
    }
}

impl Transport for SerialLink {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        // To handle the unreliable behavior of blocking/non-blocking of
        // reads over the serial port, we'll first check the available data
        // in the port's input buffer, and we only read the exact number of
        // available bytes (up to a certain maximum amount). That way we can
        // always know that read will return immediately.
        use std::io::Read;

        let available = self.port.bytes_to_read()?;
        trace!("Bytes available to read: {}", available);
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut serial_buf: Vec<u8> = vec![0; std::cmp::min(available, MAX_CHUNK) as usize];
        let n = self.port.read(serial_buf.as_mut_slice())?;
        serial_buf.truncate(n);
        Ok(serial_buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        use std::io::Write;
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn reset_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "{} @ {} baud",
            self.port.name().unwrap_or_else(|| "<unnamed>".into()),
            self.port
                .baud_rate()
                .map(|b| b.to_string())
                .unwrap_or_else(|_| "?".into())
        )
    }
}

/// Open and configure the serial port named in `settings`.
///
/// Opening is retried a few times with a fixed delay to ride out the port
/// briefly disappearing while a device re-enumerates; persistent failures
/// (port missing, permission denied, already in use) are returned to the
/// caller and end the provisioning run before it starts.
pub fn open_and_setup_port(settings: &Settings) -> Result<SerialLink> {
    use retry::{delay, retry_with_index};

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(4),
        |index| -> std::result::Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {}", index);
            // Open the port
            let path = settings.path.clone().unwrap();
            let builder = serialport::new(&path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .timeout(settings.poll_timeout);
            builder.open()
        },
    );
    match result {
        Ok(mut port) => {
            // Configure the port with the values in `settings`. TODO: This is
            // probably temporary until `serialport` configures the port after
            // `open` by itself.
            port.set_baud_rate(settings.baud_rate)?;
            port.set_data_bits(settings.data_bits)?;
            port.set_stop_bits(settings.stop_bits)?;
            port.set_parity(settings.parity)?;
            port.set_flow_control(settings.flow_control)?;
            port.set_timeout(settings.poll_timeout)?;

            info!(
                "Connected to {} at {} baud",
                port.name().unwrap(),
                port.baud_rate().unwrap()
            );
            debug!("data_bits    : {:#?}", port.data_bits().unwrap());
            debug!("stop_bits    : {:#?}", port.stop_bits().unwrap());
            debug!("parity       : {:#?}", port.parity().unwrap());
            debug!("flow control : {:#?}", port.flow_control().unwrap());

            assert_eq!(
                settings.baud_rate,
                port.baud_rate().unwrap(),
                "\n\n\
                 --> Failed to set the baud rate to the desired value {} which\n    \
                 is probably because it is not a valid one.\n    \
                 Change it to a good one in the command line arguments, or\n    \
                 don't specify it at all. The default value will be used.\n\
                 \n",
                settings.baud_rate
            );
            assert_eq!(settings.data_bits, port.data_bits().unwrap());
            assert_eq!(settings.stop_bits, port.stop_bits().unwrap());
            assert_eq!(settings.parity, port.parity().unwrap());

            Ok(SerialLink::new(port))
        }
        Err(err) => match err {
            retry::Error::Operation {
                error,
                total_delay,
                tries,
            } => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error.into())
            }
            retry::Error::Internal(_) => {
                info!("Internal retry error while opening port");
                Err(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                )
                .into())
            }
        },
    }
}
