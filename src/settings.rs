//! Settings related to provcom serial port and provisioning protocol timing.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings related to the serial port and the provisioning
/// session timing, and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
///
/// The session receives every timing and protocol parameter through this
/// value; nothing is read from ambient or global state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Upper bound for a single blocking read or write on the port. Reads
    /// during the session poll the input buffer first, so in practice this
    /// bounds worst-case latency rather than the common path.
    pub poll_timeout: Duration,

    /// When `true`, wait for the device to print a ready banner before
    /// transmitting, up to `ready_timeout`.
    pub wait_ready: bool,
    /// How long to wait for a ready banner when `wait_ready` is enabled.
    pub ready_timeout: Duration,
    /// Delay before transmitting when `wait_ready` is disabled, to let a
    /// freshly rebooted device stabilize.
    pub settle_delay: Duration,

    /// How long to wait for the provisioning acknowledgment after each
    /// transmit. A zero value means fire-and-forget: transmit once and
    /// exit without reading any response.
    pub ack_timeout: Duration,
    /// When `true`, never read from the port after transmitting. Useful
    /// when the response will be watched from a separate UART monitor.
    pub no_read: bool,

    /// Maximum number of transmit attempts for one session.
    pub max_attempts: usize,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().path("/dev/ttyACM0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                poll_timeout: Duration::from_millis(500),
                wait_ready: true,
                ready_timeout: Duration::from_secs(15),
                settle_delay: Duration::from_secs(7),
                ack_timeout: Duration::from_secs(10),
                no_read: false,
                max_attempts: 2,
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the upper bound for a single blocking port read or write
    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.settings.poll_timeout = poll_timeout;
        self
    }

    /// Enable or disable waiting for the device ready banner
    pub fn wait_ready(mut self, wait_ready: bool) -> Self {
        self.settings.wait_ready = wait_ready;
        self
    }

    /// Set how long to wait for the device ready banner
    pub fn ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.settings.ready_timeout = ready_timeout;
        self
    }

    /// Set the pre-transmit settle delay used when ready-waiting is disabled
    pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settings.settle_delay = settle_delay;
        self
    }

    /// Set how long to wait for the provisioning acknowledgment; zero means
    /// fire-and-forget
    pub fn ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.settings.ack_timeout = ack_timeout;
        self
    }

    /// Skip reading any response after transmitting
    pub fn no_read(mut self, no_read: bool) -> Self {
        self.settings.no_read = no_read;
        self
    }

    /// Set the maximum number of transmit attempts for one session
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.settings.max_attempts = max_attempts;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            poll_timeout: Duration::from_millis(500),
            wait_ready: true,
            ready_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_secs(7),
            ack_timeout: Duration::from_secs(10),
            no_read: false,
            max_attempts: 2,
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyACM0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyACM0");
}

#[test]
fn baud_rate() {
    let baud_rate = 230_400;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn data_bits() {
    let data_bits = DataBits::Seven;
    let settings = SettingsBuilder::new().data_bits(data_bits).finalize();
    assert_eq!(settings.data_bits, data_bits);
}

#[test]
fn flow_control() {
    let flow_control = FlowControl::Hardware;
    let settings = SettingsBuilder::new().flow_control(flow_control).finalize();
    assert_eq!(settings.flow_control, flow_control);
}

#[test]
fn stop_bits() {
    let stop_bits = StopBits::Two;
    let settings = SettingsBuilder::new().stop_bits(stop_bits).finalize();
    assert_eq!(settings.stop_bits, stop_bits);
}

#[test]
fn parity() {
    let parity = Parity::Even;
    let settings = SettingsBuilder::new().parity(parity).finalize();
    assert_eq!(settings.parity, parity);
}

#[test]
fn ready_wait_timing() {
    let settings = SettingsBuilder::new()
        .wait_ready(false)
        .ready_timeout(Duration::from_secs(3))
        .settle_delay(Duration::from_millis(250))
        .finalize();
    assert!(!settings.wait_ready);
    assert_eq!(settings.ready_timeout, Duration::from_secs(3));
    assert_eq!(settings.settle_delay, Duration::from_millis(250));
}

#[test]
fn ack_timing() {
    let settings = SettingsBuilder::new()
        .ack_timeout(Duration::from_millis(0))
        .no_read(true)
        .max_attempts(1)
        .finalize();
    assert_eq!(settings.ack_timeout, Duration::from_millis(0));
    assert!(settings.no_read);
    assert_eq!(settings.max_attempts, 1);
}
