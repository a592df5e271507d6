use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::dmsxml;
use crate::errors::ConfigError;
use crate::operation::RetryPolicy;
use crate::serial::{self, Connector, TransportError};

const DEFAULT_BAUD: u32 = 9600;
const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 200;
const DEFAULT_IDLE_WAIT_MS: u64 = 1000;
const DEFAULT_RETRY_THRESHOLD: u32 = 3;

/// Longest a single operation attempt may hold the link, in multiples of the response timeout.
const OP_CEILING_TIMEOUTS: u32 = 8;

/// The wire protocol spoken on a link.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// DMS XML sign servers.
    DmsXml,

    /// G4 vehicle detection sensors.
    G4,

    /// SS125 vehicle detection sensors.
    Ss125,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Protocol::DmsXml => "dmsxml",
            Protocol::G4 => "g4",
            Protocol::Ss125 => "ss125",
        };
        write!(f, "{}", name)
    }
}

/// Settings for one communication link.
///
/// Usually loaded from a TOML table; durations are given in milliseconds and exposed as
/// [`Duration`]s. Fields left out take their defaults: 9600 baud, a 5 second response
/// timeout (30 seconds for DMS XML), 200 ms between reconnection attempts, 1 second idle
/// waits and 3 retries.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use roadlink::{LinkConfig, Protocol};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let config = LinkConfig::from_toml_str(
///     r#"
///     name = "sensors_i94"
///     protocol = "ss125"
///     uri = "10.0.4.12:9000"
///     retry_threshold = 5
///     "#,
/// )?;
/// assert_eq!(Protocol::Ss125, config.protocol);
/// assert_eq!(Duration::from_secs(5), config.timeout());
///
/// let built = LinkConfig::new("sensors_i94", Protocol::Ss125, "10.0.4.12:9000").with_retry_threshold(5);
/// assert_eq!(built, config);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Name of the link, used in logs and thread names.
    pub name: String,

    /// Protocol spoken on the link.
    pub protocol: Protocol,

    /// `host:port` for TCP, otherwise a serial device path.
    pub uri: String,

    /// Serial baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Response timeout, if not the protocol default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Pause before reconnecting after an I/O failure.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// How long the worker waits for queued work before checking for shutdown.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Retries allowed after an operation's first failed attempt.
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: u32,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_idle_wait_ms() -> u64 {
    DEFAULT_IDLE_WAIT_MS
}

fn default_retry_threshold() -> u32 {
    DEFAULT_RETRY_THRESHOLD
}

impl LinkConfig {
    /// Creates a configuration with default settings.
    pub fn new<N: Into<String>, U: Into<String>>(name: N, protocol: Protocol, uri: U) -> Self {
        LinkConfig {
            name: name.into(),
            protocol,
            uri: uri.into(),
            baud: DEFAULT_BAUD,
            timeout_ms: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            idle_wait_ms: DEFAULT_IDLE_WAIT_MS,
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
        }
    }

    /// Sets the serial baud rate.
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Sets the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Sets the pause before reconnecting.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the idle wait.
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Sets the retry threshold.
    pub fn with_retry_threshold(mut self, retries: u32) -> Self {
        self.retry_threshold = retries;
        self
    }

    /// Parses and validates a single link table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown fields, or
    /// [`ConfigError::Invalid`] if a value is unusable.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: LinkConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a single link table from a file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file can't be read, or any error from
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            link: self.name.clone(),
            message: message.into(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.uri.trim().is_empty() {
            return Err(invalid("uri is empty"));
        }
        if self.baud == 0 {
            return Err(invalid("baud must be positive"));
        }
        if self.timeout_ms == Some(0) {
            return Err(invalid("timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Response timeout.
    pub fn timeout(&self) -> Duration {
        match (self.timeout_ms, self.protocol) {
            (Some(ms), _) => Duration::from_millis(ms),
            (None, Protocol::DmsXml) => dmsxml::DEFAULT_TIMEOUT,
            (None, _) => Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Pause before reconnecting after an I/O failure.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// How long the worker waits for queued work at a time.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Longest a single operation attempt may hold the link.
    pub fn op_ceiling(&self) -> Duration {
        self.timeout() * OP_CEILING_TIMEOUTS
    }

    /// Retry policy for operations on this link.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Limited(self.retry_threshold)
    }

    /// Creates a connector for the link's URI.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] if the URI is empty.
    pub fn connector(&self) -> Result<Box<dyn Connector>, TransportError> {
        serial::connector_for(&self.uri, self.baud, self.timeout())
    }
}

/// A file describing several links as an array of `[[link]]` tables.
///
/// # Examples
///
/// ```
/// use roadlink::{LinksFile, Protocol};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let file = LinksFile::from_toml_str(
///     r#"
///     [[link]]
///     name = "signs"
///     protocol = "dmsxml"
///     uri = "dms-server:8081"
///
///     [[link]]
///     name = "g4_north"
///     protocol = "g4"
///     uri = "/dev/ttyS1"
///     baud = 19200
///     "#,
/// )?;
/// assert_eq!(2, file.links.len());
/// assert_eq!(Protocol::G4, file.links[1].protocol);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinksFile {
    /// The configured links.
    #[serde(rename = "link", default)]
    pub links: Vec<LinkConfig>,
}

impl LinksFile {
    /// Parses and validates every link.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, or [`ConfigError::Invalid`] if a
    /// link is unusable or two links share a name.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: LinksFile = toml::from_str(text)?;
        for (i, link) in file.links.iter().enumerate() {
            link.validate()?;
            if file.links[..i].iter().any(|other| other.name == link.name) {
                return Err(ConfigError::Invalid {
                    link: link.name.clone(),
                    message: "name is used more than once".into(),
                });
            }
        }
        Ok(file)
    }

    /// Reads links from a file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file can't be read, or any error from
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}
