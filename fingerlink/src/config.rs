//! Controller configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fingerlink_core::constants::{DEFAULT_ADDRESS, DEFAULT_PASSWORD};

use crate::error::{Error, Result};

/// Timing and retry policy for the finger-driven sequences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPolicy {
    /// How long to wait for a finger to be placed
    pub finger_timeout: Duration,

    /// How long to wait for the finger to be lifted between enroll captures
    pub removal_timeout: Duration,

    /// Delay between presence polls
    pub poll_interval: Duration,

    /// Placements tried per capture before giving up with a bad image
    pub capture_attempts: u8,

    /// Search the library after merging and refuse known fingers
    pub reject_duplicates: bool,

    /// Drive the sensor's ring LED while operations run
    pub led_feedback: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            finger_timeout: Duration::from_secs(10),
            removal_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            capture_attempts: 3,
            reject_duplicates: true,
            led_feedback: false,
        }
    }
}

impl ScanPolicy {
    /// Number of presence polls that fit in `timeout`
    pub fn polls_within(&self, timeout: Duration) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        let polls = timeout.as_millis() / interval;

        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".into()));
        }

        if self.capture_attempts == 0 {
            return Err(Error::Config("capture attempts must be at least 1".into()));
        }

        Ok(())
    }
}

/// Everything needed to wire up a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `host:port` of the serial bridge the sensor sits behind
    pub sensor_addr: String,

    /// Module address written into every frame
    pub address: u32,

    /// Module handshake password
    pub password: u32,

    /// Bound on a single command/response exchange
    pub exchange_timeout: Duration,

    /// Template registry file
    pub registry_path: PathBuf,

    /// Depth of each subscriber's status queue
    pub subscriber_queue: usize,

    pub scan: ScanPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_addr: "127.0.0.1:2000".to_string(),
            address: DEFAULT_ADDRESS,
            password: DEFAULT_PASSWORD,
            exchange_timeout: Duration::from_secs(2),
            registry_path: PathBuf::from("fingerprints.json"),
            subscriber_queue: 8,
            scan: ScanPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Environment Variables
    ///
    /// - `FINGERLINK_SENSOR_ADDR`: serial bridge `host:port` (default: 127.0.0.1:2000)
    /// - `FINGERLINK_ADDRESS`: module address, decimal or `0x` hex (default: 0xFFFFFFFF)
    /// - `FINGERLINK_PASSWORD`: module password, decimal or `0x` hex (default: 0)
    /// - `FINGERLINK_TIMEOUT_MS`: exchange timeout (default: 2000)
    /// - `FINGERLINK_REGISTRY`: registry file (default: fingerprints.json)
    /// - `FINGERLINK_SUBSCRIBER_QUEUE`: per-subscriber queue depth (default: 8)
    /// - `FINGERLINK_FINGER_TIMEOUT_MS`: wait for placement (default: 10000)
    /// - `FINGERLINK_REMOVAL_TIMEOUT_MS`: wait for removal (default: 10000)
    /// - `FINGERLINK_POLL_INTERVAL_MS`: presence poll delay (default: 100)
    /// - `FINGERLINK_CAPTURE_ATTEMPTS`: placements per capture (default: 3)
    /// - `FINGERLINK_REJECT_DUPLICATES`: refuse already enrolled fingers (default: true)
    /// - `FINGERLINK_LED`: LED feedback (default: false)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values returned by `lookup` onto the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("FINGERLINK_SENSOR_ADDR") {
            config.sensor_addr = addr;
        }
        if let Some(value) = lookup("FINGERLINK_ADDRESS") {
            config.address = parse_u32("FINGERLINK_ADDRESS", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_PASSWORD") {
            config.password = parse_u32("FINGERLINK_PASSWORD", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_TIMEOUT_MS") {
            config.exchange_timeout = parse_millis("FINGERLINK_TIMEOUT_MS", &value)?;
        }
        if let Some(path) = lookup("FINGERLINK_REGISTRY") {
            config.registry_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("FINGERLINK_SUBSCRIBER_QUEUE") {
            config.subscriber_queue = parse("FINGERLINK_SUBSCRIBER_QUEUE", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_FINGER_TIMEOUT_MS") {
            config.scan.finger_timeout = parse_millis("FINGERLINK_FINGER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_REMOVAL_TIMEOUT_MS") {
            config.scan.removal_timeout = parse_millis("FINGERLINK_REMOVAL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_POLL_INTERVAL_MS") {
            config.scan.poll_interval = parse_millis("FINGERLINK_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_CAPTURE_ATTEMPTS") {
            config.scan.capture_attempts = parse("FINGERLINK_CAPTURE_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_REJECT_DUPLICATES") {
            config.scan.reject_duplicates = parse_flag("FINGERLINK_REJECT_DUPLICATES", &value)?;
        }
        if let Some(value) = lookup("FINGERLINK_LED") {
            config.scan.led_feedback = parse_flag("FINGERLINK_LED", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscriber_queue == 0 {
            return Err(Error::Config("subscriber queue depth must be at least 1".into()));
        }

        if self.exchange_timeout.is_zero() {
            return Err(Error::Config("exchange timeout must be greater than zero".into()));
        }

        self.scan.validate()
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, value)))
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    let value = value.trim();

    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)
            .map_err(|_| Error::Config(format!("{} has invalid hex value '{}'", key, value))),
        None => parse(key, value),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} has invalid flag '{}'", key, value))),
    }
}
