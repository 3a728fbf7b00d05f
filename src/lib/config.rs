use lazy_static::lazy_static;
use regex::Regex;
use std::{convert::TryFrom, str::FromStr, time::Duration};
use thiserror::Error;

use crate::adapter::Model;

pub const MIN_GPIB_ADDRESS: u8 = 1;
pub const MAX_GPIB_ADDRESS: u8 = 30;
pub const MAX_SLEEP_INTERVAL_SECS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Value of the right shape but outside the accepted range
    Range,
    /// Value that can't be interpreted for the current adapter
    Shape,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("GPIB address must be between 1 and 30, got {0}")]
    AddressOutOfRange(i64),
    #[error("invalid address specification '{0}'")]
    BadAddress(String),
    #[error("sleep time should be set between 0 and 10 seconds, got {0}")]
    SleepOutOfRange(f64),
    #[error("timeout must be a non-negative number of seconds, got {0}")]
    TimeoutOutOfRange(f64),
    #[error("EOS byte must be between 0 and 255, got {0}")]
    EosOutOfRange(i64),
    #[error("GPIB termination must be a single character, a byte value or \"eoi\", got {0:?}")]
    NotSingleCharacter(String),
    #[error("EOS must be CRLF, CR, LF or None, got {0:?}")]
    UnsupportedEos(String),
    #[error("adapter firmware requires an EOS byte value")]
    EosRequired,
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::AddressOutOfRange(_)
            | ConfigError::SleepOutOfRange(_)
            | ConfigError::TimeoutOutOfRange(_)
            | ConfigError::EosOutOfRange(_) => ErrorKind::Range,
            ConfigError::BadAddress(_)
            | ConfigError::NotSingleCharacter(_)
            | ConfigError::UnsupportedEos(_)
            | ConfigError::EosRequired => ErrorKind::Shape,
        }
    }
}

/// A time value given either as bare seconds or as a unit-tagged duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    Seconds(f64),
    Duration(Duration),
}

impl TimeValue {
    pub fn as_secs_f64(self) -> f64 {
        match self {
            TimeValue::Seconds(s) => s,
            TimeValue::Duration(d) => d.as_secs_f64(),
        }
    }

    /// `None` for negative, non-finite or unrepresentable values.
    pub fn to_duration(self) -> Option<Duration> {
        match self {
            TimeValue::Seconds(s) => Duration::try_from_secs_f64(s).ok(),
            TimeValue::Duration(d) => Some(d),
        }
    }
}

impl From<f64> for TimeValue {
    fn from(secs: f64) -> Self {
        TimeValue::Seconds(secs)
    }
}

impl From<u32> for TimeValue {
    fn from(secs: u32) -> Self {
        TimeValue::Seconds(secs.into())
    }
}

impl From<Duration> for TimeValue {
    fn from(duration: Duration) -> Self {
        TimeValue::Duration(duration)
    }
}

pub fn check_address(address: u8) -> Result<u8, ConfigError> {
    if (MIN_GPIB_ADDRESS..=MAX_GPIB_ADDRESS).contains(&address) {
        Ok(address)
    } else {
        Err(ConfigError::AddressOutOfRange(address.into()))
    }
}

pub fn check_sleep_interval(value: TimeValue) -> Result<Duration, ConfigError> {
    let secs = value.as_secs_f64();
    if !(0.0..=MAX_SLEEP_INTERVAL_SECS).contains(&secs) {
        return Err(ConfigError::SleepOutOfRange(secs));
    }
    value
        .to_duration()
        .ok_or(ConfigError::SleepOutOfRange(secs))
}

/// Timeouts must fit the millisecond counter the adapters are given.
pub fn check_timeout(value: TimeValue) -> Result<Duration, ConfigError> {
    value
        .to_duration()
        .filter(|d| u64::try_from(d.as_millis()).is_ok())
        .ok_or_else(|| ConfigError::TimeoutOutOfRange(value.as_secs_f64()))
}

/// Either a bare GPIB bus address, or a bus address plus the address of the
/// underlying channel (serial device, `host:port`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec {
    Bus(u8),
    WithDownstream(u8, String),
}

impl AddressSpec {
    pub fn bus(&self) -> u8 {
        match self {
            AddressSpec::Bus(addr) | AddressSpec::WithDownstream(addr, _) => *addr,
        }
    }
}

impl From<u8> for AddressSpec {
    fn from(address: u8) -> Self {
        AddressSpec::Bus(address)
    }
}

impl FromStr for AddressSpec {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^\s*(-?\d+)\s*(?:,\s*(.+?)\s*)?$").unwrap();
        }

        let c = RE
            .captures(input)
            .ok_or_else(|| ConfigError::BadAddress(input.to_string()))?;
        let bus: i64 = c[1]
            .parse()
            .map_err(|_| ConfigError::BadAddress(input.to_string()))?;
        let bus = u8::try_from(bus).map_err(|_| ConfigError::AddressOutOfRange(bus))?;

        Ok(match c.get(2) {
            Some(downstream) => AddressSpec::WithDownstream(bus, downstream.as_str().to_string()),
            None => AddressSpec::Bus(bus),
        })
    }
}

/// Session parameters applied when a communicator is opened.
#[derive(Debug, Clone)]
pub struct CommunicatorOptions {
    pub model: Model,
    pub gpib_address: u8,
    pub timeout: TimeValue,
    pub sleep_interval: TimeValue,
}

impl Default for CommunicatorOptions {
    fn default() -> Self {
        Self {
            model: Model::GalvantIndustries,
            gpib_address: MIN_GPIB_ADDRESS,
            timeout: TimeValue::Duration(Duration::from_secs(1)),
            sleep_interval: TimeValue::Duration(Duration::from_millis(10)),
        }
    }
}
