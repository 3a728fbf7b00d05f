//! Command syntax of the supported GPIB adapters.
//!
//! Galvant Industries firmware up to version 4 speaks its own `+x:` dialect
//! with byte-valued EOS and second-resolution timeouts. Later GI firmware and
//! Prologix adapters share the `++x` dialect with symbolic EOS codes and
//! millisecond timeouts.

use std::{convert::TryFrom, fmt::Display, str::FromStr, time::Duration};
use thiserror::Error;

use crate::config::ConfigError;

pub const VERSION_QUERY: &str = "+ver";
pub const LEGACY_GI_MAX_VERSION: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    GalvantIndustries,
    Prologix,
}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::GalvantIndustries => "gi".fmt(f),
            Model::Prologix => "pl".fmt(f),
        }
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid adapter model '{0}'")]
    BadModel(String),
}

impl FromStr for Model {
    type Err = ModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "gi" => Ok(Model::GalvantIndustries),
            "pl" => Ok(Model::Prologix),
            _ => Err(ModelError::BadModel(input.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutUnit {
    Seconds,
    Milliseconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EosEncoding {
    /// Literal byte value 0-255
    Byte,
    /// 0=CRLF, 1=CR, 2=LF, 3=None
    Symbolic,
}

#[derive(Debug)]
pub struct Syntax {
    pub address: &'static str,
    pub timeout: &'static str,
    pub timeout_unit: TimeoutUnit,
    pub eoi: &'static str,
    pub eos: &'static str,
    pub eos_encoding: EosEncoding,
    pub read: &'static str,
    pub setup: &'static [&'static str],
}

const LEGACY_GI: Syntax = Syntax {
    address: "+a:",
    timeout: "+t:",
    timeout_unit: TimeoutUnit::Seconds,
    eoi: "+eoi:",
    eos: "+eos:",
    eos_encoding: EosEncoding::Byte,
    read: "+read",
    setup: &[],
};

const MODERN_GI: Syntax = Syntax {
    address: "++addr ",
    timeout: "++read_tmo_ms ",
    timeout_unit: TimeoutUnit::Milliseconds,
    eoi: "++eoi ",
    eos: "++eos ",
    eos_encoding: EosEncoding::Symbolic,
    read: "++read",
    setup: &[],
};

const PROLOGIX: Syntax = Syntax {
    setup: &["++mode 1", "++auto 0"],
    ..MODERN_GI
};

/// What an explicit read request asks the adapter to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadUntil {
    Timeout,
    Eoi,
    Char(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    LegacyGi,
    ModernGi,
    Prologix,
}

impl Dialect {
    pub fn resolve(model: Model, version: Option<u32>) -> Self {
        match (model, version) {
            (Model::GalvantIndustries, Some(v)) if v <= LEGACY_GI_MAX_VERSION => {
                Dialect::LegacyGi
            }
            (Model::GalvantIndustries, _) => Dialect::ModernGi,
            (Model::Prologix, _) => Dialect::Prologix,
        }
    }

    pub fn syntax(self) -> &'static Syntax {
        match self {
            Dialect::LegacyGi => &LEGACY_GI,
            Dialect::ModernGi => &MODERN_GI,
            Dialect::Prologix => &PROLOGIX,
        }
    }

    pub fn eos_encoding(self) -> EosEncoding {
        self.syntax().eos_encoding
    }

    /// Commands to issue once when a session is opened.
    pub fn setup_commands(self) -> &'static [&'static str] {
        self.syntax().setup
    }

    pub fn address_command(self, address: u8) -> String {
        format!("{}{}", self.syntax().address, address)
    }

    /// Returns the command together with the timeout it actually encodes,
    /// which is truncated to the unit of the wire format.
    pub fn timeout_command(self, timeout: Duration) -> Result<(String, Duration), ConfigError> {
        let syntax = self.syntax();
        Ok(match syntax.timeout_unit {
            TimeoutUnit::Seconds => {
                let secs = timeout.as_secs();
                (
                    format!("{}{}", syntax.timeout, secs),
                    Duration::from_secs(secs),
                )
            }
            TimeoutUnit::Milliseconds => {
                let millis = u64::try_from(timeout.as_millis())
                    .map_err(|_| ConfigError::TimeoutOutOfRange(timeout.as_secs_f64()))?;
                (
                    format!("{}{}", syntax.timeout, millis),
                    Duration::from_millis(millis),
                )
            }
        })
    }

    pub fn eoi_command(self, eoi: bool) -> String {
        format!("{}{}", self.syntax().eoi, u8::from(eoi))
    }

    pub fn eos_command(self, code: u8) -> String {
        format!("{}{}", self.syntax().eos, code)
    }

    pub fn read_command(self, until: ReadUntil) -> String {
        let read = self.syntax().read;
        match (self, until) {
            (Dialect::LegacyGi, _) | (_, ReadUntil::Timeout) => read.to_string(),
            (_, ReadUntil::Eoi) => format!("{} eoi", read),
            (_, ReadUntil::Char(c)) => format!("{} {}", read, c),
        }
    }
}

pub fn eot_char_command(code: u8) -> String {
    format!("++eot_char {}", code)
}

pub fn eot_enable_command(enable: bool) -> String {
    format!("++eot_enable {}", u8::from(enable))
}
