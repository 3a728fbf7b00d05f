//! End-of-message handling: the EOS character, the EOI flag and the
//! terminator derived from the two.

use std::{convert::TryFrom, fmt::Display, str::FromStr};

use crate::adapter::{Dialect, EosEncoding};
use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eos {
    /// Literal byte, legacy GI firmware only
    Byte(u8),
    CrLf,
    Cr,
    Lf,
    Disabled,
}

impl Eos {
    pub fn from_code(code: i64) -> Result<Self, ConfigError> {
        u8::try_from(code)
            .map(Eos::Byte)
            .map_err(|_| ConfigError::EosOutOfRange(code))
    }

    /// Converts to the form stored for `dialect`, rejecting values the
    /// adapter can't express.
    pub fn normalize(self, dialect: Dialect) -> Result<Self, ConfigError> {
        match dialect.eos_encoding() {
            EosEncoding::Byte => match self {
                Eos::Byte(_) => Ok(self),
                Eos::Cr => Ok(Eos::Byte(b'\r')),
                Eos::Lf => Ok(Eos::Byte(b'\n')),
                Eos::CrLf => Err(ConfigError::NotSingleCharacter("\r\n".to_string())),
                Eos::Disabled => Err(ConfigError::EosRequired),
            },
            EosEncoding::Symbolic => match self {
                Eos::Byte(b'\r') => Ok(Eos::Cr),
                Eos::Byte(b'\n') => Ok(Eos::Lf),
                Eos::Byte(b) => Err(ConfigError::UnsupportedEos(char::from(b).to_string())),
                _ => Ok(self),
            },
        }
    }

    /// Value carried by the EOS command.
    pub fn code(self) -> u8 {
        match self {
            Eos::Byte(b) => b,
            Eos::CrLf => 0,
            Eos::Cr => 1,
            Eos::Lf => 2,
            Eos::Disabled => 3,
        }
    }

    pub fn chars(self) -> Option<String> {
        match self {
            Eos::Byte(b) => Some(char::from(b).to_string()),
            Eos::CrLf => Some("\r\n".to_string()),
            Eos::Cr => Some("\r".to_string()),
            Eos::Lf => Some("\n".to_string()),
            Eos::Disabled => None,
        }
    }

    /// The byte that ends a message, i.e. the last byte of the sequence.
    pub fn last_byte(self) -> Option<u8> {
        match self {
            Eos::Byte(b) => Some(b),
            Eos::CrLf | Eos::Lf => Some(b'\n'),
            Eos::Cr => Some(b'\r'),
            Eos::Disabled => None,
        }
    }
}

impl Display for Eos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.chars().unwrap_or_default().fmt(f)
    }
}

impl FromStr for Eos {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "\r\n" => Ok(Eos::CrLf),
            "\r" => Ok(Eos::Cr),
            "\n" => Ok(Eos::Lf),
            "" => Ok(Eos::Disabled),
            _ => {
                let mut chars = input.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Eos::try_from(c),
                    _ => Err(ConfigError::NotSingleCharacter(input.to_string())),
                }
            }
        }
    }
}

impl TryFrom<char> for Eos {
    type Error = ConfigError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '\r' => Ok(Eos::Cr),
            '\n' => Ok(Eos::Lf),
            _ => Eos::from_code(u32::from(c).into()),
        }
    }
}

/// How the end of a message is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Eoi,
    Eos(Eos),
}

impl Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Eoi => "eoi".fmt(f),
            Termination::Eos(eos) => eos.fmt(f),
        }
    }
}

/// Only the `eoi` keyword ignores case. Character terminators keep their
/// case, so `"A"` is byte 65, not 97.
impl FromStr for Termination {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.eq_ignore_ascii_case("eoi") {
            Ok(Termination::Eoi)
        } else {
            input.parse().map(Termination::Eos)
        }
    }
}

impl From<Eos> for Termination {
    fn from(eos: Eos) -> Self {
        Termination::Eos(eos)
    }
}

impl From<u8> for Termination {
    fn from(byte: u8) -> Self {
        Termination::Eos(Eos::Byte(byte))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationState {
    pub eoi: bool,
    pub eos: Eos,
}

impl TerminationState {
    pub fn defaults(dialect: Dialect) -> Self {
        let eos = match dialect.eos_encoding() {
            EosEncoding::Byte => Eos::Byte(b'\n'),
            EosEncoding::Symbolic => Eos::Lf,
        };
        Self { eoi: true, eos }
    }

    /// Validates `intent` and returns the state it leads to. EOI disables
    /// EOS on adapters that have a symbolic "no EOS" setting; legacy GI
    /// keeps its byte.
    pub fn apply(self, intent: Termination, dialect: Dialect) -> Result<Self, ConfigError> {
        match intent {
            Termination::Eoi => Ok(Self {
                eoi: true,
                eos: match dialect.eos_encoding() {
                    EosEncoding::Byte => self.eos,
                    EosEncoding::Symbolic => Eos::Disabled,
                },
            }),
            Termination::Eos(eos) => Ok(Self {
                eoi: false,
                eos: eos.normalize(dialect)?,
            }),
        }
    }

    pub fn terminator(self) -> Termination {
        if self.eoi {
            Termination::Eoi
        } else {
            Termination::Eos(self.eos)
        }
    }
}
