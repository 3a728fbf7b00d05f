use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use regex::Regex;

use gpib_utils::adapter::Model;
use gpib_utils::config::{AddressSpec, ConfigError};
use gpib_utils::termination::{Eos, Termination};

/// Accepts the escaped forms a shell passes through (`\n`, `\r`, `\r\n`),
/// `none`, `eoi` and decimal byte values.
fn parse_terminator(input: &str) -> Result<Termination, ConfigError> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^-?\d+$").unwrap();
    }

    if RE.is_match(input) {
        let code: i64 = input
            .parse()
            .map_err(|_| ConfigError::EosOutOfRange(i64::MAX))?;
        return Eos::from_code(code).map(Termination::Eos);
    }

    match input.to_ascii_lowercase().as_str() {
        "none" => Ok(Termination::Eos(Eos::Disabled)),
        "\\r\\n" | "crlf" => Ok(Termination::Eos(Eos::CrLf)),
        "\\r" | "cr" => Ok(Termination::Eos(Eos::Cr)),
        "\\n" | "lf" => Ok(Termination::Eos(Eos::Lf)),
        _ => input.parse(),
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Skip sanity checks
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Serial device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// Serial baud rate
    #[clap(long, short, default_value_t = 115200)]
    pub baudrate: u32,

    /// Network adapter, host[:port]; takes precedence over --port
    #[clap(long, short = 'H')]
    pub host: Option<String>,

    /// Adapter model, 'gi' (Galvant Industries) or 'pl' (Prologix)
    #[clap(long, short, default_value = "gi")]
    pub model: Model,

    /// GPIB address, optionally followed by ',' and a downstream address
    #[clap(long, short, default_value = "1")]
    pub address: AddressSpec,

    /// Bus and channel timeout, seconds
    #[clap(long, short, default_value_t = 1.0)]
    pub timeout: f64,

    /// Settle time after each adapter command, seconds
    #[clap(long, short, default_value_t = 0.01)]
    pub sleep: f64,

    /// GPIB terminator: eoi, \n, \r, \r\n, none or a byte value
    #[clap(long, short = 'T', parse(try_from_str = parse_terminator))]
    pub terminator: Option<Termination>,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a command to the instrument
    Send { text: String },

    /// Send a command and read the response
    #[clap(visible_alias = "q")]
    Query {
        text: String,
        /// Read this many bytes instead of up to the terminator
        #[clap(long, short = 'n')]
        size: Option<usize>,
    },

    /// Read a response
    Read {
        /// Read this many bytes instead of up to the terminator
        #[clap(long, short = 'n')]
        size: Option<usize>,
    },

    /// Write text to the adapter as is
    Write { text: String },

    /// Show adapter session state
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_forms() {
        assert_eq!(parse_terminator("EOI"), Ok(Termination::Eoi));
        assert_eq!(parse_terminator("\\n"), Ok(Termination::Eos(Eos::Lf)));
        assert_eq!(parse_terminator("\\r\\n"), Ok(Termination::Eos(Eos::CrLf)));
        assert_eq!(parse_terminator("none"), Ok(Termination::Eos(Eos::Disabled)));
        assert_eq!(parse_terminator("59"), Ok(Termination::Eos(Eos::Byte(59))));
        assert_eq!(
            parse_terminator("256"),
            Err(ConfigError::EosOutOfRange(256))
        );
        assert!(parse_terminator("abc").is_err());
    }

    #[test]
    fn parse_args() {
        let cli = Cli::try_parse_from([
            "gpib-tool", "-m", "pl", "-H", "10.0.0.5", "-a", "9", "-T", "eoi", "query", "*IDN?",
        ])
        .unwrap();
        assert_eq!(cli.model, Model::Prologix);
        assert_eq!(cli.address, AddressSpec::Bus(9));
        assert_eq!(cli.terminator, Some(Termination::Eoi));
        assert!(matches!(cli.command, Commands::Query { size: None, .. }));
    }
}
