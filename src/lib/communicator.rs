//! Uniform read/write/query access to an instrument behind a Galvant
//! Industries or Prologix GPIB adapter.
//!
//! The communicator owns the channel to the adapter and keeps a copy of the
//! adapter state (bus address, timeout, EOI, EOS). That state is re-sent
//! before every instrument command, and each read is bracketed by
//! `begin_read` / `end_read` steps that prime the adapter for the kind of
//! read being performed.

use anyhow::Result;
use log::debug;
use std::{thread, time::Duration};
use thiserror::Error;

use crate::adapter::{
    eot_char_command, eot_enable_command, Dialect, EosEncoding, Model, ReadUntil,
    VERSION_QUERY,
};
use crate::channel::Channel;
use crate::config::{
    check_address, check_sleep_interval, check_timeout, AddressSpec, CommunicatorOptions,
    TimeValue,
};
use crate::termination::{Eos, Termination, TerminationState};

/// Line terminator between the host and the adapter.
pub const NETWORK_TERMINATOR: &str = "\r";
/// GI firmware answers by itself when the command it forwarded contains this.
pub const QUERY_MARKER: char = '?';

#[derive(Error, Debug)]
pub enum GpibError {
    #[error("unexpected firmware version reply {0:?}")]
    BadVersion(String),
    #[error("no read terminator configured (EOI off, EOS disabled)")]
    NoTerminator,
}

pub struct GpibCommunicator<C: Channel> {
    channel: C,
    model: Model,
    version: Option<u32>,
    dialect: Dialect,
    gpib_address: u8,
    timeout: Duration,
    termination: TerminationState,
    sleep_interval: Duration,
    network_terminator: String,
    query_pending: bool,
    terminator_swapped: bool,
}

impl<C: Channel> GpibCommunicator<C> {
    pub fn new(channel: C, gpib_address: u8, model: Model) -> Result<Self> {
        Self::with_options(
            channel,
            CommunicatorOptions {
                model,
                gpib_address,
                ..Default::default()
            },
        )
    }

    /// Opens a session: detects the GI firmware version or puts a Prologix
    /// adapter in controller mode, then pushes the default termination and
    /// timeout.
    pub fn with_options(mut channel: C, options: CommunicatorOptions) -> Result<Self> {
        let gpib_address = check_address(options.gpib_address)?;
        let timeout = check_timeout(options.timeout)?;
        let sleep_interval = check_sleep_interval(options.sleep_interval)?;

        channel.set_terminator(NETWORK_TERMINATOR);
        let network_terminator = channel.terminator().to_string();

        let version = match options.model {
            Model::GalvantIndustries => Some(parse_version(&channel.query(VERSION_QUERY)?)?),
            Model::Prologix => None,
        };
        let dialect = Dialect::resolve(options.model, version);
        debug!(
            "adapter {} version {:?}, dialect {:?}",
            options.model, version, dialect
        );

        for cmd in dialect.setup_commands() {
            channel.sendcmd(cmd)?;
        }

        let mut comm = Self {
            channel,
            model: options.model,
            version,
            dialect,
            gpib_address,
            timeout,
            termination: TerminationState::defaults(dialect),
            sleep_interval,
            network_terminator,
            query_pending: false,
            terminator_swapped: false,
        };

        comm.send_eos()?;
        comm.send_eoi()?;
        comm.set_timeout(timeout)?;
        Ok(comm)
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Firmware version, GI adapters only.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// GPIB address and the address of the underlying channel.
    pub fn address(&self) -> (u8, String) {
        (self.gpib_address, self.channel.address())
    }

    pub fn set_address(&mut self, address: impl Into<AddressSpec>) -> Result<()> {
        match address.into() {
            AddressSpec::Bus(addr) => {
                self.gpib_address = check_address(addr)?;
                self.send_address()
            }
            AddressSpec::WithDownstream(addr, downstream) => {
                self.set_address(addr)?;
                self.channel.set_address(&downstream)
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets both the bus timeout and the channel timeout. The stored value is
    /// the one the adapter was given, i.e. truncated to whole seconds on
    /// legacy GI firmware and to milliseconds otherwise.
    pub fn set_timeout(&mut self, timeout: impl Into<TimeValue>) -> Result<()> {
        let requested = check_timeout(timeout.into())?;
        let (cmd, sent) = self.dialect.timeout_command(requested)?;
        self.timeout = sent;
        self.channel.sendcmd(&cmd)?;
        self.channel.set_timeout(sent)
    }

    pub fn eoi(&self) -> bool {
        self.termination.eoi
    }

    pub fn set_eoi(&mut self, eoi: bool) -> Result<()> {
        self.termination.eoi = eoi;
        self.send_eoi()
    }

    pub fn eos(&self) -> Eos {
        self.termination.eos
    }

    pub fn set_eos(&mut self, eos: Eos) -> Result<()> {
        self.termination.eos = eos.normalize(self.dialect)?;
        self.send_eos()
    }

    /// `Termination::Eoi` when EOI ends a message, the EOS character otherwise.
    pub fn terminator(&self) -> Termination {
        self.termination.terminator()
    }

    /// Legacy GI firmware gets EOI before EOS and keeps its EOS byte when
    /// switched to EOI; the `++` adapters get EOS first, `++eos 3` for EOI.
    pub fn set_terminator(&mut self, terminator: impl Into<Termination>) -> Result<()> {
        let intent = terminator.into();
        self.termination = self.termination.apply(intent, self.dialect)?;

        match (self.dialect.eos_encoding(), intent) {
            (EosEncoding::Byte, Termination::Eoi) => self.send_eoi(),
            (EosEncoding::Byte, Termination::Eos(_)) => {
                self.send_eoi()?;
                self.send_eos()
            }
            (EosEncoding::Symbolic, _) => {
                self.send_eos()?;
                self.send_eoi()
            }
        }
    }

    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    pub fn set_sleep_interval(&mut self, interval: impl Into<TimeValue>) -> Result<()> {
        self.sleep_interval = check_sleep_interval(interval.into())?;
        Ok(())
    }

    fn send_address(&mut self) -> Result<()> {
        let cmd = self.dialect.address_command(self.gpib_address);
        self.channel.sendcmd(&cmd)
    }

    fn send_eoi(&mut self) -> Result<()> {
        let cmd = self.dialect.eoi_command(self.termination.eoi);
        self.channel.sendcmd(&cmd)
    }

    fn send_eos(&mut self) -> Result<()> {
        let cmd = self.dialect.eos_command(self.termination.eos.code());
        self.channel.sendcmd(&cmd)
    }

    /// Re-sends the bus address, EOI, timeout and EOS so the adapter state
    /// matches ours, whatever happened to it in between.
    pub fn push_configuration(&mut self) -> Result<()> {
        self.send_address()?;
        self.send_eoi()?;
        self.set_timeout(self.timeout)?;
        self.send_eos()
    }

    fn settle(&self) {
        if !self.sleep_interval.is_zero() {
            thread::sleep(self.sleep_interval);
        }
    }

    /// Sends a command to the instrument. Empty commands are ignored.
    pub fn send_command(&mut self, cmd: &str) -> Result<()> {
        if cmd.is_empty() {
            return Ok(());
        }

        self.push_configuration()?;
        self.channel.sendcmd(cmd)?;
        self.query_pending = cmd.contains(QUERY_MARKER);
        self.settle();
        Ok(())
    }

    fn begin_read(&mut self, size: Option<usize>) -> Result<()> {
        match self.dialect {
            Dialect::LegacyGi | Dialect::ModernGi => {
                // the adapter already fetched the answer to a query
                if !std::mem::take(&mut self.query_pending) {
                    let cmd = self.dialect.read_command(ReadUntil::Timeout);
                    self.channel.sendcmd(&cmd)?;
                }
            }
            Dialect::Prologix => match (size, self.terminator()) {
                (None, Termination::Eoi) => {
                    let eot = self.channel.terminator().bytes().last().unwrap_or(b'\r');
                    self.channel.sendcmd(&eot_char_command(eot))?;
                    self.channel.sendcmd(&eot_enable_command(true))?;
                    self.send_command(&self.dialect.read_command(ReadUntil::Eoi))?;
                }
                (None, Termination::Eos(eos)) => {
                    let (chars, last) = eos
                        .chars()
                        .zip(eos.last_byte())
                        .ok_or(GpibError::NoTerminator)?;
                    self.channel.set_terminator(&chars);
                    self.terminator_swapped = true;
                    self.channel.sendcmd(&eot_enable_command(false))?;
                    self.send_command(&self.dialect.read_command(ReadUntil::Char(last)))?;
                }
                (Some(_), _) => {
                    self.send_command(&self.dialect.read_command(ReadUntil::Timeout))?;
                    self.settle();
                }
            },
        }
        Ok(())
    }

    fn end_read(&mut self) {
        if std::mem::take(&mut self.terminator_swapped) {
            self.channel.set_terminator(&self.network_terminator);
        }
    }

    /// Reads `size` bytes, or up to the terminator when `size` is `None`.
    pub fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let res = self
            .begin_read(size)
            .and_then(|_| self.channel.read_raw(size));
        self.end_read();
        res
    }

    pub fn read(&mut self, size: Option<usize>) -> Result<String> {
        Ok(String::from_utf8(self.read_raw(size)?)?)
    }

    pub fn query(&mut self, cmd: &str, size: Option<usize>) -> Result<String> {
        self.send_command(cmd)?;
        Ok(self.read(size)?.trim().to_string())
    }

    /// Writes directly to the channel, without adapter framing.
    pub fn write(&mut self, msg: &str) -> Result<()> {
        self.channel.write(msg)
    }

    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.channel.write_raw(data)
    }

    pub fn flush_input(&mut self) -> Result<()> {
        self.channel.flush_input()
    }

    pub fn close(mut self) -> Result<()> {
        self.channel.close()
    }
}

fn parse_version(reply: &str) -> Result<u32> {
    reply
        .trim()
        .parse()
        .map_err(|_| GpibError::BadVersion(reply.to_string()).into())
}
