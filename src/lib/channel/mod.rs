#[cfg(target_os = "linux")]
mod linux;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(not(target_os = "linux"))]
mod other;
mod stream;

#[cfg(target_os = "linux")]
use linux::is_port_open;
#[cfg(not(target_os = "linux"))]
use other::is_port_open;

pub use stream::{StreamChannel, Transport};

use anyhow::Result;
use core::time::Duration;
use log::debug;
use serialport::{self, SerialPort, SerialPortType};
use std::net::TcpStream;
use thiserror::Error;

pub const DEFAULT_NETWORK_PORT: u16 = 1234;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("no GPIB adapter compatible ports found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
    #[error("channel is closed")]
    Closed,
}

/// Byte channel between the host and the GPIB adapter.
///
/// A `size` of `None` reads up to the terminator, which is not part of the
/// returned data.
pub trait Channel {
    fn write_raw(&mut self, data: &[u8]) -> Result<()>;
    fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>>;
    fn flush_input(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    fn terminator(&self) -> &str;
    fn set_terminator(&mut self, terminator: &str);
    fn timeout(&self) -> Duration;
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
    fn address(&self) -> String;
    fn set_address(&mut self, address: &str) -> Result<()>;

    fn write(&mut self, msg: &str) -> Result<()> {
        self.write_raw(msg.as_bytes())
    }

    /// Writes `cmd` followed by the terminator.
    fn sendcmd(&mut self, cmd: &str) -> Result<()> {
        debug!("send {:?}", cmd);
        let mut line = String::with_capacity(cmd.len() + self.terminator().len());
        line.push_str(cmd);
        line.push_str(self.terminator());
        self.write_raw(line.as_bytes())
    }

    fn read(&mut self, size: Option<usize>) -> Result<String> {
        Ok(String::from_utf8(self.read_raw(size)?)?)
    }

    fn query(&mut self, cmd: &str) -> Result<String> {
        self.sendcmd(cmd)?;
        Ok(self.read(None)?.trim().to_string())
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_raw(data)
    }

    fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        (**self).read_raw(size)
    }

    fn flush_input(&mut self) -> Result<()> {
        (**self).flush_input()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn terminator(&self) -> &str {
        (**self).terminator()
    }

    fn set_terminator(&mut self, terminator: &str) {
        (**self).set_terminator(terminator)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn address(&self) -> String {
        (**self).address()
    }

    fn set_address(&mut self, address: &str) -> Result<()> {
        (**self).set_address(address)
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        (**self).write(msg)
    }

    fn sendcmd(&mut self, cmd: &str) -> Result<()> {
        (**self).sendcmd(cmd)
    }

    fn read(&mut self, size: Option<usize>) -> Result<String> {
        (**self).read(size)
    }

    fn query(&mut self, cmd: &str) -> Result<String> {
        (**self).query(cmd)
    }
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0403, 0x6001), // FTDI FT232R, Prologix GPIB-USB and GI GPIBUSB
    UsbId(0x0403, 0x6014), // FTDI FT232H Single HS USB-UART/FIFO IC
];

pub fn open_port(
    port_name: &str,
    baudrate: u32,
    force: bool,
) -> Result<StreamChannel<Box<dyn SerialPort>>> {
    let true_name: String = if port_name == "auto" {
        guess_port()?
    } else {
        port_name.to_string()
    };

    if !force && is_port_open(&true_name) {
        return Err(ChannelError::PortBusy {
            port_name: true_name,
        }
        .into());
    }

    let port = serialport::new(&true_name, baudrate)
        .timeout(DEFAULT_TIMEOUT)
        .open()?;

    debug!("open_port OK: {} @ {} baud", &true_name, baudrate);
    StreamChannel::new(port, true_name, DEFAULT_TIMEOUT)
}

/// Connects to a network adapter; `address` is `host[:port]`.
pub fn open_socket(address: &str) -> Result<StreamChannel<TcpStream>> {
    let address = if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_NETWORK_PORT)
    };

    let stream = TcpStream::connect(&address)?;
    stream.set_nodelay(true)?;

    debug!("open_socket OK: {}", &address);
    StreamChannel::new(stream, address, DEFAULT_TIMEOUT)
}

fn guess_port() -> Result<String> {
    serialport::available_ports()?
        .into_iter()
        .filter(|info| match &info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                COMPATIBLE_IDS.contains(&UsbId(usb_info.vid, usb_info.pid))
                    && !is_port_open(&info.port_name)
            }
            SerialPortType::Unknown | SerialPortType::PciPort | SerialPortType::BluetoothPort => {
                false
            }
        })
        .map(|info| info.port_name)
        .next()
        .ok_or_else(|| ChannelError::NoCompatiblePort.into())
}
