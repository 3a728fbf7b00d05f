use anyhow::Result;
use core::time::Duration;
use log::debug;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::net::TcpStream;

use super::{Channel, ChannelError};

/// A blocking byte stream the adapter is attached to.
pub trait Transport: Read + Write {
    fn set_io_timeout(&mut self, timeout: Duration) -> Result<()>;
    fn clear_input(&mut self) -> Result<()>;
    /// Replaces the connection with one to `address`.
    fn reconnect(&mut self, address: &str) -> Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn set_io_timeout(&mut self, timeout: Duration) -> Result<()> {
        Ok(SerialPort::set_timeout(&mut **self, timeout)?)
    }

    fn clear_input(&mut self) -> Result<()> {
        Ok(self.clear(ClearBuffer::Input)?)
    }

    fn reconnect(&mut self, address: &str) -> Result<()> {
        let port = serialport::new(address, self.baud_rate()?)
            .timeout(SerialPort::timeout(&**self))
            .open()?;
        *self = port;
        Ok(())
    }
}

impl Transport for TcpStream {
    fn set_io_timeout(&mut self, timeout: Duration) -> Result<()> {
        // zero means "no timeout" to the socket API
        let timeout = Some(timeout.max(Duration::from_millis(1)));
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut buf = [0u8; 256];
        self.set_nonblocking(true)?;
        let res = loop {
            match self.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.set_nonblocking(false)?;
        Ok(res?)
    }

    fn reconnect(&mut self, address: &str) -> Result<()> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.read_timeout()?)?;
        stream.set_write_timeout(self.write_timeout()?)?;
        *self = stream;
        Ok(())
    }
}

pub struct StreamChannel<T: Transport> {
    transport: Option<T>,
    address: String,
    terminator: String,
    timeout: Duration,
}

impl<T: Transport> StreamChannel<T> {
    pub fn new(mut transport: T, address: impl Into<String>, timeout: Duration) -> Result<Self> {
        transport.set_io_timeout(timeout)?;
        Ok(Self {
            transport: Some(transport),
            address: address.into(),
            terminator: "\n".to_string(),
            timeout,
        })
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.transport
            .as_mut()
            .ok_or_else(|| ChannelError::Closed.into())
    }

    fn read_until_terminator(&mut self) -> Result<Vec<u8>> {
        let terminator = self.terminator.as_bytes().to_vec();
        let transport = self.transport()?;
        let mut data = Vec::new();
        let mut byte = [0u8; 1];

        while !data.ends_with(&terminator) {
            match transport.read(&mut byte) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(_) => data.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        data.truncate(data.len() - terminator.len());
        Ok(data)
    }
}

impl<T: Transport> Channel for StreamChannel<T> {
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let transport = self.transport()?;
        transport.write_all(data)?;
        transport.flush()?;
        Ok(())
    }

    fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        let data = match size {
            Some(n) => {
                let mut buf = vec![0u8; n];
                self.transport()?.read_exact(&mut buf)?;
                buf
            }
            None => self.read_until_terminator()?,
        };
        debug!("recv {:?}", String::from_utf8_lossy(&data));
        Ok(data)
    }

    fn flush_input(&mut self) -> Result<()> {
        self.transport()?.clear_input()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.flush()?;
            debug!("closed {}", self.address);
        }
        Ok(())
    }

    fn terminator(&self) -> &str {
        &self.terminator
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.transport()?.set_io_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn set_address(&mut self, address: &str) -> Result<()> {
        self.transport()?.reconnect(address)?;
        debug!("reconnected {} -> {}", self.address, address);
        self.address = address.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Loopback {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        timeout: Option<Duration>,
    }

    impl Loopback {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
                timeout: None,
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Loopback {
        fn set_io_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = Some(timeout);
            Ok(())
        }

        fn clear_input(&mut self) -> Result<()> {
            self.input.set_position(self.input.get_ref().len() as u64);
            Ok(())
        }

        fn reconnect(&mut self, _address: &str) -> Result<()> {
            self.output.clear();
            Ok(())
        }
    }

    fn channel(input: &[u8]) -> StreamChannel<Loopback> {
        StreamChannel::new(Loopback::new(input), "loop", Duration::from_secs(1)).unwrap()
    }

    fn output(ch: &mut StreamChannel<Loopback>) -> Vec<u8> {
        ch.transport().unwrap().output.clone()
    }

    #[test]
    fn sendcmd_appends_terminator() {
        let mut ch = channel(b"");
        ch.set_terminator("\r");
        ch.sendcmd("++addr 5").unwrap();
        ch.write("*RST").unwrap();
        assert_eq!(output(&mut ch), b"++addr 5\r*RST");
    }

    #[test]
    fn read_until_terminator_strips_it() {
        let mut ch = channel(b"1.234\r\nrest");
        ch.set_terminator("\r\n");
        assert_eq!(ch.read(None).unwrap(), "1.234");
        assert_eq!(ch.read_raw(Some(2)).unwrap(), b"re");
    }

    #[test]
    fn read_past_end_fails() {
        let mut ch = channel(b"no terminator");
        assert!(ch.read(None).is_err());
    }

    #[test]
    fn query_trims_response() {
        let mut ch = channel(b" 6 \r");
        ch.set_terminator("\r");
        assert_eq!(ch.query("+ver").unwrap(), "6");
        assert_eq!(output(&mut ch), b"+ver\r");
    }

    #[test]
    fn timeout_reaches_transport() {
        let mut ch = channel(b"");
        ch.set_timeout(Duration::from_millis(250)).unwrap();
        assert_eq!(ch.timeout(), Duration::from_millis(250));
        assert_eq!(
            ch.transport().unwrap().timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn flush_discards_pending_input() {
        let mut ch = channel(b"stale\n");
        ch.flush_input().unwrap();
        assert!(ch.read(None).is_err());
    }

    #[test]
    fn closed_channel_rejects_io() {
        let mut ch = channel(b"");
        ch.close().unwrap();
        let err = ch.write("x").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChannelError>(),
            Some(ChannelError::Closed)
        ));
        ch.close().unwrap();
    }

    #[test]
    fn set_address_reconnects() {
        let mut ch = channel(b"");
        ch.set_address("other").unwrap();
        assert_eq!(ch.address(), "other");
    }
}
