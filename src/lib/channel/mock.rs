use anyhow::Result;
use core::time::Duration;
use std::collections::VecDeque;
use std::io;

use super::Channel;

/// Scripted channel recording everything sent to the adapter.
#[derive(Debug, Default)]
pub struct MockChannel {
    pub commands: Vec<String>,
    pub written: Vec<u8>,
    pub responses: VecDeque<Vec<u8>>,
    /// (size, terminator in effect) for every read
    pub reads: Vec<(Option<usize>, String)>,
    pub terminator: String,
    pub timeout: Duration,
    pub address: String,
    pub flushed: bool,
    pub closed: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            terminator: "\n".to_string(),
            address: "mock".to_string(),
            ..Default::default()
        }
    }

    pub fn with_responses(responses: &[&str]) -> Self {
        let mut ch = Self::new();
        ch.responses = responses.iter().map(|r| r.as_bytes().to_vec()).collect();
        ch
    }

    pub fn push_response(&mut self, response: &str) {
        self.responses.push_back(response.as_bytes().to_vec());
    }
}

impl Channel for MockChannel {
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn sendcmd(&mut self, cmd: &str) -> Result<()> {
        self.commands.push(cmd.to_string());
        Ok(())
    }

    fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>> {
        self.reads.push((size, self.terminator.clone()));
        let mut data = self
            .responses
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::TimedOut))?;
        if let Some(n) = size {
            data.truncate(n);
        }
        Ok(data)
    }

    fn flush_input(&mut self) -> Result<()> {
        self.responses.clear();
        self.flushed = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
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
        self.timeout = timeout;
        Ok(())
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn set_address(&mut self, address: &str) -> Result<()> {
        self.address = address.to_string();
        Ok(())
    }
}
