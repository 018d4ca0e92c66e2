use std::time::Duration;

use crate::PortSelector;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Everything a run needs to know besides the device itself.
#[derive(Debug)]
pub struct Config<'a> {
    pub port: PortSelector<'a>,
    pub baud_rate: u32,
    /// How long a single read may wait. `None` waits forever, which suits an
    /// operator who powers the device up after starting the tool.
    pub read_timeout: Option<Duration>,
    /// Address to move the device to, `1..=65535`.
    pub new_address: Option<u16>,
}

impl<'a> Config<'a> {
    pub fn new(port: impl Into<PortSelector<'a>>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: None,
            new_address: None,
        }
    }

    pub fn with_new_address(mut self, addr: u16) -> Self {
        self.new_address = Some(addr);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}
