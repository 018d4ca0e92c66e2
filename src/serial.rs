use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::debug;
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

use crate::config::Config;

/// How long a single read syscall waits when the caller asked to wait
/// forever; timeouts are retried.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A serial port set up for the bus: 8 data bits, no parity, one stop bit,
/// raw mode and no flow control.
pub struct Serial {
    port: SerialPort,
    wait_forever: bool,
}

impl Serial {
    pub fn open(path: PathBuf, config: &Config) -> Result<Self> {
        let baud_rate = config.baud_rate;
        let mut port = SerialPort::open(&path, |mut s: Settings| {
            s.set_raw();
            s.set_baud_rate(baud_rate)?;
            s.set_char_size(CharSize::Bits8);
            s.set_stop_bits(StopBits::One);
            s.set_parity(Parity::None);
            s.set_flow_control(FlowControl::None);
            Ok(s)
        })
        .wrap_err_with(|| format!("failed to open {path:?}"))?;

        port.set_read_timeout(config.read_timeout.unwrap_or(POLL_INTERVAL))
            .wrap_err("failed to set read timeout")?;

        debug!("opened {path:?} at {baud_rate} baud");

        Ok(Self {
            port,
            wait_forever: config.read_timeout.is_none(),
        })
    }
}

impl Read for Serial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.port.read(buf) {
                Err(e) if e.kind() == ErrorKind::TimedOut && self.wait_forever => continue,
                res => return res,
            }
        }
    }
}

impl Write for Serial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
