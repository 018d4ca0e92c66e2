use std::io::{self, ErrorKind, Read, Write};

use log::trace;
use thiserror::Error;

/// Reading fewer bytes than a frame needs.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("only {received} bytes read, {expected} expected")]
    Short { expected: usize, received: usize },

    #[error("error reading from serial port")]
    Io(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("only {written} bytes sent, {expected} expected")]
    Short { expected: usize, written: usize },

    #[error("error sending packet")]
    Io(#[source] io::Error),
}

/// A duplex byte channel to the bus.
///
/// Both operations block until the whole buffer has been transferred or the
/// channel gives up. Timeouts are a property of the channel, so a read that
/// times out before the buffer is full is reported as [`ReadError::Short`].
pub trait Transport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadError>;

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), WriteError>;
}

impl<T: Read + Write> Transport for T {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        let mut received = 0;
        while received < buf.len() {
            match self.read(&mut buf[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) => return Err(ReadError::Io(e)),
            }
        }

        trace!("read from port: {:02x?}", &buf[..received]);

        if received < buf.len() {
            return Err(ReadError::Short {
                expected: buf.len(),
                received,
            });
        }

        Ok(())
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        trace!("write to port: {buf:02x?}");

        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]) {
                Ok(0) => {
                    return Err(WriteError::Short {
                        expected: buf.len(),
                        written,
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(WriteError::Io(e)),
            }
        }

        self.flush().map_err(WriteError::Io)
    }
}
