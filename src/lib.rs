//! Find the bus address of a serial device from the IDENT packet it
//! broadcasts, and optionally move it to a new one.

mod config;
mod crc;
pub mod handshake;
pub mod packet;
mod readdress;
mod selector;
mod serial;
pub mod transport;

pub use color_eyre;
pub use config::{Config, DEFAULT_BAUD_RATE};
pub use crc::{calc_crc16, calc_crc16_default};
pub use handshake::{handshake, Outcome, Phase, Rejection, Report};
pub use readdress::{readdress, readdress_or_stop, FAILURE_EXIT_CODE};
pub use selector::{list_ports, PortSelector};
pub use serial::Serial;
pub use serial2;
