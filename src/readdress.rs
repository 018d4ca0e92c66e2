use std::path::{Path, PathBuf};
use std::process::exit;

use color_eyre::eyre::WrapErr;
use color_eyre::{Result, Section};

use crate::config::Config;
use crate::handshake::{Handshake, HandshakeError, Phase, Report};
use crate::serial::Serial;
use crate::transport::Transport;

pub const FAILURE_EXIT_CODE: i32 = 255;

/// Open the port named in `config`, wait for the device there to identify
/// itself, and move it to `config.new_address` if one is set.
///
/// `progress` is called with the port and every phase the handshake enters,
/// starting with [`Phase::AwaitIdent`].
///
/// A device refusing the new address is not an error; check
/// [`Report::outcome`].
pub fn readdress(config: &Config, progress: impl FnMut(&Path, Phase)) -> Result<Report> {
    let path = PathBuf::from(config.port.resolve()?);
    let mut port = Serial::open(path.clone(), config)?;

    run(&mut port, &path, config.new_address, progress)
        .wrap_err_with(|| format!("failed to set up device on {path:?}"))
}

/// Like [`readdress`], but exits with code 255 when anything goes wrong.
pub fn readdress_or_stop(config: &Config, progress: impl FnMut(&Path, Phase)) -> Report {
    match readdress(config, progress) {
        Err(e) => {
            eprintln!("{e:?}");
            exit(FAILURE_EXIT_CODE);
        }
        Ok(i) => i,
    }
}

fn run<T: Transport + ?Sized>(
    port: &mut T,
    path: &Path,
    target: Option<u16>,
    mut progress: impl FnMut(&Path, Phase),
) -> Result<Report> {
    let mut handshake = Handshake::new(port, target);

    progress(path, handshake.phase());
    loop {
        let phase = handshake.step().map_err(with_hint)?;
        progress(path, phase);
        if let Phase::Done(report) = phase {
            return Ok(report);
        }
    }
}

const LINE_FAULT_HINT: &str =
    "check the wiring and that the device talks at the configured baud rate";
const BUS_BUSY_HINT: &str =
    "make sure the device is the only one on the bus and is not being polled";

fn hint(e: &HandshakeError) -> &'static str {
    let line_fault = match e {
        HandshakeError::Ident(d) | HandshakeError::Confirm(d) => d.is_line_fault(),
        HandshakeError::Send(_) => true,
        HandshakeError::AlreadyFailed => false,
    };

    if line_fault {
        LINE_FAULT_HINT
    } else {
        BUS_BUSY_HINT
    }
}

fn with_hint(e: HandshakeError) -> color_eyre::eyre::Report {
    let suggestion = hint(&e);
    color_eyre::eyre::Report::new(e).suggestion(suggestion)
}
