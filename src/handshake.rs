//! The IDENT / WRITE address handshake.
//!
//! A device that is not yet configured broadcasts a REQUEST packet carrying
//! its current address. Answering that with a broadcast WRITE of a new
//! address makes it switch over, after which it replies with a WRITE packet
//! sent from whatever address it ended up with.
//!
//! Every step is attempted exactly once. Any failure ends the run.

use std::fmt::{Display, Formatter};

use log::{debug, info, warn};
use thiserror::Error;

use crate::packet::{receive, DecodeError, Frame, Function};
use crate::transport::{Transport, WriteError};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no valid IDENT packet received")]
    Ident(#[source] DecodeError),

    #[error("failed to send the new address")]
    Send(#[source] WriteError),

    #[error("no valid confirmation received after sending the new address")]
    Confirm(#[source] DecodeError),

    #[error("handshake already failed")]
    AlreadyFailed,
}

/// Why the device did not end up at the requested address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The device answered from this address, which is not the one requested.
    AddressNotAccepted(u16),
    /// The reply was not a WRITE.
    UnexpectedFunction(Function),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No new address was requested.
    Unchanged,
    Confirmed(u16),
    Rejected(Rejection),
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "address left unchanged"),
            Self::Confirmed(addr) => {
                write!(f, "all done, device now answers at 0x{addr:04X} ({addr})")
            }
            Self::Rejected(Rejection::AddressNotAccepted(addr)) => write!(
                f,
                "address is not accepted by the device; keeping 0x{addr:04X} ({addr})"
            ),
            Self::Rejected(Rejection::UnexpectedFunction(function)) => {
                write!(f, "unexpected function {function} in reply")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Address the device identified itself with.
    pub discovered: u16,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitIdent,
    IdentFound(u16),
    BuildingWriteCommand(u16),
    AwaitConfirm(u16),
    Done(Report),
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed)
    }
}

/// A single run of the handshake over a borrowed transport.
pub struct Handshake<'a, T: Transport + ?Sized> {
    port: &'a mut T,
    phase: Phase,
    target: Option<u16>,
    discovered: u16,
}

impl<'a, T: Transport + ?Sized> Handshake<'a, T> {
    /// `target` is the address the device should move to, if any.
    pub fn new(port: &'a mut T, target: Option<u16>) -> Self {
        Self {
            port,
            phase: Phase::AwaitIdent,
            target,
            discovered: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance by one phase and return the phase the run is now in. Stepping
    /// a finished run does nothing.
    pub fn step(&mut self) -> Result<Phase, HandshakeError> {
        let next = match self.advance() {
            Ok(next) => next,
            Err(e) => {
                warn!("handshake failed in {:?}: {e}", self.phase);
                self.phase = Phase::Failed;
                return Err(e);
            }
        };

        if next != self.phase {
            debug!("handshake {:?} -> {next:?}", self.phase);
        }
        self.phase = next;

        Ok(next)
    }

    fn advance(&mut self) -> Result<Phase, HandshakeError> {
        Ok(match self.phase {
            Phase::AwaitIdent => {
                let frame = receive(&mut *self.port).map_err(HandshakeError::Ident)?;
                if frame.is_broadcast() {
                    warn!("device identified itself with the broadcast address");
                }
                self.discovered = frame.device_addr();
                info!("found device at 0x{:04X}", self.discovered);
                Phase::IdentFound(self.discovered)
            }
            Phase::IdentFound(discovered) => match self.target {
                Some(target) => Phase::BuildingWriteCommand(target),
                None => Phase::Done(Report {
                    discovered,
                    outcome: Outcome::Unchanged,
                }),
            },
            Phase::BuildingWriteCommand(target) => {
                let packet = Frame::write_address(target).encode();
                self.port
                    .write_exact(&packet)
                    .map_err(HandshakeError::Send)?;
                info!("sent new address 0x{target:04X}");
                Phase::AwaitConfirm(target)
            }
            Phase::AwaitConfirm(target) => {
                let reply = receive(&mut *self.port).map_err(HandshakeError::Confirm)?;
                Phase::Done(Report {
                    discovered: self.discovered,
                    outcome: evaluate_confirmation(&reply, target),
                })
            }
            done @ (Phase::Done(_) | Phase::Failed) => done,
        })
    }

    pub fn run(mut self) -> Result<Report, HandshakeError> {
        loop {
            match self.step()? {
                Phase::Done(report) => return Ok(report),
                phase if phase.is_terminal() => return Err(HandshakeError::AlreadyFailed),
                _ => {}
            }
        }
    }
}

fn evaluate_confirmation(reply: &Frame, target: u16) -> Outcome {
    if reply.function() != Function::Write {
        Outcome::Rejected(Rejection::UnexpectedFunction(reply.function()))
    } else if reply.device_addr() != target {
        Outcome::Rejected(Rejection::AddressNotAccepted(reply.device_addr()))
    } else {
        Outcome::Confirmed(reply.device_addr())
    }
}

/// Wait for a device to identify itself and, if `target` is given, move it to
/// that address.
pub fn handshake<T: Transport + ?Sized>(
    port: &mut T,
    target: Option<u16>,
) -> Result<Report, HandshakeError> {
    Handshake::new(port, target).run()
}
