use std::fmt::{Display, Formatter};
use std::io;

use log::{debug, warn};
use thiserror::Error;

use crate::crc::calc_crc16_default;
use crate::transport::{ReadError, Transport};

pub const START_BYTE: u8 = 0x55;
pub const BROADCAST_ADDR: u16 = 0;

/// start, device address (2), function, data address
pub const HEADER_LENGTH: usize = 5;
pub const CRC_LENGTH: usize = 2;
pub const MIN_PKT_LENGTH: usize = HEADER_LENGTH + CRC_LENGTH;
pub const MAX_PAYLOAD_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Function {
    Read = 1,
    Write = 2,
    Control = 3,
    Request = 4,
}

impl Function {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::Control),
            4 => Some(Self::Request),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Control => "CONTROL",
            Self::Request => "REQUEST",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Payload bytes that follow the header of an inbound frame, per function.
///
/// Only IDENT broadcasts and WRITE confirmations are legitimate while the bus
/// is idle. A confirmation carries the length byte of the write it answers;
/// the address itself is reported through the device address field.
const INBOUND_PAYLOAD: &[(Function, usize)] = &[(Function::Request, 0), (Function::Write, 1)];

fn inbound_payload_length(code: u8) -> Option<usize> {
    INBOUND_PAYLOAD
        .iter()
        .find(|(function, _)| function.code() == code)
        .map(|&(_, len)| len)
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload of {len} bytes does not fit in a packet (at most {max})", max = MAX_PAYLOAD_LENGTH)]
    PayloadTooLong { len: usize },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed packet, only {received} bytes read, {expected} expected")]
    ShortRead { expected: usize, received: usize },

    #[error("error reading from serial port")]
    Io(#[source] io::Error),

    #[error("unexpected function {0}, bus is not idle")]
    UnexpectedFunction(u8),

    #[error("packet CRC mismatch: received 0x{received:04X} calculated 0x{computed:04X}")]
    ChecksumMismatch { received: u16, computed: u16 },
}

impl DecodeError {
    /// Whether this looks like a wiring or line noise problem rather than
    /// the device speaking out of turn.
    pub fn is_line_fault(&self) -> bool {
        matches!(
            self,
            Self::ShortRead { .. } | Self::Io(_) | Self::ChecksumMismatch { .. }
        )
    }
}

impl From<ReadError> for DecodeError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Short { expected, received } => Self::ShortRead { expected, received },
            ReadError::Io(e) => Self::Io(e),
        }
    }
}

/// One protocol message. The start byte and checksum are implied and only
/// exist on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    device_addr: u16,
    function: Function,
    data_addr: u8,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(
        function: Function,
        device_addr: u16,
        data_addr: u8,
        payload: &[u8],
    ) -> Result<Self, EncodeError> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(EncodeError::PayloadTooLong { len: payload.len() });
        }

        Ok(Self {
            device_addr,
            function,
            data_addr,
            payload: payload.to_vec(),
        })
    }

    /// The broadcast command asking whichever device is listening to take
    /// `new_addr` as its address. The payload is a length byte followed by
    /// the address, little endian.
    pub fn write_address(new_addr: u16) -> Self {
        let [lo, hi] = new_addr.to_le_bytes();
        Self {
            device_addr: BROADCAST_ADDR,
            function: Function::Write,
            data_addr: 0,
            payload: vec![2, lo, hi],
        }
    }

    pub fn device_addr(&self) -> u16 {
        self.device_addr
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn data_addr(&self) -> u8 {
        self.data_addr
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_broadcast(&self) -> bool {
        self.device_addr == BROADCAST_ADDR
    }

    pub fn wire_len(&self) -> usize {
        MIN_PKT_LENGTH + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut res = Vec::with_capacity(self.wire_len());

        // create header
        res.push(START_BYTE);
        res.extend_from_slice(&self.device_addr.to_le_bytes());
        res.push(self.function.code());
        res.push(self.data_addr);
        // add data
        res.extend_from_slice(&self.payload);
        // add crc
        res.extend_from_slice(&calc_crc16_default(&res).to_le_bytes());

        res
    }
}

/// Read a single frame off the transport.
///
/// The minimum frame is read first; its function code decides how many more
/// payload bytes belong to it. Frames with a function that is not expected on
/// an idle bus are rejected before anything else is read.
pub fn receive<T: Transport + ?Sized>(port: &mut T) -> Result<Frame, DecodeError> {
    let mut buf = [0u8; MIN_PKT_LENGTH + MAX_PAYLOAD_LENGTH];
    port.read_exact(&mut buf[..MIN_PKT_LENGTH])?;

    let code = buf[3];
    let (function, data_len) = match (Function::from_code(code), inbound_payload_length(code)) {
        (Some(function), Some(len)) => (function, len),
        _ => {
            warn!("rejecting packet with function {code}");
            return Err(DecodeError::UnexpectedFunction(code));
        }
    };

    if data_len > 0 {
        port.read_exact(&mut buf[MIN_PKT_LENGTH..MIN_PKT_LENGTH + data_len])?;
    }

    let body = HEADER_LENGTH + data_len;
    let computed = calc_crc16_default(&buf[..body]);
    let received = u16::from_le_bytes([buf[body], buf[body + 1]]);
    if computed != received {
        warn!("rejecting packet {:02x?}", &buf[..body + CRC_LENGTH]);
        return Err(DecodeError::ChecksumMismatch { received, computed });
    }

    let frame = Frame {
        device_addr: u16::from_le_bytes([buf[1], buf[2]]),
        function,
        data_addr: buf[4],
        payload: buf[HEADER_LENGTH..body].to_vec(),
    };
    debug!("received {frame:?}");

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::{receive, DecodeError, EncodeError, Frame, Function, BROADCAST_ADDR};
    use crate::transport::mock::MockPort;

    fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        receive(&mut MockPort::new(bytes.iter().copied()))
    }

    #[test]
    fn test_encode_ident() {
        let frame = Frame::new(Function::Request, 0x1234, 0, &[]).unwrap();
        assert_eq!(frame.wire_len(), 7);
        expect!["55 34 12 04 00 84 f9"].assert_eq(&hex(&frame.encode()));
    }

    #[test]
    fn test_encode_write_address() {
        let frame = Frame::write_address(0x2000);
        assert!(frame.is_broadcast());
        assert_eq!(frame.payload(), [2, 0x00, 0x20]);
        expect!["55 00 00 02 00 02 00 20 5c d0"].assert_eq(&hex(&frame.encode()));
    }

    #[test]
    fn test_payload_too_long() {
        let err = Frame::new(Function::Write, BROADCAST_ADDR, 0, &[0; 5]).unwrap_err();
        assert!(matches!(err, EncodeError::PayloadTooLong { len: 5 }));
        assert!(Frame::new(Function::Write, BROADCAST_ADDR, 0, &[0; 4]).is_ok());
    }

    #[test]
    fn test_function_codes() {
        for function in [
            Function::Read,
            Function::Write,
            Function::Control,
            Function::Request,
        ] {
            assert_eq!(Function::from_code(function.code()), Some(function));
        }
        assert_eq!(Function::from_code(0), None);
        assert_eq!(Function::from_code(5), None);
        assert_eq!(Function::Write.to_string(), "WRITE (2)");
    }

    #[test]
    fn test_receive_ident() {
        let frame = decode(&[0x55, 0x34, 0x12, 0x04, 0x00, 0x84, 0xf9]).unwrap();
        assert_eq!(frame.device_addr(), 0x1234);
        assert_eq!(frame.function(), Function::Request);
        assert_eq!(frame.data_addr(), 0);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_receive_write_confirmation() {
        let frame = decode(&[0x55, 0x00, 0x20, 0x02, 0x00, 0x02, 0x27, 0xdf]).unwrap();
        assert_eq!(frame.device_addr(), 0x2000);
        assert_eq!(frame.function(), Function::Write);
        assert_eq!(frame.payload(), [2]);
    }

    #[test]
    fn test_round_trip_leaves_tail() {
        let frames = [
            Frame::new(Function::Request, 0x0042, 7, &[]).unwrap(),
            Frame::new(Function::Request, 0xFFFF, 0, &[]).unwrap(),
            Frame::new(Function::Write, 0x2000, 0, &[2]).unwrap(),
            Frame::new(Function::Write, 1, 9, &[0xAA]).unwrap(),
        ];

        for frame in frames {
            let mut bytes = frame.encode();
            bytes.extend_from_slice(&[0xde, 0xad]);
            let mut port = MockPort::new(bytes);

            assert_eq!(receive(&mut port).unwrap(), frame);
            assert_eq!(port.input, [0xde, 0xad]);
        }
    }

    #[test]
    fn test_single_bit_flips() {
        let frames = [
            Frame::new(Function::Request, 0x1234, 0, &[]).unwrap(),
            Frame::new(Function::Write, 0x2000, 0, &[2]).unwrap(),
        ];

        for frame in frames {
            let encoded = frame.encode();
            for byte in 0..encoded.len() {
                for bit in 0..8 {
                    let mut corrupted = encoded.clone();
                    corrupted[byte] ^= 1 << bit;

                    match decode(&corrupted) {
                        // flipping the function code never lands on another inbound shape
                        Err(DecodeError::UnexpectedFunction(code)) => {
                            assert_eq!(byte, 3);
                            assert_eq!(code, corrupted[3]);
                        }
                        Err(DecodeError::ChecksumMismatch { .. }) => assert_ne!(byte, 3),
                        other => panic!("flip of bit {bit} in byte {byte} gave {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_checksum_mismatch_message() {
        let err = decode(&[0x55, 0x34, 0x12, 0x04, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(err.is_line_fault());
        expect!["packet CRC mismatch: received 0x0000 calculated 0xF984"].assert_eq(&err.to_string());
    }

    #[test]
    fn test_unexpected_function() {
        // CONTROL with a valid checksum
        let err = decode(&[0x55, 0x34, 0x12, 0x03, 0x00, 0x86, 0xc9]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedFunction(3)));
        assert!(!err.is_line_fault());
        expect!["unexpected function 3, bus is not idle"].assert_eq(&err.to_string());
    }

    #[test]
    fn test_unexpected_function_stops_reading() {
        let mut port = MockPort::new([0x55, 0x34, 0x12, 0x01, 0x00, 0x00, 0x00, 0x99]);
        assert!(matches!(
            receive(&mut port),
            Err(DecodeError::UnexpectedFunction(1))
        ));
        assert_eq!(port.input, [0x99]);
    }

    #[test]
    fn test_short_read() {
        let err = decode(&[0x55, 0x34, 0x12, 0x04]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::ShortRead {
                expected: 7,
                received: 4
            }
        ));
    }

    #[test]
    fn test_short_write_confirmation() {
        // the minimum frame is there, the extra payload byte is not
        let err = decode(&[0x55, 0x00, 0x20, 0x02, 0x00, 0x02, 0x27]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::ShortRead {
                expected: 1,
                received: 0
            }
        ));
    }
}
