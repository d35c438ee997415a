// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::{debug, trace};
use std::{fmt, io, time::Duration};

/// CAN transport and frame decoding error types.
#[derive(Debug)]
pub enum Error {
    /// I/O error from underlying socket operations
    Io(io::Error),
    /// Payload shorter than the fields the decoder reads
    ShortPayload {
        /// Bytes required by the decoder
        needed: usize,
        /// Bytes present in the frame
        got: usize,
    },
    /// Identifier does not fit in an 11-bit standard CAN id
    InvalidId(u32),
    /// The controller reported a bus error frame
    ErrorFrame(String),
    /// The session owning the bus has shut down
    Closed,
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::ShortPayload { needed, got } => {
                write!(f, "short payload: needed {} bytes but got {}", needed, got)
            }
            Error::InvalidId(id) => write!(f, "invalid standard id: {:#X}", id),
            Error::ErrorFrame(frame) => write!(f, "bus error frame: {}", frame),
            Error::Closed => write!(f, "session closed"),
        }
    }
}

/// Raw CAN message packet as seen on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// CAN message ID (standard 11-bit or extended 29-bit)
    pub id: u32,
    /// Data bytes, only the first `len` are valid
    pub data: [u8; 8],
    /// Data length code
    pub len: usize,
}

impl Packet {
    /// Build a packet from an identifier and up to 8 payload bytes.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(8);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Packet { id, data, len }
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Blocking access to a CAN bus.
///
/// The session worker is the only caller; implementations need not be
/// shareable. Dropping the bus releases the underlying handle.
pub trait CanBus {
    /// Wait up to `timeout` for the next frame. `Ok(None)` means the wait
    /// elapsed without traffic.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Packet>, Error>;

    /// Transmit one standard-id data frame.
    fn send(&mut self, packet: &Packet) -> Result<(), Error>;
}

#[cfg(feature = "can")]
pub use self::socket::SocketCan;

#[cfg(feature = "can")]
mod socket {
    use super::{CanBus, Error, Packet};
    use log::{debug, trace};
    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id as CanId, Socket, StandardId};
    use std::{io, time::Duration};

    /// SocketCAN backed bus handle.
    pub struct SocketCan {
        ifname: String,
        sock: CanSocket,
    }

    impl SocketCan {
        /// Open the named interface, e.g. `can0` or `vcan0`.
        pub fn open(ifname: &str) -> Result<Self, Error> {
            debug!("opening can interface {}", ifname);
            let sock = CanSocket::open(ifname)?;
            Ok(SocketCan {
                ifname: ifname.to_string(),
                sock,
            })
        }
    }

    impl CanBus for SocketCan {
        fn recv(&mut self, timeout: Duration) -> Result<Option<Packet>, Error> {
            match self.sock.read_frame_timeout(timeout) {
                Ok(CanFrame::Data(frame)) => Ok(Some(Packet::new(raw_id(frame.id()), frame.data()))),
                Ok(CanFrame::Remote(frame)) => {
                    trace!("remote frame {:?}", frame);
                    Ok(Some(Packet::new(raw_id(frame.id()), &[])))
                }
                Ok(CanFrame::Error(frame)) => Err(Error::ErrorFrame(format!("{:?}", frame))),
                Err(err)
                    if err.kind() == io::ErrorKind::TimedOut
                        || err.kind() == io::ErrorKind::WouldBlock =>
                {
                    Ok(None)
                }
                Err(err) => Err(Error::Io(err)),
            }
        }

        fn send(&mut self, packet: &Packet) -> Result<(), Error> {
            let id = StandardId::new(packet.id as u16)
                .filter(|_| packet.id <= 0x7FF)
                .ok_or(Error::InvalidId(packet.id))?;
            let frame = CanFrame::new(id, packet.payload()).ok_or(Error::InvalidId(packet.id))?;
            self.sock.write_frame(&frame)?;
            Ok(())
        }
    }

    fn raw_id(id: CanId) -> u32 {
        match id {
            CanId::Standard(id) => id.as_raw() as u32,
            CanId::Extended(id) => id.as_raw(),
        }
    }

    impl Drop for SocketCan {
        fn drop(&mut self) {
            debug!("closing can interface {}", self.ifname);
        }
    }
}

/// Format a packet the way the raw frame log shows it, used for diagnostics.
pub fn describe(packet: &Packet) -> String {
    let text = format!("ID:{:04X} Data:{:02X?}", packet.id, packet.payload());
    trace!("{}", text);
    text
}

/// Ensure `payload` carries at least `needed` bytes.
pub(crate) fn require(payload: &[u8], needed: usize) -> Result<(), Error> {
    if payload.len() < needed {
        debug!("dropping short payload {:02X?}", payload);
        return Err(Error::ShortPayload {
            needed,
            got: payload.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_truncates() {
        let pkt = Packet::new(0x60A, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(pkt.len, 8);
        assert_eq!(pkt.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        let pkt = Packet::new(0x201, &[0x3C, 0x78]);
        assert_eq!(pkt.payload(), &[0x3C, 0x78]);
        assert_eq!(pkt.data, [0x3C, 0x78, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_require() {
        assert!(require(&[0; 7], 7).is_ok());
        match require(&[0; 3], 7) {
            Err(Error::ShortPayload { needed, got }) => {
                assert_eq!(needed, 7);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_describe() {
        let pkt = Packet::new(0x60A, &[0x05, 0x64]);
        assert_eq!(describe(&pkt), "ID:060A Data:[05, 64]");
    }
}
