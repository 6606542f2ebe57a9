//! CCSDS space packet framing for feeding a stream of packets to a
//! [StreamProcessor](crate::StreamProcessor).
use std::fmt::Display;
use std::io::{ErrorKind, Read, Result as IOResult};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::RawBits;

pub type Apid = u16;

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    pub sequence_flags: u8,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 6;

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        Some(PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_id: (d2 & 0x3fff),
            len_minus1: d3,
        })
    }

    /// Total packet length, header included.
    #[must_use]
    pub fn packet_len(&self) -> usize {
        Self::LEN + self.len_minus1 as usize + 1
    }
}

/// A single space packet.
///
/// # Example
/// ```
/// use xtce::spacepacket::Packet;
///
/// let dat: &[u8] = &[0x08, 0x64, 0xc0, 0x00, 0x00, 0x01, 0xaa, 0xbb];
/// let packet = Packet::decode(dat).unwrap();
/// assert_eq!(packet.header.apid, 100);
/// assert_eq!(packet.bits().len(), 64);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PrimaryHeader,
    /// All packet bytes, including header and user data
    pub data: Vec<u8>,
    /// Byte offset of this packet in the stream it was read from.
    pub offset: usize,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{header: {:?}, data:[len={}]}}",
            self.header,
            self.data.len()
        )
    }
}

impl Packet {
    /// Decode from bytes. Returns `None` if there are not enough bytes for the header or for
    /// the packet length indicated by the header. Extra bytes are ignored.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Packet> {
        let header = PrimaryHeader::decode(dat)?;
        let len = header.packet_len();
        if dat.len() < len {
            return None;
        }
        Some(Packet {
            header,
            data: dat[..len].to_vec(),
            offset: 0,
        })
    }

    /// Read a single [Packet].
    ///
    /// # Errors
    /// Any ``std::io::Error`` reading
    pub fn read<R: Read>(mut r: R) -> IOResult<Packet> {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        r.read_exact(&mut buf)?;
        let Some(header) = PrimaryHeader::decode(&buf) else {
            return Err(ErrorKind::UnexpectedEof.into());
        };
        buf.resize(header.packet_len(), 0);
        r.read_exact(&mut buf[PrimaryHeader::LEN..])?;
        Ok(Packet {
            header,
            data: buf,
            offset: 0,
        })
    }

    /// Packet bytes as a bit sequence for container processing.
    #[must_use]
    pub fn bits(&self) -> RawBits {
        RawBits::from_bytes(&self.data)
    }
}

struct PacketReaderIter<R: Read> {
    reader: R,
    offset: usize,
}

impl<R: Read> Iterator for PacketReaderIter<R> {
    type Item = IOResult<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        match Packet::read(&mut self.reader) {
            Ok(mut p) => {
                p.offset = self.offset;
                self.offset += p.data.len();
                trace!(apid = p.header.apid, offset = p.offset, "read packet");
                Some(Ok(p))
            }
            Err(err) => {
                if err.kind() == ErrorKind::UnexpectedEof {
                    return None;
                }
                Some(Err(err))
            }
        }
    }
}

/// Return an iterator providing [Packet]s read from a byte synchronized packet stream. A
/// partial packet at the end of the stream is dropped.
///
/// # Examples
/// ```
/// use xtce::spacepacket::decode_packets;
///
/// let dat: &[u8] = &[
///     0x08, 0x64, 0xc0, 0x00, 0x00, 0x00, 0xff,
///     0x08, 0x65, 0xc0, 0x01, 0x00, 0x00, 0xee,
/// ];
/// let apids: Vec<u16> = decode_packets(dat)
///     .map(|zult| zult.unwrap().header.apid)
///     .collect();
/// assert_eq!(apids, vec![100, 101]);
/// ```
pub fn decode_packets<R>(reader: R) -> impl Iterator<Item = IOResult<Packet>> + Send
where
    R: Read + Send,
{
    PacketReaderIter { reader, offset: 0 }
}
