//! NBT Datagram Service: unicast/multicast/broadcast datagrams, error
//! messages, and the rarely-implemented NBDD query messages, all built
//! on a common 10-byte header.
//!
//! `Header.DGM_LEN`/`Header.PACKET_OFFSET` are not modeled as part of
//! the shared header (they are only meaningful for the three Direct
//! message kinds, and are recomputed on every call to [`Datagram::compose_list`]).

use std::net::Ipv4Addr;

use nbt_dtyp::{NbtError, NbtResult};

use crate::name::Name;

/// The default NBT Datagram Service UDP listener port.
pub const DATAGRAM_PORT: u16 = 138;

const FM_MASK: u8 = 0x03;
const FIRST_FLAG: u8 = 0x02;
const MORE_FLAG: u8 = 0x01;
const SNT_MASK: u8 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    DirectUnique = 0x10,
    DirectGroup = 0x11,
    Broadcast = 0x12,
    Error = 0x13,
    Query = 0x14,
    PositiveResponse = 0x15,
    NegativeResponse = 0x16,
}

impl MessageType {
    fn from_byte(b: u8) -> NbtResult<Self> {
        Ok(match b {
            0x10 => Self::DirectUnique,
            0x11 => Self::DirectGroup,
            0x12 => Self::Broadcast,
            0x13 => Self::Error,
            0x14 => Self::Query,
            0x15 => Self::PositiveResponse,
            0x16 => Self::NegativeResponse,
            other => {
                return Err(NbtError::malformed(format!(
                    "unknown Datagram Service message type: {other:#04x}"
                )));
            }
        })
    }
}

/// Sending Node Type, carried in the top two bits of the header's FLAGS
/// nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendingNodeType {
    B = 0x00,
    P = 0x04,
    M = 0x08,
    /// Also used to mark messages sent by the NBDD itself.
    H = 0x0C,
}

impl SendingNodeType {
    fn from_flags(flags: u8) -> Self {
        match flags & SNT_MASK {
            0x00 => Self::B,
            0x04 => Self::P,
            0x08 => Self::M,
            _ => Self::H,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectKind {
    Unique,
    Group,
    Broadcast,
}

impl DirectKind {
    fn message_type(self) -> MessageType {
        match self {
            Self::Unique => MessageType::DirectUnique,
            Self::Group => MessageType::DirectGroup,
            Self::Broadcast => MessageType::Broadcast,
        }
    }
}

/// The 10-byte fields shared by every Datagram Service message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    msg_type: MessageType,
    flags: u8,
    dgm_id: u16,
    src_ip: Ipv4Addr,
    src_port: u16,
}

impl Header {
    fn compose(&self) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[0] = self.msg_type as u8;
        out[1] = self.flags;
        out[2..4].copy_from_slice(&self.dgm_id.to_be_bytes());
        out[4..8].copy_from_slice(&self.src_ip.octets());
        out[8..10].copy_from_slice(&self.src_port.to_be_bytes());
        out
    }

    fn parse(bytes: &[u8]) -> NbtResult<Self> {
        if bytes.len() < 10 {
            return Err(NbtError::invalid_argument("NBT datagram message short or empty"));
        }
        Ok(Self {
            msg_type: MessageType::from_byte(bytes[0])?,
            flags: bytes[1],
            dgm_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            src_ip: Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]),
            src_port: u16::from_be_bytes([bytes[8], bytes[9]]),
        })
    }
}

/// A complete (unfragmented, reassembled) Direct Unique/Group/Broadcast
/// datagram message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub kind: DirectKind,
    pub snt: SendingNodeType,
    pub dgm_id: u16,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub src_name: Vec<u8>,
    pub dst_name: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Datagram {
    /// Pack the message into one or more wire-format UDP payloads,
    /// fragmenting `payload` into pieces no larger than `max_data` bytes
    /// when it does not fit in a single datagram.
    pub fn compose_list(&self, max_data: usize) -> Vec<Vec<u8>> {
        let names_len = self.src_name.len() + self.dst_name.len();
        let flags_base = (self.snt as u8) & SNT_MASK;

        let chunks: Vec<&[u8]> = if self.payload.len() < max_data || max_data == 0 {
            vec![self.payload.as_slice()]
        } else {
            self.payload.chunks(max_data).collect()
        };

        let mut out = Vec::with_capacity(chunks.len());
        let mut offset: u16 = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let mut flags_fm = FIRST_FLAG * (i == 0) as u8;
            if i < chunks.len() - 1 {
                flags_fm |= MORE_FLAG;
            }
            let header = Header {
                msg_type: self.kind.message_type(),
                flags: flags_base | flags_fm,
                dgm_id: self.dgm_id,
                src_ip: self.src_ip,
                src_port: self.src_port,
            };
            let mut msg = Vec::with_capacity(14 + names_len + chunk.len());
            msg.extend_from_slice(&header.compose());
            msg.extend_from_slice(&((names_len + chunk.len()) as u16).to_be_bytes());
            msg.extend_from_slice(&offset.to_be_bytes());
            msg.extend_from_slice(&self.src_name);
            msg.extend_from_slice(&self.dst_name);
            msg.extend_from_slice(chunk);
            out.push(msg);
            offset += chunk.len() as u16;
        }
        out
    }
}

/// A single fragment of a Direct Unique/Group/Broadcast message, as
/// seen on the wire before reassembly (see [`crate::defrag`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: DirectKind,
    pub snt: SendingNodeType,
    pub dgm_id: u16,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub first: bool,
    pub more: bool,
    pub pkt_offset: u16,
    pub src_name: Vec<u8>,
    pub dst_name: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    DestinationNameNotPresent = 0x82,
    MalformedSourceName = 0x83,
    MalformedDestinationName = 0x84,
}

impl ErrorCode {
    fn from_byte(b: u8) -> NbtResult<Self> {
        Ok(match b {
            0x82 => Self::DestinationNameNotPresent,
            0x83 => Self::MalformedSourceName,
            0x84 => Self::MalformedDestinationName,
            other => return Err(NbtError::malformed(format!("unknown datagram error code: {other:#04x}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDatagram {
    pub snt: SendingNodeType,
    pub dgm_id: u16,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub error: ErrorCode,
}

impl ErrorDatagram {
    pub fn compose(&self) -> Vec<u8> {
        let header = Header {
            msg_type: MessageType::Error,
            flags: (self.snt as u8) & SNT_MASK,
            dgm_id: self.dgm_id,
            src_ip: self.src_ip,
            src_port: self.src_port,
        };
        let mut out = header.compose().to_vec();
        out.push(self.error as u8);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbddQueryKind {
    Query,
    PositiveResponse,
    NegativeResponse,
}

impl NbddQueryKind {
    fn message_type(self) -> MessageType {
        match self {
            Self::Query => MessageType::Query,
            Self::PositiveResponse => MessageType::PositiveResponse,
            Self::NegativeResponse => MessageType::NegativeResponse,
        }
    }
}

/// An NBDD (NBT Datagram Distribution Server) query or response
/// message: the query name is the only payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NbddQuery {
    pub kind: NbddQueryKind,
    pub snt: SendingNodeType,
    pub dgm_id: u16,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub query_name: Vec<u8>,
}

impl NbddQuery {
    pub fn compose(&self) -> Vec<u8> {
        let header = Header {
            msg_type: self.kind.message_type(),
            flags: (self.snt as u8) & SNT_MASK,
            dgm_id: self.dgm_id,
            src_ip: self.src_ip,
            src_port: self.src_port,
        };
        let mut out = header.compose().to_vec();
        out.extend_from_slice(&self.query_name);
        out
    }
}

/// Any Datagram Service message, as identified by [`parse_datagram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDatagram {
    Message(Datagram),
    Fragment(Fragment),
    Error(ErrorDatagram),
    Nbdd(NbddQuery),
}

/// Parse a complete NBT Datagram Service UDP payload.
pub fn parse_datagram(msg: &[u8]) -> NbtResult<ParsedDatagram> {
    if msg.len() < 11 {
        return Err(NbtError::invalid_argument("NBT message short or empty"));
    }
    let header = Header::parse(msg)?;
    let snt = SendingNodeType::from_flags(header.flags);

    match header.msg_type {
        MessageType::DirectUnique | MessageType::DirectGroup | MessageType::Broadcast => {
            if msg.len() < 14 {
                return Err(NbtError::invalid_argument("NBT message short or empty"));
            }
            let dgm_len = u16::from_be_bytes([msg[10], msg[11]]) as usize;
            let pkt_offset = u16::from_be_bytes([msg[12], msg[13]]);
            if msg.len() != dgm_len + 14 {
                let rel = if msg.len() < dgm_len + 14 { "less than" } else { "greater than" };
                return Err(NbtError::invalid_argument(format!(
                    "the actual message length is {rel} the reported message length"
                )));
            }

            let mut pos = 14;
            let src_span = Name::l2_span(&msg[pos..])?;
            let src_name = msg[pos..pos + src_span].to_vec();
            pos += src_span;
            let dst_span = Name::l2_span(&msg[pos..])?;
            let dst_name = msg[pos..pos + dst_span].to_vec();
            pos += dst_span;
            let payload = msg[pos..].to_vec();

            let first = header.flags & FIRST_FLAG != 0;
            let more = header.flags & MORE_FLAG != 0;
            let kind = match header.msg_type {
                MessageType::DirectGroup => DirectKind::Group,
                MessageType::Broadcast => DirectKind::Broadcast,
                _ => DirectKind::Unique,
            };

            if !first || more {
                Ok(ParsedDatagram::Fragment(Fragment {
                    kind,
                    snt,
                    dgm_id: header.dgm_id,
                    src_ip: header.src_ip,
                    src_port: header.src_port,
                    first,
                    more,
                    pkt_offset,
                    src_name,
                    dst_name,
                    payload,
                }))
            } else {
                Ok(ParsedDatagram::Message(Datagram {
                    kind,
                    snt,
                    dgm_id: header.dgm_id,
                    src_ip: header.src_ip,
                    src_port: header.src_port,
                    src_name,
                    dst_name,
                    payload,
                }))
            }
        }
        MessageType::Error => Ok(ParsedDatagram::Error(ErrorDatagram {
            snt,
            dgm_id: header.dgm_id,
            src_ip: header.src_ip,
            src_port: header.src_port,
            error: ErrorCode::from_byte(msg[10])?,
        })),
        MessageType::Query | MessageType::PositiveResponse | MessageType::NegativeResponse => {
            let kind = match header.msg_type {
                MessageType::Query => NbddQueryKind::Query,
                MessageType::PositiveResponse => NbddQueryKind::PositiveResponse,
                _ => NbddQueryKind::NegativeResponse,
            };
            Ok(ParsedDatagram::Nbdd(NbddQuery {
                kind,
                snt,
                dgm_id: header.dgm_id,
                src_ip: header.src_ip,
                src_port: header.src_port,
                query_name: msg[10..].to_vec(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Vec<u8> {
        Name::from_netbios(s, None, None, None, None).unwrap().l2name().to_vec()
    }

    #[test]
    fn compose_list_produces_single_message_for_small_payload() {
        let dgm = Datagram {
            kind: DirectKind::Unique,
            snt: SendingNodeType::B,
            dgm_id: 1,
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: DATAGRAM_PORT,
            src_name: name("SRC"),
            dst_name: name("DST"),
            payload: b"hello".to_vec(),
        };
        let list = dgm.compose_list(576);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0][0], MessageType::DirectUnique as u8);
    }

    #[test]
    fn compose_list_fragments_large_payload() {
        let dgm = Datagram {
            kind: DirectKind::Group,
            snt: SendingNodeType::B,
            dgm_id: 26,
            src_ip: Ipv4Addr::new(172, 18, 0, 1),
            src_port: DATAGRAM_PORT,
            src_name: name("RUBY"),
            dst_name: name("TERU"),
            payload: vec![b'x'; 478],
        };
        let list = dgm.compose_list(16);
        assert!(list.len() > 1);
        assert_eq!(list[0][1] & FIRST_FLAG, FIRST_FLAG);
        assert_eq!(list.last().unwrap()[1] & MORE_FLAG, 0);
    }

    #[test]
    fn round_trips_a_small_unfragmented_message() {
        let dgm = Datagram {
            kind: DirectKind::Unique,
            snt: SendingNodeType::P,
            dgm_id: 42,
            src_ip: Ipv4Addr::new(192, 168, 1, 5),
            src_port: DATAGRAM_PORT,
            src_name: name("ALPHA"),
            dst_name: name("BETA"),
            payload: b"payload".to_vec(),
        };
        let wire = &dgm.compose_list(576)[0];
        match parse_datagram(wire).unwrap() {
            ParsedDatagram::Message(parsed) => assert_eq!(parsed, dgm),
            other => panic!("expected a complete message, got {other:?}"),
        }
    }

    #[test]
    fn error_datagram_round_trips() {
        let err = ErrorDatagram {
            snt: SendingNodeType::B,
            dgm_id: 0,
            src_ip: Ipv4Addr::new(1, 2, 3, 4),
            src_port: DATAGRAM_PORT,
            error: ErrorCode::DestinationNameNotPresent,
        };
        match parse_datagram(&err.compose()).unwrap() {
            ParsedDatagram::Error(parsed) => assert_eq!(parsed, err),
            other => panic!("expected an error datagram, got {other:?}"),
        }
    }
}
