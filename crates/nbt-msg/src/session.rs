//! NBT Session Service: the six fixed message types exchanged over a
//! TCP connection on port 139 (or 445, for "naked" SMB transport) prior
//! to (and alongside) whatever higher-level protocol rides on top.
//!
//! The session header folds a 7-bit flags field and a 1-bit length
//! extension into what is, in practice, always treated as a flat 17-bit
//! length: every flags bit ever defined is zero, so a non-zero value is
//! simply a malformed header.

use std::net::Ipv4Addr;

use binrw::{BinRead, BinResult, BinWrite, Endian};
use nbt_dtyp::{NbtError, NbtResult};

use crate::name::Name;

/// The default NBT Session Service TCP listener port.
pub const SESSION_PORT: u16 = 139;

const MAX_LENGTH: u32 = 0x0001_FFFF;
const NAME_FIELD_LEN: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    SessionMessage = 0x00,
    SessionRequest = 0x81,
    PositiveResponse = 0x82,
    NegativeResponse = 0x83,
    RetargetResponse = 0x84,
    SessionKeepalive = 0x85,
}

impl MessageType {
    fn from_byte(b: u8) -> NbtResult<Self> {
        Ok(match b {
            0x00 => Self::SessionMessage,
            0x81 => Self::SessionRequest,
            0x82 => Self::PositiveResponse,
            0x83 => Self::NegativeResponse,
            0x84 => Self::RetargetResponse,
            0x85 => Self::SessionKeepalive,
            other => {
                return Err(NbtError::malformed(format!(
                    "unknown Session Service message type: {other:#04x}"
                )));
            }
        })
    }

    /// The message's fixed body length, if it has one. `SessionMessage`
    /// has none: its length field gives the size of a higher-layer
    /// payload that follows.
    fn fixed_body_len(self) -> Option<u32> {
        match self {
            Self::SessionMessage => None,
            Self::SessionRequest => Some(2 * NAME_FIELD_LEN as u32),
            Self::PositiveResponse => Some(0),
            Self::NegativeResponse => Some(1),
            Self::RetargetResponse => Some(6),
            Self::SessionKeepalive => Some(0),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SessionMessage => "Session Message",
            Self::SessionRequest => "Session Request",
            Self::PositiveResponse => "Positive Session Response",
            Self::NegativeResponse => "Negative Session Response",
            Self::RetargetResponse => "Retarget Session Response",
            Self::SessionKeepalive => "Session Keepalive",
        }
    }
}

/// The four-byte frame header shared by every NBT Session Service
/// message: a type byte, followed by a 7-bit flags field and a 17-bit
/// length folded together into the remaining three bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHeader {
    pub mtype: MessageType,
    pub length: u32,
}

impl SessionHeader {
    pub fn new(mtype: MessageType, length: u32) -> NbtResult<Self> {
        if length > MAX_LENGTH {
            return Err(NbtError::invalid_argument(
                "Session Message length exceeds the 17-bit maximum imposed by NBT",
            ));
        }
        if let Some(expected) = mtype.fixed_body_len() {
            if expected != length {
                return Err(NbtError::semantic(format!(
                    "malformed {} (length {length} != {expected})",
                    mtype.description()
                )));
            }
        }
        Ok(Self { mtype, length })
    }
}

impl BinRead for SessionHeader {
    type Args<'a> = ();

    fn read_options<R: binrw::io::Read + binrw::io::Seek>(
        reader: &mut R,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        let raw = u32::from_be_bytes(buf);
        let flags = (raw >> 17) & 0x7F;
        if flags != 0 {
            return Err(binrw::Error::AssertFail {
                pos: reader.stream_position()?,
                message: "non-zero FLAGS in Session Service header".into(),
            });
        }
        let mtype_byte = (raw >> 24) as u8;
        let length = raw & MAX_LENGTH;
        let mtype = MessageType::from_byte(mtype_byte).map_err(|e| binrw::Error::AssertFail {
            pos: reader.stream_position()?,
            message: e.to_string(),
        })?;
        Self::new(mtype, length).map_err(|e| binrw::Error::AssertFail {
            pos: reader.stream_position()?,
            message: e.to_string(),
        })
    }
}

impl BinWrite for SessionHeader {
    type Args<'a> = ();

    fn write_options<W: binrw::io::Write + binrw::io::Seek>(
        &self,
        writer: &mut W,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let raw = ((self.mtype as u32) << 24) | (self.length & MAX_LENGTH);
        writer.write_all(&raw.to_be_bytes())?;
        Ok(())
    }
}

/// A NetBIOS name encoded as the fixed 34-byte field used in a Session
/// Request: the 32-octet L1 name plus a leading length byte and a
/// trailing NUL, with no scope.
fn encode_session_name(name: &Name) -> NbtResult<[u8; NAME_FIELD_LEN]> {
    let l2 = name.l2name();
    if l2.len() != NAME_FIELD_LEN || l2[0] != 0x20 || l2[NAME_FIELD_LEN - 1] != 0 {
        return Err(NbtError::invalid_argument(
            "Session Service names must be L2 names with no NBT scope",
        ));
    }
    let mut out = [0u8; NAME_FIELD_LEN];
    out.copy_from_slice(l2);
    Ok(out)
}

fn is_l2_session_name(name: &[u8]) -> bool {
    name.len() == NAME_FIELD_LEN
        && name[0] == 0x20
        && name[NAME_FIELD_LEN - 1] == 0
        && name[1..NAME_FIELD_LEN - 1].iter().all(|&c| (b'A'..=b'P').contains(&c))
}

/// A Session Request's pair of called/calling names, validated but kept
/// in wire form (no scope, fixed 34-byte L1 encoding each).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequestNames {
    pub called: [u8; NAME_FIELD_LEN],
    pub calling: [u8; NAME_FIELD_LEN],
}

/// Body of an NBT Session Service message, keyed by [`MessageType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBody {
    /// Higher-layer payload length follows; the payload itself is read
    /// separately by the caller.
    SessionMessage,
    SessionRequest(SessionRequestNames),
    PositiveResponse,
    NegativeResponse(NegativeResponseError),
    RetargetResponse { ip: Ipv4Addr, port: u16 },
    SessionKeepalive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NegativeResponseError {
    NotListeningOnCalledName = 0x80,
    NotListeningForCallingName = 0x81,
    CalledNameNotPresent = 0x82,
    InsufficientResources = 0x83,
    UnspecifiedError = 0x8F,
}

impl NegativeResponseError {
    fn from_byte(b: u8) -> NbtResult<Self> {
        Ok(match b {
            0x80 => Self::NotListeningOnCalledName,
            0x81 => Self::NotListeningForCallingName,
            0x82 => Self::CalledNameNotPresent,
            0x83 => Self::InsufficientResources,
            0x8F => Self::UnspecifiedError,
            other => {
                return Err(NbtError::malformed(format!(
                    "unknown error code in Negative Session Response: {other:#04x}"
                )));
            }
        })
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NotListeningOnCalledName => "Not Listening on Called Name",
            Self::NotListeningForCallingName => "Not Listening for Calling Name",
            Self::CalledNameNotPresent => "Called Name Not Present",
            Self::InsufficientResources => "Insufficient Resources",
            Self::UnspecifiedError => "Unspecified Error",
        }
    }
}

fn compose_header(header: SessionHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    header
        .write_be(&mut binrw::io::Cursor::new(&mut buf))
        .expect("fixed-size header never fails to encode");
    buf
}

/// Build a full Session Request message, header included, from a called
/// and calling name. Both names must be 34-byte L2 encodings with no
/// NBT scope. Returns 72 octets beginning `81 00 00 44`.
pub fn session_request(called: &Name, calling: &Name) -> NbtResult<Vec<u8>> {
    let called = encode_session_name(called)?;
    let calling = encode_session_name(calling)?;
    let header = SessionHeader::new(MessageType::SessionRequest, 2 * NAME_FIELD_LEN as u32)?;
    let mut out = compose_header(header);
    out.extend_from_slice(&called);
    out.extend_from_slice(&calling);
    Ok(out)
}

/// Build a Session Message frame header for a higher-layer payload of
/// `len` bytes. Returns only the 4-byte header; the caller appends the
/// payload itself.
pub fn session_message(len: u32) -> NbtResult<Vec<u8>> {
    let header = SessionHeader::new(MessageType::SessionMessage, len)?;
    Ok(compose_header(header))
}

/// Parse the Called/Calling names out of a Session Request body (the 68
/// bytes immediately following the 4-byte header).
pub fn parse_cnames(msg: &[u8]) -> NbtResult<SessionRequestNames> {
    if msg.len() < 2 * NAME_FIELD_LEN {
        return Err(NbtError::invalid_argument("missing or short message"));
    }
    let called = &msg[..NAME_FIELD_LEN];
    let calling = &msg[NAME_FIELD_LEN..2 * NAME_FIELD_LEN];
    if !is_l2_session_name(called) {
        return Err(NbtError::semantic("malformed Called name in Session Request"));
    }
    if !is_l2_session_name(calling) {
        return Err(NbtError::semantic("malformed Calling name in Session Request"));
    }
    let mut out = SessionRequestNames {
        called: [0; NAME_FIELD_LEN],
        calling: [0; NAME_FIELD_LEN],
    };
    out.called.copy_from_slice(called);
    out.calling.copy_from_slice(calling);
    Ok(out)
}

/// Parse the one-byte error code of a Negative Session Response (the
/// byte immediately following the 4-byte header).
pub fn parse_errcode(msg: &[u8]) -> NbtResult<NegativeResponseError> {
    let &[b, ..] = msg else {
        return Err(NbtError::invalid_argument("missing or short message"));
    };
    NegativeResponseError::from_byte(b)
}

/// Parse the redirection address and port of a Retarget Response (the 6
/// bytes immediately following the 4-byte header).
pub fn parse_retarget(msg: &[u8]) -> NbtResult<(Ipv4Addr, u16)> {
    if msg.len() < 6 {
        return Err(NbtError::invalid_argument("missing or short message"));
    }
    let ip = Ipv4Addr::new(msg[0], msg[1], msg[2], msg[3]);
    let port = u16::from_be_bytes([msg[4], msg[5]]);
    Ok((ip, port))
}

/// Parse a full Session Service frame (header plus any fixed-size
/// body). For `SessionMessage`, only the header is consumed: the
/// caller reads `header.length` further bytes of payload itself.
pub fn parse_frame(mut reader: impl binrw::io::Read + binrw::io::Seek) -> NbtResult<(SessionHeader, SessionBody)> {
    let header = SessionHeader::read_be(&mut reader)
        .map_err(|e| NbtError::malformed(e.to_string()))?;
    let body = match header.mtype {
        MessageType::SessionMessage => SessionBody::SessionMessage,
        MessageType::SessionRequest => {
            let mut buf = [0u8; 2 * NAME_FIELD_LEN];
            std::io::Read::read_exact(&mut reader, &mut buf)
                .map_err(|e| NbtError::malformed(e.to_string()))?;
            SessionBody::SessionRequest(parse_cnames(&buf)?)
        }
        MessageType::PositiveResponse => SessionBody::PositiveResponse,
        MessageType::NegativeResponse => {
            let mut buf = [0u8; 1];
            std::io::Read::read_exact(&mut reader, &mut buf)
                .map_err(|e| NbtError::malformed(e.to_string()))?;
            SessionBody::NegativeResponse(parse_errcode(&buf)?)
        }
        MessageType::RetargetResponse => {
            let mut buf = [0u8; 6];
            std::io::Read::read_exact(&mut reader, &mut buf)
                .map_err(|e| NbtError::malformed(e.to_string()))?;
            let (ip, port) = parse_retarget(&buf)?;
            SessionBody::RetargetResponse { ip, port }
        }
        MessageType::SessionKeepalive => SessionBody::SessionKeepalive,
    };
    Ok((header, body))
}

pub fn positive_response() -> Vec<u8> {
    let header = SessionHeader::new(MessageType::PositiveResponse, 0)
        .expect("fixed body length always matches");
    compose_header(header)
}

pub fn negative_response(err: NegativeResponseError) -> Vec<u8> {
    let header = SessionHeader::new(MessageType::NegativeResponse, 1)
        .expect("fixed body length always matches");
    let mut buf = compose_header(header);
    buf.push(err as u8);
    buf
}

pub fn retarget_response(ip: Ipv4Addr, port: u16) -> Vec<u8> {
    let header = SessionHeader::new(MessageType::RetargetResponse, 6)
        .expect("fixed body length always matches");
    let mut buf = compose_header(header);
    buf.extend_from_slice(&ip.octets());
    buf.extend_from_slice(&port.to_be_bytes());
    buf
}

pub fn keepalive() -> Vec<u8> {
    let header = SessionHeader::new(MessageType::SessionKeepalive, 0)
        .expect("fixed body length always matches");
    compose_header(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbt_tests::{hex, to_hex};

    #[test]
    fn positive_response_is_four_zero_bytes_after_type() {
        assert_eq!(to_hex(&positive_response()), "82000000");
    }

    #[test]
    fn negative_response_appends_error_code() {
        assert_eq!(
            to_hex(&negative_response(NegativeResponseError::UnspecifiedError)),
            "830000018f"
        );
    }

    #[test]
    fn retarget_response_encodes_ip_and_port() {
        let out = retarget_response(Ipv4Addr::new(172, 23, 255, 12), 8139);
        assert_eq!(out, hex("84000006ac17ff0c1fcb"));
    }

    #[test]
    fn keepalive_is_constant() {
        assert_eq!(keepalive(), hex("85000000"));
    }

    #[test]
    fn parse_frame_rejects_nonzero_flags() {
        let bytes = [0x85u8, 0x02, 0, 0];
        assert!(parse_frame(binrw::io::Cursor::new(bytes)).is_err());
    }

    #[test]
    fn parse_frame_round_trips_keepalive() {
        let (header, body) = parse_frame(binrw::io::Cursor::new(keepalive())).unwrap();
        assert_eq!(header.mtype, MessageType::SessionKeepalive);
        assert_eq!(body, SessionBody::SessionKeepalive);
    }

    #[test]
    fn session_request_round_trips_names() {
        let called = Name::from_netbios("CALLED", None, None, None, None).unwrap();
        let calling = Name::from_netbios("CALLING", None, None, None, None).unwrap();
        let msg = session_request(&called, &calling).unwrap();
        assert_eq!(msg.len(), 4 + 2 * NAME_FIELD_LEN);
        assert_eq!(&to_hex(&msg)[..8], "81000044");

        let (header, body) = parse_frame(binrw::io::Cursor::new(msg.clone())).unwrap();
        assert_eq!(header.mtype, MessageType::SessionRequest);
        let SessionBody::SessionRequest(names) = body else {
            panic!("expected a SessionRequest body");
        };
        assert!(is_l2_session_name(&names.called));
        assert!(is_l2_session_name(&names.calling));

        let names = parse_cnames(&msg[4..]).unwrap();
        assert!(is_l2_session_name(&names.called));
        assert!(is_l2_session_name(&names.calling));
    }

    #[test]
    fn session_message_emits_header_only() {
        let out = session_message(1024).unwrap();
        assert_eq!(out, hex("00000400"));
    }

    #[test]
    fn session_message_rejects_length_over_17_bits() {
        assert!(session_message(0x0002_0000).is_err());
    }
}
