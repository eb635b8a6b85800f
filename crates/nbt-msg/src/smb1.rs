//! SMB1 header and the two commands this library still speaks:
//! protocol negotiation (NegProt) and Echo, used only to bootstrap a
//! multi-protocol negotiation into SMB2/3.

use nbt_dtyp::{SmbError, SmbResult};

const PROTOCOL_PREFIX: [u8; 4] = *b"\xffSMB";
const HEADER_LEN: usize = 32;

const CMD_NEGOTIATE: u8 = 0x72;
const CMD_ECHO: u8 = 0x2B;

/// Request-side `Flags` defaults: case-insensitive paths, canonicalized
/// pathnames.
pub const DEFAULT_REQUEST_FLAGS: u8 = 0x08 | 0x10;
/// Response messages OR this bit into `Flags`.
pub const FLAGS_REPLY: u8 = 0x80;
/// Default `Flags2`: long names, NT status codes, Unicode strings.
pub const DEFAULT_FLAGS2: u16 = 0x0001 | 0x4000 | 0x8000;

/// The fixed 32-octet SMB1 header, reusable standalone since both
/// NegProt and Echo embed it independently rather than inline it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smb1Header {
    pub command: u8,
    pub status: u32,
    pub flags: u8,
    pub flags2: u16,
    pid_high: u16,
    pub security_features: [u8; 8],
    pub reserved: u16,
    pub tid: u16,
    pid_low: u16,
    pub uid: u16,
    pub mid: u16,
}

impl Smb1Header {
    /// A request header with the library's default flags and a PID
    /// split across `pid_high`/`pid_low`.
    pub fn request(command: u8, pid: u32, mid: u16) -> Self {
        Self {
            command,
            status: 0,
            flags: DEFAULT_REQUEST_FLAGS,
            flags2: DEFAULT_FLAGS2,
            pid_high: (pid >> 16) as u16,
            security_features: [0; 8],
            reserved: 0,
            tid: 0xFFFF,
            pid_low: pid as u16,
            uid: 0,
            mid,
        }
    }

    /// A response header derived from a request header: same command,
    /// PID, TID, UID and MID, `Reply` OR'd into flags, caller-supplied
    /// status.
    pub fn response_to(request: &Smb1Header, status: u32) -> Self {
        Self {
            command: request.command,
            status,
            flags: request.flags | FLAGS_REPLY,
            flags2: request.flags2,
            pid_high: request.pid_high,
            security_features: [0; 8],
            reserved: 0,
            tid: request.tid,
            pid_low: request.pid_low,
            uid: request.uid,
            mid: request.mid,
        }
    }

    /// The 32-bit process id, reassembled from `pid_high`/`pid_low`.
    pub fn pid(&self) -> u32 {
        ((self.pid_high as u32) << 16) | self.pid_low as u32
    }

    pub fn set_pid(&mut self, pid: u32) {
        self.pid_high = (pid >> 16) as u16;
        self.pid_low = pid as u16;
    }

    fn compose(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&PROTOCOL_PREFIX);
        out[4] = self.command;
        out[5..9].copy_from_slice(&self.status.to_le_bytes());
        out[9] = self.flags;
        out[10..12].copy_from_slice(&self.flags2.to_le_bytes());
        out[12..14].copy_from_slice(&self.pid_high.to_le_bytes());
        out[14..22].copy_from_slice(&self.security_features);
        out[22..24].copy_from_slice(&self.reserved.to_le_bytes());
        out[24..26].copy_from_slice(&self.tid.to_le_bytes());
        out[26..28].copy_from_slice(&self.pid_low.to_le_bytes());
        out[28..30].copy_from_slice(&self.uid.to_le_bytes());
        out[30..32].copy_from_slice(&self.mid.to_le_bytes());
        out
    }

    fn parse(bytes: &[u8]) -> SmbResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SmbError::invalid_argument(format!(
                "SMB1 header requires {HEADER_LEN} octets, got {}",
                bytes.len()
            )));
        }
        if bytes[0..4] != PROTOCOL_PREFIX {
            log::debug!(target: "nbt_msg::smb1", "bad SMB1 protocol prefix, len={}", bytes.len());
            return Err(SmbError::protocol_mismatch("expected \\xffSMB"));
        }
        Ok(Self {
            command: bytes[4],
            status: u32::from_le_bytes(bytes[5..9].try_into().unwrap()),
            flags: bytes[9],
            flags2: u16::from_le_bytes(bytes[10..12].try_into().unwrap()),
            pid_high: u16::from_le_bytes(bytes[12..14].try_into().unwrap()),
            security_features: bytes[14..22].try_into().unwrap(),
            reserved: u16::from_le_bytes(bytes[22..24].try_into().unwrap()),
            tid: u16::from_le_bytes(bytes[24..26].try_into().unwrap()),
            pid_low: u16::from_le_bytes(bytes[26..28].try_into().unwrap()),
            uid: u16::from_le_bytes(bytes[28..30].try_into().unwrap()),
            mid: u16::from_le_bytes(bytes[30..32].try_into().unwrap()),
        })
    }
}

/// A protocol-negotiation request: the header plus the ordered list of
/// dialect strings the sender offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegProtRequest {
    pub header: Smb1Header,
    pub dialects: Vec<String>,
}

impl NegProtRequest {
    pub fn new(header: Smb1Header, dialects: Vec<String>) -> Self {
        Self { header, dialects }
    }

    pub fn compose(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        for d in &self.dialects {
            payload.push(0x02);
            payload.extend_from_slice(d.as_bytes());
            payload.push(0x00);
        }
        let mut out = self.header.compose().to_vec();
        out.push(0); // WordCount
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }
}

/// A protocol-negotiation response: the header plus the index of the
/// chosen dialect (`0xFFFF` if none was acceptable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegProtResponse {
    pub header: Smb1Header,
    pub dialect_index: u16,
}

impl NegProtResponse {
    pub fn new(header: Smb1Header, dialect_index: u16) -> Self {
        Self { header, dialect_index }
    }

    pub fn compose(&self) -> Vec<u8> {
        let mut out = self.header.compose().to_vec();
        out.push(1); // WordCount
        out.extend_from_slice(&self.dialect_index.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // ByteCount
        out
    }
}

/// An Echo request or response: a single parameter word (echo count on
/// the wire for requests, sequence number for responses) plus an
/// arbitrary payload the peer must return unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub header: Smb1Header,
    pub param_word: u16,
    pub payload: Vec<u8>,
    crc32: std::cell::OnceCell<u32>,
}

impl Echo {
    pub fn new(header: Smb1Header, param_word: u16, payload: Vec<u8>) -> SmbResult<Self> {
        if payload.len() > u16::MAX as usize {
            return Err(SmbError::invalid_argument(format!(
                "echo payload of {} octets exceeds 65535",
                payload.len()
            )));
        }
        Ok(Self {
            header,
            param_word,
            payload,
            crc32: std::cell::OnceCell::new(),
        })
    }

    /// CRC-32 (IEEE 802.3) over the payload, computed lazily and cached
    /// for repeated diagnostic/test use.
    pub fn crc32(&self) -> u32 {
        *self.crc32.get_or_init(|| crc32_ieee(&self.payload))
    }

    pub fn compose(&self) -> Vec<u8> {
        let mut out = self.header.compose().to_vec();
        out.push(1); // WordCount
        out.extend_from_slice(&self.param_word.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Echo Request is the same shape as Echo Response; see [`Echo`].
pub type EchoRequest = Echo;
/// Echo Request is the same shape as Echo Response; see [`Echo`].
pub type EchoResponse = Echo;

fn crc32_ieee(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

/// Dispatch result of [`parse_smb1`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Smb1Message {
    NegProtRequest(NegProtRequest),
    NegProtResponse(NegProtResponse),
    Echo(Echo),
}

/// Parse an SMB1 message, recognizing only `NEGOTIATE` (0x72) and
/// `ECHO` (0x2B); any other command is `SMB-Semantic`.
pub fn parse_smb1(bytes: &[u8]) -> SmbResult<Smb1Message> {
    let header = Smb1Header::parse(bytes)?;
    let body = &bytes[HEADER_LEN..];
    match header.command {
        CMD_NEGOTIATE => parse_negprot(header, body),
        CMD_ECHO => parse_echo(header, body),
        other => {
            log::debug!(target: "nbt_msg::smb1", "unrecognized SMB1 command {other:#04x}");
            Err(SmbError::semantic(format!("unrecognized SMB1 command {other:#04x}")))
        }
    }
}

fn parse_negprot(header: Smb1Header, body: &[u8]) -> SmbResult<Smb1Message> {
    if body.is_empty() {
        return Err(SmbError::syntax("NegProt message has no word count byte"));
    }
    let word_count = body[0];
    let rest = &body[1..];
    if word_count == 0 {
        // Request: <ByteCount:u16><dialects...>
        if rest.len() < 2 {
            return Err(SmbError::syntax("NegProt request missing ByteCount"));
        }
        let byte_count = u16::from_le_bytes(rest[0..2].try_into().unwrap()) as usize;
        let payload = &rest[2..];
        if payload.len() != byte_count {
            return Err(SmbError::syntax(
                "NegProt request ByteCount does not match payload length",
            ));
        }
        if payload.is_empty() {
            return Err(SmbError::semantic("NegProt request dialect list is empty"));
        }
        let dialects = parse_dialects(payload)?;
        Ok(Smb1Message::NegProtRequest(NegProtRequest::new(header, dialects)))
    } else if word_count == 1 {
        // Response: <dialect_index:u16><ByteCount:u16=0>
        if rest.len() < 4 {
            return Err(SmbError::syntax("NegProt response too short"));
        }
        let dialect_index = u16::from_le_bytes(rest[0..2].try_into().unwrap());
        Ok(Smb1Message::NegProtResponse(NegProtResponse::new(header, dialect_index)))
    } else {
        Err(SmbError::semantic(format!(
            "NegProt message has unexpected word count {word_count}"
        )))
    }
}

fn parse_dialects(payload: &[u8]) -> SmbResult<Vec<String>> {
    if payload[0] != 0x02 || *payload.last().unwrap() != 0x00 {
        return Err(SmbError::syntax(
            "dialect list must start with 0x02 and end with 0x00",
        ));
    }
    let mut dialects = Vec::new();
    let mut i = 0;
    while i < payload.len() {
        if payload[i] != 0x02 {
            return Err(SmbError::syntax("expected 0x02 dialect marker"));
        }
        i += 1;
        let start = i;
        while i < payload.len() && payload[i] != 0x00 {
            i += 1;
        }
        if i >= payload.len() {
            return Err(SmbError::syntax("dialect string missing NUL terminator"));
        }
        let name = std::str::from_utf8(&payload[start..i])
            .map_err(|_| SmbError::syntax("dialect string is not valid ASCII/UTF-8"))?;
        dialects.push(name.to_string());
        i += 1;
    }
    Ok(dialects)
}

fn parse_echo(header: Smb1Header, body: &[u8]) -> SmbResult<Smb1Message> {
    if body.is_empty() || body[0] != 1 {
        return Err(SmbError::syntax("Echo message must have WordCount == 1"));
    }
    let rest = &body[1..];
    if rest.len() < 4 {
        return Err(SmbError::syntax("Echo message too short"));
    }
    let param_word = u16::from_le_bytes(rest[0..2].try_into().unwrap());
    let byte_count = u16::from_le_bytes(rest[2..4].try_into().unwrap()) as usize;
    let payload = &rest[4..];
    if payload.len() != byte_count {
        return Err(SmbError::syntax("Echo ByteCount does not match payload length"));
    }
    Ok(Smb1Message::Echo(Echo::new(header, param_word, payload.to_vec())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbt_tests::to_hex;

    #[test]
    fn negprot_request_round_trips_default_dialects() {
        let header = Smb1Header::request(CMD_NEGOTIATE, 5, 7);
        let req = NegProtRequest::new(header, vec!["2.002".into(), "2.???".into()]);
        let bytes = req.compose();
        assert_eq!(&to_hex(&bytes)[0..10], "ff534d4272");
        assert_eq!(bytes.len(), 49);
        match parse_smb1(&bytes).unwrap() {
            Smb1Message::NegProtRequest(parsed) => {
                assert_eq!(parsed.dialects, vec!["2.002", "2.???"]);
            }
            other => panic!("expected NegProtRequest, got {other:?}"),
        }
    }

    #[test]
    fn negprot_response_round_trips() {
        let header = Smb1Header::request(CMD_NEGOTIATE, 5, 7);
        let resp = NegProtResponse::new(Smb1Header::response_to(&header, 0), 1);
        let bytes = resp.compose();
        match parse_smb1(&bytes).unwrap() {
            Smb1Message::NegProtResponse(parsed) => assert_eq!(parsed.dialect_index, 1),
            other => panic!("expected NegProtResponse, got {other:?}"),
        }
    }

    #[test]
    fn echo_round_trips_and_caches_crc32() {
        let header = Smb1Header::request(CMD_ECHO, 5, 7);
        let echo = Echo::new(header, 1, b"ping".to_vec()).unwrap();
        let crc_a = echo.crc32();
        let crc_b = echo.crc32();
        assert_eq!(crc_a, crc_b);

        let bytes = echo.compose();
        match parse_smb1(&bytes).unwrap() {
            Smb1Message::Echo(parsed) => {
                assert_eq!(parsed.payload, b"ping");
                assert_eq!(parsed.crc32(), crc_a);
            }
            other => panic!("expected Echo, got {other:?}"),
        }
    }

    #[test]
    fn echo_payload_over_65535_is_rejected() {
        let header = Smb1Header::request(CMD_ECHO, 1, 1);
        let huge = vec![0u8; u16::MAX as usize + 1];
        assert!(Echo::new(header, 0, huge).is_err());
    }

    #[test]
    fn unrecognized_command_is_semantic_error() {
        let mut header_bytes = Smb1Header::request(0x04, 1, 1).compose().to_vec();
        header_bytes.push(0);
        header_bytes.extend_from_slice(&0u16.to_le_bytes());
        assert!(matches!(parse_smb1(&header_bytes), Err(SmbError::Semantic { .. })));
    }

    #[test]
    fn bad_protocol_prefix_is_rejected() {
        let mut bytes = Smb1Header::request(CMD_ECHO, 1, 1).compose().to_vec();
        bytes[0] = 0x00;
        assert!(matches!(parse_smb1(&bytes), Err(SmbError::ProtocolMismatch { .. })));
    }

    #[test]
    fn pid_splits_and_rejoins_across_high_low_words() {
        let mut header = Smb1Header::request(CMD_ECHO, 0x0001_2345, 1);
        assert_eq!(header.pid(), 0x0001_2345);
        header.set_pid(0xABCD_1234);
        assert_eq!(header.pid(), 0xABCD_1234);
    }
}
