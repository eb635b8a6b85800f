//! SMB2/SMB3 packet header.
//!
//! The header's wire layout overloads two byte ranges depending on
//! dialect and direction, so this type stores the raw bits for both
//! and exposes dialect-aware accessors rather than picking one
//! interpretation at parse time.

use modular_bitfield::prelude::*;
use nbt_dtyp::{SmbError, SmbResult};

const PROTOCOL_PREFIX: [u8; 4] = *b"\xfeSMB";
const TRANSFORM_PREFIX: [u8; 4] = *b"\xfdSMB";
const STRUCTURE_SIZE: u16 = 64;
pub const HEADER_LEN: usize = 64;

/// SMB2/SMB3 protocol command codes.
///
/// Reference: MS-SMB2 2.2.1.2
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Command {
    Negotiate = 0,
    SessionSetup = 1,
    Logoff = 2,
    TreeConnect = 3,
    TreeDisconnect = 4,
    Create = 5,
    Close = 6,
    Flush = 7,
    Read = 8,
    Write = 9,
    Lock = 0xA,
    Ioctl = 0xB,
    Cancel = 0xC,
    Echo = 0xD,
    QueryDirectory = 0xE,
    ChangeNotify = 0xF,
    QueryInfo = 0x10,
    SetInfo = 0x11,
    OplockBreak = 0x12,
}

impl Command {
    fn from_u16(value: u16) -> SmbResult<Self> {
        Ok(match value {
            0 => Self::Negotiate,
            1 => Self::SessionSetup,
            2 => Self::Logoff,
            3 => Self::TreeConnect,
            4 => Self::TreeDisconnect,
            5 => Self::Create,
            6 => Self::Close,
            7 => Self::Flush,
            8 => Self::Read,
            9 => Self::Write,
            0xA => Self::Lock,
            0xB => Self::Ioctl,
            0xC => Self::Cancel,
            0xD => Self::Echo,
            0xE => Self::QueryDirectory,
            0xF => Self::ChangeNotify,
            0x10 => Self::QueryInfo,
            0x11 => Self::SetInfo,
            0x12 => Self::OplockBreak,
            other => {
                return Err(SmbError::semantic(format!("command code {other:#06x} out of range")));
            }
        })
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({:#x})", *self as u16)
    }
}

/// The closed set of dialects this header layout understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Smb202,
    Smb210,
    Smb300,
    Smb302,
    Smb311,
}

impl Dialect {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Smb202 => 0x0202,
            Self::Smb210 => 0x0210,
            Self::Smb300 => 0x0300,
            Self::Smb302 => 0x0302,
            Self::Smb311 => 0x0311,
        }
    }

    pub fn from_u16(value: u16) -> SmbResult<Self> {
        Ok(match value {
            0x0202 => Self::Smb202,
            0x0210 => Self::Smb210,
            0x0300 => Self::Smb300,
            0x0302 => Self::Smb302,
            0x0311 => Self::Smb311,
            other => return Err(SmbError::semantic(format!("unsupported SMB2 dialect {other:#06x}"))),
        })
    }

    fn at_least_smb3(self) -> bool {
        self.as_u16() >= 0x0300
    }
}

/// SMB2 header flags.
///
/// Reference: MS-SMB2 2.2.1.2
#[nbt_dtyp::mbitfield]
pub struct HeaderFlags {
    /// Message is a server response (clear for requests).
    pub server_to_redir: bool,
    /// Message is part of an asynchronous operation.
    pub async_command: bool,
    /// Request is a related operation in a compounded chain.
    pub related_operations: bool,
    /// Message is signed.
    pub signed: bool,
    /// Priority subfield (SMB 3.1.1+ quality-of-service hint).
    pub priority_mask: B3,
    #[skip]
    __: B21,
    /// Request is a DFS operation.
    pub dfs_operation: bool,
    /// Request is a replay operation for resilient handles.
    pub replay_operation: bool,
    #[skip]
    __: B2,
}

/// SMB2/SMB3 packet header. Two fields carry dialect/direction-dependent
/// bit patterns; use the accessor methods rather than reading them raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub credit_charge: u16,
    /// Raw bits of the overloaded Status/ChannelSequence field.
    /// Use [`Header::status`] / [`Header::channel_sequence`].
    pub status_or_chan_seq: u32,
    pub command: Command,
    pub credit_request_response: u16,
    pub flags: HeaderFlags,
    pub next_command: u32,
    pub message_id: u64,
    /// Raw bits of the overloaded Reserved+TreeId/AsyncId field.
    /// Use [`Header::tree_id`] / [`Header::async_id`].
    pub reserved_or_async: u64,
    pub session_id: u64,
    pub signature: u128,
}

impl Header {
    pub const STRUCT_SIZE: usize = HEADER_LEN;

    /// A synchronous request header with a tree id and zero status.
    pub fn request(command: Command, tree_id: u32, message_id: u64) -> SmbResult<Self> {
        Ok(Self {
            credit_charge: 0,
            status_or_chan_seq: 0,
            command,
            credit_request_response: 1,
            flags: HeaderFlags::new(),
            next_command: 0,
            message_id,
            reserved_or_async: tree_id as u64,
            session_id: 0,
            signature: 0,
        })
    }

    /// The status field, valid when this is a response, or the
    /// request predates channel-sequence overloading (dialect < 3.0).
    /// Returns `None` when the channel-sequence layout applies instead.
    pub fn status(&self, dialect: Dialect) -> Option<u32> {
        if self.flags.server_to_redir() || !dialect.at_least_smb3() {
            Some(self.status_or_chan_seq)
        } else {
            None
        }
    }

    /// The channel-sequence field, valid only for requests under
    /// dialect ≥ 3.0. Returns `None` when the status layout applies.
    pub fn channel_sequence(&self, dialect: Dialect) -> Option<u16> {
        if !self.flags.server_to_redir() && dialect.at_least_smb3() {
            Some((self.status_or_chan_seq & 0xFFFF) as u16)
        } else {
            None
        }
    }

    /// The tree id, valid for synchronous (non-async) messages.
    pub fn tree_id(&self) -> Option<u32> {
        if self.flags.async_command() {
            None
        } else {
            Some((self.reserved_or_async & 0xFFFF_FFFF) as u32)
        }
    }

    /// The async id, valid only when [`HeaderFlags::async_command`] is set.
    pub fn async_id(&self) -> Option<u64> {
        if self.flags.async_command() {
            Some(self.reserved_or_async)
        } else {
            None
        }
    }

    /// Turn this header into an async header: sets the async flag,
    /// clears the tree id, and stores `async_id` in its place.
    pub fn to_async(&mut self, async_id: u64) {
        self.flags.set_async_command(true);
        self.reserved_or_async = async_id;
    }

    pub fn compose(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&PROTOCOL_PREFIX);
        out[4..6].copy_from_slice(&STRUCTURE_SIZE.to_le_bytes());
        out[6..8].copy_from_slice(&self.credit_charge.to_le_bytes());
        out[8..12].copy_from_slice(&self.status_or_chan_seq.to_le_bytes());
        out[12..14].copy_from_slice(&(self.command as u16).to_le_bytes());
        out[14..16].copy_from_slice(&self.credit_request_response.to_le_bytes());
        out[16..20].copy_from_slice(&self.flags.into_bytes());
        out[20..24].copy_from_slice(&self.next_command.to_le_bytes());
        out[24..32].copy_from_slice(&self.message_id.to_le_bytes());
        out[32..40].copy_from_slice(&self.reserved_or_async.to_le_bytes());
        out[40..48].copy_from_slice(&self.session_id.to_le_bytes());
        out[48..64].copy_from_slice(&self.signature.to_le_bytes());
        out
    }
}

/// Parse a 64-octet SMB2/3 header. Rejects SMB3 Transform headers
/// (`\xfdSMB` prefix) outright, since transform framing is out of
/// scope for this library.
pub fn parse_header(bytes: &[u8], dialect: Dialect) -> SmbResult<Header> {
    if bytes.len() < HEADER_LEN {
        return Err(SmbError::invalid_argument(format!(
            "SMB2 header requires {HEADER_LEN} octets, got {}",
            bytes.len()
        )));
    }
    if bytes[0..4] == TRANSFORM_PREFIX {
        return Err(SmbError::invalid_argument("SMB3 Transform headers are not supported"));
    }
    if bytes[0..4] != PROTOCOL_PREFIX {
        log::debug!(target: "nbt_msg::smb2", "bad SMB2 protocol prefix, len={}", bytes.len());
        return Err(SmbError::protocol_mismatch("expected \\xfeSMB"));
    }
    let structure_size = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    if structure_size != STRUCTURE_SIZE {
        return Err(SmbError::syntax(format!(
            "SMB2 header structure size must be 64, got {structure_size}"
        )));
    }

    let credit_charge = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
    let status_or_chan_seq = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let command = Command::from_u16(u16::from_le_bytes(bytes[12..14].try_into().unwrap()))?;
    let credit_request_response = u16::from_le_bytes(bytes[14..16].try_into().unwrap());
    let flags = HeaderFlags::from_bytes(bytes[16..20].try_into().unwrap());
    let next_command = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
    let message_id = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
    let reserved_or_async = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
    let session_id = u64::from_le_bytes(bytes[40..48].try_into().unwrap());
    let signature = u128::from_le_bytes(bytes[48..64].try_into().unwrap());

    let _ = dialect; // layout is resolved lazily by the accessor methods

    Ok(Header {
        credit_charge,
        status_or_chan_seq,
        command,
        credit_request_response,
        flags,
        next_command,
        message_id,
        reserved_or_async,
        session_id,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_response_round_trips() {
        let mut header = Header::request(Command::ChangeNotify, 0x00beaded, 8).unwrap();
        header.flags.set_server_to_redir(true);
        header.status_or_chan_seq = 0x0000_0103; // STATUS_PENDING
        let bytes = header.compose();
        let parsed = parse_header(&bytes, Dialect::Smb210).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.status(Dialect::Smb210), Some(0x0000_0103));
        assert_eq!(parsed.tree_id(), Some(0x00beaded));
        assert_eq!(parsed.async_id(), None);
    }

    #[test]
    fn async_header_round_trips_and_clears_tree_id() {
        let mut header = Header::request(Command::ChangeNotify, 0, 8).unwrap();
        header.to_async(8);
        header.flags.set_server_to_redir(true);
        let bytes = header.compose();
        let parsed = parse_header(&bytes, Dialect::Smb300).unwrap();
        assert_eq!(parsed.async_id(), Some(8));
        assert_eq!(parsed.tree_id(), None);
    }

    #[test]
    fn smb3_request_uses_channel_sequence_layout() {
        let mut header = Header::request(Command::Logoff, 0x00beaded, 1).unwrap();
        header.credit_charge = 213;
        header.status_or_chan_seq = 42607; // channel sequence, reserved hi bits 0
        header.credit_request_response = 42;
        header.flags.set_dfs_operation(true);
        header.flags.set_priority_mask(5);
        header.next_command = 0x8765_4321;
        let bytes = header.compose();
        let parsed = parse_header(&bytes, Dialect::Smb302).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.status(Dialect::Smb302), None);
        assert_eq!(parsed.channel_sequence(Dialect::Smb302), Some(42607));
    }

    #[test]
    fn transform_header_prefix_is_rejected() {
        let header = Header::request(Command::Negotiate, 0, 0).unwrap();
        let mut bytes = header.compose();
        bytes[0..4].copy_from_slice(b"\xfdSMB");
        assert!(parse_header(&bytes, Dialect::Smb202).is_err());
    }

    #[test]
    fn command_out_of_range_is_rejected() {
        let header = Header::request(Command::Negotiate, 0, 0).unwrap();
        let mut bytes = header.compose();
        bytes[12..14].copy_from_slice(&0x20u16.to_le_bytes());
        assert!(parse_header(&bytes, Dialect::Smb202).is_err());
    }
}
