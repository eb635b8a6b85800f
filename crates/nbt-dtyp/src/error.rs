//! Coded error taxonomy shared by the NBT and SMB1/2 codecs.
//!
//! One `thiserror` enum per protocol family (NBT, SMB), rather than a
//! single flat error type.

use thiserror::Error;

/// Errors raised while encoding or decoding NBT Name/Datagram/Session wire
/// structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NbtError {
    /// A value passed to a constructor was out of its legal range.
    #[error("invalid argument{}", fmt_msg(.message))]
    InvalidArgument { message: Option<String> },

    /// A field's value violates NBT protocol semantics (e.g. a reserved
    /// flag bit is set, or an enum-like byte holds an unknown value).
    #[error("NBT semantic error{}", fmt_msg(.message))]
    Semantic { message: Option<String> },

    /// A field does not match the shape required by the grammar (e.g. a
    /// label length byte uses a reserved bit pattern).
    #[error("NBT syntax error{}", fmt_msg(.message))]
    Syntax { message: Option<String> },

    /// The caller tried to append a tail onto a name that was already
    /// fully resolved (no outstanding Label String Pointer).
    #[error("no label string pointer to resolve{}", fmt_msg(.message))]
    NoLabelStringPointer { message: Option<String> },

    /// The message could not be parsed at all.
    #[error("malformed NBT message{}", fmt_msg(.message))]
    Malformed { message: Option<String> },
}

impl NbtError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: Some(message.into()),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic {
            message: Some(message.into()),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: Some(message.into()),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: Some(message.into()),
        }
    }
}

/// Errors raised while encoding or decoding SMB1/SMB2 wire structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmbError {
    /// A value passed to a constructor was out of its legal range.
    #[error("invalid argument{}", fmt_msg(.message))]
    InvalidArgument { message: Option<String> },

    /// A field's value violates SMB protocol semantics (e.g. an
    /// unrecognized command code, or a mismatched byte count).
    #[error("SMB semantic error{}", fmt_msg(.message))]
    Semantic { message: Option<String> },

    /// A field does not match the shape the grammar requires.
    #[error("SMB syntax error{}", fmt_msg(.message))]
    Syntax { message: Option<String> },

    /// The message did not begin with the expected protocol prefix
    /// (`\xFFSMB` or `\xFESMB`).
    #[error("SMB protocol mismatch{}", fmt_msg(.message))]
    ProtocolMismatch { message: Option<String> },

    /// A numeric status code has no registered [`crate::status`] entry.
    #[error("status code {0:#010x} is not registered")]
    UnknownStatus(u32),
}

impl SmbError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: Some(message.into()),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic {
            message: Some(message.into()),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: Some(message.into()),
        }
    }

    pub fn protocol_mismatch(message: impl Into<String>) -> Self {
        Self::ProtocolMismatch {
            message: Some(message.into()),
        }
    }
}

fn fmt_msg(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

pub type NbtResult<T> = Result<T, NbtError>;
pub type SmbResult<T> = Result<T, SmbError>;
