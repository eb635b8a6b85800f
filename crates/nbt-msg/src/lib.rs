//! NBT Name/Datagram/Session codecs and the SMB1/SMB2 message headers
//! that ride on top of them.
//!
//! Every codec in this crate is a pure function of its input bytes,
//! with one exception: [`defrag::Defrag`], the NBT Datagram Service's
//! fragment reassembly pool.

pub mod defrag;
pub mod dgram;
pub mod header;
pub mod name;
pub mod session;
pub mod smb1;
pub mod status;

pub use nbt_dtyp::{NbtError, NbtResult, SmbError, SmbResult};
