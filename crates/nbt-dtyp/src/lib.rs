//! Common data types shared by the NBT and SMB wire codecs: the coded error
//! taxonomy and hex utilities.

pub mod error;
pub mod hex;

pub use error::{NbtError, NbtResult, SmbError, SmbResult};
pub use nbt_dtyp_derive::mbitfield;
