// src/core/persistence/header.rs

//! The fixed-size on-disk header: magic, index location, and HLL parameters.
//!
//! Field widths and byte order are pinned (little-endian, fixed `u64`/`f32`)
//! rather than left at the host's native widths, which closes the 32-bit
//! portability bug the source implementation carried.

use crate::core::errors::Error;

/// Identifies this file as an `hllstore` file and pins the format version.
/// A hasher substitution or header layout change must bump this.
pub(crate) const MAGIC: &[u8; 8] = b"HLLSTOR1";

pub(crate) const HEADER_SIZE: usize = 44; // 8 + 8 + 8 + 8 + 4 + 8

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Header {
    pub index_offset: u64,
    pub index_length: u64,
    pub last_pos: u64,
    pub error_rate: f32,
    pub m: u64,
}

impl Header {
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.index_length.to_le_bytes());
        buf[24..32].copy_from_slice(&self.last_pos.to_le_bytes());
        buf[32..36].copy_from_slice(&self.error_rate.to_le_bytes());
        buf[36..44].copy_from_slice(&self.m.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::CorruptHeader(format!(
                "header region is {} bytes, expected at least {HEADER_SIZE}",
                bytes.len()
            )));
        }
        if &bytes[0..8] != MAGIC {
            return Err(Error::CorruptHeader(
                "bad magic: not an hllstore file, or unsupported format version".to_string(),
            ));
        }
        let index_offset = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let index_length = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let last_pos = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let error_rate = f32::from_le_bytes(bytes[32..36].try_into().unwrap());
        let m = u64::from_le_bytes(bytes[36..44].try_into().unwrap());

        if index_offset.checked_add(index_length).is_none_or(|end| end > last_pos) {
            return Err(Error::CorruptHeader(format!(
                "index region [{index_offset}, {index_offset}+{index_length}) does not fit before last_pos={last_pos}"
            )));
        }
        if !m.is_power_of_two() || !(16..=65536).contains(&m) {
            return Err(Error::CorruptHeader(format!(
                "m={m} is not a power of two in [16, 65536]"
            )));
        }

        Ok(Self {
            index_offset,
            index_length,
            last_pos,
            error_rate,
            m,
        })
    }
}
