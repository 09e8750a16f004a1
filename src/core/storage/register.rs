// src/core/storage/register.rs

//! A fixed-length, fixed-offset window into the container's mapped bytes.

use crate::core::errors::Error;
use crate::core::persistence::backing::Backing;
use parking_lot::RwLock;
use std::sync::Arc;

/// A descriptor `(mapping, offset, length)` addressing a contiguous slice of
/// the backing file's mapping.
///
/// Cloning a `RegisterView` is cheap (an `Arc` clone) and yields a second
/// handle onto the *same* bytes: writes through one become visible through
/// the other, since both resolve through the same shared [`Backing`] on
/// every access rather than caching a raw pointer.
#[derive(Clone)]
pub struct RegisterView {
    backing: Arc<RwLock<Backing>>,
    offset: u64,
    length: usize,
}

impl RegisterView {
    pub(crate) fn new(backing: Arc<RwLock<Backing>>, offset: u64, length: usize) -> Self {
        Self {
            backing,
            offset,
            length,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Reads the byte at position `i`. Panics if `i >= len()` — the caller
    /// (the HLL estimator) always indexes within `[0, m)`, so an
    /// out-of-bounds index here is a programming error, not user input.
    pub fn get(&self, i: usize) -> u8 {
        assert!(i < self.length, "register index {i} out of bounds ({})", self.length);
        let guard = self.backing.read();
        guard.as_slice()[self.offset as usize + i]
    }

    /// Writes the byte at position `i`. Panics if `i >= len()`.
    pub fn set(&self, i: usize, value: u8) {
        assert!(i < self.length, "register index {i} out of bounds ({})", self.length);
        let mut guard = self.backing.write();
        guard.as_mut_slice()[self.offset as usize + i] = value;
    }

    /// Returns a copy of all `length` bytes.
    pub fn read_all(&self) -> Vec<u8> {
        let guard = self.backing.read();
        let start = self.offset as usize;
        guard.as_slice()[start..start + self.length].to_vec()
    }

    /// Overwrites all `length` bytes. Fails if `bytes.len() != self.len()`.
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() != self.length {
            return Err(Error::MismatchedBacking {
                expected: self.length,
                actual: bytes.len(),
            });
        }
        let mut guard = self.backing.write();
        let start = self.offset as usize;
        guard.as_mut_slice()[start..start + self.length].copy_from_slice(bytes);
        Ok(())
    }

    /// Counts how many positions currently hold `byte_value`.
    pub fn count(&self, byte_value: u8) -> usize {
        let guard = self.backing.read();
        let start = self.offset as usize;
        guard.as_slice()[start..start + self.length]
            .iter()
            .filter(|&&b| b == byte_value)
            .count()
    }
}

impl PartialEq for RegisterView {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.read_all() == other.read_all()
    }
}

impl std::fmt::Debug for RegisterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterView")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}
