// src/core/persistence/backing.rs

//! Owns the backing file and its writable memory mapping, and grows both in
//! page-aligned blocks without invalidating anything built on top of it.
//!
//! Every [`crate::core::storage::register::RegisterView`] and the container's
//! own header/index access hold a clone of the same `Arc<RwLock<Backing>>`
//! rather than a raw pointer captured at construction time. A resize swaps
//! the `Mmap` payload behind that single lock, so every outstanding view
//! automatically observes the new mapping on its next access — there is no
//! rebind walk to perform.

use crate::core::errors::Error;
use memmap2::MmapMut;
use std::fs::File;
use tracing::debug;

/// The number of pages grown per resize block by default; see
/// [`crate::config::Config::resize_block_pages`].
pub(crate) const DEFAULT_RESIZE_BLOCK_PAGES: u64 = 1000;

pub(crate) struct Backing {
    file: File,
    mmap: MmapMut,
    file_size: u64,
}

impl Backing {
    /// Creates a fresh backing store, extending `file` to `initial_size`
    /// bytes (must be > 0) before mapping it.
    pub fn create(file: File, initial_size: u64) -> Result<Self, Error> {
        file.set_len(initial_size)?;
        file.sync_all()?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            mmap,
            file_size: initial_size,
        })
    }

    /// Maps an already-sized file (an existing store being reopened).
    pub fn open(file: File, file_size: u64) -> Result<Self, Error> {
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            mmap,
            file_size,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    /// Grows the file (and re-maps it) until it is at least `needed` bytes,
    /// rounding up to the next page-aligned block. A no-op if already large
    /// enough.
    pub fn ensure_capacity(&mut self, needed: u64, block_pages: u64) -> Result<(), Error> {
        if self.file_size >= needed {
            return Ok(());
        }
        let block = page_size() * block_pages.max(1);
        let new_size = needed.div_ceil(block) * block;

        debug!(
            old_size = self.file_size,
            new_size, needed, "resizing backing file"
        );

        self.mmap.flush()?;
        self.file.set_len(new_size)?;
        self.file.sync_all()?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.file_size = new_size;
        Ok(())
    }

    /// Flushes the mapping to the page cache, optionally followed by an
    /// `fsync` of the file for full durability.
    pub fn flush(&self, fsync: bool) -> Result<(), Error> {
        self.mmap.flush()?;
        if fsync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

/// Queries the OS page size via `sysconf`, falling back to the common 4 KiB
/// default if the call fails (it practically never does on the platforms
/// this crate targets).
pub(crate) fn page_size() -> u64 {
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ps > 0 { ps as u64 } else { 4096 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn create_maps_requested_size() {
        let file = tempfile().unwrap();
        let backing = Backing::create(file, page_size()).unwrap();
        assert_eq!(backing.file_size(), page_size());
        assert_eq!(backing.as_slice().len(), page_size() as usize);
    }

    #[test]
    fn ensure_capacity_rounds_up_to_block() {
        let file = tempfile().unwrap();
        let mut backing = Backing::create(file, page_size()).unwrap();
        let needed = page_size() * 3 + 17;
        backing.ensure_capacity(needed, 1).unwrap();
        assert!(backing.file_size() >= needed);
        assert_eq!(backing.file_size() % page_size(), 0);
    }

    #[test]
    fn ensure_capacity_is_noop_when_large_enough() {
        let file = tempfile().unwrap();
        let mut backing = Backing::create(file, page_size() * 10).unwrap();
        let size_before = backing.file_size();
        backing.ensure_capacity(page_size(), 1).unwrap();
        assert_eq!(backing.file_size(), size_before);
    }

    #[test]
    fn written_bytes_survive_resize() {
        let file = tempfile().unwrap();
        let mut backing = Backing::create(file, page_size()).unwrap();
        backing.as_mut_slice()[0] = 0xAB;
        backing.ensure_capacity(page_size() * 5, 1).unwrap();
        assert_eq!(backing.as_slice()[0], 0xAB);
    }
}
