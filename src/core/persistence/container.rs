// src/core/persistence/container.rs

//! The single-file container: owns the mapping, the header, the key→offset
//! index, and hands out [`HyperLogLog`] handles backed by slices of it.

use crate::config::Config;
use crate::core::errors::Error;
use crate::core::hash::{Hasher160, Sha1Hasher};
use crate::core::persistence::backing::Backing;
use crate::core::persistence::header::{Header, HEADER_SIZE};
use crate::core::storage::hll::{derive_b, HyperLogLog, RhoTable};
use crate::core::storage::register::RegisterView;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A disk-backed collection of named HyperLogLog counters, persisted in a
/// single memory-mapped file.
///
/// Not `Sync`: every operation mutates shared in-memory bookkeeping
/// (`index`, `last_pos`) without its own lock, so callers must not share a
/// `HllStore` across threads without external synchronization. Separate
/// stores over separate files are fully independent.
pub struct HllStore<H: Hasher160 = Sha1Hasher> {
    backing: Arc<RwLock<Backing>>,
    index: HashMap<String, u64>,
    index_offset: u64,
    index_length: u64,
    last_pos: u64,
    error_rate: f32,
    b: u32,
    m: usize,
    rho_table: Arc<RhoTable>,
    hasher: H,
    config: Config,
    path: std::path::PathBuf,
}

impl HllStore<Sha1Hasher> {
    /// Opens (or creates, if the file doesn't exist or is empty) a store at
    /// `path` with the given target `error_rate`.
    pub fn open<P: AsRef<Path>>(path: P, error_rate: f32, config: Config) -> Result<Self, Error> {
        Self::open_with_hasher(path, error_rate, config, Sha1Hasher)
    }
}

impl<H: Hasher160> HllStore<H> {
    pub fn open_with_hasher<P: AsRef<Path>>(
        path: P,
        error_rate: f32,
        config: Config,
        hasher: H,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size == 0 {
            info!(path = %path.display(), "creating new hllstore file");
            Self::initialize(file, path, error_rate, config, hasher)
        } else {
            info!(path = %path.display(), "opening existing hllstore file");
            Self::load(file, file_size, path, error_rate, config, hasher)
        }
    }

    fn initialize(
        file: File,
        path: std::path::PathBuf,
        error_rate: f32,
        config: Config,
        hasher: H,
    ) -> Result<Self, Error> {
        let b = derive_b(error_rate)?;
        let m = 1usize << b;

        let index_bytes = b"{}".to_vec();
        let index_offset = HEADER_SIZE as u64;
        let index_length = index_bytes.len() as u64;
        let last_pos = index_offset + index_length;

        let mut backing = Backing::create(file, last_pos.max(crate::core::persistence::backing::page_size()))?;
        let header = Header {
            index_offset,
            index_length,
            last_pos,
            error_rate,
            m: m as u64,
        };
        backing.as_mut_slice()[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        backing.as_mut_slice()[index_offset as usize..(index_offset + index_length) as usize]
            .copy_from_slice(&index_bytes);
        backing.flush(config.fsync_on_flush)?;

        Ok(Self {
            backing: Arc::new(RwLock::new(backing)),
            index: HashMap::new(),
            index_offset,
            index_length,
            last_pos,
            error_rate,
            b,
            m,
            rho_table: Arc::new(RhoTable::new(b)),
            hasher,
            config,
            path,
        })
    }

    fn load(
        file: File,
        file_size: u64,
        path: std::path::PathBuf,
        error_rate: f32,
        config: Config,
        hasher: H,
    ) -> Result<Self, Error> {
        let backing = Backing::open(file, file_size)?;
        let header = Header::from_bytes(backing.as_slice())?;

        if (header.error_rate - error_rate).abs() > f32::EPSILON {
            if config.allow_error_rate_mismatch {
                warn!(
                    stored = header.error_rate,
                    requested = error_rate,
                    "error_rate mismatch on reopen, using stored value (allow_error_rate_mismatch is set)"
                );
            } else {
                return Err(Error::CorruptHeader(format!(
                    "store was created with error_rate={}, but {} was requested",
                    header.error_rate, error_rate
                )));
            }
        }
        let error_rate = header.error_rate;
        let b = derive_b(error_rate)?;
        if header.m != (1u64 << b) {
            return Err(Error::CorruptHeader(format!(
                "stored m={} does not match error_rate-derived m={}",
                header.m,
                1u64 << b
            )));
        }
        let m = header.m as usize;

        let index_start = header.index_offset as usize;
        let index_end = index_start + header.index_length as usize;
        let index_bytes = &backing.as_slice()[index_start..index_end];
        let index: HashMap<String, u64> = serde_json::from_slice(index_bytes)
            .map_err(|e| Error::CorruptIndex(e.to_string()))?;

        debug!(path = %path.display(), keys = index.len(), "loaded index");

        Ok(Self {
            backing: Arc::new(RwLock::new(backing)),
            index,
            index_offset: header.index_offset,
            index_length: header.index_length,
            last_pos: header.last_pos,
            error_rate,
            b,
            m,
            rho_table: Arc::new(RhoTable::new(b)),
            hasher,
            config,
            path,
        })
    }

    /// Allocates a fresh `m`-byte register region for `key`, growing the
    /// file if necessary, and returns a handle to it. Overwrites any
    /// existing allocation recorded for `key` (the old bytes become dead
    /// space, matching the index-relocation design).
    pub fn create(&mut self, key: &str) -> Result<HyperLogLog<H>, Error> {
        let offset = self.last_pos;
        let needed = offset + self.m as u64;
        {
            let mut backing = self.backing.write();
            backing.ensure_capacity(needed, self.config.resize_block_pages)?;
            backing.as_mut_slice()[offset as usize..needed as usize].fill(0);
        }
        self.last_pos = needed;
        self.index.insert(key.to_string(), offset);

        self.view_at(offset)
    }

    /// Returns a handle to `key`'s estimator, or `None` if the key is unknown.
    pub fn get(&self, key: &str) -> Option<HyperLogLog<H>> {
        let offset = *self.index.get(key)?;
        self.view_at(offset).ok()
    }

    fn view_at(&self, offset: u64) -> Result<HyperLogLog<H>, Error> {
        let view = RegisterView::new(Arc::clone(&self.backing), offset, self.m);
        HyperLogLog::with_view(
            self.error_rate,
            view,
            Arc::clone(&self.rho_table),
            self.hasher.clone(),
        )
    }

    /// Creates `key` on demand, then records `value` in its estimator.
    pub fn add(&mut self, key: &str, value: &[u8]) -> Result<(), Error> {
        let hll = match self.get(key) {
            Some(hll) => hll,
            None => self.create(key)?,
        };
        hll.add(value)
    }

    /// The approximate distinct-element count for `key`, or `0` if unknown.
    pub fn count(&self, key: &str) -> u64 {
        self.get(key).map(|hll| hll.count()).unwrap_or(0)
    }

    /// Known keys, in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Unions `key`'s register array, across `self` (if present) and every
    /// `other` that has `key`, writing the result into `self`.
    pub fn update(&mut self, key: &str, others: &[&HllStore<H>]) -> Result<(), Error> {
        let sources: Vec<HyperLogLog<H>> = others
            .iter()
            .filter_map(|store| store.get(key))
            .collect();
        if sources.is_empty() {
            return Ok(());
        }

        let target = match self.get(key) {
            Some(hll) => hll,
            None => self.create(key)?,
        };
        let refs: Vec<&HyperLogLog<H>> = sources.iter().collect();
        target.merge(&refs)
    }

    /// Unions every key appearing in any of `others` into `self`.
    pub fn merge(&mut self, others: &[&HllStore<H>]) -> Result<(), Error> {
        let mut all_keys: Vec<String> = Vec::new();
        for other in others {
            for key in other.keys() {
                if !all_keys.iter().any(|k| k == key) {
                    all_keys.push(key.to_string());
                }
            }
        }
        for key in all_keys {
            self.update(&key, others)?;
        }
        Ok(())
    }

    /// Serializes the index (relocating it if it has outgrown its current
    /// reservation), writes the header, flushes the mapping, and (per
    /// `Config::fsync_on_flush`) fsyncs the file.
    pub fn flush(&mut self) -> Result<(), Error> {
        let idx_bytes = serde_json::to_vec(&self.index)
            .map_err(|e| Error::CorruptIndex(e.to_string()))?;

        if idx_bytes.len() as u64 > self.index_length {
            let new_offset = self.last_pos;
            let new_length = idx_bytes.len() as u64;
            debug!(
                old_offset = self.index_offset,
                new_offset, new_length, "relocating index"
            );
            let needed = new_offset + new_length;
            self.backing.write().ensure_capacity(needed, self.config.resize_block_pages)?;
            self.index_offset = new_offset;
            self.index_length = new_length;
            self.last_pos = needed;
        }

        let header = Header {
            index_offset: self.index_offset,
            index_length: self.index_length,
            last_pos: self.last_pos,
            error_rate: self.error_rate,
            m: self.m as u64,
        };

        let mut backing = self.backing.write();
        let start = self.index_offset as usize;
        backing.as_mut_slice()[start..start + idx_bytes.len()].copy_from_slice(&idx_bytes);
        backing.as_mut_slice()[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        backing.flush(self.config.fsync_on_flush)?;
        Ok(())
    }

    pub fn error_rate(&self) -> f32 {
        self.error_rate
    }

    pub fn b(&self) -> u32 {
        self.b
    }

    pub fn m(&self) -> usize {
        self.m
    }
}

impl<H: Hasher160> Drop for HllStore<H> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "implicit flush on drop failed");
        }
    }
}
