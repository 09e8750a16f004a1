// src/config.rs

//! Loadable configuration for a [`crate::HllStore`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::core::persistence::backing::DEFAULT_RESIZE_BLOCK_PAGES;

/// Tunables for a single store. Constructed via [`Config::default`] or
/// [`Config::from_file`]; fields have no effect once a store has been
/// opened with them (they are consulted per-call, not cached as file
/// format state).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of OS pages grown per resize block when the backing file
    /// needs to grow. Larger values mean fewer, bigger `set_len` calls at
    /// the cost of more unused tail space between growths.
    pub resize_block_pages: u64,

    /// When `true`, reopening a store with a different `error_rate` than
    /// the one it was created with is accepted (the stored value wins) and
    /// logged at `warn`, instead of failing with `Error::CorruptHeader`.
    pub allow_error_rate_mismatch: bool,

    /// When `true`, `flush` calls `File::sync_all` after flushing the
    /// mapping. When `false`, only the mapping is flushed to the page
    /// cache, which is cheaper but not durable across a power loss.
    pub fsync_on_flush: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resize_block_pages: DEFAULT_RESIZE_BLOCK_PAGES,
            allow_error_rate_mismatch: false,
            fsync_on_flush: true,
        }
    }
}

impl Config {
    /// Loads a `Config` from a TOML file, falling back to [`Default`] for
    /// any field the file omits, then validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file at {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("parsing config file at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would make the store unusable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.resize_block_pages > 0,
            "resize_block_pages must be at least 1, got {}",
            self.resize_block_pages
        );
        Ok(())
    }
}
