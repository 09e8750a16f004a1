// src/lib.rs

//! A disk-backed collection of HyperLogLog cardinality counters, persisted
//! in a single memory-mapped file.
//!
//! ```no_run
//! use hllstore::{Config, HllStore};
//!
//! # fn main() -> Result<(), hllstore::Error> {
//! let mut store = HllStore::open("visitors.hll", 0.01, Config::default())?;
//! store.add("2026-07-29", b"user-123")?;
//! store.add("2026-07-29", b"user-456")?;
//! assert_eq!(store.count("2026-07-29"), 2);
//! store.flush()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;

pub use config::Config;
pub use core::errors::Error;
pub use core::hash::{Hasher160, Sha1Hasher};
pub use core::persistence::container::HllStore;
pub use core::storage::hll::{HyperLogLog, RhoTable};
pub use core::storage::register::RegisterView;
