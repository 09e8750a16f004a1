// src/core/errors.rs

//! Defines the primary error type for the crate.

use thiserror::Error;

/// The error type returned by every fallible operation in this crate.
///
/// Using `thiserror` keeps the variants self-describing and gives us a
/// `From<std::io::Error>` implementation for free, so filesystem and mmap
/// failures propagate with `?` without any manual wrapping at call sites.
#[derive(Error, Debug)]
pub enum Error {
    /// `error_rate` was outside `(0, 1)`, or the derived `b = ceil(log2((1.04/error_rate)^2))`
    /// fell outside the supported range `[4, 16]`.
    #[error(
        "invalid error_rate {error_rate}: derived b={b} is out of the supported range [4, 16]"
    )]
    InvalidParameter { error_rate: f32, b: i64 },

    /// A register view's length did not match the `m` the estimator was constructed with.
    #[error("register view has length {actual}, expected m={expected}")]
    MismatchedBacking { expected: usize, actual: usize },

    /// `merge` was attempted across estimators with different `m`.
    #[error("cannot merge HyperLogLogs with different m: {expected} vs {actual}")]
    PrecisionMismatch { expected: usize, actual: usize },

    /// The rho computation produced a value wider than the threshold table, which would
    /// indicate the hash width assumption (160 bits) has been violated somewhere upstream.
    #[error("rho computation exceeded the threshold table width")]
    Overflow,

    /// Filesystem, mmap, or fsync failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk header failed validation (bad magic, or offsets that don't fit the file).
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// The index region did not contain valid JSON, or parsed into something unexpected.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
}
