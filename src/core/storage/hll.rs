// src/core/storage/hll.rs

//! A HyperLogLog estimator backed by a [`RegisterView`] instead of an
//! in-process array, so that `add`/`merge` write directly through to the
//! container's memory-mapped file.

use crate::core::errors::Error;
use crate::core::hash::{Hasher160, Sha1Hasher};
use crate::core::storage::register::RegisterView;
use std::sync::Arc;

/// Total width, in bits, of the digest this estimator is built around.
const HASH_BITS: u32 = 160;

/// A precomputed threshold derived from `b` (the register-index width), so
/// that `add` doesn't recompute `HASH_BITS - b` on every call. Cheap enough
/// that constructing a fresh one per [`HyperLogLog`] is also fine; sharing
/// one `Arc<RhoTable>` across many estimators (as `HllStore` does) just
/// avoids the redundant allocation-free arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct RhoTable {
    tail_width: u32,
}

impl RhoTable {
    pub fn new(b: u32) -> Self {
        Self {
            tail_width: HASH_BITS - b,
        }
    }

    /// Computes rho: `1 + leading_zeros(w)`, where `w` is the digest with
    /// its low `b` bits shifted out. The leading-zero count of the
    /// untouched digest already equals the leading-zero count of `w` unless
    /// every bit within the tail is zero, in which case it saturates at
    /// `tail_width` (giving the maximal rho).
    pub(crate) fn rho(&self, digest: &[u8; 20]) -> Result<u8, Error> {
        let lz = leading_zeros_160(digest).min(self.tail_width);
        let rho = lz + 1;
        if rho > self.tail_width + 1 {
            // Structurally unreachable given the `min` above; kept so the
            // spec's documented failure mode has a concrete home.
            return Err(Error::Overflow);
        }
        Ok(rho as u8)
    }
}

fn leading_zeros_160(digest: &[u8; 20]) -> u32 {
    let mut count = 0u32;
    for &byte in digest {
        if byte == 0 {
            count += 8;
            continue;
        }
        return count + byte.leading_zeros();
    }
    count
}

/// Extracts the low `b` bits of the 160-bit big-endian digest as a register
/// index. `b <= 16`, so these bits always live entirely within the last two
/// bytes.
fn register_index(digest: &[u8; 20], b: u32) -> usize {
    let last_two = u16::from_be_bytes([digest[18], digest[19]]);
    let mask: u16 = ((1u32 << b) - 1) as u16;
    (last_two & mask) as usize
}

/// `b = ceil(log2((1.04 / error_rate)^2))`; also validates the `[4, 16]`
/// invariant all constructors share.
pub(crate) fn derive_b(error_rate: f32) -> Result<u32, Error> {
    if !(error_rate > 0.0 && error_rate < 1.0) {
        return Err(Error::InvalidParameter { error_rate, b: -1 });
    }
    let m = (1.04_f64 / error_rate as f64).powi(2);
    let b = m.log2().ceil() as i64;
    if !(4..=16).contains(&b) {
        return Err(Error::InvalidParameter { error_rate, b });
    }
    Ok(b as u32)
}

pub(crate) fn alpha_for_m(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

/// A HyperLogLog cardinality estimator whose registers live in a
/// [`RegisterView`] rather than an owned array.
///
/// Generic over the hash function so a caller can substitute a different
/// 160-bit-producing hasher; [`Sha1Hasher`] is the pinned on-disk default.
#[derive(Clone)]
pub struct HyperLogLog<H: Hasher160 = Sha1Hasher> {
    view: RegisterView,
    b: u32,
    m: usize,
    alpha: f64,
    rho_table: Arc<RhoTable>,
    hasher: H,
}

impl<H: Hasher160> HyperLogLog<H> {
    /// Builds an estimator over an existing register view.
    ///
    /// Fails with [`Error::InvalidParameter`] if `error_rate` is out of
    /// `(0,1)` or the derived `b` is outside `[4,16]`, and with
    /// [`Error::MismatchedBacking`] if `view.len()` isn't exactly `m`.
    pub fn with_view(
        error_rate: f32,
        view: RegisterView,
        rho_table: Arc<RhoTable>,
        hasher: H,
    ) -> Result<Self, Error> {
        let b = derive_b(error_rate)?;
        let m = 1usize << b;
        if view.len() != m {
            return Err(Error::MismatchedBacking {
                expected: m,
                actual: view.len(),
            });
        }
        Ok(Self {
            view,
            b,
            m,
            alpha: alpha_for_m(m),
            rho_table,
            hasher,
        })
    }

    pub fn b(&self) -> u32 {
        self.b
    }

    pub fn m(&self) -> usize {
        self.m
    }

    /// Hashes `value`, derives `(j, rho)`, and sets `register[j]` to
    /// `max(register[j], rho)`.
    pub fn add(&self, value: &[u8]) -> Result<(), Error> {
        let digest = self.hasher.digest(value);
        let j = register_index(&digest, self.b);
        let rho = self.rho_table.rho(&digest)?;
        if rho > self.view.get(j) {
            self.view.set(j, rho);
        }
        Ok(())
    }

    /// Unions `others`' registers into `self`'s, element-wise maximum.
    /// Fails with [`Error::PrecisionMismatch`] if any other has a different `m`.
    pub fn merge(&self, others: &[&HyperLogLog<H>]) -> Result<(), Error> {
        for other in others {
            if other.m != self.m {
                return Err(Error::PrecisionMismatch {
                    expected: self.m,
                    actual: other.m,
                });
            }
        }
        let mut merged = self.view.read_all();
        for other in others {
            let other_regs = other.view.read_all();
            for (a, b) in merged.iter_mut().zip(other_regs.iter()) {
                *a = (*a).max(*b);
            }
        }
        self.view.write_all(&merged)
    }

    /// The bias-corrected cardinality estimate. Never fails.
    pub fn estimate(&self) -> f64 {
        let registers = self.view.read_all();
        let m = self.m as f64;

        let mut z = 0.0f64;
        for &r in &registers {
            z += 2f64.powi(-(r as i32));
        }
        let e = self.alpha * m * m / z;

        if e <= 2.5 * m {
            let v = registers.iter().filter(|&&r| r == 0).count();
            if v > 0 {
                return m * (m / v as f64).ln();
            }
            return e;
        }

        let two_pow_160 = 2f64.powi(HASH_BITS as i32);
        if e <= two_pow_160 / 30.0 {
            return e;
        }
        -two_pow_160 * (1.0 - e / two_pow_160).ln()
    }

    /// `estimate().round()` as an integer cardinality. Never fails.
    pub fn count(&self) -> u64 {
        self.estimate().round() as u64
    }

    pub(crate) fn view(&self) -> &RegisterView {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::backing::{page_size, Backing};
    use parking_lot::RwLock;
    use rand::Rng;

    fn make_view(m: usize) -> RegisterView {
        let file = tempfile::tempfile().unwrap();
        let backing = Backing::create(file, page_size().max(m as u64)).unwrap();
        RegisterView::new(Arc::new(RwLock::new(backing)), 0, m)
    }

    fn make_hll(error_rate: f32) -> HyperLogLog {
        let b = derive_b(error_rate).unwrap();
        let m = 1usize << b;
        let view = make_view(m);
        HyperLogLog::with_view(error_rate, view, Arc::new(RhoTable::new(b)), Sha1Hasher).unwrap()
    }

    #[test]
    fn construction_validates_b_range() {
        // error_rate too large => b below 4
        let err = HyperLogLog::with_view(
            0.9,
            make_view(16),
            Arc::new(RhoTable::new(4)),
            Sha1Hasher,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));

        // error_rate too small => b above 16
        let err = HyperLogLog::with_view(
            0.00001,
            make_view(16),
            Arc::new(RhoTable::new(4)),
            Sha1Hasher,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn construction_validates_view_length() {
        let err = HyperLogLog::with_view(0.01, make_view(4), Arc::new(RhoTable::new(14)), Sha1Hasher)
            .unwrap_err();
        assert!(matches!(err, Error::MismatchedBacking { .. }));
    }

    #[test]
    fn empty_estimate_is_zero() {
        let hll = make_hll(0.01);
        assert_eq!(hll.count(), 0);
    }

    #[test]
    fn add_is_idempotent() {
        let hll = make_hll(0.01);
        hll.add(b"the-same-value").unwrap();
        let registers_once = hll.view().read_all();
        hll.add(b"the-same-value").unwrap();
        let registers_twice = hll.view().read_all();
        assert_eq!(registers_once, registers_twice);
    }

    #[test]
    fn small_cardinalities_are_near_exact() {
        let hll = make_hll(0.01);
        for v in ["a", "b", "c"] {
            hll.add(v.as_bytes()).unwrap();
        }
        assert_eq!(hll.count(), 3);
    }

    #[test]
    fn estimate_within_error_rate_for_large_sets() {
        let error_rate = 0.01;
        let hll = make_hll(error_rate);
        let n = 20_000usize;
        let mut rng = rand::thread_rng();
        for _ in 0..n {
            let bytes: [u8; 20] = rng.r#gen();
            hll.add(&bytes).unwrap();
        }
        let estimate = hll.count() as f64;
        let tolerance = n as f64 * error_rate * 3.0; // generous bound for one trial
        assert!(
            (estimate - n as f64).abs() <= tolerance,
            "estimate {estimate} too far from {n}"
        );
    }

    #[test]
    fn merge_is_commutative() {
        let a = make_hll(0.01);
        let b = make_hll(0.01);
        a.add(b"x").unwrap();
        b.add(b"y").unwrap();

        let ab = make_hll(0.01);
        ab.view().write_all(&a.view().read_all()).unwrap();
        ab.merge(&[&b]).unwrap();

        let ba = make_hll(0.01);
        ba.view().write_all(&b.view().read_all()).unwrap();
        ba.merge(&[&a]).unwrap();

        assert_eq!(ab.view().read_all(), ba.view().read_all());
    }

    #[test]
    fn merge_rejects_mismatched_m() {
        let a = make_hll(0.01); // b=14
        let b = make_hll(0.1); // b=7
        assert!(matches!(
            a.merge(&[&b]),
            Err(Error::PrecisionMismatch { .. })
        ));
    }

    #[test]
    fn merge_of_disjoint_sets_approximates_union() {
        let a = make_hll(0.01);
        let b = make_hll(0.01);
        let c = make_hll(0.01);
        let mut rng = rand::thread_rng();
        for hll in [&a, &b, &c] {
            for _ in 0..1000 {
                let bytes: [u8; 20] = rng.r#gen();
                hll.add(&bytes).unwrap();
            }
        }
        a.merge(&[&b, &c]).unwrap();
        let estimate = a.count() as f64;
        assert!(
            (estimate - 3000.0).abs() <= 3000.0 * 0.05,
            "merged estimate {estimate} too far from 3000"
        );
    }
}
