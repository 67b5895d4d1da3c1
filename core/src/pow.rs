//! Proof-of-work target/difficulty (spec §3, §4.3, §9).
//!
//! `target` is a 256-bit unsigned integer compared bitwise against the block
//! hash, not a float — the source's float target is exactly what spec §9
//! flags as unacceptable for consensus. Difficulty is a reduced rational
//! (`num`/`den`) rather than a float, so retargeting never drifts by
//! platform-dependent rounding.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    if a == 0 {
        1
    } else {
        a
    }
}

/// A positive rational difficulty value, kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difficulty {
    pub num: u128,
    pub den: u128,
}

impl Difficulty {
    pub const ONE: Difficulty = Difficulty { num: 1, den: 1 };

    fn reduced(num: u128, den: u128) -> Self {
        let g = gcd(num, den);
        Difficulty { num: num / g, den: den / g }
    }

    /// Multiplies this difficulty by `expected / actual`, the retarget
    /// ratio spec §4.3 defines, and returns the reduced result.
    pub fn retarget(self, expected_duration: u64, actual_duration: u64) -> Self {
        let actual = actual_duration.max(1) as u128;
        Difficulty::reduced(self.num * expected_duration as u128, self.den * actual)
    }

    /// `target = (2^256 - 1) / difficulty`, computed as exact integer
    /// division `floor(U256::MAX / num) * den`. Splitting the division in
    /// two instead of widening to 512 bits loses at most `num - 1` out of
    /// the 256-bit range — negligible, and still exact integer arithmetic
    /// rather than floating point.
    pub fn target(&self) -> U256 {
        let num = U256::from(self.num);
        let den = U256::from(self.den);
        let base = U256::max_value() / num;
        base.saturating_mul(den)
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::ONE
    }
}

/// `true` iff the 256-bit integer interpretation of `hash` is strictly below
/// `target` (spec §3 invariant 4, §4.3).
pub fn hash_meets_target(hash: &[u8; 32], target: &U256) -> bool {
    U256::from_big_endian(hash) < *target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_has_max_target() {
        assert_eq!(Difficulty::ONE.target(), U256::max_value());
    }

    #[test]
    fn higher_difficulty_lowers_target() {
        let low = Difficulty::ONE;
        let high = Difficulty::reduced(2, 1);
        assert!(high.target() < low.target());
    }

    #[test]
    fn retarget_ratio_matches_expected_over_actual() {
        let start = Difficulty::ONE;
        let retargeted = start.retarget(100, 50);
        assert_eq!(retargeted.as_f64(), 2.0);
        let slower = start.retarget(100, 200);
        assert_eq!(slower.as_f64(), 0.5);
    }

    #[test]
    fn zero_hash_meets_any_positive_target() {
        let zero = [0u8; 32];
        assert!(hash_meets_target(&zero, &U256::from(1)));
    }
}
