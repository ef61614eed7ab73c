#![warn(missing_docs, unused_imports)]

//! Utilities for the bfv.rs library.

use num_bigint_dig::{prime::probably_prime, BigUint};
use rand::{distributions::Distribution, Rng};
use std::panic::UnwindSafe;

/// Define catch_unwind to silence the panic in unit tests.
pub fn catch_unwind<F, R>(f: F) -> std::thread::Result<R>
where
    F: FnOnce() -> R + UnwindSafe,
{
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let r = std::panic::catch_unwind(f);
    std::panic::set_hook(prev_hook);
    r
}

/// Returns whether the modulus p is prime; this function is 100% accurate.
pub fn is_prime(p: u64) -> bool {
    probably_prime(&BigUint::from(p), 0)
}

/// Normal distribution of given standard deviation, clipped at a maximum
/// deviation. Samples outside `[-max_deviation, max_deviation]` are rejected
/// and redrawn. A zero standard deviation or maximum deviation degenerates
/// to the constant zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedNormal {
    standard_deviation: f64,
    max_deviation: f64,
}

impl ClippedNormal {
    /// Create a clipped normal distribution.
    ///
    /// Returns `None` if either parameter is negative or not finite.
    pub fn new(standard_deviation: f64, max_deviation: f64) -> Option<Self> {
        if !standard_deviation.is_finite()
            || !max_deviation.is_finite()
            || standard_deviation < 0.0
            || max_deviation < 0.0
        {
            None
        } else {
            Some(Self {
                standard_deviation,
                max_deviation,
            })
        }
    }
}

impl Distribution<i64> for ClippedNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        if self.standard_deviation == 0.0 || self.max_deviation == 0.0 {
            return 0;
        }
        loop {
            // Box-Muller transform over two uniform draws in (0, 1].
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen::<f64>();
            let r = (-2.0 * u1.ln()).sqrt();
            let value = r * (2.0 * std::f64::consts::PI * u2).cos() * self.standard_deviation;
            if value.abs() <= self.max_deviation {
                return value.round() as i64;
            }
        }
    }
}

/// Transpose a bitstring of length `width`; `width` must be at most 32.
pub const fn reverse_bits(x: u32, width: u32) -> u32 {
    debug_assert!(width <= 32);
    if width == 0 {
        0
    } else {
        x.reverse_bits() >> (32 - width)
    }
}

/// Returns the number of significant bits of a nonzero value, and 0 for 0.
pub const fn significant_bits(x: u64) -> u32 {
    64 - x.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::{is_prime, reverse_bits, significant_bits, ClippedNormal};
    use rand::distributions::Distribution;

    #[test]
    fn test_is_prime() {
        assert!(is_prime(2));
        assert!(is_prime(3));
        assert!(is_prime(17));
        assert!(is_prime(1153));
        assert!(is_prime(4611686018326724609));
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(!is_prime(4));
        assert!(!is_prime(1 << 32));
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0, 3), 0);
        assert_eq!(reverse_bits(1, 3), 4);
        assert_eq!(reverse_bits(3, 3), 6);
        assert_eq!(reverse_bits(6, 3), 3);
        for i in 0u32..16 {
            assert_eq!(reverse_bits(reverse_bits(i, 4), 4), i);
        }
    }

    #[test]
    fn test_significant_bits() {
        assert_eq!(significant_bits(0), 0);
        assert_eq!(significant_bits(1), 1);
        assert_eq!(significant_bits(2), 2);
        assert_eq!(significant_bits(u64::MAX), 64);
    }

    #[test]
    fn test_clipped_normal() {
        let mut rng = rand::thread_rng();

        assert!(ClippedNormal::new(-1.0, 1.0).is_none());
        assert!(ClippedNormal::new(1.0, f64::NAN).is_none());

        let zero = ClippedNormal::new(0.0, 10.0).unwrap();
        for _ in 0..100 {
            assert_eq!(zero.sample(&mut rng), 0);
        }

        let dist = ClippedNormal::new(3.2, 19.2).unwrap();
        for _ in 0..1000 {
            let x = dist.sample(&mut rng);
            assert!(x.abs() <= 20);
        }
    }
}
