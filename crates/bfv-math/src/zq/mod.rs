#![warn(missing_docs, unused_imports)]

//! Modular arithmetic on integers modulo a small (up to 62-bit) modulus,
//! with precomputed Barrett constants.

use crate::errors::{Error, Result};
use num_bigint::BigUint;
use num_traits::cast::ToPrimitive;
use rand::{distributions::Uniform, Rng, RngCore};
use std::io;

/// Structure encapsulating an integer modulus up to 62 bits, together with
/// the Barrett constant `floor(2^128 / q)` stored in two 64-bit limbs plus
/// the remainder `2^128 mod q`.
///
/// The all-zero value represents an unset modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmallModulus {
    value: u64,
    const_ratio: [u64; 3],
    bit_count: u32,
}

impl Default for SmallModulus {
    fn default() -> Self {
        Self::zero()
    }
}

impl SmallModulus {
    /// Create a modulus from an integer in `[2, 2^62)`.
    pub fn new(value: u64) -> Result<Self> {
        if value < 2 || (value >> 62) != 0 {
            return Err(Error::InvalidModulus(value));
        }
        let ratio = ((BigUint::from(1u64) << 128usize) / value)
            .to_u128()
            .ok_or(Error::InvalidModulus(value))?;
        let remainder = {
            let big = (BigUint::from(1u64) << 128usize) % value;
            big.to_u64().ok_or(Error::InvalidModulus(value))?
        };
        Ok(Self {
            value,
            const_ratio: [ratio as u64, (ratio >> 64) as u64, remainder],
            bit_count: bfv_util::significant_bits(value),
        })
    }

    /// The unset modulus.
    pub const fn zero() -> Self {
        Self {
            value: 0,
            const_ratio: [0; 3],
            bit_count: 0,
        }
    }

    /// Returns the value of the modulus.
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Returns whether the modulus is unset.
    pub const fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Returns the significant bit count of the modulus.
    pub const fn bit_count(&self) -> u32 {
        self.bit_count
    }

    /// Returns the Barrett constant `floor(2^128 / q)` in two 64-bit limbs
    /// (low, high), followed by the remainder `2^128 mod q`.
    pub const fn const_ratio(&self) -> &[u64; 3] {
        &self.const_ratio
    }

    /// Modular addition in constant time.
    ///
    /// Aborts if a >= q or b >= q in debug mode.
    pub const fn add(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.value && b < self.value);
        Self::reduce1(a + b, self.value)
    }

    /// Modular subtraction in constant time.
    ///
    /// Aborts if a >= q or b >= q in debug mode.
    pub const fn sub(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.value && b < self.value);
        Self::reduce1(a + self.value - b, self.value)
    }

    /// Modular negation in constant time.
    ///
    /// Aborts if a >= q in debug mode.
    pub const fn neg(&self, a: u64) -> u64 {
        debug_assert!(a < self.value);
        let non_zero = (a != 0) as u64;
        (self.value - a) & non_zero.wrapping_neg()
    }

    /// Modular division by two in constant time: `a * 2^{-1} mod q` for odd
    /// moduli.
    ///
    /// Aborts if a >= q in debug mode.
    pub const fn half(&self, a: u64) -> u64 {
        debug_assert!(a < self.value);
        // q < 2^62, so a + q never overflows 64 bits.
        if a & 1 == 1 {
            (a + self.value) >> 1
        } else {
            a >> 1
        }
    }

    /// Modular multiplication in constant time.
    ///
    /// Aborts if a >= q or b >= q in debug mode.
    pub const fn mul(&self, a: u64, b: u64) -> u64 {
        debug_assert!(a < self.value && b < self.value);
        self.barrett_reduce_128((a as u128) * (b as u128))
    }

    /// Barrett reduction of a 128-bit value, in constant time.
    ///
    /// Computes `z - floor(z * floor(2^128/q) / 2^128) * q` followed by one
    /// conditional subtraction; the result is in `[0, q)`.
    pub const fn barrett_reduce_128(&self, z: u128) -> u64 {
        let z0 = z as u64;
        let z1 = (z >> 64) as u64;
        let cr0 = self.const_ratio[0];
        let cr1 = self.const_ratio[1];

        // Round 1
        let carry = (((z0 as u128) * (cr0 as u128)) >> 64) as u64;
        let tmp = (z0 as u128) * (cr1 as u128) + carry as u128;
        let tmp1 = tmp as u64;
        let tmp3 = (tmp >> 64) as u64;

        // Round 2
        let tmp = (z1 as u128) * (cr0 as u128) + tmp1 as u128;
        let carry = (tmp >> 64) as u64;

        // This is all we care about
        let quotient = z1
            .wrapping_mul(cr1)
            .wrapping_add(tmp3)
            .wrapping_add(carry);

        // Barrett subtraction; the remainder is in [0, 2q)
        let r = z0.wrapping_sub(quotient.wrapping_mul(self.value));
        Self::reduce1(r, self.value)
    }

    /// Modular reduction of a u64 in constant time.
    pub const fn reduce(&self, a: u64) -> u64 {
        self.barrett_reduce_128(a as u128)
    }

    /// Modular exponentiation by square-and-multiply, in variable time with
    /// respect to the exponent.
    ///
    /// Aborts if a >= q in debug mode.
    pub fn exp(&self, a: u64, e: u64) -> u64 {
        debug_assert!(a < self.value);
        if e == 0 {
            return 1 % self.value;
        }
        if e == 1 {
            return a;
        }
        let mut r = a;
        let mut i = (63 - e.leading_zeros()) as isize - 1;
        while i >= 0 {
            r = self.mul(r, r);
            if (e >> i) & 1 == 1 {
                r = self.mul(r, a);
            }
            i -= 1;
        }
        r
    }

    /// Modular inversion by the extended Euclidean algorithm, in variable
    /// time.
    ///
    /// Fails with [`Error::NotCoprime`] when `gcd(a, q) != 1`.
    pub fn inv(&self, a: u64) -> Result<u64> {
        debug_assert!(a < self.value);
        if a == 0 {
            return Err(Error::NotCoprime(a));
        }
        let (mut old_r, mut r) = (a as i128, self.value as i128);
        let (mut old_s, mut s) = (1i128, 0i128);
        while r != 0 {
            let quotient = old_r / r;
            (old_r, r) = (r, old_r - quotient * r);
            (old_s, s) = (s, old_s - quotient * s);
        }
        if old_r != 1 {
            return Err(Error::NotCoprime(a));
        }
        let inverse = old_s.rem_euclid(self.value as i128) as u64;
        debug_assert_eq!(self.mul(a, inverse), 1);
        Ok(inverse)
    }

    /// Returns a uniformly random element of `[0, q)`.
    pub fn random<R: RngCore>(&self, rng: &mut R) -> u64 {
        debug_assert!(!self.is_zero());
        rng.sample(Uniform::from(0..self.value))
    }

    /// Serialize per the wire layout: `bit_count (i32) || uint64_count
    /// (i32) || value (8 bytes) || const_ratio[3] (24 bytes)`, all
    /// little-endian.
    pub fn save<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&(self.bit_count as i32).to_le_bytes())?;
        writer.write_all(&1i32.to_le_bytes())?;
        writer.write_all(&self.value.to_le_bytes())?;
        for limb in &self.const_ratio {
            writer.write_all(&limb.to_le_bytes())?;
        }
        Ok(())
    }

    /// Deserialize a modulus written by [`SmallModulus::save`].
    pub fn load<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf4 = [0u8; 4];
        let mut buf8 = [0u8; 8];
        reader.read_exact(&mut buf4)?;
        let bit_count = i32::from_le_bytes(buf4);
        reader.read_exact(&mut buf4)?;
        let uint64_count = i32::from_le_bytes(buf4);
        reader.read_exact(&mut buf8)?;
        let value = u64::from_le_bytes(buf8);
        let mut const_ratio = [0u64; 3];
        for limb in &mut const_ratio {
            reader.read_exact(&mut buf8)?;
            *limb = u64::from_le_bytes(buf8);
        }
        if uint64_count != 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected uint64 count",
            ));
        }
        if value == 0 {
            return Ok(Self::zero());
        }
        let modulus = Self::new(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        if modulus.bit_count as i32 != bit_count || modulus.const_ratio != const_ratio {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "inconsistent modulus constants",
            ));
        }
        Ok(modulus)
    }

    /// Return x mod q in constant time.
    ///
    /// Aborts if x >= 2q in debug mode.
    const fn reduce1(x: u64, q: u64) -> u64 {
        debug_assert!(q >> 63 == 0);
        debug_assert!(x < 2 * q);

        let (y, _) = x.overflowing_sub(q);
        let mask = ((y >> 63) as i64).wrapping_neg() as u64;
        let r = (mask & x) | (!mask & y);

        debug_assert!(r == x % q);
        r
    }
}

/// Returns whether `root` is a primitive `degree`-th root of unity modulo
/// `q`, i.e. whether `root^(degree/2) = -1 mod q`. `degree` must be a power
/// of two.
pub fn is_primitive_root(root: u64, degree: u64, q: &SmallModulus) -> bool {
    debug_assert!(degree.is_power_of_two());
    if root == 0 {
        return false;
    }
    if degree == 1 {
        return root == 1;
    }
    q.exp(root, degree >> 1) == q.value() - 1
}

/// Try to find a primitive `degree`-th root of unity modulo `q`, where
/// `degree` must be a power of two dividing `q - 1`.
///
/// Samples random candidates `x`, sets `r = x^((q-1)/degree)`, and tests; at
/// most 100 attempts are made before failing with [`Error::NoRoot`].
pub fn try_primitive_root<R: RngCore>(degree: u64, q: &SmallModulus, rng: &mut R) -> Result<u64> {
    debug_assert!(degree.is_power_of_two());
    if (q.value() - 1) % degree != 0 {
        return Err(Error::NoRoot(degree));
    }
    let group_size = (q.value() - 1) / degree;
    for _ in 0..100 {
        let candidate = q.exp(q.random(rng), group_size);
        if is_primitive_root(candidate, degree, q) {
            return Ok(candidate);
        }
    }
    Err(Error::NoRoot(degree))
}

/// Try to find the numerically smallest primitive `degree`-th root of unity
/// modulo `q`.
///
/// Starting from one known root `r`, all `degree` primitive roots are of the
/// form `r^k` for odd `k`; they are enumerated by repeated multiplication
/// with `r^2` while tracking the minimum.
pub fn try_minimal_primitive_root<R: RngCore>(
    degree: u64,
    q: &SmallModulus,
    rng: &mut R,
) -> Result<u64> {
    let root = try_primitive_root(degree, q, rng)?;
    let generator_sq = q.mul(root, root);
    let mut candidate = root;
    let mut minimum = root;
    let mut i = 0;
    while i < degree {
        if candidate < minimum {
            minimum = candidate;
        }
        candidate = q.mul(candidate, generator_sq);
        i += 2;
    }
    Ok(minimum)
}

#[cfg(test)]
mod tests {
    use super::{
        is_primitive_root, try_minimal_primitive_root, try_primitive_root, SmallModulus,
    };
    use crate::errors::Error;
    use bfv_util::catch_unwind;
    use proptest::prelude::{any, BoxedStrategy, Strategy};
    use rand::thread_rng;

    fn valid_moduli() -> BoxedStrategy<SmallModulus> {
        any::<u64>()
            .prop_filter_map("filter invalid moduli", |q| SmallModulus::new(q).ok())
            .boxed()
    }

    proptest::proptest! {
        #[test]
        fn test_constructor(q: u64) {
            proptest::prop_assert!(SmallModulus::new(q | (1u64 << 62)).is_err());
            proptest::prop_assert!(SmallModulus::new(q | (1u64 << 63)).is_err());
            proptest::prop_assert!(SmallModulus::new(0u64).is_err());
            proptest::prop_assert!(SmallModulus::new(1u64).is_err());

            proptest::prop_assume!(q >> 2 >= 2);
            proptest::prop_assert!(
                SmallModulus::new(q >> 2).is_ok_and(|m| m.value() == q >> 2)
            );
        }

        #[test]
        fn test_add_sub_neg(q in valid_moduli(), mut a: u64, mut b: u64) {
            a = q.reduce(a);
            b = q.reduce(b);
            proptest::prop_assert_eq!(q.add(a, b), (a + b) % q.value());
            proptest::prop_assert_eq!(q.sub(a, b), (a + q.value() - b) % q.value());
            proptest::prop_assert_eq!(q.neg(a), (q.value() - a) % q.value());

            let big = (b % (u64::MAX - q.value())) + 1 + q.value();
            proptest::prop_assert!(catch_unwind(|| q.add(big, a)).is_err());
            proptest::prop_assert!(catch_unwind(|| q.sub(a, big)).is_err());
        }

        #[test]
        fn test_mul(q in valid_moduli(), mut a: u64, mut b: u64) {
            a = q.reduce(a);
            b = q.reduce(b);
            proptest::prop_assert_eq!(
                q.mul(a, b) as u128,
                ((a as u128) * (b as u128)) % (q.value() as u128)
            );
        }

        #[test]
        fn test_half(q in valid_moduli(), mut a: u64) {
            proptest::prop_assume!(q.value() & 1 == 1);
            a = q.reduce(a);
            proptest::prop_assert_eq!(q.add(q.half(a), q.half(a)), a);
        }

        #[test]
        fn test_barrett_reduce_128(q in valid_moduli(), z: u128) {
            proptest::prop_assert_eq!(
                q.barrett_reduce_128(z) as u128,
                z % (q.value() as u128)
            );
        }

        #[test]
        fn test_reduce(q in valid_moduli(), a: u64) {
            proptest::prop_assert_eq!(q.reduce(a), a % q.value());
        }
    }

    #[test]
    fn test_barrett_reduce_128_edges() {
        // The largest 62-bit modulus against the largest 128-bit input.
        let q = SmallModulus::new((1u64 << 62) - 1).unwrap();
        assert_eq!(
            q.barrett_reduce_128(u128::MAX) as u128,
            u128::MAX % (q.value() as u128)
        );
        assert_eq!(q.barrett_reduce_128(0), 0);
        assert_eq!(q.barrett_reduce_128(q.value() as u128), 0);

        let q = SmallModulus::new(2).unwrap();
        assert_eq!(q.barrett_reduce_128(u128::MAX), 1);
    }

    #[test]
    fn test_exp() {
        for p in [2u64, 3, 17, 1987, 4611686018326724609] {
            let q = SmallModulus::new(p).unwrap();
            assert_eq!(q.exp(p - 1, 0), 1 % p);
            assert_eq!(q.exp(p - 1, 1), p - 1);
            assert_eq!(q.exp(p - 1, 2), 1 % p);
            assert_eq!(q.exp(1 % p, p - 2), 1 % p);

            let mut rng = thread_rng();
            for _ in 0..10 {
                let a = q.random(&mut rng);
                let e = q.random(&mut rng) % 1000;
                let mut expected = 1 % p;
                for _ in 0..e {
                    expected = q.mul(expected, a);
                }
                assert_eq!(q.exp(a, e), expected);
            }
        }
    }

    #[test]
    fn test_inv() {
        for p in [3u64, 17, 1987, 4611686018326724609] {
            let q = SmallModulus::new(p).unwrap();
            assert_eq!(q.inv(0), Err(Error::NotCoprime(0)));
            assert_eq!(q.inv(1), Ok(1));
            assert_eq!(q.inv(p - 1), Ok(p - 1));

            let mut rng = thread_rng();
            for _ in 0..100 {
                let a = q.random(&mut rng);
                match q.inv(a) {
                    Ok(b) => assert_eq!(q.mul(a, b), 1),
                    Err(_) => assert_eq!(a, 0),
                }
            }
        }

        // A composite modulus has non-invertible nonzero elements.
        let q = SmallModulus::new(15).unwrap();
        assert_eq!(q.inv(2), Ok(8));
        assert!(q.inv(3).is_err());
        assert!(q.inv(5).is_err());
    }

    #[test]
    fn test_is_primitive_root() {
        let q = SmallModulus::new(11).unwrap();
        assert!(is_primitive_root(10, 2, &q));
        assert!(!is_primitive_root(9, 2, &q));
        assert!(!is_primitive_root(10, 4, &q));

        let q = SmallModulus::new(29).unwrap();
        assert!(is_primitive_root(28, 2, &q));
        assert!(is_primitive_root(12, 4, &q));
        assert!(!is_primitive_root(12, 2, &q));
        assert!(!is_primitive_root(12, 8, &q));

        let q = SmallModulus::new(1234565441).unwrap();
        assert!(is_primitive_root(1234565440, 2, &q));
        assert!(is_primitive_root(960907033, 8, &q));
        assert!(is_primitive_root(1180581915, 16, &q));
        assert!(!is_primitive_root(1180581915, 32, &q));
        assert!(!is_primitive_root(1180581915, 8, &q));
        assert!(!is_primitive_root(1180581915, 2, &q));
    }

    #[test]
    fn test_try_primitive_root() {
        let mut rng = thread_rng();

        let q = SmallModulus::new(11).unwrap();
        assert_eq!(try_primitive_root(2, &q, &mut rng), Ok(10));

        let q = SmallModulus::new(29).unwrap();
        assert_eq!(try_primitive_root(2, &q, &mut rng), Ok(28));
        let root = try_primitive_root(4, &q, &mut rng).unwrap();
        assert!([12, 17].contains(&root));
        assert!(try_primitive_root(8, &q, &mut rng).is_err());

        let q = SmallModulus::new(1234565441).unwrap();
        assert_eq!(try_primitive_root(2, &q, &mut rng), Ok(1234565440));
        let root = try_primitive_root(8, &q, &mut rng).unwrap();
        assert!([984839708, 273658408, 249725733, 960907033].contains(&root));
    }

    #[test]
    fn test_try_minimal_primitive_root() {
        let mut rng = thread_rng();

        let q = SmallModulus::new(11).unwrap();
        assert_eq!(try_minimal_primitive_root(2, &q, &mut rng), Ok(10));

        let q = SmallModulus::new(29).unwrap();
        assert_eq!(try_minimal_primitive_root(2, &q, &mut rng), Ok(28));
        assert_eq!(try_minimal_primitive_root(4, &q, &mut rng), Ok(12));

        let q = SmallModulus::new(1234565441).unwrap();
        assert_eq!(try_minimal_primitive_root(2, &q, &mut rng), Ok(1234565440));
        assert_eq!(try_minimal_primitive_root(8, &q, &mut rng), Ok(249725733));
    }

    #[test]
    fn test_save_load() {
        for p in [2u64, 3, 17, 1153, (1u64 << 62) - 1] {
            let q = SmallModulus::new(p).unwrap();
            let mut bytes = Vec::new();
            q.save(&mut bytes).unwrap();
            assert_eq!(bytes.len(), 4 + 4 + 8 + 24);
            let r = SmallModulus::load(&mut bytes.as_slice()).unwrap();
            assert_eq!(q, r);
        }

        let q = SmallModulus::zero();
        let mut bytes = Vec::new();
        q.save(&mut bytes).unwrap();
        assert_eq!(SmallModulus::load(&mut bytes.as_slice()).unwrap(), q);
    }
}
