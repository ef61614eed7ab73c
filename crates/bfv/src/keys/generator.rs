//! Key generation.

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::keys::{invert_odd_mod_power_of_two, EvaluationKeys, GaloisKeys, PublicKey, SecretKey};
use crate::sampling::{sample_noise_poly, sample_ternary_poly, sample_uniform_poly};
use bfv_math::poly;
use num_traits::cast::ToPrimitive;
use rand::{CryptoRng, RngCore};
use std::collections::HashSet;
use std::sync::Arc;
use zeroize::Zeroize;

/// Generates the secret key, public key, evaluation keys and Galois keys
/// of a parameter set.
pub struct KeyGenerator {
    ctx: Arc<Context>,
    secret_key: SecretKey,
    // Coefficient-form copy of the secret, for Galois-key targets.
    secret_key_coeff: Vec<u64>,
    public_key: PublicKey,
}

impl Drop for KeyGenerator {
    fn drop(&mut self) {
        self.secret_key_coeff.zeroize();
    }
}

impl KeyGenerator {
    /// Sample a fresh key pair under `ctx`.
    pub fn new<R: RngCore + CryptoRng>(ctx: &Arc<Context>, rng: &mut R) -> Result<Self> {
        let n = ctx.poly_modulus_degree();

        let secret_key_coeff = sample_ternary_poly(ctx, rng);
        let mut s = secret_key_coeff.clone();
        for (l, tables) in ctx.coeff_ntt_tables().iter().enumerate() {
            tables.forward(&mut s[l * n..(l + 1) * n]);
        }
        let secret_key = SecretKey {
            fingerprint: *ctx.fingerprint(),
            data: s,
        };

        // pk = (-(a*s + e), a) with a uniform in NTT form.
        let a = sample_uniform_poly(ctx, rng);
        let mut e = sample_noise_poly(ctx, rng);
        let mut pk = Ciphertext::new(ctx, 2);
        for (l, (q, tables)) in ctx
            .coeff_modulus()
            .iter()
            .zip(ctx.coeff_ntt_tables().iter())
            .enumerate()
        {
            tables.forward(&mut e[l * n..(l + 1) * n]);

            let b = pk.residue_mut(0, l);
            b.copy_from_slice(&a[l * n..(l + 1) * n]);
            poly::dyadic_product_coeffmod(b, &secret_key.data()[l * n..(l + 1) * n], q);
            poly::add_poly_poly_coeffmod(b, &e[l * n..(l + 1) * n], q);
            poly::neg_poly_coeffmod(b, q);

            pk.residue_mut(1, l).copy_from_slice(&a[l * n..(l + 1) * n]);
        }
        e.zeroize();

        Ok(Self {
            ctx: ctx.clone(),
            secret_key,
            secret_key_coeff,
            public_key: PublicKey { data: pk },
        })
    }

    /// The generated secret key.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// The generated public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Generate evaluation keys for the powers `s^2, ..., s^{count + 1}`,
    /// enough to relinearize ciphertexts up to size `count + 2`.
    ///
    /// Refuses with [`Error::InvalidParameters`] when relinearization is
    /// not enabled by the parameters.
    pub fn evaluation_keys<R: RngCore + CryptoRng>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<EvaluationKeys> {
        if !self.ctx.qualifiers().enable_relinearization || count == 0 {
            return Err(Error::InvalidParameters);
        }
        let n = self.ctx.poly_modulus_degree();

        // Walk up the powers of the secret in NTT form.
        let mut power = self.secret_key.data().to_vec();
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            for (l, q) in self.ctx.coeff_modulus().iter().enumerate() {
                poly::dyadic_product_coeffmod(
                    &mut power[l * n..(l + 1) * n],
                    &self.secret_key.data()[l * n..(l + 1) * n],
                    q,
                );
            }
            keys.push(self.keyswitch_key(&power, rng)?);
        }
        power.zeroize();

        Ok(EvaluationKeys {
            fingerprint: *self.ctx.fingerprint(),
            decomposition_bit_count: self.ctx.parms().decomposition_bit_count(),
            keys,
        })
    }

    /// Generate Galois keys for the given odd exponents below `2n`.
    ///
    /// Refuses with [`Error::InvalidParameters`] when relinearization (the
    /// key-switching machinery) is not enabled by the parameters.
    pub fn galois_keys<R: RngCore + CryptoRng>(
        &self,
        galois_elts: &[u64],
        rng: &mut R,
    ) -> Result<GaloisKeys> {
        if !self.ctx.qualifiers().enable_relinearization {
            return Err(Error::InvalidParameters);
        }
        let n = self.ctx.poly_modulus_degree();
        let coeff_count_power = self.ctx.coeff_count_power();
        let m = (n as u64) << 1;

        let mut keys = std::collections::HashMap::new();
        for g in galois_elts {
            if g & 1 == 0 || *g >= m {
                return Err(Error::InvalidParameters);
            }
            if keys.contains_key(g) {
                continue;
            }
            // Target: the automorphism applied to the secret, back in NTT
            // form.
            let mut target = Vec::with_capacity(self.secret_key_coeff.len());
            for (l, tables) in self.ctx.coeff_ntt_tables().iter().enumerate() {
                let mut residue = poly::apply_galois(
                    &self.secret_key_coeff[l * n..(l + 1) * n],
                    coeff_count_power,
                    *g,
                    tables.modulus(),
                );
                tables.forward(&mut residue);
                target.extend_from_slice(&residue);
                residue.zeroize();
            }
            let key = self.keyswitch_key(&target, rng)?;
            target.zeroize();
            keys.insert(*g, key);
        }

        Ok(GaloisKeys {
            fingerprint: *self.ctx.fingerprint(),
            decomposition_bit_count: self.ctx.parms().decomposition_bit_count(),
            keys,
        })
    }

    /// Generate Galois keys for the powers of the rotation generator `3`,
    /// of its inverse, and for the column swap `2n - 1`; this set lets the
    /// evaluator reach every rotation by chaining keys.
    pub fn default_galois_keys<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<GaloisKeys> {
        let n = self.ctx.poly_modulus_degree() as u64;
        let m = n << 1;
        let mask = m - 1;
        let gen: u64 = 3;
        let gen_inv = invert_odd_mod_power_of_two(gen, mask);

        let mut elts = HashSet::new();
        elts.insert(m - 1);
        let mut power = gen;
        let mut power_inv = gen_inv;
        for _ in 0..self.ctx.coeff_count_power().saturating_sub(1) {
            elts.insert(power);
            elts.insert(power_inv);
            power = power.wrapping_mul(power) & mask;
            power_inv = power_inv.wrapping_mul(power_inv) & mask;
        }

        let elts = elts.into_iter().collect::<Vec<_>>();
        self.galois_keys(&elts, rng)
    }

    /// Key-switching material for one NTT-form target polynomial: for each
    /// coefficient modulus `q_i`, one ciphertext holding the pairs
    /// `(-(a_j*s + e_j) + garner_i * 2^{jw} * target, a_j)` for the
    /// `ceil(bits(q_i)/w)` decomposition levels.
    fn keyswitch_key<R: RngCore + CryptoRng>(
        &self,
        target: &[u64],
        rng: &mut R,
    ) -> Result<Vec<Ciphertext>> {
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        let w = ctx.parms().decomposition_bit_count();
        let total = ctx.total_coeff_modulus();

        let mut result = Vec::with_capacity(ctx.coeff_mod_count());
        for (i, qi) in ctx.coeff_modulus().iter().enumerate() {
            let levels = qi.bit_count().div_ceil(w) as usize;
            let mut ct = Ciphertext::new(ctx, 2 * levels);

            for j in 0..levels {
                let a = sample_uniform_poly(ctx, rng);
                let mut e = sample_noise_poly(ctx, rng);
                let factor_big = (&ctx.garner()[i] << (j as u32 * w)) % total;

                for (l, (q, tables)) in ctx
                    .coeff_modulus()
                    .iter()
                    .zip(ctx.coeff_ntt_tables().iter())
                    .enumerate()
                {
                    tables.forward(&mut e[l * n..(l + 1) * n]);
                    let factor = (&factor_big % q.value())
                        .to_u64()
                        .expect("residue fits u64");

                    let b = ct.residue_mut(2 * j, l);
                    b.copy_from_slice(&a[l * n..(l + 1) * n]);
                    poly::dyadic_product_coeffmod(
                        b,
                        &self.secret_key.data()[l * n..(l + 1) * n],
                        q,
                    );
                    poly::add_poly_poly_coeffmod(b, &e[l * n..(l + 1) * n], q);
                    poly::neg_poly_coeffmod(b, q);
                    for (b_m, t_m) in b.iter_mut().zip(&target[l * n..(l + 1) * n]) {
                        *b_m = q.add(*b_m, q.mul(factor, *t_m));
                    }

                    ct.residue_mut(2 * j + 1, l)
                        .copy_from_slice(&a[l * n..(l + 1) * n]);
                }
                e.zeroize();
            }
            result.push(ct);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::KeyGenerator;
    use crate::context::Context;
    use crate::errors::Error;
    use crate::parameters::EncryptionParameters;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn context(w: u32) -> Arc<Context> {
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[1153]).unwrap();
        parms.set_plain_modulus(17).unwrap();
        parms.set_decomposition_bit_count(w);
        Arc::new(Context::new(parms).unwrap())
    }

    #[test]
    fn test_keygen() {
        let ctx = context(4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        assert_eq!(keygen.secret_key().fingerprint(), ctx.fingerprint());
        assert_eq!(keygen.public_key().fingerprint(), ctx.fingerprint());
    }

    #[test]
    fn test_evaluation_keys() {
        let ctx = context(4);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let evk = keygen.evaluation_keys(2, &mut rng).unwrap();
        assert_eq!(evk.size(), 2);
        assert_eq!(evk.decomposition_bit_count(), 4);
        // 11-bit modulus, 4-bit windows: three levels, so six polynomials.
        assert_eq!(evk.key(0)[0].size(), 6);

        assert_eq!(
            keygen.evaluation_keys(0, &mut rng).err(),
            Some(Error::InvalidParameters)
        );
    }

    #[test]
    fn test_refuses_without_relinearization() {
        let ctx = context(0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        assert_eq!(
            keygen.evaluation_keys(1, &mut rng).err(),
            Some(Error::InvalidParameters)
        );
        assert_eq!(
            keygen.galois_keys(&[3], &mut rng).err(),
            Some(Error::InvalidParameters)
        );
    }

    #[test]
    fn test_galois_keys() {
        let ctx = context(4);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();

        let keys = keygen.galois_keys(&[3, 15], &mut rng).unwrap();
        assert!(keys.has_key(3));
        assert!(keys.has_key(15));
        assert!(!keys.has_key(5));

        // Exponents must be odd and below 2n.
        assert!(keygen.galois_keys(&[4], &mut rng).is_err());
        assert!(keygen.galois_keys(&[17], &mut rng).is_err());

        let default_keys = keygen.default_galois_keys(&mut rng).unwrap();
        // Column swap plus the generator powers 3, 9 and their inverses.
        assert!(default_keys.has_key(15));
        assert!(default_keys.has_key(3));
        assert!(default_keys.has_key(9));
    }

    #[test]
    fn test_save_load_round_trips() {
        let ctx = context(4);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();

        let mut bytes = Vec::new();
        keygen.secret_key().save(&mut bytes).unwrap();
        let sk = crate::keys::SecretKey::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(&sk, keygen.secret_key());

        let mut bytes = Vec::new();
        keygen.public_key().save(&mut bytes).unwrap();
        let pk = crate::keys::PublicKey::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(&pk, keygen.public_key());

        let evk = keygen.evaluation_keys(1, &mut rng).unwrap();
        let mut bytes = Vec::new();
        evk.save(&mut bytes).unwrap();
        let loaded = crate::keys::EvaluationKeys::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(loaded, evk);

        let gk = keygen.galois_keys(&[3], &mut rng).unwrap();
        let mut bytes = Vec::new();
        gk.save(&mut bytes).unwrap();
        let loaded = crate::keys::GaloisKeys::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(loaded, gk);
    }
}
