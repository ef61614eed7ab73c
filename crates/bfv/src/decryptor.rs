//! Decryption and the invariant noise budget.

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::keys::SecretKey;
use crate::plaintext::Plaintext;
use crate::pool::MemoryPool;
use bfv_math::poly;
use std::sync::{Arc, RwLock};
use zeroize::Zeroize;

/// Decrypts ciphertexts of arbitrary size with the secret key: computes
/// `c_0 + sum_j c_j * s^j mod q` through NTT dot products, rescales to the
/// plaintext base through the `{plain, gamma}` conversion, and reports the
/// invariant noise budget.
///
/// The powers of the secret key are extended lazily, on demand, under a
/// reader-writer lock; everything else is immutable and the decryptor is
/// safe to share across threads.
pub struct Decryptor {
    ctx: Arc<Context>,
    // Powers s^1, s^2, ... in NTT form, prime-major within each power.
    secret_key_array: RwLock<Vec<u64>>,
    pool: MemoryPool,
}

impl std::fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decryptor")
            .field("fingerprint", self.ctx.fingerprint())
            .finish_non_exhaustive()
    }
}

impl Drop for Decryptor {
    fn drop(&mut self) {
        if let Ok(mut array) = self.secret_key_array.write() {
            array.zeroize();
        }
    }
}

impl Decryptor {
    /// Create a decryptor for `ctx` holding the given secret key and a
    /// fresh default pool.
    pub fn new(ctx: &Arc<Context>, secret_key: &SecretKey) -> Result<Self> {
        Self::with_pool(ctx, secret_key, MemoryPool::new())
    }

    /// Create a decryptor drawing scratch space from `pool`.
    pub fn with_pool(ctx: &Arc<Context>, secret_key: &SecretKey, pool: MemoryPool) -> Result<Self> {
        if secret_key.fingerprint() != ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        if !pool.is_initialized() {
            return Err(Error::NoPool);
        }
        Ok(Self {
            ctx: ctx.clone(),
            secret_key_array: RwLock::new(secret_key.data().to_vec()),
            pool,
        })
    }

    /// Decrypt `encrypted` and trim the result to its significant length.
    pub fn decrypt(&self, encrypted: &Ciphertext) -> Result<Plaintext> {
        self.decrypt_with_pool(encrypted, &self.pool)
    }

    /// Decrypt `encrypted`, drawing scratch space from `pool`.
    pub fn decrypt_with_pool(&self, encrypted: &Ciphertext, pool: &MemoryPool) -> Result<Plaintext> {
        let ctx = &self.ctx;
        if encrypted.fingerprint() != ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let converter = ctx.base_converter();

        let mut dest_modq = pool.allocate(k * n)?;
        self.dot_product_with_key_powers(encrypted, &mut dest_modq, pool)?;

        // Scale by t * gamma mod q_i.
        for (l, q) in ctx.coeff_modulus().iter().enumerate() {
            poly::multiply_poly_scalar_coeffmod(
                &mut dest_modq[l * n..(l + 1) * n],
                converter.plain_gamma_product_mod_coeff()[l],
                q,
            );
        }

        // Convert to the {plain, gamma} base and multiply by -q^{-1}.
        let mut dest_plain_gamma = pool.allocate(2 * n)?;
        converter.fastbconv_plain_gamma(&dest_modq, &mut dest_plain_gamma);
        for (j, m) in converter.plain_gamma_base().iter().enumerate() {
            poly::multiply_poly_scalar_coeffmod(
                &mut dest_plain_gamma[j * n..(j + 1) * n],
                converter.neg_inv_coeff_products_all_mod_plain_gamma()[j],
                m,
            );
        }

        // Center the gamma residues into (-gamma/2, gamma/2], reduce modulo
        // t, and remove the error.
        let t = converter.plain_gamma_base()[0];
        let gamma = converter.plain_gamma_base()[1];
        let gamma_div_2 = gamma.value() >> 1;
        let mut coeffs = vec![0u64; n];
        for i in 0..n {
            let plain_res = dest_plain_gamma[i];
            let gamma_res = dest_plain_gamma[n + i];
            coeffs[i] = if gamma_res > gamma_div_2 {
                t.add(plain_res, t.reduce(gamma.value() - gamma_res))
            } else {
                t.sub(plain_res, t.reduce(gamma_res))
            };
        }

        // The final rescale by gamma^{-1} mod t, trimmed to significant
        // length.
        let significant = coeffs
            .iter()
            .rposition(|c| *c != 0)
            .map_or(0, |i| i + 1);
        coeffs.truncate(significant);
        poly::multiply_poly_scalar_coeffmod(&mut coeffs, converter.inv_gamma_mod_plain(), &t);

        dest_modq.zeroize();
        dest_plain_gamma.zeroize();
        Ok(Plaintext::from_coeffs(coeffs))
    }

    /// The invariant noise budget of `encrypted`, in bits; zero means the
    /// ciphertext no longer decrypts correctly.
    pub fn invariant_noise_budget(&self, encrypted: &Ciphertext) -> Result<u32> {
        self.invariant_noise_budget_with_pool(encrypted, &self.pool)
    }

    /// The invariant noise budget, drawing scratch space from `pool`.
    pub fn invariant_noise_budget_with_pool(
        &self,
        encrypted: &Ciphertext,
        pool: &MemoryPool,
    ) -> Result<u32> {
        let ctx = &self.ctx;
        if encrypted.fingerprint() != ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let t = ctx.plain_modulus();

        let mut noise_poly = pool.allocate(k * n)?;
        self.dot_product_with_key_powers(encrypted, &mut noise_poly, pool)?;

        // t * (c_0 + sum c_j s^j) mod q, composed into big coefficients.
        for (l, q) in ctx.coeff_modulus().iter().enumerate() {
            poly::multiply_poly_scalar_coeffmod(
                &mut noise_poly[l * n..(l + 1) * n],
                q.reduce(t.value()),
                q,
            );
        }
        let composed = ctx.compose(&noise_poly);

        // Infinity norm over the centered representatives in (-q/2, q/2].
        let total = ctx.total_coeff_modulus();
        let norm = composed
            .iter()
            .map(|v| {
                let negated = total - v;
                if *v < negated {
                    v.clone()
                } else {
                    negated
                }
            })
            .max()
            .unwrap_or_default();

        noise_poly.zeroize();
        let budget = (total.bits() as i64) - (norm.bits() as i64) - 1;
        Ok(budget.max(0) as u32)
    }

    /// Compute `c_0 + sum_{j >= 1} c_j * s^j mod q` into `destination`
    /// (prime-major), extending the secret-key ladder as needed.
    fn dot_product_with_key_powers(
        &self,
        encrypted: &Ciphertext,
        destination: &mut [u64],
        pool: &MemoryPool,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let size = encrypted.size();

        self.extend_secret_key_array(size - 1);
        let key_powers = self
            .secret_key_array
            .read()
            .expect("ladder lock is never poisoned");

        destination.fill(0);
        let mut operand = pool.allocate(n)?;
        for (l, (q, tables)) in ctx
            .coeff_modulus()
            .iter()
            .zip(ctx.coeff_ntt_tables().iter())
            .enumerate()
        {
            let acc = &mut destination[l * n..(l + 1) * n];
            for j in 1..size {
                operand.copy_from_slice(encrypted.residue(j, l));
                tables.forward_lazy(&mut operand);
                let power = &key_powers[((j - 1) * k + l) * n..((j - 1) * k + l + 1) * n];
                for (o, p) in operand.iter_mut().zip(power.iter()) {
                    *o = q.barrett_reduce_128((*o as u128) * (*p as u128));
                }
                poly::add_poly_poly_coeffmod(acc, &operand, q);
            }
            tables.backward(acc);
            poly::add_poly_poly_coeffmod(acc, encrypted.residue(0, l), q);
        }
        operand.zeroize();
        Ok(())
    }

    /// Make sure the ladder holds at least `max_power` powers of the
    /// secret: peek under the read lock, compute the extension locally,
    /// then commit under the write lock unless another writer extended
    /// further in the meantime.
    fn extend_secret_key_array(&self, max_power: usize) {
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let stride = k * n;

        let old_count;
        let mut extended;
        {
            let array = self
                .secret_key_array
                .read()
                .expect("ladder lock is never poisoned");
            old_count = array.len() / stride;
            if old_count >= max_power {
                return;
            }
            extended = array.clone();
        }

        // Powers are NTT transformed, so the next one is a dyadic product
        // with the first.
        extended.reserve((max_power - old_count) * stride);
        for power in old_count..max_power {
            let prev = extended[(power - 1) * stride..power * stride].to_vec();
            let mut next = prev;
            for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                poly::dyadic_product_coeffmod(
                    &mut next[l * n..(l + 1) * n],
                    &extended[..stride][l * n..(l + 1) * n],
                    q,
                );
            }
            extended.extend_from_slice(&next);
            next.zeroize();
        }

        let mut array = self
            .secret_key_array
            .write()
            .expect("ladder lock is never poisoned");
        if array.len() < extended.len() {
            let mut old = std::mem::replace(&mut *array, extended);
            old.zeroize();
        } else {
            extended.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Decryptor;
    use crate::context::Context;
    use crate::encryptor::Encryptor;
    use crate::errors::Error;
    use crate::keys::KeyGenerator;
    use crate::parameters::EncryptionParameters;
    use crate::plaintext::Plaintext;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn context() -> Arc<Context> {
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[17]).unwrap();
        parms.set_plain_modulus(3).unwrap();
        // The toy modulus has no room for noise.
        parms.set_noise_standard_deviation(0.0);
        Arc::new(Context::new(parms).unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key()).unwrap();

        let pt = Plaintext::from_coeffs(vec![1, 2]);
        let ct = encryptor.encrypt(&pt, &mut rng).unwrap();
        let decrypted = decryptor.decrypt(&ct).unwrap();
        assert_eq!(decrypted.coeffs(), &[1, 2]);
    }

    #[test]
    fn test_empty_plaintext_decrypts_to_zero() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key()).unwrap();

        let ct = encryptor.encrypt(&Plaintext::zero(), &mut rng).unwrap();
        let decrypted = decryptor.decrypt(&ct).unwrap();
        assert!(decrypted.is_zero());
        assert_eq!(decrypted.coeff_count(), 0);
    }

    #[test]
    fn test_fingerprint_check() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key()).unwrap();

        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[97]).unwrap();
        parms.set_plain_modulus(3).unwrap();
        let other = Arc::new(Context::new(parms).unwrap());
        let other_keygen = KeyGenerator::new(&other, &mut rng).unwrap();
        let other_encryptor = Encryptor::new(&other, other_keygen.public_key()).unwrap();
        let foreign = other_encryptor
            .encrypt(&Plaintext::from_coeffs(vec![1]), &mut rng)
            .unwrap();

        assert_eq!(decryptor.decrypt(&foreign).err(), Some(Error::WrongParams));
        assert_eq!(
            decryptor.invariant_noise_budget(&foreign).err(),
            Some(Error::WrongParams)
        );
    }

    #[test]
    fn test_concurrent_ladder_growth() {
        use crate::evaluator::Evaluator;

        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[786433]).unwrap();
        parms.set_plain_modulus(3).unwrap();
        parms.set_noise_standard_deviation(0.0);
        let ctx = Arc::new(Context::new(parms).unwrap());

        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key()).unwrap();
        let evaluator = Evaluator::new(&ctx).unwrap();

        // A size-4 ciphertext forces the ladder to grow under contention.
        let ct_m = encryptor
            .encrypt(&Plaintext::from_coeffs(vec![2, 1]), &mut rng)
            .unwrap();
        let ct_one = encryptor
            .encrypt(&Plaintext::from_coeffs(vec![1]), &mut rng)
            .unwrap();
        let mut product = ct_m.clone();
        evaluator.multiply(&mut product, &ct_one).unwrap();
        evaluator.multiply(&mut product, &ct_m).unwrap();
        assert_eq!(product.size(), 4);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let pool = crate::pool::MemoryPool::new();
                    let pt = decryptor.decrypt_with_pool(&product, &pool).unwrap();
                    assert_eq!(pt.coeffs(), &[1, 1, 1]);
                });
            }
        });
    }

    #[test]
    fn test_noise_budget_of_fresh_encryption() {
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[0x3fffffff000001]).unwrap();
        parms.set_plain_modulus(1 << 6).unwrap();
        let ctx = Arc::new(Context::new(parms).unwrap());

        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();
        let decryptor = Decryptor::new(&ctx, keygen.secret_key()).unwrap();

        let ct = encryptor
            .encrypt(&Plaintext::from_coeffs(vec![5, 1]), &mut rng)
            .unwrap();
        let budget = decryptor.invariant_noise_budget(&ct).unwrap();
        assert!(budget > 0);
        assert!(budget < 54);
        assert_eq!(decryptor.decrypt(&ct).unwrap().coeffs(), &[5, 1]);
    }
}
