//! Encryption of plaintexts under the public key.

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::keys::PublicKey;
use crate::plaintext::Plaintext;
use crate::pool::MemoryPool;
use crate::sampling::{sample_noise_poly, sample_ternary_poly};
use bfv_math::poly;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroize;

/// Encrypts plaintexts into fresh size-2 ciphertexts using the public key
/// and discrete noise: `c_0 = pk_0*u + e_0 + Delta*plain`,
/// `c_1 = pk_1*u + e_1` with `u` ternary and `Delta = floor(q/t)`.
///
/// Logically stateless; carries a default memory pool, and callers that
/// encrypt concurrently pass a thread-local pool per call.
#[derive(Debug)]
pub struct Encryptor {
    ctx: Arc<Context>,
    public_key: PublicKey,
    pool: MemoryPool,
}

impl Encryptor {
    /// Create an encryptor for `ctx` with the given public key and a fresh
    /// default pool.
    pub fn new(ctx: &Arc<Context>, public_key: &PublicKey) -> Result<Self> {
        Self::with_pool(ctx, public_key, MemoryPool::new())
    }

    /// Create an encryptor drawing scratch space from `pool`.
    pub fn with_pool(ctx: &Arc<Context>, public_key: &PublicKey, pool: MemoryPool) -> Result<Self> {
        if public_key.fingerprint() != ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        if !pool.is_initialized() {
            return Err(Error::NoPool);
        }
        Ok(Self {
            ctx: ctx.clone(),
            public_key: public_key.clone(),
            pool,
        })
    }

    /// Encrypt `plain` into a fresh size-2 ciphertext.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plain: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        self.encrypt_with_pool(plain, rng, &self.pool)
    }

    /// Encrypt `plain`, drawing scratch space from `pool`.
    pub fn encrypt_with_pool<R: RngCore + CryptoRng>(
        &self,
        plain: &Plaintext,
        rng: &mut R,
        pool: &MemoryPool,
    ) -> Result<Ciphertext> {
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        if plain.significant_coeff_count() > n {
            return Err(Error::SizeMismatch("plaintext has too many coefficients"));
        }
        debug_assert!(plain
            .coeffs()
            .iter()
            .all(|c| *c < ctx.plain_modulus().value()));
        let mut u_buffer = pool.allocate(ctx.coeff_mod_count() * n)?;

        let mut destination = Ciphertext::new(ctx, 2);

        // u uniform ternary; both pk products use the same NTT of u.
        let mut u = sample_ternary_poly(ctx, rng);
        u_buffer.copy_from_slice(&u);
        u.zeroize();
        for (l, (q, tables)) in ctx
            .coeff_modulus()
            .iter()
            .zip(ctx.coeff_ntt_tables().iter())
            .enumerate()
        {
            let u_ntt = &mut u_buffer[l * n..(l + 1) * n];
            tables.forward_lazy(u_ntt);

            for component in 0..2 {
                let pk = self.public_key.data().residue(component, l).to_vec();
                let c = destination.residue_mut(component, l);
                for (c_m, (u_m, pk_m)) in c.iter_mut().zip(u_ntt.iter().zip(pk.iter())) {
                    *c_m = q.barrett_reduce_128((*u_m as u128) * (*pk_m as u128));
                }
                tables.backward(c);
            }
        }

        // The noise terms e_0, e_1.
        for component in 0..2 {
            let mut e = sample_noise_poly(ctx, rng);
            for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                poly::add_poly_poly_coeffmod(
                    destination.residue_mut(component, l),
                    &e[l * n..(l + 1) * n],
                    q,
                );
            }
            e.zeroize();
        }

        // Delta * plain into c_0.
        self.preencrypt(plain, &mut destination);

        u_buffer.zeroize();
        Ok(destination)
    }

    /// Scale the plaintext by `Delta = floor(q/t)` and add it into the
    /// first component, repositioning coefficients in the upper half of the
    /// plaintext range by the precomputed increment.
    fn preencrypt(&self, plain: &Plaintext, destination: &mut Ciphertext) {
        let ctx = &self.ctx;
        let threshold = ctx.plain_upper_half_threshold();

        for i in 0..plain.significant_coeff_count() {
            let coeff = plain.coeff(i);
            for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                let scaled = if coeff >= threshold {
                    q.barrett_reduce_128(
                        (ctx.coeff_div_plain_modulus()[l] as u128) * (coeff as u128)
                            + (ctx.upper_half_increment()[l] as u128),
                    )
                } else {
                    q.barrett_reduce_128(
                        (ctx.coeff_div_plain_modulus()[l] as u128) * (coeff as u128),
                    )
                };
                let c = destination.residue_mut(0, l);
                c[i] = q.add(c[i], scaled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Encryptor;
    use crate::context::Context;
    use crate::errors::Error;
    use crate::keys::KeyGenerator;
    use crate::parameters::EncryptionParameters;
    use crate::plaintext::Plaintext;
    use crate::pool::MemoryPool;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn context() -> Arc<Context> {
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[17]).unwrap();
        parms.set_plain_modulus(3).unwrap();
        Arc::new(Context::new(parms).unwrap())
    }

    #[test]
    fn test_encrypt_shape() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();

        let pt = Plaintext::from_coeffs(vec![1, 2]);
        let ct = encryptor.encrypt(&pt, &mut rng).unwrap();
        assert_eq!(ct.size(), 2);
        assert_eq!(ct.fingerprint(), ctx.fingerprint());
        assert!(ct.data().iter().all(|c| *c < 17));
    }

    #[test]
    fn test_rejects_oversized_plaintext() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();

        let pt = Plaintext::from_coeffs(vec![1; 9]);
        assert!(matches!(
            encryptor.encrypt(&pt, &mut rng),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn test_rejects_uninitialized_pool() {
        let ctx = context();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let keygen = KeyGenerator::new(&ctx, &mut rng).unwrap();
        assert_eq!(
            Encryptor::with_pool(&ctx, keygen.public_key(), MemoryPool::uninitialized()).err(),
            Some(Error::NoPool)
        );

        let encryptor = Encryptor::new(&ctx, keygen.public_key()).unwrap();
        let pt = Plaintext::from_coeffs(vec![1]);
        assert_eq!(
            encryptor
                .encrypt_with_pool(&pt, &mut rng, &MemoryPool::uninitialized())
                .err(),
            Some(Error::NoPool)
        );
    }

    #[test]
    fn test_rejects_foreign_public_key() {
        let ctx = context();
        let mut parms = EncryptionParameters::new();
        parms.set_poly_modulus_degree(8);
        parms.set_coeff_modulus(&[97]).unwrap();
        parms.set_plain_modulus(3).unwrap();
        let other = Arc::new(Context::new(parms).unwrap());

        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let keygen = KeyGenerator::new(&other, &mut rng).unwrap();
        assert_eq!(
            Encryptor::new(&ctx, keygen.public_key()).err(),
            Some(Error::WrongParams)
        );
    }
}
