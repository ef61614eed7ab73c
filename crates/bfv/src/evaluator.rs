//! Homomorphic evaluation: ciphertext arithmetic, relinearization, plain
//! operations, NTT-domain transforms, and Galois automorphisms.

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::errors::{Error, Result};
use crate::keys::{invert_odd_mod_power_of_two, EvaluationKeys, GaloisKeys};
use crate::plaintext::Plaintext;
use crate::pool::MemoryPool;
use bfv_math::poly;
use bfv_math::zq::SmallModulus;
use num_traits::cast::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;

/// Performs arithmetic on ciphertexts: add, sub, negate, multiply (the
/// tensoring and rescale in the `q` and `Bsk` bases), square,
/// relinearization, multiply-many, exponentiation, plain operations,
/// NTT-domain transforms, and Galois-automorphism application.
///
/// Logically stateless; carries a default memory pool, and callers that
/// evaluate concurrently pass a thread-local pool per call.
#[derive(Debug)]
pub struct Evaluator {
    ctx: Arc<Context>,
    pool: MemoryPool,
    // g = (-1)^e * 3^k mod 2n, as g -> (k, e).
    zmstar_to_generator: HashMap<u64, (u64, u64)>,
}

impl Evaluator {
    /// Create an evaluator for `ctx` with a fresh default pool.
    pub fn new(ctx: &Arc<Context>) -> Result<Self> {
        Self::with_pool(ctx, MemoryPool::new())
    }

    /// Create an evaluator drawing scratch space from `pool`.
    pub fn with_pool(ctx: &Arc<Context>, pool: MemoryPool) -> Result<Self> {
        if !pool.is_initialized() {
            return Err(Error::NoPool);
        }

        // Decompose every element of Zm* (m = 2n) over the generator 3 and
        // the column swap -1.
        let n = ctx.poly_modulus_degree() as u64;
        let m = n << 1;
        let mask = m - 1;
        let mut zmstar_to_generator = HashMap::new();
        let mut pos: u64 = 1;
        for i in 0..n / 2 {
            zmstar_to_generator.insert(pos, (i, 0));
            zmstar_to_generator.insert(pos.wrapping_mul(m - 1) & mask, (i, 1));
            pos = pos.wrapping_mul(3) & mask;
        }

        Ok(Self {
            ctx: ctx.clone(),
            pool,
            zmstar_to_generator,
        })
    }

    fn check(&self, encrypted: &Ciphertext) -> Result<()> {
        if encrypted.fingerprint() != self.ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        Ok(())
    }

    /// Negate every component in place.
    pub fn negate(&self, encrypted: &mut Ciphertext) -> Result<()> {
        self.check(encrypted)?;
        for i in 0..encrypted.size() {
            for (l, q) in self.ctx.coeff_modulus().iter().enumerate() {
                poly::neg_poly_coeffmod(encrypted.residue_mut(i, l), q);
            }
        }
        Ok(())
    }

    /// Add `encrypted2` into `encrypted1`. The output size is the larger of
    /// the two; extra high components of the larger input are copied.
    pub fn add(&self, encrypted1: &mut Ciphertext, encrypted2: &Ciphertext) -> Result<()> {
        self.check(encrypted1)?;
        self.check(encrypted2)?;

        let min_count = encrypted1.size().min(encrypted2.size());
        if encrypted1.size() < encrypted2.size() {
            encrypted1.resize(encrypted2.size());
            for i in min_count..encrypted2.size() {
                encrypted1.poly_mut(i).copy_from_slice(encrypted2.poly(i));
            }
        }
        for i in 0..min_count {
            for (l, q) in self.ctx.coeff_modulus().iter().enumerate() {
                poly::add_poly_poly_coeffmod(
                    encrypted1.residue_mut(i, l),
                    encrypted2.residue(i, l),
                    q,
                );
            }
        }
        Ok(())
    }

    /// Add many ciphertexts into one.
    pub fn add_many(&self, encrypteds: &[Ciphertext]) -> Result<Ciphertext> {
        let (first, rest) = encrypteds
            .split_first()
            .ok_or(Error::SizeMismatch("nothing to add"))?;
        self.check(first)?;
        let mut destination = first.clone();
        for ct in rest {
            self.add(&mut destination, ct)?;
        }
        Ok(destination)
    }

    /// Subtract `encrypted2` from `encrypted1`. The output size is the
    /// larger of the two; extra high components of `encrypted2` are
    /// negated.
    pub fn sub(&self, encrypted1: &mut Ciphertext, encrypted2: &Ciphertext) -> Result<()> {
        self.check(encrypted1)?;
        self.check(encrypted2)?;

        let min_count = encrypted1.size().min(encrypted2.size());
        if encrypted1.size() < encrypted2.size() {
            encrypted1.resize(encrypted2.size());
            for i in min_count..encrypted2.size() {
                encrypted1.poly_mut(i).copy_from_slice(encrypted2.poly(i));
                for (l, q) in self.ctx.coeff_modulus().iter().enumerate() {
                    poly::neg_poly_coeffmod(encrypted1.residue_mut(i, l), q);
                }
            }
        }
        for i in 0..min_count {
            for (l, q) in self.ctx.coeff_modulus().iter().enumerate() {
                poly::sub_poly_poly_coeffmod(
                    encrypted1.residue_mut(i, l),
                    encrypted2.residue(i, l),
                    q,
                );
            }
        }
        Ok(())
    }

    /// Multiply `encrypted1` by `encrypted2` in place; sizes `a` and `b`
    /// produce size `a + b - 1`.
    pub fn multiply(&self, encrypted1: &mut Ciphertext, encrypted2: &Ciphertext) -> Result<()> {
        self.multiply_with_pool(encrypted1, encrypted2, &self.pool)
    }

    /// Multiply, drawing scratch space from `pool`.
    pub fn multiply_with_pool(
        &self,
        encrypted1: &mut Ciphertext,
        encrypted2: &Ciphertext,
        pool: &MemoryPool,
    ) -> Result<()> {
        self.check(encrypted1)?;
        self.check(encrypted2)?;

        let size1 = encrypted1.size();
        let size2 = encrypted2.size();
        let ntt1 = self.tensor_operand(encrypted1, pool)?;
        let ntt2 = self.tensor_operand(encrypted2, pool)?;
        self.tensor_and_rescale(encrypted1, &ntt1, size1, &ntt2, size2, pool)
    }

    /// Square `encrypted` in place; uses a two-product schedule for size 2.
    pub fn square(&self, encrypted: &mut Ciphertext) -> Result<()> {
        self.square_with_pool(encrypted, &self.pool)
    }

    /// Square, drawing scratch space from `pool`.
    pub fn square_with_pool(&self, encrypted: &mut Ciphertext, pool: &MemoryPool) -> Result<()> {
        self.check(encrypted)?;

        let size = encrypted.size();
        let ntt = self.tensor_operand(encrypted, pool)?;
        self.tensor_and_rescale(encrypted, &ntt, size, &ntt, size, pool)
    }

    /// Convert every component of `encrypted` into the `q` and `Bsk` NTT
    /// domains: fast conversion with the `m_tilde` factor, Montgomery
    /// reduction into `Bsk`, then lazy forward transforms in both bases.
    fn tensor_operand(&self, encrypted: &Ciphertext, pool: &MemoryPool) -> Result<TensorOperand> {
        let ctx = &self.ctx;
        let conv = ctx.base_converter();
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let bsk = conv.bsk_base_mod_count();
        let size = encrypted.size();

        let mut q_ntt = encrypted.data().to_vec();
        let mut bsk_ntt = vec![0u64; size * bsk * n];
        let mut mtilde = pool.allocate((bsk + 1) * n)?;
        for i in 0..size {
            conv.fastbconv_mtilde(encrypted.poly(i), &mut mtilde);
            conv.mont_rq(&mtilde, &mut bsk_ntt[i * bsk * n..(i + 1) * bsk * n]);
        }
        for i in 0..size {
            for (j, tables) in ctx.coeff_ntt_tables().iter().enumerate() {
                tables.forward_lazy(&mut q_ntt[(i * k + j) * n..(i * k + j + 1) * n]);
            }
            for (j, tables) in conv.bsk_ntt_tables().iter().enumerate() {
                tables.forward_lazy(&mut bsk_ntt[(i * bsk + j) * n..(i * bsk + j + 1) * n]);
            }
        }
        Ok(TensorOperand { q_ntt, bsk_ntt })
    }

    /// The tensor product of two NTT-domain operands in both bases,
    /// followed by the scale by `t`, the fast floor back into `Bsk`, and
    /// the Shenoy-Kumaresan conversion into `q`, written into
    /// `destination`.
    fn tensor_and_rescale(
        &self,
        destination: &mut Ciphertext,
        op1: &TensorOperand,
        size1: usize,
        op2: &TensorOperand,
        size2: usize,
        pool: &MemoryPool,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let conv = ctx.base_converter();
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let bsk = conv.bsk_base_mod_count();
        let dest_count = size1 + size2 - 1;

        let mut des_q = pool.allocate(dest_count * k * n)?;
        let mut des_bsk = pool.allocate(dest_count * bsk * n)?;

        if size1 == 2 && size2 == 2 {
            karatsuba_2x2(ctx.coeff_modulus(), n, &op1.q_ntt, &op2.q_ntt, &mut des_q);
            karatsuba_2x2(conv.bsk_base(), n, &op1.bsk_ntt, &op2.bsk_ntt, &mut des_bsk);
        } else {
            tensor_accumulate(
                ctx.coeff_modulus(),
                n,
                &op1.q_ntt,
                size1,
                &op2.q_ntt,
                size2,
                &mut des_q,
            );
            tensor_accumulate(
                conv.bsk_base(),
                n,
                &op1.bsk_ntt,
                size1,
                &op2.bsk_ntt,
                size2,
                &mut des_bsk,
            );
        }

        // Back to the coefficient domain, then scale by t in both bases.
        let t = ctx.plain_modulus().value();
        for i in 0..dest_count {
            for (j, (q, tables)) in ctx
                .coeff_modulus()
                .iter()
                .zip(ctx.coeff_ntt_tables().iter())
                .enumerate()
            {
                let residue = &mut des_q[(i * k + j) * n..(i * k + j + 1) * n];
                tables.backward(residue);
                poly::multiply_poly_scalar_coeffmod(residue, q.reduce(t), q);
            }
            for (j, (m, tables)) in conv
                .bsk_base()
                .iter()
                .zip(conv.bsk_ntt_tables().iter())
                .enumerate()
            {
                let residue = &mut des_bsk[(i * bsk + j) * n..(i * bsk + j + 1) * n];
                tables.backward(residue);
                poly::multiply_poly_scalar_coeffmod(residue, m.reduce(t), m);
            }
        }

        // Divide by q with the fast floor and convert back into q.
        destination.resize(dest_count);
        let mut floor_in = pool.allocate((k + bsk) * n)?;
        let mut floor_out = pool.allocate(bsk * n)?;
        for i in 0..dest_count {
            floor_in[..k * n].copy_from_slice(&des_q[i * k * n..(i + 1) * k * n]);
            floor_in[k * n..].copy_from_slice(&des_bsk[i * bsk * n..(i + 1) * bsk * n]);
            conv.fast_floor(&floor_in, &mut floor_out);
            conv.fastbconv_sk(&floor_out, destination.poly_mut(i));
        }
        Ok(())
    }

    /// Relinearize `encrypted` down to `destination_size` components by
    /// repeated base-`2^w` decomposition of the top component against the
    /// evaluation keys.
    pub fn relinearize(
        &self,
        encrypted: &mut Ciphertext,
        evaluation_keys: &EvaluationKeys,
        destination_size: usize,
    ) -> Result<()> {
        self.relinearize_with_pool(encrypted, evaluation_keys, destination_size, &self.pool)
    }

    /// Relinearize, drawing scratch space from `pool`.
    pub fn relinearize_with_pool(
        &self,
        encrypted: &mut Ciphertext,
        evaluation_keys: &EvaluationKeys,
        destination_size: usize,
        pool: &MemoryPool,
    ) -> Result<()> {
        self.check(encrypted)?;
        if evaluation_keys.fingerprint() != self.ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        if destination_size < 2 || destination_size > encrypted.size() {
            return Err(Error::SizeMismatch("relinearization target out of range"));
        }
        if evaluation_keys.size() < encrypted.size() - 2 {
            return Err(Error::NeedsKey);
        }

        let mut current = encrypted.size();
        while current > destination_size {
            self.switch_key_inner(
                encrypted,
                current,
                evaluation_keys.key(current - 3),
                evaluation_keys.decomposition_bit_count(),
                pool,
                false,
            )?;
            current -= 1;
        }
        encrypted.resize(destination_size);
        Ok(())
    }

    /// One key-switching pass: decompose the component `source_size - 1` of
    /// `encrypted` base `2^w` per prime, dot it against the per-prime key
    /// pairs, and fold the result into components 0 and 1. With `replace`,
    /// component 1 is replaced instead of accumulated (the Galois path).
    fn switch_key_inner(
        &self,
        encrypted: &mut Ciphertext,
        source_size: usize,
        key_cts: &[Ciphertext],
        decomposition_bit_count: u32,
        pool: &MemoryPool,
        replace: bool,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let conv = ctx.base_converter();
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        let w = decomposition_bit_count;
        debug_assert!(w > 0);
        let mask = (1u64 << w) - 1;

        let mut acc0 = pool.allocate(k * n)?;
        let mut acc1 = pool.allocate(k * n)?;
        let mut target = pool.allocate(n)?;
        let mut digits = pool.allocate(n)?;
        let mut digits_ntt = pool.allocate(n)?;

        for (i, qi) in ctx.coeff_modulus().iter().enumerate() {
            target.copy_from_slice(encrypted.residue(source_size - 1, i));
            poly::multiply_poly_scalar_coeffmod(
                &mut target,
                conv.inv_coeff_base_products_mod_coeff()[i],
                qi,
            );

            let key_ct = &key_cts[i];
            let levels = key_ct.size() / 2;
            let mut shift = 0;
            for j in 0..levels {
                for m in 0..n {
                    digits[m] = (target[m] >> shift) & mask;
                }
                for (l, (ql, tables)) in ctx
                    .coeff_modulus()
                    .iter()
                    .zip(ctx.coeff_ntt_tables().iter())
                    .enumerate()
                {
                    for m in 0..n {
                        digits_ntt[m] = ql.reduce(digits[m]);
                    }
                    tables.forward_lazy(&mut digits_ntt);

                    let key0 = key_ct.residue(2 * j, l);
                    let key1 = key_ct.residue(2 * j + 1, l);
                    for m in 0..n {
                        let d = digits_ntt[m] as u128;
                        acc0[l * n + m] = ql.add(
                            acc0[l * n + m],
                            ql.barrett_reduce_128(d * (key0[m] as u128)),
                        );
                        acc1[l * n + m] = ql.add(
                            acc1[l * n + m],
                            ql.barrett_reduce_128(d * (key1[m] as u128)),
                        );
                    }
                }
                shift += w;
            }
        }

        for (l, (ql, tables)) in ctx
            .coeff_modulus()
            .iter()
            .zip(ctx.coeff_ntt_tables().iter())
            .enumerate()
        {
            tables.backward(&mut acc0[l * n..(l + 1) * n]);
            poly::add_poly_poly_coeffmod(
                encrypted.residue_mut(0, l),
                &acc0[l * n..(l + 1) * n],
                ql,
            );
            tables.backward(&mut acc1[l * n..(l + 1) * n]);
            if replace {
                encrypted
                    .residue_mut(1, l)
                    .copy_from_slice(&acc1[l * n..(l + 1) * n]);
            } else {
                poly::add_poly_poly_coeffmod(
                    encrypted.residue_mut(1, l),
                    &acc1[l * n..(l + 1) * n],
                    ql,
                );
            }
        }
        Ok(())
    }

    /// Multiply many ciphertexts with a balanced binary-tree reduction,
    /// relinearizing to size 2 after every internal product.
    pub fn multiply_many(
        &self,
        encrypteds: &[Ciphertext],
        evaluation_keys: &EvaluationKeys,
    ) -> Result<Ciphertext> {
        let refs = encrypteds.iter().collect::<Vec<_>>();
        self.multiply_many_inner(&refs, evaluation_keys, &self.pool)
    }

    fn multiply_many_inner(
        &self,
        operands: &[&Ciphertext],
        evaluation_keys: &EvaluationKeys,
        pool: &MemoryPool,
    ) -> Result<Ciphertext> {
        if operands.is_empty() {
            return Err(Error::SizeMismatch("nothing to multiply"));
        }
        if operands.len() == 1 {
            self.check(operands[0])?;
            return Ok(operands[0].clone());
        }

        let mut next = Vec::with_capacity(operands.len().div_ceil(2));
        for pair in operands.chunks(2) {
            if pair.len() == 1 {
                next.push(pair[0].clone());
                continue;
            }
            let mut product = pair[0].clone();
            if std::ptr::eq(pair[0], pair[1]) {
                self.square_with_pool(&mut product, pool)?;
            } else {
                self.multiply_with_pool(&mut product, pair[1], pool)?;
            }
            self.relinearize_with_pool(&mut product, evaluation_keys, 2, pool)?;
            next.push(product);
        }
        let refs = next.iter().collect::<Vec<_>>();
        self.multiply_many_inner(&refs, evaluation_keys, pool)
    }

    /// Raise `encrypted` to the power `exponent` by multiplying aliased
    /// copies pairwise.
    pub fn exponentiate(
        &self,
        encrypted: &mut Ciphertext,
        exponent: u64,
        evaluation_keys: &EvaluationKeys,
    ) -> Result<()> {
        self.check(encrypted)?;
        if exponent == 0 {
            return Err(Error::SizeMismatch("exponent cannot be zero"));
        }
        if exponent == 1 {
            return Ok(());
        }
        let aliases = vec![&*encrypted; exponent as usize];
        let result = self.multiply_many_inner(&aliases, evaluation_keys, &self.pool)?;
        *encrypted = result;
        Ok(())
    }

    /// Add `Delta * plain` into the first component.
    pub fn add_plain(&self, encrypted: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        self.plain_additive(encrypted, plain, false)
    }

    /// Subtract `Delta * plain` from the first component.
    pub fn sub_plain(&self, encrypted: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        self.plain_additive(encrypted, plain, true)
    }

    fn plain_additive(
        &self,
        encrypted: &mut Ciphertext,
        plain: &Plaintext,
        subtract: bool,
    ) -> Result<()> {
        self.check(encrypted)?;
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        if plain.significant_coeff_count() > n {
            return Err(Error::SizeMismatch("plaintext has too many coefficients"));
        }

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
                let c = encrypted.residue_mut(0, l);
                c[i] = if subtract {
                    q.sub(c[i], scaled)
                } else {
                    q.add(c[i], scaled)
                };
            }
        }
        Ok(())
    }

    /// Lift a plaintext into the coefficient base: the fast path adds the
    /// per-prime increment `q_l - t` to upper-half coefficients, the exact
    /// path lifts through a big-integer offset of `q - t`.
    fn lift_plain(&self, plain: &Plaintext, lifted: &mut [u64]) {
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        let threshold = ctx.plain_upper_half_threshold();
        lifted.fill(0);

        if ctx.qualifiers().enable_fast_plain_lift {
            for (l, increment) in ctx.plain_upper_half_increment_array().iter().enumerate() {
                for i in 0..plain.significant_coeff_count() {
                    let coeff = plain.coeff(i);
                    lifted[l * n + i] = if coeff >= threshold {
                        coeff + increment
                    } else {
                        coeff
                    };
                }
            }
        } else {
            for i in 0..plain.significant_coeff_count() {
                let coeff = plain.coeff(i);
                if coeff >= threshold {
                    let adjusted = ctx.plain_upper_half_increment() + coeff;
                    for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                        lifted[l * n + i] =
                            (&adjusted % q.value()).to_u64().expect("residue fits u64");
                    }
                } else {
                    for l in 0..ctx.coeff_mod_count() {
                        lifted[l * n + i] = coeff;
                    }
                }
            }
        }
    }

    /// Multiply by a plaintext: a scalar path for constants, and a general
    /// path that lifts the plaintext into the coefficient base, transforms
    /// it once, and runs a dyadic product around every component.
    pub fn multiply_plain(&self, encrypted: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        self.multiply_plain_with_pool(encrypted, plain, &self.pool)
    }

    /// Multiply by a plaintext, drawing scratch space from `pool`.
    pub fn multiply_plain_with_pool(
        &self,
        encrypted: &mut Ciphertext,
        plain: &Plaintext,
        pool: &MemoryPool,
    ) -> Result<()> {
        self.check(encrypted)?;
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        if plain.significant_coeff_count() > n {
            return Err(Error::SizeMismatch("plaintext has too many coefficients"));
        }
        if plain.is_zero() && cfg!(debug_assertions) {
            return Err(Error::PlainIsZero);
        }

        // A constant multiplies through as a per-prime scalar.
        if plain.significant_coeff_count() <= 1 {
            let coeff = plain.coeff(0);
            let threshold = ctx.plain_upper_half_threshold();
            let scalars = if ctx.qualifiers().enable_fast_plain_lift {
                ctx.plain_upper_half_increment_array()
                    .iter()
                    .map(|increment| {
                        if coeff >= threshold {
                            coeff + increment
                        } else {
                            coeff
                        }
                    })
                    .collect::<Vec<_>>()
            } else {
                let adjusted = if coeff >= threshold {
                    ctx.plain_upper_half_increment() + coeff
                } else {
                    coeff.into()
                };
                ctx.coeff_modulus()
                    .iter()
                    .map(|q| (&adjusted % q.value()).to_u64().expect("residue fits u64"))
                    .collect::<Vec<_>>()
            };
            for i in 0..encrypted.size() {
                for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                    poly::multiply_poly_scalar_coeffmod(
                        encrypted.residue_mut(i, l),
                        q.reduce(scalars[l]),
                        q,
                    );
                }
            }
            return Ok(());
        }

        let k = ctx.coeff_mod_count();
        let mut lifted = pool.allocate(k * n)?;
        self.lift_plain(plain, &mut lifted);
        for (l, tables) in ctx.coeff_ntt_tables().iter().enumerate() {
            tables.forward(&mut lifted[l * n..(l + 1) * n]);
        }

        for i in 0..encrypted.size() {
            for (l, (q, tables)) in ctx
                .coeff_modulus()
                .iter()
                .zip(ctx.coeff_ntt_tables().iter())
                .enumerate()
            {
                let residue = encrypted.residue_mut(i, l);
                tables.forward_lazy(residue);
                for (r, p) in residue.iter_mut().zip(&lifted[l * n..(l + 1) * n]) {
                    *r = q.barrett_reduce_128((*r as u128) * (*p as u128));
                }
                tables.backward(residue);
            }
        }
        Ok(())
    }

    /// Transform a plaintext for repeated fast plain multiplication: widen
    /// it to the coefficient base and move it into the NTT domain.
    pub fn transform_plain_to_ntt(&self, plain: &mut Plaintext) -> Result<()> {
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        if plain.significant_coeff_count() > n {
            return Err(Error::SizeMismatch("plaintext has too many coefficients"));
        }

        let mut lifted = vec![0u64; k * n];
        self.lift_plain(plain, &mut lifted);
        for (l, tables) in ctx.coeff_ntt_tables().iter().enumerate() {
            tables.forward(&mut lifted[l * n..(l + 1) * n]);
        }
        plain.set_coeffs(lifted);
        Ok(())
    }

    /// Multiply an NTT-form ciphertext by an NTT-form plaintext; the result
    /// stays in NTT form.
    pub fn multiply_plain_ntt(
        &self,
        encrypted_ntt: &mut Ciphertext,
        plain_ntt: &Plaintext,
    ) -> Result<()> {
        self.check(encrypted_ntt)?;
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        if plain_ntt.coeff_count() != k * n {
            return Err(Error::SizeMismatch("plaintext is not in ntt form"));
        }
        if plain_ntt.is_zero() && cfg!(debug_assertions) {
            return Err(Error::PlainIsZero);
        }

        for i in 0..encrypted_ntt.size() {
            for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                poly::dyadic_product_coeffmod(
                    encrypted_ntt.residue_mut(i, l),
                    &plain_ntt.coeffs()[l * n..(l + 1) * n],
                    q,
                );
            }
        }
        Ok(())
    }

    /// Transform every component into the NTT domain in place. The
    /// fingerprint is preserved.
    pub fn transform_to_ntt(&self, encrypted: &mut Ciphertext) -> Result<()> {
        self.check(encrypted)?;
        for i in 0..encrypted.size() {
            for (l, tables) in self.ctx.coeff_ntt_tables().iter().enumerate() {
                tables.forward(encrypted.residue_mut(i, l));
            }
        }
        Ok(())
    }

    /// Transform every component back into the coefficient domain in
    /// place.
    pub fn transform_from_ntt(&self, encrypted_ntt: &mut Ciphertext) -> Result<()> {
        self.check(encrypted_ntt)?;
        for i in 0..encrypted_ntt.size() {
            for (l, tables) in self.ctx.coeff_ntt_tables().iter().enumerate() {
                tables.backward(encrypted_ntt.residue_mut(i, l));
            }
        }
        Ok(())
    }

    /// Apply the Galois automorphism `x -> x^galois_elt` to a size-2
    /// ciphertext, key-switching the permuted second component. When the
    /// key for the exponent is absent, the exponent is factored over the
    /// generator `3` and `-1` and the present keys are chained.
    pub fn apply_galois(
        &self,
        encrypted: &mut Ciphertext,
        galois_elt: u64,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        self.apply_galois_with_pool(encrypted, galois_elt, galois_keys, &self.pool)
    }

    /// Apply a Galois automorphism, drawing scratch space from `pool`.
    pub fn apply_galois_with_pool(
        &self,
        encrypted: &mut Ciphertext,
        galois_elt: u64,
        galois_keys: &GaloisKeys,
        pool: &MemoryPool,
    ) -> Result<()> {
        self.check(encrypted)?;
        if galois_keys.fingerprint() != self.ctx.fingerprint() {
            return Err(Error::WrongParams);
        }
        let ctx = &self.ctx;
        let n = ctx.poly_modulus_degree() as u64;
        let m = n << 1;
        if galois_elt & 1 == 0 || galois_elt >= m {
            return Err(Error::InvalidParameters);
        }
        if encrypted.size() != 2 {
            return Err(Error::SizeMismatch("automorphisms require size 2"));
        }

        if !galois_keys.has_key(galois_elt) {
            // galois_elt = 3^order1 * (-1)^order2; chain through whichever
            // of 3 and 3^{-1} gives the sparser exponent.
            let (mut order1, order2) = self.zmstar_to_generator[&galois_elt];
            let subgroup_size = n >> 1;
            let mut generator: u64 = 3;
            if (subgroup_size - order1).count_ones() < order1.count_ones() {
                order1 = subgroup_size - order1;
                generator = invert_odd_mod_power_of_two(3, m - 1);
            }
            while order1 != 0 {
                if order1 & 1 == 1 {
                    if !galois_keys.has_key(generator) {
                        return Err(Error::NeedsKey);
                    }
                    self.apply_galois_with_pool(encrypted, generator, galois_keys, pool)?;
                }
                generator = generator.wrapping_mul(generator) & (m - 1);
                order1 >>= 1;
            }
            if order2 != 0 {
                if !galois_keys.has_key(m - 1) {
                    return Err(Error::NeedsKey);
                }
                self.apply_galois_with_pool(encrypted, m - 1, galois_keys, pool)?;
            }
            return Ok(());
        }

        // Permute both components by the automorphism, in coefficient
        // order.
        let coeff_count_power = ctx.coeff_count_power();
        for component in 0..2 {
            for (l, q) in ctx.coeff_modulus().iter().enumerate() {
                let permuted = poly::apply_galois(
                    encrypted.residue(component, l),
                    coeff_count_power,
                    galois_elt,
                    q,
                );
                encrypted.residue_mut(component, l).copy_from_slice(&permuted);
            }
        }

        // Key-switch the permuted c_1: fold into c_0 and replace c_1.
        let key_cts = galois_keys
            .key(galois_elt)
            .expect("presence checked above");
        self.switch_key_inner(
            encrypted,
            2,
            key_cts,
            galois_keys.decomposition_bit_count(),
            pool,
            true,
        )
    }

    /// Rotate the rows of a batched ciphertext by `steps` slots; positive
    /// steps rotate left. Maps to the automorphism `x -> x^(3^|steps|)`.
    pub fn rotate_rows(
        &self,
        encrypted: &mut Ciphertext,
        steps: i32,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        if steps == 0 {
            return Ok(());
        }
        let n = self.ctx.poly_modulus_degree();
        let row_size = n >> 1;
        if steps.unsigned_abs() as usize >= row_size {
            return Err(Error::InvalidParameters);
        }

        let effective_steps = if steps < 0 {
            row_size - steps.unsigned_abs() as usize
        } else {
            steps as usize
        };

        let m = (n as u64) << 1;
        let mut galois_elt: u64 = 1;
        for _ in 0..effective_steps {
            galois_elt = galois_elt.wrapping_mul(3) & (m - 1);
        }
        self.apply_galois(encrypted, galois_elt, galois_keys)
    }

    /// Swap the two rows of a batched ciphertext. Maps to the automorphism
    /// `x -> x^(2n - 1)`.
    pub fn rotate_columns(
        &self,
        encrypted: &mut Ciphertext,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        let m = (self.ctx.poly_modulus_degree() as u64) << 1;
        self.apply_galois(encrypted, m - 1, galois_keys)
    }
}

/// One multiplication operand, NTT transformed in both bases.
struct TensorOperand {
    q_ntt: Vec<u64>,
    bsk_ntt: Vec<u64>,
}

/// The 2x2 tensor product with a Karatsuba schedule: three dyadic products
/// per residue instead of four.
fn karatsuba_2x2(
    base: &[SmallModulus],
    n: usize,
    op1: &[u64],
    op2: &[u64],
    destination: &mut [u64],
) {
    let kb = base.len();
    for (j, q) in base.iter().enumerate() {
        let a0 = &op1[j * n..(j + 1) * n];
        let a1 = &op1[(kb + j) * n..(kb + j + 1) * n];
        let b0 = &op2[j * n..(j + 1) * n];
        let b1 = &op2[(kb + j) * n..(kb + j + 1) * n];
        for m in 0..n {
            let p00 = q.barrett_reduce_128((a0[m] as u128) * (b0[m] as u128));
            let p11 = q.barrett_reduce_128((a1[m] as u128) * (b1[m] as u128));
            // The operands are lazy, so the sums go through a full
            // reduction before the cross product.
            let sa = q.barrett_reduce_128(a0[m] as u128 + a1[m] as u128);
            let sb = q.barrett_reduce_128(b0[m] as u128 + b1[m] as u128);
            let cross = q.barrett_reduce_128((sa as u128) * (sb as u128));
            destination[j * n + m] = p00;
            destination[(kb + j) * n + m] = q.sub(q.sub(cross, p00), p11);
            destination[(2 * kb + j) * n + m] = p11;
        }
    }
}

/// The general tensor product: accumulate `d_s = sum_{i+j=s} a_i * b_j`
/// coefficient-wise for arbitrary operand sizes.
fn tensor_accumulate(
    base: &[SmallModulus],
    n: usize,
    op1: &[u64],
    size1: usize,
    op2: &[u64],
    size2: usize,
    destination: &mut [u64],
) {
    let kb = base.len();
    for s in 0..size1 + size2 - 1 {
        for i1 in 0..size1.min(s + 1) {
            let i2 = s - i1;
            if i2 >= size2 {
                continue;
            }
            for (j, q) in base.iter().enumerate() {
                let a = &op1[(i1 * kb + j) * n..(i1 * kb + j + 1) * n];
                let b = &op2[(i2 * kb + j) * n..(i2 * kb + j + 1) * n];
                let d = &mut destination[(s * kb + j) * n..(s * kb + j + 1) * n];
                for m in 0..n {
                    let product = q.barrett_reduce_128((a[m] as u128) * (b[m] as u128));
                    d[m] = q.add(d[m], product);
                }
            }
        }
    }
}
