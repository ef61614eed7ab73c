//! Sampling of the random polynomials used by encryption and key
//! generation: ternary secrets, clipped-normal noise, and uniform masks.

use crate::context::Context;
use bfv_util::ClippedNormal;
use rand::{distributions::Distribution, Rng, RngCore};

/// Sample a ternary polynomial with coefficients in `{-1, 0, 1}`, uniformly
/// and independently, in RNS coefficient form over the coefficient base.
pub(crate) fn sample_ternary_poly<R: RngCore>(ctx: &Context, rng: &mut R) -> Vec<u64> {
    let n = ctx.poly_modulus_degree();
    let k = ctx.coeff_mod_count();
    let mut poly = vec![0u64; k * n];
    for i in 0..n {
        let trit = rng.gen_range(-1i32..=1);
        for (j, q) in ctx.coeff_modulus().iter().enumerate() {
            poly[j * n + i] = match trit {
                1 => 1,
                -1 => q.value() - 1,
                _ => 0,
            };
        }
    }
    poly
}

/// Sample a noise polynomial coordinate-wise from the clipped normal
/// distribution of the parameters, in RNS coefficient form. A zero standard
/// deviation or clipping bound yields the zero polynomial.
pub(crate) fn sample_noise_poly<R: RngCore>(ctx: &Context, rng: &mut R) -> Vec<u64> {
    let n = ctx.poly_modulus_degree();
    let k = ctx.coeff_mod_count();
    let mut poly = vec![0u64; k * n];

    let dist = ClippedNormal::new(
        ctx.parms().noise_standard_deviation(),
        ctx.parms().noise_max_deviation(),
    )
    .expect("context validated the noise parameters");

    for i in 0..n {
        let noise = dist.sample(rng);
        for (j, q) in ctx.coeff_modulus().iter().enumerate() {
            poly[j * n + i] = match noise {
                0 => 0,
                _ if noise > 0 => (noise as u64) % q.value(),
                _ => q.value() - ((-noise) as u64) % q.value(),
            };
        }
    }
    poly
}

/// Sample a uniformly random polynomial over the coefficient base; used
/// directly in NTT form as the mask of a key-switching pair.
pub(crate) fn sample_uniform_poly<R: RngCore>(ctx: &Context, rng: &mut R) -> Vec<u64> {
    let n = ctx.poly_modulus_degree();
    let mut poly = Vec::with_capacity(ctx.coeff_mod_count() * n);
    for q in ctx.coeff_modulus() {
        poly.extend((0..n).map(|_| q.random(rng)));
    }
    poly
}
