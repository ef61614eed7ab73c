//! Ciphertexts: ordered sequences of residue polynomials over the
//! coefficient base.

use crate::context::Context;
use crate::parameters::Fingerprint;
use crate::serialization::{
    invalid_data, read_fingerprint, read_u32, read_u64, write_fingerprint, write_u32, write_u64,
};
use ndarray::{s, Array2};
use std::io::{self, Read, Write};

/// A ciphertext `(c_0, ..., c_{s-1})` of `s >= 2` RNS polynomials over the
/// coefficient base, tagged with the fingerprint of the parameter set that
/// produced it.
///
/// The residues live in one residue matrix with a row per (component,
/// modulus) pair — component-major, prime-major within each component —
/// and a column per coefficient; semantically the ciphertext decrypts by
/// evaluating `sum_i c_i * s^i mod q` and rescaling. A fresh encryption
/// has size 2; multiplying sizes `a` and `b` gives size `a + b - 1`, and
/// relinearization contracts the size back towards 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    fingerprint: Fingerprint,
    size: usize,
    poly_modulus_degree: usize,
    coeff_mod_count: usize,
    data: Array2<u64>,
}

impl Ciphertext {
    /// An all-zero ciphertext of the given size under `ctx`.
    pub fn new(ctx: &Context, size: usize) -> Self {
        debug_assert!(size >= 2);
        let n = ctx.poly_modulus_degree();
        let k = ctx.coeff_mod_count();
        Self {
            fingerprint: *ctx.fingerprint(),
            size,
            poly_modulus_degree: n,
            coeff_mod_count: k,
            data: Array2::zeros((size * k, n)),
        }
    }

    /// The number of polynomial components.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The polynomial degree `n`.
    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    /// The number of moduli in the coefficient base.
    pub fn coeff_mod_count(&self) -> usize {
        self.coeff_mod_count
    }

    /// The fingerprint of the producing parameter set.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The full residue matrix as one contiguous slice.
    pub fn data(&self) -> &[u64] {
        self.data.as_slice().expect("residue matrix is contiguous")
    }

    /// Component `i` as a prime-major residue slice of `k * n` words.
    pub fn poly(&self, i: usize) -> &[u64] {
        let len = self.coeff_mod_count * self.poly_modulus_degree;
        &self.data()[i * len..(i + 1) * len]
    }

    /// Mutable access to component `i`.
    pub fn poly_mut(&mut self, i: usize) -> &mut [u64] {
        let len = self.coeff_mod_count * self.poly_modulus_degree;
        let data = self
            .data
            .as_slice_mut()
            .expect("residue matrix is contiguous");
        &mut data[i * len..(i + 1) * len]
    }

    /// The residue polynomial of component `i` modulo coefficient modulus
    /// `j`: one row of the residue matrix.
    pub fn residue(&self, i: usize, j: usize) -> &[u64] {
        self.data
            .row(i * self.coeff_mod_count + j)
            .to_slice()
            .expect("residue rows are contiguous")
    }

    /// Mutable access to the residue polynomial of component `i` modulo
    /// coefficient modulus `j`.
    pub fn residue_mut(&mut self, i: usize, j: usize) -> &mut [u64] {
        self.data
            .row_mut(i * self.coeff_mod_count + j)
            .into_slice()
            .expect("residue rows are contiguous")
    }

    /// Grow or shrink to `new_size` components; new components are zero,
    /// excess components are dropped from the top.
    pub fn resize(&mut self, new_size: usize) {
        debug_assert!(new_size >= 2);
        let k = self.coeff_mod_count;
        let keep = self.size.min(new_size) * k;
        let mut data = Array2::zeros((new_size * k, self.poly_modulus_degree));
        data.slice_mut(s![..keep, ..])
            .assign(&self.data.slice(s![..keep, ..]));
        self.data = data;
        self.size = new_size;
    }

    /// Serialize per the wire layout: `fingerprint (16) || size (u32) ||
    /// poly_modulus_degree (u32) || coeff_modulus_size (u32) ||
    /// residue data (size * n * k * 8 bytes)`, little-endian.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_fingerprint(writer, &self.fingerprint)?;
        write_u32(writer, self.size as u32)?;
        write_u32(writer, self.poly_modulus_degree as u32)?;
        write_u32(writer, self.coeff_mod_count as u32)?;
        for word in self.data.iter() {
            write_u64(writer, *word)?;
        }
        Ok(())
    }

    /// Deserialize a ciphertext written by [`Ciphertext::save`].
    pub fn load<R: Read>(reader: &mut R) -> io::Result<Self> {
        let fingerprint = read_fingerprint(reader)?;
        let size = read_u32(reader)? as usize;
        let poly_modulus_degree = read_u32(reader)? as usize;
        let coeff_mod_count = read_u32(reader)? as usize;
        if size < 2 || poly_modulus_degree == 0 || coeff_mod_count == 0 {
            return Err(invalid_data("ciphertext dimensions are not valid"));
        }
        let total = size
            .checked_mul(poly_modulus_degree)
            .and_then(|x| x.checked_mul(coeff_mod_count))
            .ok_or_else(|| invalid_data("ciphertext dimensions overflow"))?;
        if total > (1 << 30) {
            return Err(invalid_data("ciphertext is too large"));
        }
        let mut data = Vec::with_capacity(total);
        for _ in 0..total {
            data.push(read_u64(reader)?);
        }
        let data = Array2::from_shape_vec((size * coeff_mod_count, poly_modulus_degree), data)
            .map_err(|_| invalid_data("ciphertext dimensions are inconsistent"))?;
        Ok(Self {
            fingerprint,
            size,
            poly_modulus_degree,
            coeff_mod_count,
            data,
        })
    }
}
