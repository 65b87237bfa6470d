//! Real solid harmonics and the Cartesian to spherical transformation.
//!
//! Harmonics carry Racah normalization, so that every component of a shell
//! integrates to 4 pi / (2l + 1) over the unit sphere and one radial
//! normalization constant serves the whole shell. Components are ordered
//! m = -l, ..., l.

use crate::gto::cart_components;
use nalgebra::DMatrix;
use std::collections::HashMap;

type Poly = HashMap<[usize; 3], f64>;

fn times_coord(poly: &Poly, dir: usize, scale: f64) -> Poly {
    poly.iter()
        .map(|(k, v)| {
            let mut key = *k;
            key[dir] += 1;
            (key, v * scale)
        })
        .collect()
}

fn add_into(target: &mut Poly, other: &Poly, scale: f64) {
    for (k, v) in other {
        *target.entry(*k).or_insert(0.0) += v * scale;
    }
}

fn times_r2(poly: &Poly) -> Poly {
    let mut out = Poly::new();
    for dir in 0..3 {
        for (k, v) in poly {
            let mut key = *k;
            key[dir] += 2;
            *out.entry(key).or_insert(0.0) += v;
        }
    }
    out
}

/// Solid harmonics S_{l,m} as Cartesian polynomials for l = 0..=lmax,
/// indexed as `[l][m + l]`.
pub fn solid_harmonics(lmax: usize) -> Vec<Vec<Poly>> {
    let mut s: Vec<Vec<Poly>> = Vec::with_capacity(lmax + 1);
    let mut s00 = Poly::new();
    s00.insert([0, 0, 0], 1.0);
    s.push(vec![s00]);

    for l in 0..lmax {
        let li = l as i64;
        let mut next: Vec<Poly> = vec![Poly::new(); 2 * l + 3];
        let first = l == 0;
        let fac = ((if first { 2.0 } else { 1.0 }) * (2 * l + 1) as f64 / (2 * l + 2) as f64).sqrt();
        let top = &s[l][2 * l];
        let bottom = &s[l][0];

        // m = l + 1
        let mut p = times_coord(top, 0, fac);
        if !first {
            add_into(&mut p, &times_coord(bottom, 1, 1.0), -fac);
        }
        next[2 * l + 2] = p;

        // m = -(l + 1)
        let mut p = times_coord(top, 1, fac);
        if !first {
            add_into(&mut p, &times_coord(bottom, 0, 1.0), fac);
        }
        next[0] = p;

        for m in -li..=li {
            let mut p = times_coord(&s[l][(m + li) as usize], 2, (2 * l + 1) as f64);
            let c = (((li + m) * (li - m)) as f64).sqrt();
            if c != 0.0 {
                let lower = &s[l - 1][(m + li - 1) as usize];
                add_into(&mut p, &times_r2(lower), -c);
            }
            let denom = (((li + m + 1) * (li - m + 1)) as f64).sqrt();
            p.values_mut().for_each(|v| *v /= denom);
            next[(m + li + 1) as usize] = p;
        }
        s.push(next);
    }
    s
}

/// (2l + 1) x ncart(l) matrix taking Cartesian components to real solid harmonics.
pub fn cart2sph(l: usize) -> DMatrix<f64> {
    let harmonics = solid_harmonics(l);
    let comps = cart_components(l);
    let mut c2s = DMatrix::zeros(2 * l + 1, comps.len());
    for (row, poly) in harmonics[l].iter().enumerate() {
        for (col, ijk) in comps.iter().enumerate() {
            if let Some(v) = poly.get(ijk) {
                c2s[(row, col)] = *v;
            }
        }
    }
    c2s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_order_harmonics() {
        let c2s = cart2sph(1);
        // y, z, x
        assert_eq!(c2s[(0, 1)], 1.0);
        assert_eq!(c2s[(1, 2)], 1.0);
        assert_eq!(c2s[(2, 0)], 1.0);

        let c2s = cart2sph(2);
        // m = 0: (3z^2 - r^2) / 2
        assert!((c2s[(2, 5)] - 1.0).abs() < 1e-14);
        assert!((c2s[(2, 0)] + 0.5).abs() < 1e-14);
        assert!((c2s[(2, 3)] + 0.5).abs() < 1e-14);
        // m = -2: sqrt(3) xy
        assert!((c2s[(0, 1)] - 3f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_harmonics_are_homogeneous() {
        let s = solid_harmonics(4);
        for (l, shell) in s.iter().enumerate() {
            assert_eq!(shell.len(), 2 * l + 1);
            for poly in shell {
                assert!(poly.keys().all(|k| k[0] + k[1] + k[2] == l));
            }
        }
    }
}
