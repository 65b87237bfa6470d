//! Molecular integrals over spherical contracted Gaussians.
//!
//! Everything is evaluated with the McMurchie-Davidson scheme: products of
//! Cartesian primitives are expanded in Hermite Gaussians (`HermiteE`) and
//! Coulomb type operators reduce to the Hermite integrals `HermiteR`.
//! Operators carrying a gradient (`pV.p`, spin-orbit) expand the
//! differentiated primitives into neighbouring Cartesian powers.
//!
//! # Usage
//!
//! ```rust,ignore
//! let s = integrals::overlap(&basis);
//! let eri = EriTensor::build(&basis);
//! let (j, k) = eri.jk(&density);
//! ```

#![allow(non_snake_case)]

use crate::basis::{MolecularBasis, Shell};
use crate::gto::{cart_components, for_each_derivative, ncart, Direction, HermiteR, PrimitivePair};
use itertools::iproduct;
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;
use std::f64::consts::PI;

#[derive(Clone, Copy, PartialEq, Debug)]
enum Hermiticity {
    Symmetric,
    Antisymmetric,
}

/// The cross product components as (first, second) derivative directions.
const CROSS: [[(Direction, Direction); 2]; 3] = [
    [(Direction::Y, Direction::Z), (Direction::Z, Direction::Y)],
    [(Direction::Z, Direction::X), (Direction::X, Direction::Z)],
    [(Direction::X, Direction::Y), (Direction::Y, Direction::X)],
];

/// Sum over the derivative terms of d/d(da) on the bra and d/d(db) on the ket.
fn derivative_pair_sum<F>(ia: &[usize; 3], ib: &[usize; 3], a: f64, b: f64, da: Direction, db: Direction, f: F) -> f64
where
    F: Fn(&[usize; 3], &[usize; 3]) -> f64,
{
    let mut total = 0.0;
    for_each_derivative(ia, a, da, |ca, ia2| {
        for_each_derivative(ib, b, db, |cb, ib2| {
            total += ca * cb * f(&ia2, &ib2);
        });
    });
    total
}

/// Block diagonal transformation from (nctr x ncart) to (nctr x nsph) functions.
fn shell_c2s(basis: &MolecularBasis, shell: &Shell) -> DMatrix<f64> {
    let c2s = &basis.c2s[shell.l];
    let (ns, nc) = c2s.shape();
    let nctr = shell.nctr();
    let mut t = DMatrix::zeros(nctr * ns, nctr * nc);
    for k in 0..nctr {
        t.view_mut((k * ns, k * nc), (ns, nc)).copy_from(c2s);
    }
    t
}

/// Contracts `data` (row major with shape `dims`) along `axis` with `mat`
/// of shape (new, old): out[.., n, ..] = sum_k mat[n, k] data[.., k, ..].
pub fn transform_axis(data: &[f64], dims: &[usize], axis: usize, mat: &DMatrix<f64>) -> (Vec<f64>, Vec<usize>) {
    let old = dims[axis];
    let new = mat.nrows();
    debug_assert_eq!(mat.ncols(), old);
    let outer: usize = dims[..axis].iter().product();
    let inner: usize = dims[axis + 1..].iter().product();

    let mut out = vec![0.0; outer * new * inner];
    out.par_chunks_mut(new * inner)
        .enumerate()
        .for_each(|(o, chunk)| {
            let src = &data[o * old * inner..(o + 1) * old * inner];
            for n in 0..new {
                let dst = &mut chunk[n * inner..(n + 1) * inner];
                for k in 0..old {
                    let m = mat[(n, k)];
                    if m == 0.0 {
                        continue;
                    }
                    let row = &src[k * inner..(k + 1) * inner];
                    for (d, s) in dst.iter_mut().zip(row) {
                        *d += m * s;
                    }
                }
            }
        });

    let mut new_dims = dims.to_vec();
    new_dims[axis] = new;
    (out, new_dims)
}

/// Generic one-electron driver over shell pairs. The kernel fills
/// `ncomp * ncart(la) * ncart(lb)` values for one primitive pair.
fn one_electron<F>(basis: &MolecularBasis, ncomp: usize, ext: usize, herm: Hermiticity, kernel: F) -> Vec<DMatrix<f64>>
where
    F: Fn(&PrimitivePair, &[[usize; 3]], &[[usize; 3]], &mut [f64]) + Sync,
{
    let nshell = basis.shells.len();
    let pairs: Vec<(usize, usize)> = (0..nshell).flat_map(|i| (0..=i).map(move |j| (i, j))).collect();

    let blocks: Vec<(usize, usize, Vec<DMatrix<f64>>)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let sa = &basis.shells[i];
            let sb = &basis.shells[j];
            let ca = cart_components(sa.l);
            let cb = cart_components(sb.l);
            let (nca, ncb) = (ca.len(), cb.len());
            let mut cart = vec![DMatrix::<f64>::zeros(sa.nctr() * nca, sb.nctr() * ncb); ncomp];
            let mut buf = vec![0.0; ncomp * nca * ncb];

            for (pa, &a) in sa.exponents.iter().enumerate() {
                for (pb, &b) in sb.exponents.iter().enumerate() {
                    let pair = PrimitivePair::new(a, &sa.center, sa.l, b, &sb.center, sb.l, ext);
                    buf.iter_mut().for_each(|x| *x = 0.0);
                    kernel(&pair, &ca, &cb, &mut buf);
                    for ka in 0..sa.nctr() {
                        for kb in 0..sb.nctr() {
                            let w = sa.coefficients[ka][pa] * sb.coefficients[kb][pb];
                            if w == 0.0 {
                                continue;
                            }
                            for (comp, m) in cart.iter_mut().enumerate() {
                                for ia in 0..nca {
                                    for ib in 0..ncb {
                                        m[(ka * nca + ia, kb * ncb + ib)] += w * buf[(comp * nca + ia) * ncb + ib];
                                    }
                                }
                            }
                        }
                    }
                }
            }

            let ta = shell_c2s(basis, sa);
            let tb = shell_c2s(basis, sb);
            let sph = cart.iter().map(|m| &ta * m * tb.transpose()).collect();
            (i, j, sph)
        })
        .collect();

    let nao = basis.nao();
    let mut mats = vec![DMatrix::zeros(nao, nao); ncomp];
    let sign = if herm == Hermiticity::Symmetric { 1.0 } else { -1.0 };
    for (i, j, sph) in blocks {
        let (oi, oj) = (basis.ao_offsets[i], basis.ao_offsets[j]);
        for (comp, block) in sph.iter().enumerate() {
            for r in 0..block.nrows() {
                for c in 0..block.ncols() {
                    mats[comp][(oi + r, oj + c)] = block[(r, c)];
                    if i != j {
                        mats[comp][(oj + c, oi + r)] = sign * block[(r, c)];
                    }
                }
            }
        }
    }
    mats
}

fn single(mut mats: Vec<DMatrix<f64>>) -> DMatrix<f64> {
    mats.swap_remove(0)
}

pub fn overlap(basis: &MolecularBasis) -> DMatrix<f64> {
    single(one_electron(basis, 1, 0, Hermiticity::Symmetric, |pair, ca, cb, buf| {
        let ncb = cb.len();
        for (ia, a) in ca.iter().enumerate() {
            for (ib, b) in cb.iter().enumerate() {
                buf[ia * ncb + ib] = pair.overlap(a, b);
            }
        }
    }))
}

/// T = 1/2 <grad mu | grad nu>
pub fn kinetic(basis: &MolecularBasis) -> DMatrix<f64> {
    single(one_electron(basis, 1, 1, Hermiticity::Symmetric, |pair, ca, cb, buf| {
        let ncb = cb.len();
        for (ia, a) in ca.iter().enumerate() {
            for (ib, b) in cb.iter().enumerate() {
                buf[ia * ncb + ib] = 0.5
                    * Direction::all()
                        .iter()
                        .map(|&d| derivative_pair_sum(a, b, pair.a, pair.b, d, d, |x, y| pair.overlap(x, y)))
                        .sum::<f64>();
            }
        }
    }))
}

fn lsum(c: &[[usize; 3]]) -> usize {
    c[0].iter().sum()
}

/// Nuclear attraction sum_C <mu| -Z_C / |r - C| |nu>.
pub fn nuclear(basis: &MolecularBasis) -> DMatrix<f64> {
    single(one_electron(basis, 1, 0, Hermiticity::Symmetric, |pair, ca, cb, buf| {
        let ncb = cb.len();
        let lmax = lsum(ca) + lsum(cb);
        for (Z, C) in basis.charges.iter().zip(&basis.coords) {
            let R = HermiteR::new(lmax, pair.p, pair.P - C);
            let pref = -Z * 2.0 * PI / pair.p;
            for (ia, a) in ca.iter().enumerate() {
                for (ib, b) in cb.iter().enumerate() {
                    buf[ia * ncb + ib] += pref * pair.coulomb(a, b, &R);
                }
            }
        }
    }))
}

/// W = <grad mu | V_nuc . | grad nu>, the small component potential of X2C.
pub fn pvp(basis: &MolecularBasis) -> DMatrix<f64> {
    single(one_electron(basis, 1, 1, Hermiticity::Symmetric, |pair, ca, cb, buf| {
        let ncb = cb.len();
        let lmax = lsum(ca) + lsum(cb) + 2;
        for (Z, C) in basis.charges.iter().zip(&basis.coords) {
            let R = HermiteR::new(lmax, pair.p, pair.P - C);
            let pref = -Z * 2.0 * PI / pair.p;
            for (ia, a) in ca.iter().enumerate() {
                for (ib, b) in cb.iter().enumerate() {
                    let val: f64 = Direction::all()
                        .iter()
                        .map(|&d| derivative_pair_sum(a, b, pair.a, pair.b, d, d, |x, y| pair.coulomb(x, y, &R)))
                        .sum();
                    buf[ia * ncb + ib] += pref * val;
                }
            }
        }
    }))
}

/// P_k = <grad mu | V_nuc x | grad nu>_k. Real and antisymmetric; the
/// one-electron spin-orbit operator is i alpha^2/2 P.
pub fn spin_orbit_nuclear(basis: &MolecularBasis) -> [DMatrix<f64>; 3] {
    let mats = one_electron(basis, 3, 1, Hermiticity::Antisymmetric, |pair, ca, cb, buf| {
        let (nca, ncb) = (ca.len(), cb.len());
        let lmax = lsum(ca) + lsum(cb) + 2;
        for (Z, C) in basis.charges.iter().zip(&basis.coords) {
            let R = HermiteR::new(lmax, pair.p, pair.P - C);
            let pref = -Z * 2.0 * PI / pair.p;
            for (comp, terms) in CROSS.iter().enumerate() {
                for (ia, a) in ca.iter().enumerate() {
                    for (ib, b) in cb.iter().enumerate() {
                        let plus = derivative_pair_sum(a, b, pair.a, pair.b, terms[0].0, terms[0].1, |x, y| {
                            pair.coulomb(x, y, &R)
                        });
                        let minus = derivative_pair_sum(a, b, pair.a, pair.b, terms[1].0, terms[1].1, |x, y| {
                            pair.coulomb(x, y, &R)
                        });
                        buf[(comp * nca + ia) * ncb + ib] += pref * (plus - minus);
                    }
                }
            }
        }
    });
    let nao = basis.nao();
    let mut it = mats.into_iter();
    let mut next = || it.next().unwrap_or_else(|| DMatrix::zeros(nao, nao));
    [next(), next(), next()]
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum BraOperator {
    Plain,
    Cross,
}

fn tetra_index(dim: usize, t: usize, u: usize, v: usize) -> usize {
    (t * dim + u) * dim + v
}

/// Contracted spherical block of a shell quartet, row major over
/// [comp, a, b, c, d].
fn quartet_block(basis: &MolecularBasis, idx: [usize; 4], op: BraOperator) -> (Vec<f64>, Vec<usize>) {
    let shells: Vec<&Shell> = idx.iter().map(|&i| &basis.shells[i]).collect();
    let (sa, sb, sc, sd) = (shells[0], shells[1], shells[2], shells[3]);
    let comps: Vec<Vec<[usize; 3]>> = shells.iter().map(|s| cart_components(s.l)).collect();
    let nc: Vec<usize> = shells.iter().map(|s| ncart(s.l)).collect();
    let ncomp = if op == BraOperator::Cross { 3 } else { 1 };
    let ext = if op == BraOperator::Cross { 1 } else { 0 };

    let lab = sa.l + sb.l + 2 * ext;
    let lcd = sc.l + sd.l;
    let dim = lab + 1;
    let nprim_block = ncomp * nc[0] * nc[1] * nc[2] * nc[3];
    let bra_cols = nc[2] * nc[3];

    let full_dims = [
        ncomp,
        sa.nctr() * nc[0],
        sb.nctr() * nc[1],
        sc.nctr() * nc[2],
        sd.nctr() * nc[3],
    ];
    let mut acc = vec![0.0; full_dims.iter().product()];
    let mut ket_acc = vec![0.0; sc.nctr() * sd.nctr() * nprim_block];
    let mut prim = vec![0.0; nprim_block];
    let mut W = vec![0.0; bra_cols * dim * dim * dim];

    for (pa, &a) in sa.exponents.iter().enumerate() {
        for (pb, &b) in sb.exponents.iter().enumerate() {
            let wab: Vec<(usize, usize, f64)> = iproduct!(0..sa.nctr(), 0..sb.nctr())
                .map(|(ka, kb)| (ka, kb, sa.coefficients[ka][pa] * sb.coefficients[kb][pb]))
                .filter(|w| w.2 != 0.0)
                .collect();
            if wab.is_empty() {
                continue;
            }

            let ab = PrimitivePair::new(a, &sa.center, sa.l, b, &sb.center, sb.l, ext);
            // sparse Hermite expansions of the bra, one per (comp, ia, ib)
            let mut bra: Vec<Vec<(usize, f64)>> = Vec::with_capacity(ncomp * nc[0] * nc[1]);
            for comp in 0..ncomp {
                for ia in &comps[0] {
                    for ib in &comps[1] {
                        let mut dense = vec![0.0; dim * dim * dim];
                        let mut add = |x: &[usize; 3], y: &[usize; 3], scale: f64| {
                            for (t, u, v, c) in ab.expand(x, y, false) {
                                dense[tetra_index(dim, t, u, v)] += scale * c;
                            }
                        };
                        match op {
                            BraOperator::Plain => add(ia, ib, 1.0),
                            BraOperator::Cross => {
                                for (sign, (da, db)) in [(1.0, CROSS[comp][0]), (-1.0, CROSS[comp][1])] {
                                    for_each_derivative(ia, a, da, |c1, x| {
                                        for_each_derivative(ib, b, db, |c2, y| add(&x, &y, sign * c1 * c2));
                                    });
                                }
                            }
                        }
                        bra.push(
                            dense
                                .into_iter()
                                .enumerate()
                                .filter(|(_, c)| *c != 0.0)
                                .collect(),
                        );
                    }
                }
            }

            ket_acc.iter_mut().for_each(|x| *x = 0.0);
            for (pc, &c) in sc.exponents.iter().enumerate() {
                for (pd, &d) in sd.exponents.iter().enumerate() {
                    let wcd: Vec<(usize, f64)> = iproduct!(0..sc.nctr(), 0..sd.nctr())
                        .map(|(kc, kd)| (kc * sd.nctr() + kd, sc.coefficients[kc][pc] * sd.coefficients[kd][pd]))
                        .filter(|w| w.1 != 0.0)
                        .collect();
                    if wcd.is_empty() {
                        continue;
                    }

                    let cd = PrimitivePair::new(c, &sc.center, sc.l, d, &sd.center, sd.l, 0);
                    let p = ab.p;
                    let q = cd.p;
                    let alpha = p * q / (p + q);
                    let R = HermiteR::new(lab + lcd, alpha, ab.P - cd.P);
                    let pref = 2.0 * PI.powf(2.5) / (p * q * (p + q).sqrt());

                    // W_cd[tuv] = sum (-1)^{tau+nu+phi} E^{cd} R_{t+tau, u+nu, v+phi}
                    W.iter_mut().for_each(|x| *x = 0.0);
                    for (icc, ic) in comps[2].iter().enumerate() {
                        for (idd, id) in comps[3].iter().enumerate() {
                            let ket = cd.expand(ic, id, true);
                            let w = &mut W[(icc * nc[3] + idd) * dim * dim * dim..][..dim * dim * dim];
                            for t in 0..=lab {
                                for u in 0..=(lab - t) {
                                    for v in 0..=(lab - t - u) {
                                        let mut s = 0.0;
                                        for &(tau, nu, phi, e) in &ket {
                                            s += e * R.get(t + tau, u + nu, v + phi);
                                        }
                                        w[tetra_index(dim, t, u, v)] = s;
                                    }
                                }
                            }
                        }
                    }

                    for (row, terms) in bra.iter().enumerate() {
                        for col in 0..bra_cols {
                            let w = &W[col * dim * dim * dim..][..dim * dim * dim];
                            let mut s = 0.0;
                            for &(k, e) in terms {
                                s += e * w[k];
                            }
                            prim[row * bra_cols + col] = pref * s;
                        }
                    }

                    for &(kcd, wgt) in &wcd {
                        let dst = &mut ket_acc[kcd * nprim_block..(kcd + 1) * nprim_block];
                        for (d, s) in dst.iter_mut().zip(&prim) {
                            *d += wgt * s;
                        }
                    }
                }
            }

            // scatter into the contracted cartesian block
            for &(ka, kb, wgt) in &wab {
                for kc in 0..sc.nctr() {
                    for kd in 0..sd.nctr() {
                        let src = &ket_acc[(kc * sd.nctr() + kd) * nprim_block..][..nprim_block];
                        for comp in 0..ncomp {
                            for ia in 0..nc[0] {
                                for ib in 0..nc[1] {
                                    for ic in 0..nc[2] {
                                        for id in 0..nc[3] {
                                            let s = src[(((comp * nc[0] + ia) * nc[1] + ib) * nc[2] + ic) * nc[3] + id];
                                            let ai = ka * nc[0] + ia;
                                            let bi = kb * nc[1] + ib;
                                            let ci = kc * nc[2] + ic;
                                            let di = kd * nc[3] + id;
                                            let dst = (((comp * full_dims[1] + ai) * full_dims[2] + bi) * full_dims[3]
                                                + ci)
                                                * full_dims[4]
                                                + di;
                                            acc[dst] += wgt * s;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    let mut data = acc;
    let mut dims = full_dims.to_vec();
    for (axis, shell) in shells.iter().enumerate() {
        let t = shell_c2s(basis, shell);
        let (d, n) = transform_axis(&data, &dims, axis + 1, &t);
        data = d;
        dims = n;
    }
    (data, dims)
}

fn pair_index(i: usize, j: usize) -> usize {
    if i >= j {
        i * (i + 1) / 2 + j
    } else {
        j * (j + 1) / 2 + i
    }
}

/// Electron repulsion integrals (mu nu | lambda sigma) in chemists' notation,
/// stored once per 8-fold permutation class.
#[derive(Debug, Clone)]
pub struct EriTensor {
    nao: usize,
    data: Vec<f64>,
}

impl EriTensor {
    pub fn build(basis: &MolecularBasis) -> Self {
        let nao = basis.nao();
        let npair = nao * (nao + 1) / 2;
        let nshell = basis.shells.len();

        let shell_pairs: Vec<(usize, usize)> = (0..nshell).flat_map(|i| (0..=i).map(move |j| (i, j))).collect();
        let quartets: Vec<[usize; 4]> = shell_pairs
            .iter()
            .enumerate()
            .flat_map(|(ij, &(i, j))| shell_pairs[..=ij].iter().map(move |&(k, l)| [i, j, k, l]))
            .collect();

        let blocks: Vec<([usize; 4], Vec<f64>, Vec<usize>)> = quartets
            .par_iter()
            .map(|&q| {
                let (data, dims) = quartet_block(basis, q, BraOperator::Plain);
                (q, data, dims)
            })
            .collect();

        let mut data = vec![0.0; npair * (npair + 1) / 2];
        for (q, block, dims) in blocks {
            let off: Vec<usize> = q.iter().map(|&s| basis.ao_offsets[s]).collect();
            for a in 0..dims[1] {
                for b in 0..dims[2] {
                    for c in 0..dims[3] {
                        for d in 0..dims[4] {
                            let v = block[((a * dims[2] + b) * dims[3] + c) * dims[4] + d];
                            let idx = Self::index(off[0] + a, off[1] + b, off[2] + c, off[3] + d);
                            data[idx] = v;
                        }
                    }
                }
            }
        }
        EriTensor { nao, data }
    }

    fn index(i: usize, j: usize, k: usize, l: usize) -> usize {
        pair_index(pair_index(i, j), pair_index(k, l))
    }

    pub fn nao(&self) -> usize {
        self.nao
    }

    pub fn get(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.data[Self::index(i, j, k, l)]
    }

    /// Coulomb and exchange matrices J_mn = (mn|ls) D_ls, K_mn = (ml|ns) D_ls.
    pub fn jk(&self, dm: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = self.nao;
        let zero = || (DMatrix::zeros(n, n), DMatrix::zeros(n, n));
        (0..n)
            .into_par_iter()
            .fold(zero, |(mut j, mut k), i| {
                for jj in 0..=i {
                    let ij = pair_index(i, jj);
                    for kk in 0..=i {
                        let lmax = if kk == i { jj } else { kk };
                        for ll in 0..=lmax {
                            let kl = pair_index(kk, ll);
                            debug_assert!(kl <= ij);
                            let v = self.data[pair_index(ij, kl)];
                            if v == 0.0 {
                                continue;
                            }
                            let perms = [
                                (i, jj, kk, ll),
                                (jj, i, kk, ll),
                                (i, jj, ll, kk),
                                (jj, i, ll, kk),
                                (kk, ll, i, jj),
                                (ll, kk, i, jj),
                                (kk, ll, jj, i),
                                (ll, kk, jj, i),
                            ];
                            for (p, &(a, b, c, d)) in perms.iter().enumerate() {
                                if perms[..p].contains(&(a, b, c, d)) {
                                    continue;
                                }
                                j[(a, b)] += v * dm[(c, d)];
                                k[(a, c)] += v * dm[(b, d)];
                            }
                        }
                    }
                }
                (j, k)
            })
            .reduce(zero, |(j1, k1), (j2, k2)| (j1 + j2, k1 + k2))
    }

    /// Full (mu nu | lambda sigma) as a row major nao^4 array.
    pub fn unpack(&self) -> Vec<f64> {
        let n = self.nao;
        let mut out = vec![0.0; n * n * n * n];
        out.par_chunks_mut(n * n * n).enumerate().for_each(|(i, chunk)| {
            for j in 0..n {
                for k in 0..n {
                    for l in 0..n {
                        chunk[(j * n + k) * n + l] = self.get(i, j, k, l);
                    }
                }
            }
        });
        out
    }

    /// (pq|rs) = sum C1_{mu p} C2_{nu q} C3_{lambda r} C4_{sigma s} (mu nu|lambda sigma).
    pub fn transform(&self, coeffs: [&DMatrix<f64>; 4]) -> Tensor4 {
        let n = self.nao;
        let mut data = self.unpack();
        let mut dims = vec![n; 4];
        for axis in (0..4).rev() {
            let (d, nd) = transform_axis(&data, &dims, axis, &coeffs[axis].transpose());
            data = d;
            dims = nd;
        }
        Tensor4 {
            dims: [dims[0], dims[1], dims[2], dims[3]],
            data,
        }
    }
}

/// Dense four index array, row major.
#[derive(Debug, Clone)]
pub struct Tensor4 {
    pub dims: [usize; 4],
    pub data: Vec<f64>,
}

impl Tensor4 {
    pub fn zeros(dims: [usize; 4]) -> Self {
        Tensor4 {
            dims,
            data: vec![0.0; dims.iter().product()],
        }
    }

    fn offset(&self, p: usize, q: usize, r: usize, s: usize) -> usize {
        ((p * self.dims[1] + q) * self.dims[2] + r) * self.dims[3] + s
    }

    pub fn get(&self, p: usize, q: usize, r: usize, s: usize) -> f64 {
        self.data[self.offset(p, q, r, s)]
    }

    pub fn set(&mut self, p: usize, q: usize, r: usize, s: usize, v: f64) {
        let o = self.offset(p, q, r, s);
        self.data[o] = v;
    }

    pub fn add(&mut self, p: usize, q: usize, r: usize, s: usize, v: f64) {
        let o = self.offset(p, q, r, s);
        self.data[o] += v;
    }
}

/// Spin-orbit two-electron Coulomb and exchange type contractions of
/// I_k[i,j,k,l] = (grad i x grad j | k l)_k with a spin-summed density:
/// vj[i,j] = I[i,j,k,l] D[l,k], vk[i,l] = I[i,j,k,l] D[j,k], vk2[k,j] = I[i,j,k,l] D[l,i].
///
/// With `amfi` only quartets on a single atom are kept.
pub fn spin_orbit_jk(
    basis: &MolecularBasis,
    dm: &DMatrix<f64>,
    amfi: bool,
) -> ([DMatrix<f64>; 3], [DMatrix<f64>; 3], [DMatrix<f64>; 3]) {
    let nao = basis.nao();
    let nshell = basis.shells.len();
    let atom = |s: usize| basis.shells[s].atom;

    let quartets: Vec<[usize; 4]> = (0..nshell)
        .flat_map(|i| (0..=i).map(move |j| (i, j)))
        .flat_map(|(i, j)| (0..nshell).flat_map(move |k| (0..=k).map(move |l| [i, j, k, l])))
        .filter(|q| !amfi || q.iter().all(|&s| atom(s) == atom(q[0])))
        .collect();

    type Acc = ([DMatrix<f64>; 3], [DMatrix<f64>; 3], [DMatrix<f64>; 3]);
    let zero3 = || {
        [
            DMatrix::zeros(nao, nao),
            DMatrix::zeros(nao, nao),
            DMatrix::zeros(nao, nao),
        ]
    };
    let zero = || -> Acc { (zero3(), zero3(), zero3()) };

    quartets
        .par_iter()
        .fold(zero, |(mut vj, mut vk, mut vk2), &q| {
            let (block, dims) = quartet_block(basis, q, BraOperator::Cross);
            let off: Vec<usize> = q.iter().map(|&s| basis.ao_offsets[s]).collect();
            let mirror_ij = q[0] != q[1];
            let mirror_kl = q[2] != q[3];
            for comp in 0..3 {
                for a in 0..dims[1] {
                    for b in 0..dims[2] {
                        for c in 0..dims[3] {
                            for d in 0..dims[4] {
                                let v = block[(((comp * dims[1] + a) * dims[2] + b) * dims[3] + c) * dims[4] + d];
                                if v == 0.0 {
                                    continue;
                                }
                                let (i, j, k, l) = (off[0] + a, off[1] + b, off[2] + c, off[3] + d);
                                let mut images = vec![(i, j, k, l, v)];
                                if mirror_ij {
                                    images.push((j, i, k, l, -v));
                                }
                                if mirror_kl {
                                    images.push((i, j, l, k, v));
                                    if mirror_ij {
                                        images.push((j, i, l, k, -v));
                                    }
                                }
                                for (i, j, k, l, v) in images {
                                    vj[comp][(i, j)] += v * dm[(l, k)];
                                    vk[comp][(i, l)] += v * dm[(j, k)];
                                    vk2[comp][(k, j)] += v * dm[(l, i)];
                                }
                            }
                        }
                    }
                }
            }
            (vj, vk, vk2)
        })
        .reduce(zero, |a, b| {
            let add = |x: [DMatrix<f64>; 3], y: [DMatrix<f64>; 3]| {
                let [x0, x1, x2] = x;
                let [y0, y1, y2] = y;
                [x0 + y0, x1 + y1, x2 + y2]
            };
            (add(a.0, b.0), add(a.1, b.1), add(a.2, b.2))
        })
}

/// Two-electron spin-orbit mean field vj - 3/2 (vk + vk2).
pub fn spin_orbit_mean_field(basis: &MolecularBasis, dm: &DMatrix<f64>, amfi: bool) -> [DMatrix<f64>; 3] {
    let (vj, vk, vk2) = spin_orbit_jk(basis, dm, amfi);
    let [j0, j1, j2] = vj;
    let [k0, k1, k2] = vk;
    let [q0, q1, q2] = vk2;
    [
        j0 - (k0 + q0) * 1.5,
        j1 - (k1 + q1) * 1.5,
        j2 - (k2 + q2) * 1.5,
    ]
}

/// Nuclear repulsion sum_{A<B} Z_A Z_B / R_AB.
pub fn nuclear_repulsion(charges: &[f64], coords: &[Vector3<f64>]) -> f64 {
    let mut e = 0.0;
    for a in 0..charges.len() {
        for b in 0..a {
            e += charges[a] * charges[b] / (coords[a] - coords[b]).norm();
        }
    }
    e
}

#[cfg(test)]
mod tests;
