//! Spin-free exact two-component (X2C-1e) core Hamiltonian
//!
//! The one-electron Dirac problem is solved in the modified-Dirac form in the
//! uncontracted basis, the positive-energy block is decoupled with
//! X = C_S C_L^-1, renormalized, and projected back onto the contracted basis.

use basis::integrals::{kinetic, nuclear, overlap, pvp};
use basis::MolecularBasis;
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Speed of light in atomic units
pub const LIGHT_SPEED: f64 = 137.03599967994;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relativity {
    NonRelativistic,
    SfX2C1e,
}

impl Relativity {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "nr" | "nonrelativistic" => Ok(Relativity::NonRelativistic),
            "sfx2c1e" | "sfx2c" | "x2c" => Ok(Relativity::SfX2C1e),
            other => Err(eyre!("Unknown relativistic treatment '{}'", other)),
        }
    }
}

/// Core Hamiltonian T + V, or its sf-X2C-1e counterpart.
pub fn core_hamiltonian(basis: &MolecularBasis, relativity: Relativity) -> Result<DMatrix<f64>> {
    match relativity {
        Relativity::NonRelativistic => Ok(kinetic(basis) + nuclear(basis)),
        Relativity::SfX2C1e => sfx2c1e_hcore(basis, LIGHT_SPEED),
    }
}

/// f(A) for a symmetric matrix through its eigendecomposition, skipping
/// eigenvalues below `threshold`.
fn symmetric_function(a: &DMatrix<f64>, threshold: f64, f: impl Fn(f64) -> f64) -> DMatrix<f64> {
    let eig = a.clone().symmetric_eigen();
    let vals = DVector::from_iterator(
        eig.eigenvalues.len(),
        eig.eigenvalues
            .iter()
            .map(|&w| if w > threshold { f(w) } else { 0.0 }),
    );
    &eig.eigenvectors * DMatrix::from_diagonal(&vals) * eig.eigenvectors.transpose()
}

/// Solve H C = M C E for symmetric H and positive definite M, eigenvalues ascending.
fn generalized_eigh(h: &DMatrix<f64>, m: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let n = h.nrows();
    let chol = m
        .clone()
        .cholesky()
        .ok_or_else(|| eyre!("X2C metric is not positive definite"))?;
    let l_inv = chol
        .l()
        .solve_lower_triangular(&DMatrix::identity(n, n))
        .ok_or_else(|| eyre!("X2C metric Cholesky factor is singular"))?;
    let a = &l_inv * h * l_inv.transpose();
    let a = (&a + a.transpose()) * 0.5;
    let eig = a.symmetric_eigen();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[i]
            .partial_cmp(&eig.eigenvalues[j])
            .unwrap_or(Ordering::Equal)
    });
    let values = DVector::from_fn(n, |i, _| eig.eigenvalues[order[i]]);
    let vectors = l_inv.transpose() * eig.eigenvectors.select_columns(&order);
    Ok((values, vectors))
}

/// Spin-free X2C-1e core Hamiltonian in the contracted basis.
pub fn sfx2c1e_hcore(basis: &MolecularBasis, c: f64) -> Result<DMatrix<f64>> {
    let (unc, contraction) = basis.uncontract();
    let n = unc.nao();
    info!(
        "sf-X2C-1e: {} contracted / {} uncontracted functions",
        basis.nao(),
        n
    );

    let s = overlap(&unc);
    let t = kinetic(&unc);
    let v = nuclear(&unc);
    let w = pvp(&unc);
    let c2 = c * c;
    let w_scaled = &w * (0.25 / c2) - &t;

    let mut h4 = DMatrix::zeros(2 * n, 2 * n);
    h4.view_mut((0, 0), (n, n)).copy_from(&v);
    h4.view_mut((0, n), (n, n)).copy_from(&t);
    h4.view_mut((n, 0), (n, n)).copy_from(&t);
    h4.view_mut((n, n), (n, n)).copy_from(&w_scaled);

    let mut m4 = DMatrix::zeros(2 * n, 2 * n);
    m4.view_mut((0, 0), (n, n)).copy_from(&s);
    m4.view_mut((n, n), (n, n)).copy_from(&(&t * (0.5 / c2)));

    let (e, cvec) = generalized_eigh(&h4, &m4)?;
    debug!(
        "sf-X2C-1e: lowest positive-energy level {:.10}, highest negative-energy level {:.6}",
        e[n],
        e[n - 1]
    );

    let c_large = cvec.view((0, n), (n, n)).into_owned();
    let c_small = cvec.view((n, n), (n, n)).into_owned();
    let c_large_inv = c_large
        .try_inverse()
        .ok_or_else(|| eyre!("X2C large-component block is singular"))?;
    let x = c_small * c_large_inv;

    // renormalization R = S^-1/2 (S^-1/2 S~ S^-1/2)^-1/2 S^1/2
    let s_tilde = &s + x.transpose() * &t * &x * (0.5 / c2);
    let s_half = symmetric_function(&s, 1e-14, f64::sqrt);
    let s_inv_half = symmetric_function(&s, 1e-14, |w| 1.0 / w.sqrt());
    let inner = &s_inv_half * &s_tilde * &s_inv_half;
    let inner = (&inner + inner.transpose()) * 0.5;
    let inner_inv_half = symmetric_function(&inner, 1e-14, |w| 1.0 / w.sqrt());
    let r = &s_inv_half * inner_inv_half * &s_half;

    let h1 = &v + &t * &x + x.transpose() * &t + x.transpose() * &w_scaled * &x;
    let h = r.transpose() * h1 * &r;
    let h = contraction.transpose() * h * &contraction;
    Ok((&h + h.transpose()) * 0.5)
}
