//! SCF implementations with DIIS acceleration
//!
//! This module provides the SCF trait definition, DIIS (Direct Inversion in the Iterative Subspace)
//! convergence acceleration, and the restricted Hartree-Fock solver used as the CASSCF starting point.

mod rhf;

pub use rhf::RestrictedHF;

use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use tracing::debug;

/// The SCF trait defines the interface for Self-Consistent Field calculations
pub trait SCF {
    fn init_density_matrix(&mut self);
    fn update_density_matrix(&mut self);
    fn update_fock_matrix(&mut self);
    /// Iterate to self-consistency, returns whether convergence was reached
    fn scf_cycle(&mut self) -> bool;
    fn calculate_total_energy(&self) -> f64;
}

/// DIIS (Direct Inversion in the Iterative Subspace) convergence accelerator
///
/// The error matrix is the commutator E = FDS - SDF. The extrapolated Fock
/// matrix is F_DIIS = sum c_i F_i, with the c_i minimizing ||sum c_i E_i||^2
/// subject to sum c_i = 1.
#[derive(Clone)]
pub struct DIIS {
    error_matrices: Vec<DMatrix<f64>>,
    fock_matrices: Vec<DMatrix<f64>>,
    max_subspace_size: usize,
}

impl DIIS {
    pub fn new(max_subspace_size: usize) -> Self {
        DIIS {
            error_matrices: Vec::new(),
            fock_matrices: Vec::new(),
            max_subspace_size,
        }
    }

    /// Calculate DIIS error matrix: FDS - SDF
    pub fn calculate_error_matrix(
        &self,
        fock: &DMatrix<f64>,
        density: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
    ) -> DMatrix<f64> {
        let fds = fock * density * overlap;
        let sdf = overlap * density * fock;
        fds - sdf
    }

    /// Store a Fock matrix and its error, dropping the oldest pair when full.
    pub fn update(
        &mut self,
        fock_matrix: DMatrix<f64>,
        density_matrix: &DMatrix<f64>,
        overlap_matrix: &DMatrix<f64>,
    ) -> f64 {
        let error = self.calculate_error_matrix(&fock_matrix, density_matrix, overlap_matrix);
        let max_error = error.amax();

        if self.error_matrices.len() >= self.max_subspace_size {
            self.error_matrices.remove(0);
            self.fock_matrices.remove(0);
        }

        self.error_matrices.push(error);
        self.fock_matrices.push(fock_matrix);
        max_error
    }

    /// Extrapolate optimal Fock matrix from DIIS subspace
    ///
    /// Returns None if the DIIS equations cannot be solved (e.g., singular B matrix).
    pub fn extrapolate(&self) -> Option<DMatrix<f64>> {
        let n = self.error_matrices.len();
        if n == 0 {
            return None;
        }

        // B_ij = <e_i|e_j> bordered by the normalization constraint
        let mut b = DMatrix::zeros(n + 1, n + 1);
        for i in 0..n {
            for j in 0..=i {
                let bij = self.error_matrices[i].dot(&self.error_matrices[j]);
                b[(i, j)] = bij;
                b[(j, i)] = bij;
            }
            b[(i, n)] = -1.0;
            b[(n, i)] = -1.0;
        }

        let mut rhs = DVector::zeros(n + 1);
        rhs[n] = -1.0;

        let coeffs = match b.lu().solve(&rhs) {
            Some(x) => x,
            None => {
                debug!("DIIS extrapolation failed: singular B matrix");
                return None;
            }
        };

        let mut fock_extrapolated =
            DMatrix::zeros(self.fock_matrices[0].nrows(), self.fock_matrices[0].ncols());
        for i in 0..n {
            fock_extrapolated += &self.fock_matrices[i] * coeffs[i];
        }
        Some(fock_extrapolated)
    }

    /// Clear the DIIS history
    pub fn reset(&mut self) {
        self.error_matrices.clear();
        self.fock_matrices.clear();
    }

    /// Get the number of vectors currently in the DIIS subspace
    pub fn size(&self) -> usize {
        self.error_matrices.len()
    }
}

/// Given a matrix where each column is an eigenvector,
/// this function aligns each eigenvector so that the entry with the largest
/// absolute value is positive.
pub fn align_eigenvectors(mut eigvecs: DMatrix<f64>) -> DMatrix<f64> {
    for j in 0..eigvecs.ncols() {
        let max_val = eigvecs
            .column(j)
            .iter()
            .copied()
            .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Less))
            .unwrap_or(0.0);
        if max_val < 0.0 {
            eigvecs.column_mut(j).neg_mut();
        }
    }
    eigvecs
}

/// Canonical orthogonalizer X = U s^-1/2 with near-linear dependencies
/// (overlap eigenvalues below `threshold`) removed, so X^T S X = 1.
pub fn canonical_orthogonalizer(overlap: &DMatrix<f64>, threshold: f64) -> DMatrix<f64> {
    let eig = overlap.clone().symmetric_eigen();
    let mut keep: Vec<usize> = (0..eig.eigenvalues.len())
        .filter(|&i| eig.eigenvalues[i] > threshold)
        .collect();
    keep.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .partial_cmp(&eig.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });
    let mut x = eig.eigenvectors.select_columns(&keep);
    for (col, &i) in keep.iter().enumerate() {
        x.column_mut(col).scale_mut(1.0 / eig.eigenvalues[i].sqrt());
    }
    x
}

/// Diagonalize a Fock matrix in an orthogonal basis: returns ascending
/// orbital energies and AO coefficients C = X C'.
pub fn diagonalize_fock(fock: &DMatrix<f64>, x: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let f_prime = x.transpose() * fock * x;
    let f_prime = (&f_prime + f_prime.transpose()) * 0.5;
    let eig = f_prime.symmetric_eigen();

    let mut indices: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    indices.sort_by(|&a, &b| {
        eig.eigenvalues[a]
            .partial_cmp(&eig.eigenvalues[b])
            .unwrap_or(Ordering::Equal)
    });
    let sorted_eigenvalues =
        DVector::from_fn(eig.eigenvalues.len(), |i, _| eig.eigenvalues[indices[i]]);
    let sorted_eigenvectors = eig.eigenvectors.select_columns(&indices);
    (sorted_eigenvalues, align_eigenvectors(x * sorted_eigenvectors))
}
