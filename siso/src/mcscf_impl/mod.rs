//! Multi-configurational SCF
//!
//! State-averaged CASSCF over a mix of FCI solvers. The orbitals are
//! optimized with a diagonal-Hessian Newton step, capped in length and
//! backtracked on energy increase, applied as C' = C exp(X).
//!
//! # Usage
//!
//! ```rust,ignore
//! let mix = StateAverageMix::uniform(vec![FCISolver::new(2, 3), FCISolver::new(0, 8)])?;
//! let mc = CASSCF::new(h_core, eri, energy_nuc, nelectron, 4, 4, mix)?;
//! let result = mc.kernel(&scf.coeffs)?;
//! let dmao = result.make_rdm1_ao();
//! ```

mod casscf;

pub use casscf::{CasResult, StateAverageMix, CASSCF};

use nalgebra::DMatrix;

/// exp(X) by scaling and squaring of a truncated Taylor series
pub fn expmat(x: &DMatrix<f64>) -> DMatrix<f64> {
    let n = x.nrows();
    let norm = x.norm();
    let mut scale = 1.0;
    let mut squarings = 0;
    while norm * scale > 0.5 {
        scale *= 0.5;
        squarings += 1;
    }
    let y = x * scale;
    let mut result = DMatrix::identity(n, n);
    let mut term = DMatrix::identity(n, n);
    for k in 1..=14 {
        term = (&term * &y) * (1.0 / k as f64);
        result += &term;
    }
    for _ in 0..squarings {
        result = &result * &result;
    }
    result
}
