//! Full configuration interaction in an active space
//!
//! Provides the determinant space, dense Hamiltonian diagonalization with an
//! optional spin penalty, reduced density matrices and spin-resolved
//! transition densities.
//!
//! # Usage
//!
//! ```rust,ignore
//! let solver = FCISolver::new(2, 3).fix_spin(0.2, 2.0);
//! let roots = solver.kernel(&h1, &eri, ncas, nelecas, ecore)?;
//! let (dm1, dm2) = make_rdm12(&roots.ci[0], ncas, roots.nelec)?;
//! ```

mod fci;
#[cfg(test)]
pub(crate) mod tests;

pub use fci::{
    make_rdm1, make_rdm12, make_strings, spin_flip, spin_square, trans_rdm1_raise, trans_rdm1s,
    Excitation, FCISolver, FciResult, FciSpace, Spin,
};
