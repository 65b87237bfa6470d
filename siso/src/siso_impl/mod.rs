//! Spin-orbit state interaction
//!
//! Couples spin-free CI states of different Ms through the one-electron
//! spin-orbit mean-field operator and diagonalizes the resulting complex
//! Hermitian matrix.

mod siso;
#[cfg(test)]
mod tests;

pub use siso::{project_to_active, spin_orbit_ao, StateDescriptor, SISO};
