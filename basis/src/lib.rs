//! Gaussian basis sets and molecular integrals.

pub mod basis;
pub mod cgto;
pub mod error;
pub mod gto;
pub mod helper;
pub mod integrals;
pub mod spherical;

pub use basis::{MolecularBasis, Shell};
pub use cgto::{BasisFormat, ContractedShell, ElementBasis};
pub use error::BasisError;
pub use integrals::{EriTensor, Tensor4};
