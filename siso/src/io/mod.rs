//! Input/Output operations
//!
//! This module handles logging setup and basis set loading.

mod basis_loader;
mod output;

pub use basis_loader::{canonical_basis_name, fetch_basis, BasisSource};
pub use output::{level_for_verbosity, setup_output};
