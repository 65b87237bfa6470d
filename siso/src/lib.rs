//! State-averaged CASSCF and spin-orbit state interaction for atoms.

pub mod app;
pub mod config;
pub mod fci_impl;
pub mod io;
pub mod mcscf_impl;
pub mod mole;
pub mod scf_impl;
pub mod siso_impl;
pub mod x2c;
