//! Restricted Hartree-Fock with DIIS, level shift and damping

use super::{canonical_orthogonalizer, diagonalize_fock, DIIS, SCF};
use basis::EriTensor;
use color_eyre::eyre::{bail, Result};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RestrictedHF {
    pub num_basis: usize,
    pub num_occ: usize,
    pub h_core: DMatrix<f64>,
    pub overlap_matrix: DMatrix<f64>,
    pub eri: Arc<EriTensor>,
    pub energy_nuc: f64,
    pub coeffs: DMatrix<f64>,
    pub e_level: DVector<f64>,
    pub density_matrix: DMatrix<f64>,
    pub fock_matrix: DMatrix<f64>,
    pub max_cycle: usize,
    pub convergence_threshold: f64,
    pub level_shift: f64,
    pub damping: f64,
    pub diis: Option<DIIS>,
    pub converged: bool,
    pub e_tot: f64,
    orthogonalizer: DMatrix<f64>,
}

impl RestrictedHF {
    pub fn new(
        h_core: DMatrix<f64>,
        overlap_matrix: DMatrix<f64>,
        eri: Arc<EriTensor>,
        nelec: (usize, usize),
        energy_nuc: f64,
    ) -> Result<Self> {
        if nelec.0 != nelec.1 {
            bail!(
                "Restricted Hartree-Fock needs a closed shell, got {} alpha and {} beta electrons",
                nelec.0,
                nelec.1
            );
        }
        let num_basis = h_core.nrows();
        let orthogonalizer = canonical_orthogonalizer(&overlap_matrix, 1e-9);
        let nmo = orthogonalizer.ncols();
        if nelec.0 > nmo {
            bail!("{} doubly occupied orbitals requested but only {} orbitals", nelec.0, nmo);
        }
        if nmo < num_basis {
            info!("Removed {} linearly dependent functions", num_basis - nmo);
        }
        Ok(RestrictedHF {
            num_basis,
            num_occ: nelec.0,
            h_core,
            overlap_matrix,
            eri,
            energy_nuc,
            coeffs: DMatrix::zeros(num_basis, nmo),
            e_level: DVector::zeros(nmo),
            density_matrix: DMatrix::zeros(num_basis, num_basis),
            fock_matrix: DMatrix::zeros(num_basis, num_basis),
            max_cycle: 100,
            convergence_threshold: 1e-10,
            level_shift: 0.0,
            damping: 0.0,
            diis: None,
            converged: false,
            e_tot: 0.0,
            orthogonalizer,
        })
    }

    pub fn enable_diis(&mut self, subspace_size: usize) {
        if subspace_size > 0 {
            self.diis = Some(DIIS::new(subspace_size));
            info!("DIIS enabled with subspace size {}", subspace_size);
        } else {
            self.diis = None;
        }
    }

    pub fn set_convergence_threshold(&mut self, threshold: f64) {
        self.convergence_threshold = threshold;
        info!("Convergence threshold set to {:e}", threshold);
    }

    /// Energy change threshold, never below 16 ulps of the energy itself
    pub(crate) fn energy_threshold(&self, energy: f64) -> f64 {
        let floor = 16.0 * f64::EPSILON * energy.abs();
        if floor > self.convergence_threshold {
            debug!(
                "conv_tol {:e} is below the precision of E = {:.6}, using {:e}",
                self.convergence_threshold, energy, floor
            );
            floor
        } else {
            self.convergence_threshold
        }
    }

    fn gradient_threshold(&self) -> f64 {
        self.convergence_threshold.sqrt().max(1e-10)
    }

    fn density_from_coeffs(&self) -> DMatrix<f64> {
        let occupied = self.coeffs.columns(0, self.num_occ);
        2.0 * &occupied * occupied.transpose()
    }

    /// Shift the virtual space up by `level_shift`: F + shift (S - S D S / 2).
    fn shifted(&self, fock: DMatrix<f64>) -> DMatrix<f64> {
        if self.level_shift == 0.0 {
            return fock;
        }
        let s = &self.overlap_matrix;
        let sds = s * &self.density_matrix * s;
        fock + (s - sds * 0.5) * self.level_shift
    }

    fn orbital_gradient(&self) -> f64 {
        let x = &self.orthogonalizer;
        let s = &self.overlap_matrix;
        let d = &self.density_matrix;
        let f = &self.fock_matrix;
        let comm = f * d * s - s * d * f;
        (x.transpose() * comm * x).amax()
    }

    pub fn run(&mut self) -> Result<f64> {
        self.init_density_matrix();
        if !self.scf_cycle() {
            warn!(
                "SCF not converged in {} cycles, continuing with the last iterate",
                self.max_cycle
            );
        }
        Ok(self.e_tot)
    }
}

impl SCF for RestrictedHF {
    fn init_density_matrix(&mut self) {
        let (e, c) = diagonalize_fock(&self.h_core, &self.orthogonalizer);
        self.e_level = e;
        self.coeffs = c;
        self.density_matrix = self.density_from_coeffs();
        self.update_fock_matrix();
    }

    fn update_density_matrix(&mut self) {
        let new_density = self.density_from_coeffs();
        if self.damping > 0.0 && self.density_matrix.iter().any(|&x| x != 0.0) {
            self.density_matrix =
                new_density * (1.0 - self.damping) + &self.density_matrix * self.damping;
        } else {
            self.density_matrix = new_density;
        }
    }

    fn update_fock_matrix(&mut self) {
        let (j, k) = self.eri.jk(&self.density_matrix);
        self.fock_matrix = &self.h_core + j - k * 0.5;
    }

    fn scf_cycle(&mut self) -> bool {
        let mut old_energy = self.calculate_total_energy();
        info!("Initial guess energy: {:.12} au", old_energy);
        if let Some(diis) = self.diis.as_mut() {
            diis.reset();
        }
        self.converged = false;

        for cycle in 0..self.max_cycle {
            let mut fock = self.fock_matrix.clone();
            if let Some(diis) = self.diis.as_mut() {
                diis.update(fock.clone(), &self.density_matrix, &self.overlap_matrix);
                if let Some(extrapolated) = diis.extrapolate() {
                    fock = extrapolated;
                }
            }
            let fock = self.shifted(fock);

            let (e, c) = diagonalize_fock(&fock, &self.orthogonalizer);
            self.e_level = e;
            self.coeffs = c;
            self.update_density_matrix();
            self.update_fock_matrix();

            let total_energy = self.calculate_total_energy();
            let energy_change = total_energy - old_energy;
            let gradient = self.orbital_gradient();
            info!(
                "Cycle {}: E = {:.12} au, dE = {:.3e} au, |g| = {:.3e}",
                cycle, total_energy, energy_change, gradient
            );
            old_energy = total_energy;

            let energy_threshold = self.energy_threshold(total_energy);
            if energy_change.abs() < energy_threshold && gradient < self.gradient_threshold()
            {
                info!("SCF converged in {} cycles.", cycle + 1);
                self.converged = true;
                break;
            }
        }

        // canonical orbitals of the final Fock matrix
        let (e, c) = diagonalize_fock(&self.fock_matrix, &self.orthogonalizer);
        self.e_level = e;
        self.coeffs = c;
        self.e_tot = old_energy;
        debug!("Orbital energies: {:?}", self.e_level.as_slice());
        self.converged
    }

    fn calculate_total_energy(&self) -> f64 {
        let hf = &self.h_core + &self.fock_matrix;
        0.5 * self.density_matrix.dot(&hf) + self.energy_nuc
    }
}
