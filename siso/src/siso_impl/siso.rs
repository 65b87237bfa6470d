use crate::fci_impl::{trans_rdm1_raise, trans_rdm1s, FciSpace};
use crate::x2c::LIGHT_SPEED;
use basis::integrals::{spin_orbit_mean_field, spin_orbit_nuclear};
use basis::MolecularBasis;
use color_eyre::eyre::{bail, Result, WrapErr};
use nalgebra::DMatrix;
use num_complex::Complex64;
use std::cmp::Ordering;
use tracing::{debug, info};

/// A spin-free CI state with its spin labels
#[derive(Debug, Clone)]
pub struct StateDescriptor {
    /// active (N(alpha), N(beta))
    pub nelec: (usize, usize),
    /// 2S
    pub two_s: i32,
    /// 2Ms
    pub two_ms: i32,
    pub energy: f64,
    pub ci: DMatrix<f64>,
}

/// Real AO matrices A_k of the spin-orbit operator h_k = i A_k (k = x, y, z):
/// A_k = alpha^2 / 2 * qed_factor * (P_k + two-electron mean field of `dmao`).
pub fn spin_orbit_ao(
    basis: &MolecularBasis,
    dmao: &DMatrix<f64>,
    amfi: bool,
    qed_factor: f64,
) -> [DMatrix<f64>; 3] {
    let one = spin_orbit_nuclear(basis);
    let two = spin_orbit_mean_field(basis, dmao, amfi);
    let prefactor = qed_factor / (2.0 * LIGHT_SPEED * LIGHT_SPEED);
    let [p0, p1, p2] = one;
    let [v0, v1, v2] = two;
    [
        (p0 + v0) * prefactor,
        (p1 + v1) * prefactor,
        (p2 + v2) * prefactor,
    ]
}

/// Ca^T A Ca for each component
pub fn project_to_active(
    ao: &[DMatrix<f64>; 3],
    mo_coeff: &DMatrix<f64>,
    ncore: usize,
    ncas: usize,
) -> [DMatrix<f64>; 3] {
    let ca = mo_coeff.columns(ncore, ncas);
    [
        ca.transpose() * &ao[0] * &ca,
        ca.transpose() * &ao[1] * &ca,
        ca.transpose() * &ao[2] * &ca,
    ]
}

pub struct SISO {
    pub states: Vec<StateDescriptor>,
    pub ncas: usize,
}

impl SISO {
    pub fn new(states: Vec<StateDescriptor>, ncas: usize) -> Result<Self> {
        if states.is_empty() {
            bail!("No states to couple");
        }
        for (i, st) in states.iter().enumerate() {
            let (na, nb) = st.nelec;
            if st.two_ms != na as i32 - nb as i32 {
                bail!(
                    "State {}: 2Ms = {} does not match ({}, {}) electrons",
                    i,
                    st.two_ms,
                    na,
                    nb
                );
            }
            if st.two_s < 0 || st.two_ms.abs() > st.two_s || (st.two_s - st.two_ms) % 2 != 0 {
                bail!("State {}: 2Ms = {} is not a component of 2S = {}", i, st.two_ms, st.two_s);
            }
            let space = FciSpace::new(ncas, st.nelec)
                .wrap_err_with(|| format!("State {} does not fit the active space", i))?;
            if st.ci.shape() != space.shape() {
                bail!(
                    "State {}: CI vector of shape {:?}, expected {:?} for {:?} electrons in {} orbitals",
                    i,
                    st.ci.shape(),
                    space.shape(),
                    st.nelec,
                    ncas
                );
            }
        }
        Ok(SISO { states, ncas })
    }

    pub fn nstates(&self) -> usize {
        self.states.len()
    }

    /// <I|H_SO|J> for the active-space matrices A_k of h_k = i A_k.
    ///
    /// With the spin operator s = sigma / 2:
    /// same Ms:  i/2 sum_pq A_z (<a+_pa a_qa> - <a+_pb a_qb>),
    /// raising:  1/2 sum_pq (A_y + i A_x) <a+_pa a_qb>,
    /// lowering fills the Hermitian partner.
    fn coupling(&self, hso: &[DMatrix<f64>; 3]) -> Result<DMatrix<Complex64>> {
        let n = self.nstates();
        let norb = self.ncas;
        let mut h = DMatrix::from_element(n, n, Complex64::new(0.0, 0.0));
        for (i, bra) in self.states.iter().enumerate() {
            for (j, ket) in self.states.iter().enumerate() {
                let (na, nb) = ket.nelec;
                if bra.nelec == ket.nelec {
                    let (dm_a, dm_b) = trans_rdm1s(&bra.ci, &ket.ci, norb, ket.nelec)?;
                    let val = 0.5 * hso[2].dot(&(dm_a - dm_b));
                    h[(i, j)] += Complex64::new(0.0, val);
                } else if nb > 0 && bra.nelec == (na + 1, nb - 1) {
                    let dm = trans_rdm1_raise(&bra.ci, &ket.ci, norb, ket.nelec)?;
                    let val = Complex64::new(0.5 * hso[1].dot(&dm), 0.5 * hso[0].dot(&dm));
                    h[(i, j)] += val;
                    h[(j, i)] += val.conj();
                }
            }
        }
        Ok(h)
    }

    /// Spin-free energies on the diagonal plus the spin-orbit coupling
    pub fn hamiltonian(&self, hso: &[DMatrix<f64>; 3]) -> Result<DMatrix<Complex64>> {
        for (k, m) in hso.iter().enumerate() {
            if m.shape() != (self.ncas, self.ncas) {
                bail!(
                    "Spin-orbit component {} has shape {:?}, expected ({}, {})",
                    k,
                    m.shape(),
                    self.ncas,
                    self.ncas
                );
            }
        }
        let mut h = self.coupling(hso)?;
        for (i, st) in self.states.iter().enumerate() {
            h[(i, i)] += Complex64::new(st.energy, 0.0);
        }
        Ok(h)
    }

    /// Ascending eigenvalues of the spin-orbit Hamiltonian
    pub fn kernel(&self, hso: &[DMatrix<f64>; 3]) -> Result<Vec<f64>> {
        let h = self.hamiltonian(hso)?;
        let asym = (&h - h.adjoint()).iter().map(|z| z.norm()).fold(0.0, f64::max);
        debug!("SISO Hamiltonian anti-Hermitian residue {:.3e}", asym);
        let herm = (&h + h.adjoint()) * Complex64::new(0.5, 0.0);
        let mut energies: Vec<f64> = herm.symmetric_eigen().eigenvalues.iter().copied().collect();
        energies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        info!("SISO: {} states", energies.len());
        for (i, e) in energies.iter().enumerate() {
            debug!("SO state {}  E = {:.12}", i, e);
        }
        Ok(energies)
    }
}
