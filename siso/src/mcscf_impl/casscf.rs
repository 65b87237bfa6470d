//! State-averaged CASSCF

use super::expmat;
use crate::fci_impl::{make_rdm12, FCISolver, FciResult};
use basis::{EriTensor, Tensor4};
use color_eyre::eyre::{bail, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Weighted states of several FCI solvers sharing one set of orbitals.
///
/// Weights run over the roots of all solvers in order, first solver first.
#[derive(Debug, Clone)]
pub struct StateAverageMix {
    pub solvers: Vec<FCISolver>,
    pub weights: Vec<f64>,
}

impl StateAverageMix {
    pub fn new(solvers: Vec<FCISolver>, weights: Vec<f64>) -> Result<Self> {
        if solvers.is_empty() {
            bail!("State averaging needs at least one CI solver");
        }
        let nroots: usize = solvers.iter().map(|s| s.nroots).sum();
        if weights.len() != nroots {
            bail!(
                "{} state weights given for {} roots",
                weights.len(),
                nroots
            );
        }
        if weights.iter().any(|&w| w < 0.0) {
            bail!("State weights must be non-negative: {:?}", weights);
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > 1e-8 {
            bail!("State weights sum to {}, expected 1", total);
        }
        Ok(StateAverageMix { solvers, weights })
    }

    /// Equal weight on every root
    pub fn uniform(solvers: Vec<FCISolver>) -> Result<Self> {
        let nroots: usize = solvers.iter().map(|s| s.nroots).sum();
        if nroots == 0 {
            bail!("State averaging needs at least one root");
        }
        Self::new(solvers, vec![1.0 / nroots as f64; nroots])
    }

    pub fn nroots(&self) -> usize {
        self.weights.len()
    }

    pub fn kernel(
        &self,
        h1: &DMatrix<f64>,
        eri: &Tensor4,
        norb: usize,
        nelecas: usize,
        ecore: f64,
    ) -> Result<Vec<FciResult>> {
        self.solvers
            .par_iter()
            .map(|s| s.kernel(h1, eri, norb, nelecas, ecore))
            .collect()
    }
}

/// Converged (or last) CASSCF iterate
#[derive(Debug, Clone)]
pub struct CasResult {
    /// state-averaged energy
    pub e_tot: f64,
    pub e_states: Vec<f64>,
    pub ci: Vec<DMatrix<f64>>,
    /// solver each state came from
    pub state_solver: Vec<usize>,
    pub state_nelec: Vec<(usize, usize)>,
    pub state_spin_square: Vec<f64>,
    pub mo_coeff: DMatrix<f64>,
    pub ncore: usize,
    pub ncas: usize,
    pub nelecas: usize,
    /// state-averaged active one-particle density
    pub casdm1: DMatrix<f64>,
    pub converged: bool,
}

impl CasResult {
    /// State-averaged AO density 2 Cc Cc^T + Ca dm1 Ca^T
    pub fn make_rdm1_ao(&self) -> DMatrix<f64> {
        let cc = self.mo_coeff.columns(0, self.ncore);
        let ca = self.mo_coeff.columns(self.ncore, self.ncas);
        2.0 * &cc * cc.transpose() + &ca * &self.casdm1 * ca.transpose()
    }

    /// (N(alpha), N(beta)) of the active electrons, one pair per solver
    pub fn nelecas_per_solver(&self) -> Vec<(usize, usize)> {
        let mut out: Vec<(usize, usize)> = Vec::new();
        for (k, &s) in self.state_solver.iter().enumerate() {
            if s == out.len() {
                out.push(self.state_nelec[k]);
            }
        }
        out
    }
}

/// Energy and orbital derivatives at one set of orbitals
struct Evaluation {
    mo_coeff: DMatrix<f64>,
    e_tot: f64,
    roots: Vec<FciResult>,
    casdm1: DMatrix<f64>,
    gradient: Vec<f64>,
    hdiag: Vec<f64>,
}

impl Evaluation {
    fn gradient_norm(&self) -> f64 {
        self.gradient.iter().map(|g| g * g).sum::<f64>().sqrt()
    }
}

pub struct CASSCF {
    pub ncore: usize,
    pub ncas: usize,
    pub nelecas: usize,
    pub fcisolver: StateAverageMix,
    pub conv_tol: f64,
    pub conv_tol_grad: f64,
    pub max_cycle_macro: usize,
    pub max_stepsize: f64,
    h_core: DMatrix<f64>,
    eri: Arc<EriTensor>,
    energy_nuc: f64,
}

impl CASSCF {
    pub fn new(
        h_core: DMatrix<f64>,
        eri: Arc<EriTensor>,
        energy_nuc: f64,
        nelectron: usize,
        ncas: usize,
        nelecas: usize,
        fcisolver: StateAverageMix,
    ) -> Result<Self> {
        if nelecas > nelectron || (nelectron - nelecas) % 2 != 0 {
            bail!(
                "{} active electrons cannot be taken from {} electrons with a closed-shell core",
                nelecas,
                nelectron
            );
        }
        if nelecas > 2 * ncas {
            bail!("{} electrons do not fit in {} active orbitals", nelecas, ncas);
        }
        for solver in &fcisolver.solvers {
            solver.nelec(nelecas)?;
        }
        let ncore = (nelectron - nelecas) / 2;
        Ok(CASSCF {
            ncore,
            ncas,
            nelecas,
            fcisolver,
            conv_tol: 1e-7,
            conv_tol_grad: 1e-7f64.sqrt(),
            max_cycle_macro: 50,
            max_stepsize: 0.05,
            h_core,
            eri,
            energy_nuc,
        })
    }

    /// Non-redundant rotations (r, p) with r > p: core-active, core-virtual, active-virtual
    fn rotation_pairs(&self, nmo: usize) -> Vec<(usize, usize)> {
        let nocc = self.ncore + self.ncas;
        let mut pairs = Vec::new();
        for p in 0..nocc {
            let start = if p < self.ncore { self.ncore } else { nocc };
            for r in start..nmo {
                pairs.push((r, p));
            }
        }
        pairs
    }

    fn evaluate(&self, mo: DMatrix<f64>) -> Result<Evaluation> {
        let (ncore, ncas) = (self.ncore, self.ncas);
        let nmo = mo.ncols();
        let cc = mo.columns(0, ncore).into_owned();
        let ca = mo.columns(ncore, ncas).into_owned();

        // inactive Fock and core energy
        let dm_core = 2.0 * &cc * cc.transpose();
        let (jc, kc) = self.eri.jk(&dm_core);
        let fcore_ao = &self.h_core + jc - kc * 0.5;
        let ecore = self.energy_nuc + 0.5 * dm_core.dot(&(&self.h_core + &fcore_ao));

        // (ru|vw) for all r, the active block gives the CI integrals
        let ruvw = self.eri.transform([&mo, &ca, &ca, &ca]);
        let mut eri_act = Tensor4::zeros([ncas; 4]);
        for t in 0..ncas {
            for u in 0..ncas {
                for v in 0..ncas {
                    for w in 0..ncas {
                        eri_act.set(t, u, v, w, ruvw.get(ncore + t, u, v, w));
                    }
                }
            }
        }
        let h1 = ca.transpose() * &fcore_ao * &ca;
        let roots = self.fcisolver.kernel(&h1, &eri_act, ncas, self.nelecas, ecore)?;

        let mut e_tot = 0.0;
        let mut casdm1 = DMatrix::zeros(ncas, ncas);
        let mut casdm2 = Tensor4::zeros([ncas; 4]);
        let states = roots
            .iter()
            .flat_map(|r| r.ci.iter().zip(&r.energies).map(move |(c, &e)| (r.nelec, c, e)));
        for ((nelec, ci, e), &w) in states.zip(&self.fcisolver.weights) {
            let (dm1, dm2) = make_rdm12(ci, ncas, nelec)?;
            e_tot += w * e;
            casdm1 += dm1 * w;
            for (acc, x) in casdm2.data.iter_mut().zip(&dm2.data) {
                *acc += w * x;
            }
        }

        // generalized Fock G[p, r], p indexes the density
        let fi = mo.transpose() * &fcore_ao * &mo;
        let dm_act = &ca * &casdm1 * ca.transpose();
        let (ja, ka) = self.eri.jk(&dm_act);
        let fa = mo.transpose() * (ja - ka * 0.5) * &mo;
        let ftot = &fi + &fa;
        let mut g = DMatrix::zeros(nmo, nmo);
        for i in 0..ncore {
            for r in 0..nmo {
                g[(i, r)] = 2.0 * ftot[(r, i)];
            }
        }
        for t in 0..ncas {
            for r in 0..nmo {
                let mut val = 0.0;
                for u in 0..ncas {
                    val += casdm1[(t, u)] * fi[(r, ncore + u)];
                    for v in 0..ncas {
                        for w in 0..ncas {
                            val += casdm2.get(t, u, v, w) * ruvw.get(r, u, v, w);
                        }
                    }
                }
                g[(ncore + t, r)] = val;
            }
        }

        let occ = |p: usize| {
            if p < ncore {
                2.0
            } else if p < ncore + ncas {
                casdm1[(p - ncore, p - ncore)]
            } else {
                0.0
            }
        };
        let pairs = self.rotation_pairs(nmo);
        let mut gradient = Vec::with_capacity(pairs.len());
        let mut hdiag = Vec::with_capacity(pairs.len());
        for &(r, p) in &pairs {
            gradient.push(2.0 * (g[(p, r)] - g[(r, p)]));
            let h = 2.0 * (ftot[(r, r)] * occ(p) + ftot[(p, p)] * occ(r))
                - 2.0 * (g[(p, p)] + g[(r, r)]);
            hdiag.push(h);
        }

        Ok(Evaluation {
            mo_coeff: mo,
            e_tot,
            roots,
            casdm1,
            gradient,
            hdiag,
        })
    }

    /// Diagonal Newton step kappa = -g / |h|, scaled down to `max_stepsize`
    fn newton_step(&self, eval: &Evaluation) -> Vec<f64> {
        let mut step: Vec<f64> = eval
            .gradient
            .iter()
            .zip(&eval.hdiag)
            .map(|(&g, &h)| -g / h.abs().max(1e-2))
            .collect();
        let norm = step.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > self.max_stepsize {
            let scale = self.max_stepsize / norm;
            step.iter_mut().for_each(|x| *x *= scale);
        }
        step
    }

    fn rotate(&self, mo: &DMatrix<f64>, step: &[f64], scale: f64) -> DMatrix<f64> {
        let nmo = mo.ncols();
        let mut x = DMatrix::zeros(nmo, nmo);
        for (&(r, p), &k) in self.rotation_pairs(nmo).iter().zip(step) {
            x[(r, p)] = k * scale;
            x[(p, r)] = -k * scale;
        }
        mo * expmat(&x)
    }

    pub fn kernel(&self, mo_coeff: &DMatrix<f64>) -> Result<CasResult> {
        let nmo = mo_coeff.ncols();
        if mo_coeff.nrows() != self.h_core.nrows() {
            bail!(
                "MO coefficients have {} rows for {} basis functions",
                mo_coeff.nrows(),
                self.h_core.nrows()
            );
        }
        if self.ncore + self.ncas > nmo {
            bail!(
                "ncore {} + ncas {} exceeds the {} available orbitals",
                self.ncore,
                self.ncas,
                nmo
            );
        }

        info!("===========================================");
        info!("        CASSCF Initialization");
        info!("===========================================");
        info!("ncore = {}  ncas = {}  nelecas = {}", self.ncore, self.ncas, self.nelecas);
        info!("Number of states: {}", self.fcisolver.nroots());
        info!("Orbital rotations: {}", self.rotation_pairs(nmo).len());
        info!("Convergence threshold: {:.2e} (gradient {:.2e})", self.conv_tol, self.conv_tol_grad);

        let mut current = self.evaluate(mo_coeff.clone())?;
        info!(
            "CASCI E = {:.12} au, |g| = {:.3e}",
            current.e_tot,
            current.gradient_norm()
        );
        let mut converged = self.max_cycle_macro == 0;

        for cycle in 1..=self.max_cycle_macro {
            let step = self.newton_step(&current);
            let mut scale = 1.0;
            let trial = loop {
                let trial = self.evaluate(self.rotate(&current.mo_coeff, &step, scale))?;
                if trial.e_tot <= current.e_tot + 1e-12 {
                    break Some(trial);
                }
                scale *= 0.5;
                debug!("Energy rose to {:.12}, step scaled by {}", trial.e_tot, scale);
                if scale < 1.0 / 64.0 {
                    break None;
                }
            };
            let Some(trial) = trial else {
                warn!("No energy lowering along the orbital step at cycle {}", cycle);
                converged = current.gradient_norm() < self.conv_tol_grad;
                break;
            };

            let de = trial.e_tot - current.e_tot;
            current = trial;
            let gnorm = current.gradient_norm();
            info!(
                "Macro cycle {}: E = {:.12} au, dE = {:.3e} au, |g| = {:.3e}",
                cycle, current.e_tot, de, gnorm
            );
            if de.abs() < self.conv_tol && gnorm < self.conv_tol_grad {
                info!("CASSCF converged in {} macro cycles.", cycle);
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                "CASSCF not converged in {} macro cycles, continuing with the last iterate",
                self.max_cycle_macro
            );
        }

        let mut result = CasResult {
            e_tot: current.e_tot,
            e_states: Vec::new(),
            ci: Vec::new(),
            state_solver: Vec::new(),
            state_nelec: Vec::new(),
            state_spin_square: Vec::new(),
            mo_coeff: current.mo_coeff,
            ncore: self.ncore,
            ncas: self.ncas,
            nelecas: self.nelecas,
            casdm1: current.casdm1,
            converged,
        };
        for (solver, roots) in current.roots.into_iter().enumerate() {
            for ((e, ci), s2) in roots.energies.into_iter().zip(roots.ci).zip(roots.spin_square) {
                result.e_states.push(e);
                result.ci.push(ci);
                result.state_solver.push(solver);
                result.state_nelec.push(roots.nelec);
                result.state_spin_square.push(s2);
            }
        }
        for (i, (e, s2)) in result.e_states.iter().zip(&result.state_spin_square).enumerate() {
            info!("State {}  E = {:.12}  S^2 = {:.7}", i, e, s2);
        }
        Ok(result)
    }
}
