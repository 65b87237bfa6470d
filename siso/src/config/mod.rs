//! Configuration management for the spin-orbit benchmark
//!
//! Every section is optional in the YAML file. Missing values fall back to the
//! germanium CAS(4e,4o) calculation, so an empty configuration runs the
//! reference benchmark.

mod args;

pub use args::Args;

use color_eyre::eyre::{bail, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub molecule: MoleculeParams,
    pub scf: ScfParams,
    pub casscf: CasscfParams,
    pub siso: SisoParams,
    pub report: ReportParams,
}

/// Atomic position configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Atom {
    pub element: String,
    pub coords: [f64; 3],
}

/// Molecule specification
#[derive(Debug, Deserialize, Serialize)]
pub struct MoleculeParams {
    pub atoms: Option<Vec<Atom>>,
    /// "angstrom" or "bohr"
    pub unit: Option<String>,
    pub basis: Option<String>,
    /// 2S = N(alpha) - N(beta)
    pub spin: Option<i32>,
    pub charge: Option<i32>,
    pub symmetry: Option<bool>,
    pub verbose: Option<usize>,
    /// "sfx2c1e" or "none"
    pub relativistic: Option<String>,
}

impl Default for MoleculeParams {
    fn default() -> Self {
        MoleculeParams {
            atoms: Some(vec![Atom {
                element: "Ge".to_string(),
                coords: [0.0, 0.0, 0.0],
            }]),
            unit: Some("angstrom".to_string()),
            basis: Some("ccpvtz-dk".to_string()),
            spin: Some(0),
            charge: Some(0),
            symmetry: Some(false),
            verbose: Some(3),
            relativistic: Some("sfx2c1e".to_string()),
        }
    }
}

impl MoleculeParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.atoms.is_none() {
            self.atoms = defaults.atoms;
        }
        if self.unit.is_none() {
            self.unit = defaults.unit;
        }
        if self.basis.is_none() {
            self.basis = defaults.basis;
        }
        if self.spin.is_none() {
            self.spin = defaults.spin;
        }
        if self.charge.is_none() {
            self.charge = defaults.charge;
        }
        if self.symmetry.is_none() {
            self.symmetry = defaults.symmetry;
        }
        if self.verbose.is_none() {
            self.verbose = defaults.verbose;
        }
        if self.relativistic.is_none() {
            self.relativistic = defaults.relativistic;
        }
        self
    }
}

/// SCF-specific parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct ScfParams {
    pub conv_tol: Option<f64>,
    pub max_cycle: Option<usize>,
    pub diis_subspace_size: Option<usize>,
    pub level_shift: Option<f64>,
    pub damping: Option<f64>,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            conv_tol: Some(1e-14),
            max_cycle: Some(100),
            diis_subspace_size: Some(8),
            level_shift: Some(0.0),
            damping: Some(0.0),
        }
    }
}

impl ScfParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.conv_tol.is_none() {
            self.conv_tol = defaults.conv_tol;
        }
        if self.max_cycle.is_none() {
            self.max_cycle = defaults.max_cycle;
        }
        if self.diis_subspace_size.is_none() {
            self.diis_subspace_size = defaults.diis_subspace_size;
        }
        if self.level_shift.is_none() {
            self.level_shift = defaults.level_shift;
        }
        if self.damping.is_none() {
            self.damping = defaults.damping;
        }
        self
    }
}

/// One CI solver of the state-averaged mix
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverParams {
    /// 2Ms of the determinant space, N(alpha) - N(beta)
    pub spin: usize,
    pub nroots: usize,
    /// Adds shift * (S^2 - ss) to the CI Hamiltonian
    pub spin_penalty: Option<SpinPenalty>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SpinPenalty {
    pub shift: f64,
    pub ss: f64,
}

/// CASSCF parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct CasscfParams {
    pub ncas: Option<usize>,
    pub nelecas: Option<usize>,
    pub solvers: Option<Vec<SolverParams>>,
    /// One weight per root over all solvers; uniform when absent
    pub weights: Option<Vec<f64>>,
    pub conv_tol: Option<f64>,
    pub conv_tol_grad: Option<f64>,
    pub max_cycle_macro: Option<usize>,
    pub max_stepsize: Option<f64>,
}

impl Default for CasscfParams {
    fn default() -> Self {
        CasscfParams {
            ncas: Some(4),
            nelecas: Some(4),
            solvers: Some(vec![
                SolverParams {
                    spin: 2,
                    nroots: 3,
                    spin_penalty: Some(SpinPenalty { shift: 0.2, ss: 2.0 }),
                },
                SolverParams {
                    spin: 0,
                    nroots: 3 + 5,
                    spin_penalty: None,
                },
            ]),
            weights: None,
            conv_tol: Some(1e-7),
            conv_tol_grad: None,
            max_cycle_macro: Some(50),
            max_stepsize: Some(0.05),
        }
    }
}

impl CasscfParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.ncas.is_none() {
            self.ncas = defaults.ncas;
        }
        if self.nelecas.is_none() {
            self.nelecas = defaults.nelecas;
        }
        if self.solvers.is_none() {
            self.solvers = defaults.solvers;
        }
        if self.conv_tol.is_none() {
            self.conv_tol = defaults.conv_tol;
        }
        if self.max_cycle_macro.is_none() {
            self.max_cycle_macro = defaults.max_cycle_macro;
        }
        if self.max_stepsize.is_none() {
            self.max_stepsize = defaults.max_stepsize;
        }
        self
    }

    pub fn total_roots(&self) -> usize {
        self.solvers
            .as_ref()
            .map(|s| s.iter().map(|p| p.nroots).sum())
            .unwrap_or(0)
    }

    /// Explicit weights, or 1/N for each of the N roots
    pub fn state_weights(&self) -> Vec<f64> {
        match &self.weights {
            Some(w) => w.clone(),
            None => {
                let n = self.total_roots();
                vec![1.0 / n as f64; n]
            }
        }
    }

    /// Gradient threshold, sqrt(conv_tol) unless given
    pub fn gradient_tolerance(&self) -> f64 {
        self.conv_tol_grad
            .unwrap_or_else(|| self.conv_tol.unwrap_or(1e-7).sqrt())
    }
}

/// One row of the state table handed to the spin-orbit step
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateSpec {
    /// Index into the CASSCF state list
    pub root: usize,
    /// Swap alpha and beta strings of the CI vector
    #[serde(default)]
    pub transpose: bool,
    pub nelec: [usize; 2],
    /// 2S
    pub two_s: i32,
    /// 2Ms
    pub two_ms: i32,
}

impl StateSpec {
    fn new(root: usize, transpose: bool, nelec: [usize; 2], two_s: i32, two_ms: i32) -> Self {
        StateSpec {
            root,
            transpose,
            nelec,
            two_s,
            two_ms,
        }
    }
}

/// Spin-orbit state interaction parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct SisoParams {
    pub amfi: Option<bool>,
    pub qed_factor: Option<f64>,
    pub states: Option<Vec<StateSpec>>,
}

/// 3P with Ms = -1, 0, +1 followed by 1D, as labelled for a p^2 atom in CAS(4e,4o)
fn default_states() -> Vec<StateSpec> {
    let mut states = Vec::new();
    for root in 0..3 {
        states.push(StateSpec::new(root, true, [1, 3], 2, -2));
    }
    for root in 3..6 {
        states.push(StateSpec::new(root, false, [2, 2], 2, 0));
    }
    for root in 0..3 {
        states.push(StateSpec::new(root, false, [3, 1], 2, 2));
    }
    for root in 6..11 {
        states.push(StateSpec::new(root, false, [2, 2], 0, 0));
    }
    states
}

impl Default for SisoParams {
    fn default() -> Self {
        SisoParams {
            amfi: Some(true),
            qed_factor: Some(1.0),
            states: Some(default_states()),
        }
    }
}

impl SisoParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.amfi.is_none() {
            self.amfi = defaults.amfi;
        }
        if self.qed_factor.is_none() {
            self.qed_factor = defaults.qed_factor;
        }
        if self.states.is_none() {
            self.states = defaults.states;
        }
        self
    }
}

/// A term splitting line of the final comparison
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TermLine {
    pub label: String,
    pub reference: f64,
}

/// Post-processing of the spin-orbit energies
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportParams {
    /// Half-open index ranges [start, end) of the sorted spin-orbit energies
    pub groups: Option<Vec<[usize; 2]>>,
    /// One line per group after the first, measured from group 0
    pub lines: Option<Vec<TermLine>>,
}

impl Default for ReportParams {
    fn default() -> Self {
        ReportParams {
            groups: Some(vec![[0, 1], [1, 4], [4, 9], [9, 14]]),
            lines: Some(vec![
                TermLine {
                    label: "E 3P  (J = 1) - (J = 0)".to_string(),
                    reference: 557.1341,
                },
                TermLine {
                    label: "E 3P  (J = 2) - (J = 0)".to_string(),
                    reference: 1409.9609,
                },
                TermLine {
                    label: "E 1D(J = 2) - 3P(J = 0)".to_string(),
                    reference: 7125.2989,
                },
            ]),
        }
    }
}

impl ReportParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.groups.is_none() {
            self.groups = defaults.groups;
        }
        if self.lines.is_none() {
            self.lines = defaults.lines;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.molecule = self.molecule.with_defaults();
        self.scf = self.scf.with_defaults();
        self.casscf = self.casscf.with_defaults();
        self.siso = self.siso.with_defaults();
        self.report = self.report.with_defaults();
        self
    }

    pub fn solvers(&self) -> &[SolverParams] {
        self.casscf.solvers.as_deref().unwrap_or(&[])
    }

    pub fn states(&self) -> &[StateSpec] {
        self.siso.states.as_deref().unwrap_or(&[])
    }

    pub fn groups(&self) -> &[[usize; 2]] {
        self.report.groups.as_deref().unwrap_or(&[])
    }

    /// Check the cross references between sections before any integrals are computed.
    pub fn validate(&self) -> Result<()> {
        let nelecas = self.casscf.nelecas.unwrap_or(0);
        let ncas = self.casscf.ncas.unwrap_or(0);
        let solvers = self.solvers();
        if solvers.is_empty() {
            bail!("casscf.solvers must name at least one CI solver");
        }
        for (i, solver) in solvers.iter().enumerate() {
            if solver.spin > nelecas || (nelecas - solver.spin) % 2 != 0 {
                bail!(
                    "solver {}: spin {} is incompatible with {} active electrons",
                    i,
                    solver.spin,
                    nelecas
                );
            }
            if solver.nroots == 0 {
                bail!("solver {}: nroots must be positive", i);
            }
        }

        let nroots = self.casscf.total_roots();
        let weights = self.casscf.state_weights();
        if weights.len() != nroots {
            bail!(
                "{} state weights given for {} roots",
                weights.len(),
                nroots
            );
        }
        let wsum: f64 = weights.iter().sum();
        if (wsum - 1.0).abs() > 1e-8 {
            bail!("state weights sum to {}, expected 1", wsum);
        }

        let states = self.states();
        for (i, state) in states.iter().enumerate() {
            if state.root >= nroots {
                bail!(
                    "state {} refers to root {} but only {} roots are computed",
                    i,
                    state.root,
                    nroots
                );
            }
            let [na, nb] = state.nelec;
            if na + nb != nelecas || na > ncas || nb > ncas {
                bail!(
                    "state {}: ({}, {}) electrons do not fit CAS({}e, {}o)",
                    i,
                    na,
                    nb,
                    nelecas,
                    ncas
                );
            }
            if state.two_ms != na as i32 - nb as i32 {
                bail!(
                    "state {}: 2Ms = {} does not match N(alpha) - N(beta) = {}",
                    i,
                    state.two_ms,
                    na as i32 - nb as i32
                );
            }
            if state.two_ms.abs() > state.two_s || (state.two_s - state.two_ms) % 2 != 0 {
                bail!(
                    "state {}: 2Ms = {} is not a component of 2S = {}",
                    i,
                    state.two_ms,
                    state.two_s
                );
            }
        }

        let mut covered = 0;
        for (i, &[start, end]) in self.groups().iter().enumerate() {
            if start != covered || end <= start {
                bail!("report group {} [{}, {}) is not contiguous", i, start, end);
            }
            covered = end;
        }
        if covered != states.len() {
            bail!(
                "report groups cover {} energies but {} states are coupled",
                covered,
                states.len()
            );
        }
        let nlines = self.report.lines.as_ref().map(|l| l.len()).unwrap_or(0);
        if nlines + 1 != self.groups().len() {
            bail!(
                "{} comparison lines given for {} term groups",
                nlines,
                self.groups().len()
            );
        }
        Ok(())
    }
}
