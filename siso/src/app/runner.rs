use super::basis::{BasisLoader, BasisRegistry};
use super::report::{format_term_line, splittings_cm, term_energies};
use super::states::build_state_descriptors;
use crate::config::Config;
use crate::fci_impl::FCISolver;
use crate::mcscf_impl::{CasResult, StateAverageMix, CASSCF};
use crate::mole::Molecule;
use crate::scf_impl::RestrictedHF;
use crate::siso_impl::{project_to_active, spin_orbit_ao, SISO};
use crate::x2c::{core_hamiltonian, Relativity};
use ::basis::integrals::overlap;
use ::basis::{EriTensor, MolecularBasis};
use color_eyre::eyre::{bail, Result, WrapErr};
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::info;

/// Everything the benchmark prints, kept for callers and tests
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub scf_energy: f64,
    pub ncore: usize,
    pub ncas: usize,
    pub casscf: CasResult,
    /// active (alpha, beta) electrons of each CI solver
    pub solver_nelecas: Vec<(usize, usize)>,
    pub dm_shape: (usize, usize),
    /// spin-free energies of the tagged states, in table order
    pub state_energies: Vec<f64>,
    pub so_energies: Vec<f64>,
    pub terms: Vec<f64>,
    /// cm-1, one per term after the first
    pub splittings: Vec<f64>,
}

/// Integrals shared by every stage
struct Hamiltonian {
    basis: MolecularBasis,
    h_core: DMatrix<f64>,
    overlap: DMatrix<f64>,
    eri: Arc<EriTensor>,
    energy_nuc: f64,
}

fn build_hamiltonian<L: BasisLoader>(
    mol: &Molecule,
    config: &Config,
    registry: &mut BasisRegistry<L>,
) -> Result<Hamiltonian> {
    info!("\nPreparing basis and integrals...");
    let basis_map = registry.load_for_elements(&mol.basis, &mol.unique_symbols())?;
    let basis = mol.build_basis(&basis_map)?;
    info!("{} atoms, {} basis functions", mol.natm(), basis.nao());

    let relativity = Relativity::parse(config.molecule.relativistic.as_deref().unwrap_or("sfx2c1e"))?;
    let h_core = core_hamiltonian(&basis, relativity)?;
    let overlap = overlap(&basis);
    let eri = Arc::new(EriTensor::build(&basis));
    Ok(Hamiltonian {
        basis,
        h_core,
        overlap,
        eri,
        energy_nuc: mol.energy_nuc(),
    })
}

fn run_mean_field(ham: &Hamiltonian, mol: &Molecule, config: &Config) -> Result<RestrictedHF> {
    info!("\nStarting SCF cycle...\n");
    let params = &config.scf;
    let mut scf = RestrictedHF::new(
        ham.h_core.clone(),
        ham.overlap.clone(),
        ham.eri.clone(),
        mol.nelec()?,
        ham.energy_nuc,
    )?;
    scf.max_cycle = params.max_cycle.unwrap_or(100);
    scf.level_shift = params.level_shift.unwrap_or(0.0);
    scf.damping = params.damping.unwrap_or(0.0);
    scf.set_convergence_threshold(params.conv_tol.unwrap_or(1e-14));
    scf.enable_diis(params.diis_subspace_size.unwrap_or(8));
    let energy = scf.run()?;
    info!("Hartree-Fock Total Energy: {:.10} au", energy);
    Ok(scf)
}

fn run_casscf(ham: &Hamiltonian, mol: &Molecule, config: &Config, scf: &RestrictedHF) -> Result<CasResult> {
    let params = &config.casscf;
    let ncas = params.ncas.unwrap_or(4);
    let nelecas = params.nelecas.unwrap_or(4);
    let solvers: Vec<FCISolver> = config
        .solvers()
        .iter()
        .map(|s| {
            let solver = FCISolver::new(s.spin, s.nroots);
            match s.spin_penalty {
                Some(p) => solver.fix_spin(p.shift, p.ss),
                None => solver,
            }
        })
        .collect();
    let mix = StateAverageMix::new(solvers, params.state_weights())?;
    let mut mc = CASSCF::new(
        ham.h_core.clone(),
        ham.eri.clone(),
        ham.energy_nuc,
        mol.nelectron()?,
        ncas,
        nelecas,
        mix,
    )?;
    mc.conv_tol = params.conv_tol.unwrap_or(1e-7);
    mc.conv_tol_grad = params.gradient_tolerance();
    mc.max_cycle_macro = params.max_cycle_macro.unwrap_or(50);
    mc.max_stepsize = params.max_stepsize.unwrap_or(0.05);
    mc.kernel(&scf.coeffs).wrap_err("CASSCF failed")
}

/// Molecule, RHF, state-averaged CASSCF, spin-orbit state interaction and the
/// term splitting report, printed to stdout as each stage finishes.
pub fn run_benchmark<L: BasisLoader>(
    config: &Config,
    registry: &mut BasisRegistry<L>,
) -> Result<BenchmarkResult> {
    let mol = Molecule::from_config(&config.molecule)?;
    let ham = build_hamiltonian(&mol, config, registry)?;
    let scf = run_mean_field(&ham, &mol, config)?;

    let nelectron = mol.nelectron()?;
    let ncas = config.casscf.ncas.unwrap_or(4);
    let nelecas = config.casscf.nelecas.unwrap_or(4);
    if nelecas > nelectron {
        bail!("{} active electrons requested from {} electrons", nelecas, nelectron);
    }
    let ncore = (nelectron - nelecas) / 2;
    println!("ncore = {}  ncas = {}", ncore, ncas);

    let cas = run_casscf(&ham, &mol, config, &scf)?;
    let spin = mol.spin.clamp(-(nelecas as i32), nelecas as i32);
    let nelecas_pair = ((nelecas as i32 + spin) / 2, (nelecas as i32 - spin) / 2);
    println!("{:?} {:?}", nelecas_pair, cas.e_states);
    let solver_nelecas = cas.nelecas_per_solver();
    for (i, nelec) in solver_nelecas.iter().enumerate() {
        info!("CI solver {}: nelecas = {:?}", i, nelec);
    }

    let dmao = cas.make_rdm1_ao();
    println!("{:?}", dmao.shape());

    let states = build_state_descriptors(config.states(), &cas)?;
    let state_energies: Vec<f64> = states.iter().map(|s| s.energy).collect();
    let siso = SISO::new(states, ncas)?;
    let amfi = config.siso.amfi.unwrap_or(true);
    let qed_factor = config.siso.qed_factor.unwrap_or(1.0);
    info!("\nSpin-orbit integrals (amfi = {}, qed factor = {})", amfi, qed_factor);
    let hso_ao = spin_orbit_ao(&ham.basis, &dmao, amfi, qed_factor);
    let hso = project_to_active(&hso_ao, &cas.mo_coeff, cas.ncore, cas.ncas);
    let so_energies = siso.kernel(&hso)?;
    println!("{:?}", so_energies);

    let terms = term_energies(&so_energies, config.groups())?;
    let splittings = splittings_cm(&terms);
    let lines = config.report.lines.as_deref().unwrap_or(&[]);
    for (line, value) in lines.iter().zip(&splittings) {
        println!("{}", format_term_line(line, *value));
    }

    Ok(BenchmarkResult {
        scf_energy: scf.e_tot,
        ncore,
        ncas,
        dm_shape: dmao.shape(),
        casscf: cas,
        solver_nelecas,
        state_energies,
        so_energies,
        terms,
        splittings,
    })
}
