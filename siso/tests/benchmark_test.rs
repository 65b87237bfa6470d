//! End-to-end runs of the term splitting benchmark
//!
//! The carbon run uses the bundled STO-3G file and finishes quickly. The
//! germanium run downloads cc-pVTZ-DK and takes minutes, so it is ignored by
//! default.

use siso::app::{run_benchmark, BasisRegistry, FileBasisLoader, AU2CM};
use siso::config::Config;
use std::fs;
use std::path::PathBuf;

fn example_path(filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("example")
        .join(filename)
}

fn load_example(filename: &str) -> Config {
    let text = fs::read_to_string(example_path(filename)).unwrap();
    let config = serde_yml::from_str::<Config>(&text).unwrap().with_defaults();
    config.validate().unwrap();
    config
}

fn registry() -> BasisRegistry<FileBasisLoader> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    BasisRegistry::new(FileBasisLoader::new(
        root.join("tests/basis_sets"),
        std::env::temp_dir().join("siso_benchmark_cache"),
    ))
}

#[test]
fn test_carbon_multiplet_structure() {
    let config = load_example("c_sto3g.yaml");
    let result = run_benchmark(&config, &mut registry()).unwrap();

    assert_eq!(result.ncore, 1);
    assert_eq!(result.ncas, 4);
    assert_eq!(result.dm_shape, (5, 5));
    assert_eq!(result.casscf.e_states.len(), 11);
    assert_eq!(result.solver_nelecas, vec![(3, 1), (2, 2)]);
    assert!(result.casscf.converged);
    assert_eq!(result.so_energies.len(), 14);

    // the spin-orbit coupling only redistributes the spin-free energies
    let trace: f64 = result.state_energies.iter().sum();
    let so_trace: f64 = result.so_energies.iter().sum();
    assert!((trace - so_trace).abs() < 1e-9);

    // J = 0, 1, 2 of 3P and the five 1D levels stay degenerate
    for [start, end] in [[0usize, 1usize], [1, 4], [4, 9], [9, 14]] {
        let group = &result.so_energies[start..end];
        let spread = group.iter().cloned().fold(f64::MIN, f64::max)
            - group.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread * AU2CM < 1e-3, "group [{}, {}) spread {}", start, end, spread);
    }

    // regular multiplet with the Lande interval rule, 1D well above 3P
    let s = &result.splittings;
    assert_eq!(s.len(), 3);
    assert!(s[0] > 0.0 && s[1] > s[0]);
    let ratio = s[1] / s[0];
    assert!(ratio > 2.7 && ratio < 3.3, "ratio {}", ratio);
    assert!(s[2] > 100.0 * s[0]);
}

#[test]
fn test_runs_are_reproducible() {
    let config = load_example("c_sto3g.yaml");
    let first = run_benchmark(&config, &mut registry()).unwrap();
    let second = run_benchmark(&config, &mut registry()).unwrap();
    assert_eq!(first.so_energies.len(), second.so_energies.len());
    for (a, b) in first.so_energies.iter().zip(&second.so_energies) {
        assert!((a - b).abs() < 1e-10);
    }
}

#[test]
#[ignore] // downloads cc-pVTZ-DK and runs for minutes
fn test_germanium_cc_pvtz_dk_splittings() {
    let config = load_example("ge_casscf.yaml");
    let result = run_benchmark(&config, &mut registry()).unwrap();
    assert_eq!(result.ncore, 14);
    assert_eq!(result.so_energies.len(), 14);
    let reference = [428.7261, 1241.3271, 9482.4184];
    for (value, expected) in result.splittings.iter().zip(reference) {
        assert!((value - expected).abs() < 2.0, "{} vs {}", value, expected);
    }
}
