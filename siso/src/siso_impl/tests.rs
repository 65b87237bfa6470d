//! Tests for the spin-orbit state interaction

use super::*;
use crate::fci_impl::tests::random_integrals;
use crate::fci_impl::{spin_flip, FCISolver};
use nalgebra::{DMatrix, Matrix3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_antisymmetric(n: usize, scale: f64, rng: &mut StdRng) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(n, n);
    for p in 0..n {
        for q in 0..p {
            let v = rng.gen_range(-scale..scale);
            a[(p, q)] = v;
            a[(q, p)] = -v;
        }
    }
    a
}

fn random_hso(seed: u64) -> [DMatrix<f64>; 3] {
    let mut rng = StdRng::seed_from_u64(seed);
    [
        random_antisymmetric(4, 0.05, &mut rng),
        random_antisymmetric(4, 0.05, &mut rng),
        random_antisymmetric(4, 0.05, &mut rng),
    ]
}

/// Two complete triplets (Ms = -1, 0, +1) and two singlets of a random CAS(4, 4)
fn multiplet_states(seed: u64) -> Vec<StateDescriptor> {
    let (h1, eri) = random_integrals(4, seed);
    let ms1 = FCISolver::new(2, 2).fix_spin(5.0, 2.0).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let ms0 = FCISolver::new(0, 36).kernel(&h1, &eri, 4, 4, 0.0).unwrap();

    let mut states = Vec::new();
    for (e, ci) in ms1.energies.iter().zip(&ms1.ci) {
        let partner = ms0
            .energies
            .iter()
            .zip(&ms0.spin_square)
            .position(|(e0, s2)| (e0 - e).abs() < 1e-8 && (s2 - 2.0).abs() < 1e-6)
            .unwrap();
        states.push(StateDescriptor {
            nelec: (1, 3),
            two_s: 2,
            two_ms: -2,
            energy: *e,
            ci: spin_flip(ci),
        });
        states.push(StateDescriptor {
            nelec: (2, 2),
            two_s: 2,
            two_ms: 0,
            energy: *e,
            ci: ms0.ci[partner].clone(),
        });
        states.push(StateDescriptor {
            nelec: (3, 1),
            two_s: 2,
            two_ms: 2,
            energy: *e,
            ci: ci.clone(),
        });
    }
    let singlets = ms0
        .spin_square
        .iter()
        .enumerate()
        .filter(|(_, s2)| s2.abs() < 1e-6)
        .map(|(i, _)| i)
        .take(2);
    for i in singlets {
        states.push(StateDescriptor {
            nelec: (2, 2),
            two_s: 0,
            two_ms: 0,
            energy: ms0.energies[i],
            ci: ms0.ci[i].clone(),
        });
    }
    assert_eq!(states.len(), 8);
    states
}

#[test]
fn test_hamiltonian_is_hermitian_and_conserves_trace() {
    let states = multiplet_states(23);
    let trace: f64 = states.iter().map(|s| s.energy).sum();
    let siso = SISO::new(states, 4).unwrap();
    let hso = random_hso(1);
    let h = siso.hamiltonian(&hso).unwrap();
    let residue = (&h - h.adjoint()).iter().map(|z| z.norm()).fold(0.0, f64::max);
    assert!(residue < 1e-12);
    for i in 0..h.nrows() {
        assert!((h[(i, i)].re - siso.states[i].energy).abs() < 1e-12);
        assert!(h[(i, i)].im.abs() < 1e-12);
    }
    let energies = siso.kernel(&hso).unwrap();
    assert_eq!(energies.len(), 8);
    assert!((energies.iter().sum::<f64>() - trace).abs() < 1e-10);
    assert!(energies.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_zero_coupling_returns_spin_free_energies() {
    let states = multiplet_states(29);
    let mut expected: Vec<f64> = states.iter().map(|s| s.energy).collect();
    expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let siso = SISO::new(states, 4).unwrap();
    let zero = [DMatrix::zeros(4, 4), DMatrix::zeros(4, 4), DMatrix::zeros(4, 4)];
    let energies = siso.kernel(&zero).unwrap();
    for (e, x) in energies.iter().zip(&expected) {
        assert!((e - x).abs() < 1e-12);
    }
}

#[test]
fn test_spectrum_is_invariant_under_spin_axis_rotation() {
    let siso = SISO::new(multiplet_states(31), 4).unwrap();
    let hso = random_hso(2);
    let reference = siso.kernel(&hso).unwrap();

    let rotation = nalgebra::Rotation3::from_euler_angles(0.4, -1.1, 2.3);
    let r: Matrix3<f64> = *rotation.matrix();
    let rotated: [DMatrix<f64>; 3] = [0, 1, 2].map(|k| {
        &hso[0] * r[(k, 0)] + &hso[1] * r[(k, 1)] + &hso[2] * r[(k, 2)]
    });
    let energies = siso.kernel(&rotated).unwrap();
    for (e, x) in energies.iter().zip(&reference) {
        assert!((e - x).abs() < 1e-10, "{} vs {}", e, x);
    }
    // the coupling does split the levels
    let mut spin_free: Vec<f64> = siso.states.iter().map(|s| s.energy).collect();
    spin_free.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let shift = reference
        .iter()
        .zip(&spin_free)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(shift > 1e-8);
}

#[test]
fn test_mislabelled_states_are_rejected() {
    let mut states = multiplet_states(37);
    states[0].two_ms = 2;
    assert!(SISO::new(states, 4).is_err());

    let mut states = multiplet_states(37);
    states[6].two_s = 1;
    assert!(SISO::new(states, 4).is_err());

    let mut states = multiplet_states(37);
    states[1].ci = DMatrix::zeros(4, 4);
    assert!(SISO::new(states, 4).is_err());

    let siso = SISO::new(multiplet_states(37), 4).unwrap();
    let wrong = [DMatrix::zeros(3, 3), DMatrix::zeros(3, 3), DMatrix::zeros(3, 3)];
    assert!(siso.kernel(&wrong).is_err());
    assert!(SISO::new(Vec::new(), 4).is_err());
}

#[test]
fn test_projection_to_active_orbitals() {
    let mut rng = StdRng::seed_from_u64(41);
    let ao = [
        random_antisymmetric(6, 1.0, &mut rng),
        random_antisymmetric(6, 1.0, &mut rng),
        random_antisymmetric(6, 1.0, &mut rng),
    ];
    let mo = DMatrix::<f64>::identity(6, 6);
    let act = project_to_active(&ao, &mo, 1, 4);
    for k in 0..3 {
        assert_eq!(act[k].shape(), (4, 4));
        assert!((&act[k] - ao[k].view((1, 1), (4, 4))).amax() < 1e-15);
    }
}
