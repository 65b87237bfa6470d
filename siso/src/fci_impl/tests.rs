//! Tests for the FCI solver

use super::*;
use basis::Tensor4;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random real integrals with the 8-fold permutational symmetry of (pq|rs)
pub(crate) fn random_integrals(norb: usize, seed: u64) -> (DMatrix<f64>, Tensor4) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut h1 = DMatrix::zeros(norb, norb);
    for p in 0..norb {
        h1[(p, p)] = -2.0 + 0.6 * p as f64;
        for q in 0..p {
            let v = rng.gen_range(-0.2..0.2);
            h1[(p, q)] = v;
            h1[(q, p)] = v;
        }
    }
    let mut eri = Tensor4::zeros([norb; 4]);
    for p in 0..norb {
        for q in 0..=p {
            for r in 0..norb {
                for s in 0..=r {
                    if p * (p + 1) / 2 + q < r * (r + 1) / 2 + s {
                        continue;
                    }
                    let mut v = rng.gen_range(-0.05..0.05);
                    if p == q && r == s {
                        v += 0.5;
                    }
                    for (a, b, c, d) in [
                        (p, q, r, s),
                        (q, p, r, s),
                        (p, q, s, r),
                        (q, p, s, r),
                        (r, s, p, q),
                        (s, r, p, q),
                        (r, s, q, p),
                        (s, r, q, p),
                    ] {
                        eri.set(a, b, c, d, v);
                    }
                }
            }
        }
    }
    (h1, eri)
}

fn rdm_energy(h1: &DMatrix<f64>, eri: &Tensor4, dm1: &DMatrix<f64>, dm2: &Tensor4) -> f64 {
    let n = h1.nrows();
    let mut e = h1.dot(dm1);
    for p in 0..n {
        for q in 0..n {
            for r in 0..n {
                for s in 0..n {
                    e += 0.5 * eri.get(p, q, r, s) * dm2.get(p, q, r, s);
                }
            }
        }
    }
    e
}

#[test]
fn test_string_enumeration() {
    let strings = make_strings(4, 2);
    assert_eq!(strings.len(), 6);
    assert_eq!(strings[0], 0b0011);
    assert!(strings.iter().all(|s| s.count_ones() == 2));
    assert_eq!(make_strings(4, 0), vec![0]);
    let space = FciSpace::new(4, (3, 1)).unwrap();
    assert_eq!(space.shape(), (4, 4));
    assert_eq!(space.ndet(), 16);
    assert!(FciSpace::new(3, (4, 0)).is_err());
}

#[test]
fn test_hamiltonian_is_symmetric_and_matches_rdm_energy() {
    let (h1, eri) = random_integrals(4, 7);
    let space = FciSpace::new(4, (2, 2)).unwrap();
    let h = space.hamiltonian(&h1, &eri);
    assert!((&h - h.transpose()).amax() < 1e-12);

    let roots = FCISolver::new(0, 3).kernel(&h1, &eri, 4, 4, 1.5).unwrap();
    for (e, ci) in roots.energies.iter().zip(&roots.ci) {
        assert!((ci.norm() - 1.0).abs() < 1e-12);
        let (dm1, dm2) = make_rdm12(ci, 4, roots.nelec).unwrap();
        assert!((dm1.trace() - 4.0).abs() < 1e-10);
        assert!((rdm_energy(&h1, &eri, &dm1, &dm2) + 1.5 - e).abs() < 1e-10);
        let dm1_only = make_rdm1(ci, 4, roots.nelec).unwrap();
        assert!((dm1_only - &dm1).amax() < 1e-12);
    }
    assert!(roots.energies.windows(2).all(|w| w[0] <= w[1] + 1e-12));
}

#[test]
fn test_two_electron_density_partial_trace() {
    let (h1, eri) = random_integrals(4, 11);
    let roots = FCISolver::new(2, 1).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let (dm1, dm2) = make_rdm12(&roots.ci[0], 4, roots.nelec).unwrap();
    // sum_r dm2[p,q,r,r] = (N - 1) dm1[p,q]
    for p in 0..4 {
        for q in 0..4 {
            let tr: f64 = (0..4).map(|r| dm2.get(p, q, r, r)).sum();
            assert!((tr - 3.0 * dm1[(p, q)]).abs() < 1e-10);
        }
    }
}

#[test]
fn test_spin_free_roots_are_spin_eigenstates() {
    let (h1, eri) = random_integrals(4, 3);
    let roots = FCISolver::new(0, 8).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    for (ci, &s2) in roots.ci.iter().zip(&roots.spin_square) {
        let nearest = [0.0, 2.0, 6.0]
            .iter()
            .map(|&x| (s2 - x).abs())
            .fold(f64::MAX, f64::min);
        assert!(nearest < 1e-8, "<S^2> = {}", s2);
        assert!((spin_square(ci, 4, (2, 2)).unwrap() - s2).abs() < 1e-10);
    }
}

#[test]
fn test_spin_penalty_selects_triplets_and_is_not_reported() {
    let (h1, eri) = random_integrals(4, 5);
    let plain = FCISolver::new(2, 16).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let penalized = FCISolver::new(2, 3).fix_spin(5.0, 2.0).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let triplets: Vec<f64> = plain
        .energies
        .iter()
        .zip(&plain.spin_square)
        .filter(|(_, s2)| (**s2 - 2.0).abs() < 1e-6)
        .map(|(&e, _)| e)
        .take(3)
        .collect();
    assert_eq!(triplets.len(), 3);
    for (i, &s2) in penalized.spin_square.iter().enumerate() {
        assert!((s2 - 2.0).abs() < 1e-8);
        assert!((penalized.energies[i] - triplets[i]).abs() < 1e-10);
    }
}

#[test]
fn test_spin_flipped_vector_is_an_eigenvector() {
    let (h1, eri) = random_integrals(4, 13);
    let roots = FCISolver::new(2, 2).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let flipped = spin_flip(&roots.ci[0]);
    let space = FciSpace::new(4, (1, 3)).unwrap();
    assert_eq!(flipped.shape(), space.shape());
    let h = space.hamiltonian(&h1, &eri);
    let v = space.flatten(&flipped);
    let residual = &h * &v - &v * roots.energies[0];
    assert!(residual.amax() < 1e-10);
}

#[test]
fn test_spin_resolved_densities_sum_to_rdm1() {
    let (h1, eri) = random_integrals(4, 17);
    let roots = FCISolver::new(2, 2).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let ci = &roots.ci[1];
    let (dm_a, dm_b) = trans_rdm1s(ci, ci, 4, (3, 1)).unwrap();
    assert!((dm_a.trace() - 3.0).abs() < 1e-10);
    assert!((dm_b.trace() - 1.0).abs() < 1e-10);
    let dm1 = make_rdm1(ci, 4, (3, 1)).unwrap();
    assert!((dm_a + dm_b - dm1).amax() < 1e-12);

    // orthogonal states have traceless transition densities
    let (ta, tb) = trans_rdm1s(&roots.ci[0], ci, 4, (3, 1)).unwrap();
    assert!((ta.trace() + tb.trace()).abs() < 1e-10);
}

#[test]
fn test_raising_operator_connects_triplet_components() {
    let (h1, eri) = random_integrals(4, 19);
    let ms0 = FCISolver::new(0, 16).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let ms1 = FCISolver::new(2, 1).fix_spin(5.0, 2.0).kernel(&h1, &eri, 4, 4, 0.0).unwrap();
    let triplet = ms0
        .spin_square
        .iter()
        .position(|&s2| (s2 - 2.0).abs() < 1e-6)
        .unwrap();
    assert!((ms0.energies[triplet] - ms1.energies[0]).abs() < 1e-10);

    // <S=1, M=1|S+|S=1, M=0> = sqrt(2) up to the phase of the two vectors
    let dm = trans_rdm1_raise(&ms1.ci[0], &ms0.ci[triplet], 4, (2, 2)).unwrap();
    assert!((dm.trace().abs() - 2f64.sqrt()).abs() < 1e-8);
    assert!(trans_rdm1_raise(&ms1.ci[0], &ms0.ci[triplet], 4, (4, 0)).is_err());
}

#[test]
fn test_invalid_requests_are_errors() {
    let (h1, eri) = random_integrals(2, 1);
    assert!(FCISolver::new(1, 1).kernel(&h1, &eri, 2, 2, 0.0).is_err());
    assert!(FCISolver::new(0, 5).kernel(&h1, &eri, 2, 2, 0.0).is_err());
    let wrong = DMatrix::zeros(2, 3);
    assert!(make_rdm1(&wrong, 2, (1, 1)).is_err());
}
