use super::*;
use crate::cgto::ContractedShell;
use crate::gto::{cart_components, Direction, PrimitivePair};
use crate::helper::boys_function;
use nalgebra::{DMatrix, Vector3};

fn shell(l: usize, exps: &[f64], coefs: &[&[f64]], atom: usize, center: Vector3<f64>) -> Shell {
    let contracted = ContractedShell {
        l,
        exponents: exps.to_vec(),
        coefficients: coefs.iter().map(|c| c.to_vec()).collect(),
    };
    Shell::from_contracted(&contracted, atom, center)
}

fn two_center_basis() -> MolecularBasis {
    let a = Vector3::new(0.0, 0.0, 0.0);
    let b = Vector3::new(0.3, -0.4, 1.1);
    MolecularBasis::from_shells(
        vec![
            shell(0, &[3.0, 0.6], &[&[0.4, 0.7]], 0, a),
            shell(1, &[1.1], &[&[1.0]], 0, a),
            shell(2, &[0.8, 0.3], &[&[0.6, 0.5], &[-0.2, 1.0]], 1, b),
            shell(1, &[0.45], &[&[1.0]], 1, b),
        ],
        vec![2.0, 1.0],
        vec![a, b],
    )
}

#[test]
fn test_spherical_shells_are_orthonormal() {
    let center = Vector3::new(0.1, 0.2, -0.3);
    let shells = (0..=4).map(|l| shell(l, &[0.9], &[&[1.0]], 0, center)).collect();
    let basis = MolecularBasis::from_shells(shells, vec![1.0], vec![center]);
    let s = overlap(&basis);
    let identity = DMatrix::<f64>::identity(basis.nao(), basis.nao());
    assert!((s - identity).amax() < 1e-12);
}

#[test]
fn test_contracted_functions_are_normalized() {
    let basis = two_center_basis();
    let s = overlap(&basis);
    for i in 0..basis.nao() {
        assert!((s[(i, i)] - 1.0).abs() < 1e-12, "S[{}] = {}", i, s[(i, i)]);
    }
    assert!((&s - s.transpose()).amax() < 1e-14);
}

#[test]
fn test_kinetic_gradient_and_laplacian_routes_agree() {
    let (a, b) = (0.7, 1.3);
    let A = Vector3::new(0.2, 0.0, -0.5);
    let B = Vector3::new(-0.4, 0.6, 0.1);
    let pair = PrimitivePair::new(a, &A, 2, b, &B, 1, 2);
    for ia in cart_components(2) {
        for ib in cart_components(1) {
            let gradient: f64 = Direction::all()
                .iter()
                .map(|&d| derivative_pair_sum(&ia, &ib, a, b, d, d, |x, y| pair.overlap(x, y)))
                .sum::<f64>()
                * 0.5;

            // -1/2 <a| d^2/dx^2 |b> with d^2 x^j e^{-b x^2} = j(j-1) x^{j-2} - 2b(2j+1) x^j + 4b^2 x^{j+2}
            let mut laplacian = 0.0;
            for d in 0..3 {
                let j = ib[d];
                let shifted = |power: usize| {
                    let mut y = ib;
                    y[d] = power;
                    pair.overlap(&ia, &y)
                };
                let mut term = -2.0 * b * (2 * j + 1) as f64 * shifted(j) + 4.0 * b * b * shifted(j + 2);
                if j >= 2 {
                    term += (j * (j - 1)) as f64 * shifted(j - 2);
                }
                laplacian += -0.5 * term;
            }
            assert!((gradient - laplacian).abs() < 1e-12);
        }
    }
}

#[test]
fn test_kinetic_of_s_primitive() {
    // <s|T|s> = 3a/2 for a normalized s primitive
    let basis = MolecularBasis::from_shells(
        vec![shell(0, &[0.8], &[&[1.0]], 0, Vector3::zeros())],
        vec![1.0],
        vec![Vector3::zeros()],
    );
    let t = kinetic(&basis);
    assert!((t[(0, 0)] - 1.5 * 0.8).abs() < 1e-12);
}

#[test]
fn test_nuclear_attraction_two_s_closed_form() {
    let (a, b) = (1.3, 0.4);
    let A = Vector3::new(0.0, 0.0, 0.0);
    let B = Vector3::new(0.0, 0.5, 0.9);
    let C = Vector3::new(-0.3, 0.2, 0.4);
    let basis = MolecularBasis::from_shells(
        vec![shell(0, &[a], &[&[1.0]], 0, A), shell(0, &[b], &[&[1.0]], 1, B)],
        vec![0.0, 0.0, 3.0],
        vec![A, B, C],
    );
    let v = nuclear(&basis);
    let p = a + b;
    let mu = a * b / p;
    let P = (A * a + B * b) / p;
    let na = (2.0 * a / PI).powf(0.75);
    let nb = (2.0 * b / PI).powf(0.75);
    let expected = -3.0 * 2.0 * PI / p
        * (-mu * (A - B).norm_squared()).exp()
        * boys_function(0, p * (P - C).norm_squared())
        * na
        * nb;
    assert!((v[(0, 1)] - expected).abs() < 1e-12);
    assert!((v[(1, 0)] - expected).abs() < 1e-12);
}

#[test]
fn test_pvp_of_s_primitive_on_nucleus() {
    let a = 1.7;
    let basis = MolecularBasis::from_shells(
        vec![shell(0, &[a], &[&[1.0]], 0, Vector3::zeros())],
        vec![4.0],
        vec![Vector3::zeros()],
    );
    let n2 = (2.0 * a / PI).powf(1.5);
    let w = pvp(&basis);
    assert!((w[(0, 0)] - (-2.0 * PI * 4.0 * n2)).abs() < 1e-10);
    let v = nuclear(&basis);
    assert!((v[(0, 0)] - (-4.0 * PI * n2 / a)).abs() < 1e-10);
}

#[test]
fn test_eri_single_center_s() {
    let a = 0.9;
    let basis = MolecularBasis::from_shells(
        vec![shell(0, &[a], &[&[1.0]], 0, Vector3::zeros())],
        vec![1.0],
        vec![Vector3::zeros()],
    );
    let eri = EriTensor::build(&basis);
    assert!((eri.get(0, 0, 0, 0) - 2.0 * (a / PI).sqrt()).abs() < 1e-12);
}

/// A very tight normalized s function behaves like a unit point charge.
fn basis_with_probe() -> (MolecularBasis, usize) {
    let a = Vector3::new(0.0, 0.0, 0.0);
    let b = Vector3::new(0.3, -0.4, 1.1);
    let c = Vector3::new(-0.5, 0.7, 0.2);
    let basis = MolecularBasis::from_shells(
        vec![
            shell(2, &[0.8], &[&[1.0]], 0, a),
            shell(1, &[0.5, 1.4], &[&[0.6, 0.5]], 1, b),
            shell(0, &[0.7], &[&[1.0]], 1, b),
            shell(0, &[1.0e10], &[&[1.0]], 2, c),
        ],
        vec![0.0, 0.0, 1.0],
        vec![a, b, c],
    );
    let probe = basis.nao() - 1;
    (basis, probe)
}

#[test]
fn test_eri_point_charge_limit() {
    let (basis, probe) = basis_with_probe();
    let eri = EriTensor::build(&basis);
    let v = nuclear(&basis);
    for i in 0..probe {
        for j in 0..probe {
            let e = eri.get(i, j, probe, probe);
            assert!((e + v[(i, j)]).abs() < 1e-7, "({} {}|tt) = {} vs {}", i, j, e, -v[(i, j)]);
        }
    }
}

#[test]
fn test_eri_quartet_order_independent() {
    let basis = two_center_basis();
    let eri = EriTensor::build(&basis);
    let (block, dims) = quartet_block(&basis, [1, 2, 3, 0], BraOperator::Plain);
    let off: Vec<usize> = [1, 2, 3, 0].iter().map(|&s| basis.ao_offsets[s]).collect();
    for a in 0..dims[1] {
        for b in 0..dims[2] {
            for c in 0..dims[3] {
                for d in 0..dims[4] {
                    let v = block[((a * dims[2] + b) * dims[3] + c) * dims[4] + d];
                    let stored = eri.get(off[0] + a, off[1] + b, off[2] + c, off[3] + d);
                    assert!((v - stored).abs() < 1e-12);
                }
            }
        }
    }
}

#[test]
fn test_jk_against_explicit_sums() {
    let basis = two_center_basis();
    let n = basis.nao();
    let eri = EriTensor::build(&basis);
    let mut dm = DMatrix::<f64>::from_fn(n, n, |i, j| ((i * 7 + j * 3) % 5) as f64 * 0.1 - 0.2);
    dm = &dm + dm.transpose();
    let (j, k) = eri.jk(&dm);
    for m in 0..n {
        for v in 0..n {
            let mut jj = 0.0;
            let mut kk = 0.0;
            for l in 0..n {
                for s in 0..n {
                    jj += eri.get(m, v, l, s) * dm[(l, s)];
                    kk += eri.get(m, l, v, s) * dm[(l, s)];
                }
            }
            assert!((j[(m, v)] - jj).abs() < 1e-12);
            assert!((k[(m, v)] - kk).abs() < 1e-12);
        }
    }
}

#[test]
fn test_transform_with_identity_is_unpack() {
    let basis = two_center_basis();
    let n = basis.nao();
    let eri = EriTensor::build(&basis);
    let id = DMatrix::<f64>::identity(n, n);
    let t = eri.transform([&id, &id, &id, &id]);
    assert_eq!(t.dims, [n, n, n, n]);
    for (i, j, k, l) in [(0, 1, 2, 3), (4, 4, 1, 0), (n - 1, 2, n - 2, 5)] {
        assert!((t.get(i, j, k, l) - eri.get(i, j, k, l)).abs() < 1e-14);
    }
}

#[test]
fn test_spin_orbit_nuclear_is_antisymmetric() {
    let basis = two_center_basis();
    let p = spin_orbit_nuclear(&basis);
    for comp in &p {
        assert!((comp + comp.transpose()).amax() < 1e-12);
        assert!(comp.amax() > 1e-4);
    }
}

#[test]
fn test_spin_orbit_nuclear_vanishes_for_s_only() {
    let a = Vector3::new(0.0, 0.0, 0.0);
    let b = Vector3::new(0.0, 0.0, 1.4);
    let basis = MolecularBasis::from_shells(
        vec![shell(0, &[1.0], &[&[1.0]], 0, a), shell(0, &[0.5], &[&[1.0]], 1, b)],
        vec![1.0, 1.0],
        vec![a, b],
    );
    // the two s centres and both nuclei are collinear along z, so no torque
    let p = spin_orbit_nuclear(&basis);
    for comp in &p {
        assert!(comp.amax() < 1e-12);
    }
}

#[test]
fn test_spin_orbit_coulomb_point_charge_limit() {
    let (basis, probe) = basis_with_probe();
    let n = basis.nao();
    let mut dm = DMatrix::<f64>::zeros(n, n);
    dm[(probe, probe)] = 1.0;
    let p = spin_orbit_nuclear(&basis);
    let (vj, _, _) = spin_orbit_jk(&basis, &dm, false);
    for comp in 0..3 {
        for i in 0..probe {
            for j in 0..probe {
                assert!(
                    (vj[comp][(i, j)] + p[comp][(i, j)]).abs() < 1e-7,
                    "component {} ({}, {})",
                    comp,
                    i,
                    j
                );
            }
        }
    }
}

#[test]
fn test_spin_orbit_mean_field_amfi_drops_two_center_terms() {
    let basis = two_center_basis();
    let n = basis.nao();
    let dm = DMatrix::<f64>::from_fn(n, n, |i, j| if i == j { 0.5 } else { 0.05 });
    let full = spin_orbit_mean_field(&basis, &dm, false);
    let amfi = spin_orbit_mean_field(&basis, &dm, true);
    let ranges = basis.atom_ao_ranges();
    // atom 0 / atom 1 off-diagonal block has no one-centre contribution
    for comp in 0..3 {
        for i in ranges[0].clone() {
            for j in ranges[1].clone() {
                assert_eq!(amfi[comp][(i, j)], 0.0);
            }
        }
        assert!((&full[comp] + full[comp].transpose()).amax() < 1e-10);
        assert!((&amfi[comp] + amfi[comp].transpose()).amax() < 1e-10);
    }
}

#[test]
fn test_nuclear_repulsion() {
    let e = nuclear_repulsion(&[1.0, 1.0], &[Vector3::zeros(), Vector3::new(0.0, 0.0, 1.4)]);
    assert!((e - 1.0 / 1.4).abs() < 1e-14);
}
