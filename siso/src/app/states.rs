use crate::config::StateSpec;
use crate::fci_impl::spin_flip;
use crate::mcscf_impl::CasResult;
use crate::siso_impl::StateDescriptor;
use color_eyre::eyre::{bail, Result};
use tracing::debug;

/// Tag CASSCF states with spin labels, flipping alpha and beta strings where asked.
pub fn build_state_descriptors(specs: &[StateSpec], cas: &CasResult) -> Result<Vec<StateDescriptor>> {
    let mut out = Vec::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        if spec.root >= cas.e_states.len() {
            bail!(
                "state {} refers to root {} but CASSCF has {} states",
                i,
                spec.root,
                cas.e_states.len()
            );
        }
        let (na, nb) = cas.state_nelec[spec.root];
        let (ci, nelec) = if spec.transpose {
            (spin_flip(&cas.ci[spec.root]), (nb, na))
        } else {
            (cas.ci[spec.root].clone(), (na, nb))
        };
        if nelec != (spec.nelec[0], spec.nelec[1]) {
            bail!(
                "state {}: root {} has ({}, {}) electrons, labelled ({}, {})",
                i,
                spec.root,
                nelec.0,
                nelec.1,
                spec.nelec[0],
                spec.nelec[1]
            );
        }
        debug!(
            "state {:2}: root {:2} nelec {:?} 2S = {} 2Ms = {:+}",
            i, spec.root, nelec, spec.two_s, spec.two_ms
        );
        out.push(StateDescriptor {
            nelec,
            two_s: spec.two_s,
            two_ms: spec.two_ms,
            energy: cas.e_states[spec.root],
            ci,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn fake_result() -> CasResult {
        CasResult {
            e_tot: -1.0,
            e_states: vec![-1.5, -0.5],
            ci: vec![DMatrix::from_element(4, 4, 0.25), DMatrix::from_element(6, 6, 1.0 / 6.0)],
            state_solver: vec![0, 1],
            state_nelec: vec![(3, 1), (2, 2)],
            state_spin_square: vec![2.0, 0.0],
            mo_coeff: DMatrix::identity(5, 5),
            ncore: 1,
            ncas: 4,
            nelecas: 4,
            casdm1: DMatrix::identity(4, 4),
            converged: true,
        }
    }

    fn spec(root: usize, transpose: bool, nelec: [usize; 2], two_s: i32, two_ms: i32) -> StateSpec {
        StateSpec {
            root,
            transpose,
            nelec,
            two_s,
            two_ms,
        }
    }

    #[test]
    fn test_transposed_state_swaps_electron_counts() {
        let cas = fake_result();
        let specs = [spec(0, true, [1, 3], 2, -2), spec(0, false, [3, 1], 2, 2), spec(1, false, [2, 2], 0, 0)];
        let states = build_state_descriptors(&specs, &cas).unwrap();
        assert_eq!(states[0].nelec, (1, 3));
        assert_eq!(states[0].energy, -1.5);
        assert_eq!(states[1].nelec, (3, 1));
        assert_eq!(states[2].ci.shape(), (6, 6));
    }

    #[test]
    fn test_mismatched_labels_are_rejected() {
        let cas = fake_result();
        assert!(build_state_descriptors(&[spec(0, false, [1, 3], 2, -2)], &cas).is_err());
        assert!(build_state_descriptors(&[spec(2, false, [2, 2], 0, 0)], &cas).is_err());
    }
}
